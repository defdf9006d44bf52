//! Archive-then-install lifecycle for analysis reports
//!
//! The live report is never removed: the filtered report replaces it with a
//! single rename, so its path always holds either the original or the
//! complete filtered content.

use chrono::NaiveDate;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RotationError, RotationFailure};
use crate::io::{parse_document, write_atomic, ReportLayout};

/// Paths involved in rotating one category's report
#[derive(Debug, Clone, PartialEq)]
pub struct RotationPlan {
  /// Live report, replaced in place
  pub original: PathBuf,
  /// Preserved copy of the unfiltered report
  pub archive: PathBuf,
  /// Deduplicated report to install
  pub filtered: PathBuf,
}

impl RotationPlan {
  pub fn for_category(layout: &ReportLayout, feed_date: NaiveDate, category: &str) -> Self {
    Self {
      original: layout.input_path(feed_date, category),
      archive: layout.archive_path(feed_date, category),
      filtered: layout.output_path(feed_date, category),
    }
  }
}

/// `Pending -> Archived -> Installed -> Done`. `Failed` marks on-disk state
/// that cannot be resumed without a person looking at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
  Pending,
  Archived,
  Installed,
  Done,
  Failed,
}

impl fmt::Display for RotationState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Pending => "pending",
      Self::Archived => "archived",
      Self::Installed => "installed",
      Self::Done => "done",
      Self::Failed => "failed",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileRotator;

impl FileRotator {
  pub fn new() -> Self {
    Self
  }

  /// Archive the original report and install the filtered one in its place.
  /// Safe to repeat after an interruption at any step.
  pub fn rotate(&self, plan: &RotationPlan) -> Result<RotationState, RotationFailure> {
    let mut state = RotationState::Pending;
    match self.advance(plan, &mut state) {
      Ok(()) => Ok(state),
      Err(source) => {
        tracing::error!(
          original = %plan.original.display(),
          reached = %state,
          error = %source,
          "Rotation failed"
        );
        Err(RotationFailure { reached: state, source })
      }
    }
  }

  /// How far a previous rotation got, judged from the files on disk.
  ///
  /// Once the archive exists, a live report that no longer matches it was
  /// installed by us and may since have been touched downstream; as long as
  /// it is still a valid report the rotation counts as done.
  pub fn status(&self, plan: &RotationPlan) -> RotationState {
    if !plan.archive.exists() {
      return RotationState::Pending;
    }

    let (original, archived) = match (fs::read(&plan.original), fs::read(&plan.archive)) {
      (Ok(original), Ok(archived)) => (original, archived),
      _ => return RotationState::Failed,
    };
    if fs::read(&plan.filtered).is_ok_and(|filtered| filtered == original) {
      return RotationState::Done;
    }
    if original == archived {
      return RotationState::Archived;
    }
    match parse_document(&plan.original, &original) {
      Ok(_) => RotationState::Done,
      Err(_) => RotationState::Failed,
    }
  }

  fn advance(&self, plan: &RotationPlan, state: &mut RotationState) -> Result<(), RotationError> {
    let filtered = read_filtered(&plan.filtered)?;

    if !plan.original.exists() {
      return Err(RotationError::OriginalMissing { path: plan.original.clone() });
    }
    let original = fs::read(&plan.original).map_err(|e| RotationError::io(&plan.original, e))?;

    if plan.archive.exists() {
      let archived = fs::read(&plan.archive).map_err(|e| RotationError::io(&plan.archive, e))?;
      if original == filtered {
        tracing::info!(original = %plan.original.display(), "Filtered report already installed");
        *state = RotationState::Done;
        return Ok(());
      }
      if archived != original {
        return Err(RotationError::ArchiveConflict {
          archive: plan.archive.clone(),
          original: plan.original.clone(),
        });
      }
      tracing::info!(archive = %plan.archive.display(), "Original already archived");
    } else {
      write_atomic(&plan.archive, &original).map_err(|e| RotationError::io(&plan.archive, e))?;
      tracing::info!(archive = %plan.archive.display(), "Archived original report");
    }
    *state = RotationState::Archived;

    write_atomic(&plan.original, &filtered).map_err(|e| RotationError::io(&plan.original, e))?;
    *state = RotationState::Installed;
    tracing::info!(original = %plan.original.display(), "Installed filtered report");

    let installed = fs::read(&plan.original).map_err(|e| RotationError::io(&plan.original, e))?;
    if installed != filtered {
      return Err(RotationError::LiveInvalid {
        path: plan.original.clone(),
        message: "installed bytes differ from the filtered report".to_string(),
      });
    }
    *state = RotationState::Done;
    Ok(())
  }
}

fn read_filtered(path: &Path) -> Result<Vec<u8>, RotationError> {
  let invalid =
    |message: String| RotationError::InvalidFiltered { path: path.to_path_buf(), message };

  let bytes = fs::read(path).map_err(|e| invalid(e.to_string()))?;
  parse_document(path, &bytes).map_err(|e| invalid(e.to_string()))?;
  Ok(bytes)
}
