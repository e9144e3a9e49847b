//! Container metadata patching via mkvpropedit.

use crate::exec::{self, ExecutionResult};
use crate::progress::{MkvpropeditGrammar, ProgressTracker};
use crate::{Error, Result};
use std::path::Path;
use std::process::Command;

/// Set the container title and refresh track statistics tags on a finished
/// merge output.
///
/// Fails with a finalize error if the output file is absent, which covers
/// the nominally-successful-run-without-output case.
pub fn set_title(
    tool: &Path,
    file: &Path,
    title: &str,
    tracker: &mut ProgressTracker,
) -> Result<ExecutionResult> {
    if !file.exists() {
        return Err(Error::Finalize {
            path: file.to_path_buf(),
        });
    }

    let mut command = Command::new(tool);
    command
        .arg(file)
        .args(["-e", "info", "-s"])
        .arg(format!("title={title}"))
        .arg("--add-track-statistics-tags");

    let mut grammar = MkvpropeditGrammar::new();
    exec::run(command, &mut grammar, tracker)
}
