//! Scratch directory check.

use super::CheckResult;
use std::path::Path;

/// Check that `workdir` is a directory we can create scratch space in.
pub fn check_workdir(workdir: &Path) -> CheckResult {
    if !workdir.is_dir() {
        return CheckResult::fail(
            "Workdir",
            format!("{} does not exist or is not a directory", workdir.display()),
            "Create it or point ISOEDITOR_WORKDIR elsewhere",
        );
    }

    match tempfile::tempdir_in(workdir) {
        Ok(_) => CheckResult::pass("Workdir", format!("{} is writable", workdir.display())),
        Err(e) => CheckResult::fail(
            "Workdir",
            format!("Cannot create scratch space in {}: {}", workdir.display(), e),
            "Fix permissions or point ISOEDITOR_WORKDIR elsewhere",
        ),
    }
}
