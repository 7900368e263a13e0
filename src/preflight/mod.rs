//! Preflight checks for the external-tool path.
//!
//! Embedding and extraction are pure stream work. Building an nmstate
//! ramdisk is not: it shells out and needs scratch space. These checks
//! catch a missing tool or an unusable workdir before any work starts.
//!
//! # Checks Performed
//!
//! - **Host tools**: cpio, unsquashfs are installed
//! - **Workdir**: the scratch directory exists and is writable
//!
//! # Usage
//!
//! ```rust,no_run
//! use isoeditor::config::EditorConfig;
//! use isoeditor::preflight::PreflightChecker;
//!
//! let checker = PreflightChecker::new(EditorConfig::default());
//! let report = checker.run_all();
//!
//! if !report.is_ok() {
//!     eprintln!("Preflight checks failed:");
//!     for error in report.errors() {
//!         eprintln!("  - {}: {}", error.name, error.message);
//!     }
//!     std::process::exit(1);
//! }
//! ```

mod host_tools;
mod workdir;

pub use host_tools::{check_host_tools, HostTool, HOST_TOOLS};
pub use workdir::check_workdir;

use crate::config::EditorConfig;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// All preflight results.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Check if all preflight checks passed.
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Get all failing checks.
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Print a summary of the preflight checks.
    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        if self.is_ok() {
            println!("All preflight checks passed ({}/{})", self.passed_count(), self.total_count());
        } else {
            println!(
                "Preflight checks failed: {} of {} passed",
                self.passed_count(),
                self.total_count()
            );
        }
    }
}

/// Runs every check against one configuration.
pub struct PreflightChecker {
    config: EditorConfig,
}

impl PreflightChecker {
    pub fn new(config: EditorConfig) -> Self {
        Self { config }
    }

    /// Run all preflight checks and return a report.
    pub fn run_all(&self) -> PreflightReport {
        let mut report = PreflightReport::default();
        report.checks.extend(check_host_tools());
        report.checks.push(check_workdir(&self.config.workdir));
        report
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }
}
