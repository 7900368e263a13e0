//! nmstate ramdisk.
//!
//! Pulls `nmstatectl` out of a CoreOS rootfs image and packs it into a small
//! CPIO archive that can be embedded as the custom ramdisk.
//!
//! # Steps
//!
//! ```text
//! rootfs.img --cpio -idm--> root.squashfs --unsquashfs--> squashfs-root/ostree/deploy/*/deploy/*/usr/bin/nmstatectl
//!                                                                              |
//!                                              gzip cpio: usr/, usr/bin/, usr/bin/nmstatectl (0755)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::artifact::cpio::{build_cpio_with_level, CpioEntry};
use crate::config::{EditorConfig, NMSTATECTL_RAMDISK_PATH};
use crate::error::{IoResultExt, IsoEditorError, Result};
use crate::process::{Cmd, Executor};

const SQUASHFS_NAME: &str = "root.squashfs";
const SQUASHFS_ROOT: &str = "squashfs-root";
const NMSTATECTL_DEPLOY_GLOB: &str = "ostree/deploy/*/deploy/*/usr/bin/nmstatectl";

/// Builds nmstate ramdisks, running external tools through `E`.
pub struct NmstateHandler<E> {
    executor: E,
    config: EditorConfig,
}

impl<E: Executor> NmstateHandler<E> {
    pub fn new(executor: E, config: EditorConfig) -> Self {
        Self { executor, config }
    }

    /// Build the ramdisk archive from the rootfs image at `rootfs_path`.
    pub fn build_nmstate_ramdisk(&self, rootfs_path: &Path) -> Result<Vec<u8>> {
        let scratch = tempfile::Builder::new()
            .prefix("nmstate-")
            .tempdir_in(&self.config.workdir)
            .io_context(|| format!("creating scratch directory in {}", self.config.workdir.display()))?;
        let dir = scratch.path();

        self.executor.execute(
            &Cmd::new("cpio")
                .args(["-idm", SQUASHFS_NAME])
                .stdin_file(rootfs_path)
                .error_msg(format!("failed to extract {} from {}", SQUASHFS_NAME, rootfs_path.display())),
            dir,
        )?;

        self.executor.execute(
            &Cmd::new("unsquashfs")
                .args(["-no-xattrs", "-d", SQUASHFS_ROOT, SQUASHFS_NAME, NMSTATECTL_DEPLOY_GLOB])
                .error_msg("failed to extract nmstatectl"),
            dir,
        )?;

        let binary_path = find_nmstatectl(&dir.join(SQUASHFS_ROOT))?;
        let binary = fs::read(&binary_path).io_context(|| format!("reading {}", binary_path.display()))?;
        tracing::debug!(path = %binary_path.display(), size = binary.len(), "Found nmstatectl");

        build_cpio_with_level(&ramdisk_entries(binary), self.config.gzip_level)
    }
}

fn find_nmstatectl(root: &Path) -> Result<PathBuf> {
    let suffix = Path::new(NMSTATECTL_RAMDISK_PATH);
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.path().ends_with(suffix))
        .map(|e| e.into_path())
        .ok_or_else(|| {
            IsoEditorError::FormatIncompatible(format!(
                "nmstatectl not found under {}",
                root.display()
            ))
        })
}

fn ramdisk_entries(binary: Vec<u8>) -> Vec<CpioEntry> {
    let mut entries = Vec::new();
    let mut dir = String::new();
    let mut components = NMSTATECTL_RAMDISK_PATH.split('/').peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        if !dir.is_empty() {
            dir.push('/');
        }
        dir.push_str(component);
        entries.push(CpioEntry::directory(dir.clone(), 0o755));
    }
    entries.push(CpioEntry::file(NMSTATECTL_RAMDISK_PATH, binary, 0o755));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::cpio::tests::read_archive;
    use crate::process::CommandResult;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records commands; `unsquashfs` lays out a fake deployment.
    struct MockExecutor {
        calls: RefCell<Vec<(Cmd, PathBuf)>>,
        binary: Option<Vec<u8>>,
    }

    impl MockExecutor {
        fn new(binary: Option<&[u8]>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                binary: binary.map(|b| b.to_vec()),
            }
        }
    }

    impl Executor for MockExecutor {
        fn execute(&self, cmd: &Cmd, workdir: &Path) -> Result<CommandResult> {
            self.calls.borrow_mut().push((cmd.clone(), workdir.to_path_buf()));
            if cmd.program() == "unsquashfs" {
                if let Some(binary) = &self.binary {
                    let bin = workdir.join("squashfs-root/ostree/deploy/rhcos/deploy/abc123.0/usr/bin");
                    fs::create_dir_all(&bin).unwrap();
                    fs::write(bin.join("nmstatectl"), binary).unwrap();
                }
            }
            Ok(CommandResult {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn config(dir: &Path) -> EditorConfig {
        EditorConfig {
            workdir: dir.to_path_buf(),
            ..EditorConfig::default()
        }
    }

    #[test]
    fn test_build_ramdisk() {
        let temp = TempDir::new().unwrap();
        let handler = NmstateHandler::new(MockExecutor::new(Some(b"\x7fELF nmstatectl")), config(temp.path()));

        let archive = handler.build_nmstate_ramdisk(Path::new("/srv/rootfs.img")).unwrap();
        let entries = read_archive(&archive);
        let listing: Vec<_> = entries.iter().map(|(p, _, m)| (p.as_str(), *m)).collect();
        assert_eq!(
            listing,
            vec![("usr", 0o040_755), ("usr/bin", 0o040_755), ("usr/bin/nmstatectl", 0o100_755)]
        );
        assert_eq!(entries[2].1, b"\x7fELF nmstatectl");

        let calls = handler.executor.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.display(), "cpio -idm root.squashfs");
        assert_eq!(calls[0].0.get_stdin(), Some(Path::new("/srv/rootfs.img")));
        assert_eq!(
            calls[1].0.display(),
            "unsquashfs -no-xattrs -d squashfs-root root.squashfs ostree/deploy/*/deploy/*/usr/bin/nmstatectl"
        );
        assert_eq!(calls[0].1, calls[1].1);
        assert!(calls[0].1.starts_with(temp.path()));
        // scratch directory is gone
        assert!(!calls[0].1.exists());
    }

    #[test]
    fn test_missing_binary() {
        let temp = TempDir::new().unwrap();
        let handler = NmstateHandler::new(MockExecutor::new(None), config(temp.path()));
        let err = handler.build_nmstate_ramdisk(Path::new("/srv/rootfs.img")).unwrap_err();
        assert!(matches!(err, IsoEditorError::FormatIncompatible(_)));
    }
}
