//! External programs needed by the nmstate ramdisk build.

use super::CheckResult;
use crate::process::which;

/// A program looked up on `PATH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTool {
    pub program: &'static str,
    /// Step of the ramdisk build that runs it
    pub step: &'static str,
    /// Package that ships it
    pub package: &'static str,
}

pub const HOST_TOOLS: &[HostTool] = &[
    HostTool {
        program: "cpio",
        step: "unpacking root.squashfs from the rootfs image",
        package: "cpio",
    },
    HostTool {
        program: "unsquashfs",
        step: "copying nmstatectl out of root.squashfs",
        package: "squashfs-tools",
    },
];

/// One result per entry of [`HOST_TOOLS`].
pub fn check_host_tools() -> Vec<CheckResult> {
    HOST_TOOLS.iter().map(check_tool).collect()
}

fn check_tool(tool: &HostTool) -> CheckResult {
    let name = format!("{} tool", tool.program);
    match which(tool.program) {
        Some(path) => CheckResult::pass(name, path.display().to_string()),
        None => CheckResult::fail(
            name,
            format!("not on PATH, needed for {}", tool.step),
            format!("install the {} package", tool.package),
        ),
    }
}
