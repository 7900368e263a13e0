//! Kernel argument embedding.
//!
//! Bootloader configs carry a run of `#` padding right before a
//! `# COREOS_KARG_EMBED_AREA` comment. Writing `" " + args + "\n"` over the
//! start of that run extends the kernel command line above it; unused
//! padding stays a comment.
//!
//! Which configs carry the area is listed in `/coreos/kargs.json`. Images
//! without that manifest get the grub and isolinux defaults.

use serde::Deserialize;

use crate::boundary::{find_marker_region_in, EmbedRegion, Marker};
use crate::config::{DEFAULT_GRUB_CONFIG_PATH, DEFAULT_ISOLINUX_CONFIG_PATH, KARGS_CONFIG_PATH};
use crate::error::{IsoEditorError, Result};
use crate::iso::IsoFilesystem;

/// What to do with a kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KargOperation {
    Append,
}

/// One kernel command line token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KernelArgument {
    pub operation: KargOperation,
    pub value: String,
}

impl KernelArgument {
    pub fn append(value: impl Into<String>) -> Self {
        Self {
            operation: KargOperation::Append,
            value: value.into(),
        }
    }
}

/// Parse a JSON list of `{"operation": ..., "value": ...}`.
///
/// Operations other than `append` are rejected.
pub fn parse_kernel_arguments(json: &str) -> Result<Vec<KernelArgument>> {
    serde_json::from_str(json)
        .map_err(|e| IsoEditorError::InvalidInput(format!("invalid kernel arguments: {}", e)))
}

/// Bytes written at the start of each embed area.
pub fn kargs_content(args: &[KernelArgument]) -> Result<Vec<u8>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        if arg.value.is_empty() || arg.value.contains('\n') {
            return Err(IsoEditorError::InvalidInput(format!(
                "invalid kernel argument {:?}",
                arg.value
            )));
        }
        values.push(arg.value.as_str());
    }
    Ok(format!(" {}\n", values.join(" ")).into_bytes())
}

#[derive(Debug, Deserialize)]
struct KargsManifest {
    files: Vec<KargsManifestFile>,
}

#[derive(Debug, Deserialize)]
struct KargsManifestFile {
    path: String,
}

/// Config files that carry the kernel argument embed area.
pub fn kargs_files<F: IsoFilesystem + ?Sized>(iso: &mut F, image: &str) -> Result<Vec<String>> {
    let data = match iso.read_file(KARGS_CONFIG_PATH) {
        Ok(data) => data,
        Err(e) if e.is_not_found() => {
            tracing::warn!(
                image = %image,
                "{} not found, using default kernel argument files",
                KARGS_CONFIG_PATH
            );
            return Ok(vec![
                DEFAULT_GRUB_CONFIG_PATH.to_string(),
                DEFAULT_ISOLINUX_CONFIG_PATH.to_string(),
            ]);
        }
        Err(e) => return Err(e),
    };

    let manifest: KargsManifest = serde_json::from_slice(&data).map_err(|e| {
        IsoEditorError::FormatIncompatible(format!("malformed {} in {}: {}", KARGS_CONFIG_PATH, image, e))
    })?;

    Ok(manifest
        .files
        .into_iter()
        .map(|f| format!("/{}", f.path.trim_start_matches('/')))
        .collect())
}

/// Embed areas of every kernel argument file, in manifest order.
pub fn kargs_regions<F: IsoFilesystem + ?Sized>(iso: &mut F, image: &str) -> Result<Vec<EmbedRegion>> {
    let marker = Marker::karg_embed_area()?;
    kargs_files(iso, image)?
        .iter()
        .map(|path| find_marker_region_in(iso, path, &marker, image))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso::IsoImage;
    use crate::testutil::{build_iso, TestFile};
    use std::io::Cursor;

    const CFG: &[u8] = b"linux /images/vmlinuz rd.neednet=1\n#################### COREOS_KARG_EMBED_AREA\n";

    fn iso(files: &[TestFile]) -> IsoImage<Cursor<Vec<u8>>> {
        IsoImage::new(Cursor::new(build_iso(files)), "test.iso").unwrap()
    }

    #[test]
    fn test_parse_append() {
        let args = parse_kernel_arguments(
            r#"[{"operation":"append","value":"ip=dhcp"},{"operation":"append","value":"console=ttyS0"}]"#,
        )
        .unwrap();
        assert_eq!(
            args,
            vec![KernelArgument::append("ip=dhcp"), KernelArgument::append("console=ttyS0")]
        );
    }

    #[test]
    fn test_parse_rejects_other_operations() {
        for op in ["replace", "delete", "APPEND"] {
            let json = format!(r#"[{{"operation":"{}","value":"x"}}]"#, op);
            let err = parse_kernel_arguments(&json).unwrap_err();
            assert!(matches!(err, IsoEditorError::InvalidInput(_)), "{}", op);
        }
    }

    #[test]
    fn test_content_format() {
        let args = vec![KernelArgument::append("ip=dhcp"), KernelArgument::append("quiet")];
        assert_eq!(kargs_content(&args).unwrap(), b" ip=dhcp quiet\n");
        assert!(kargs_content(&[KernelArgument::append("a\nb")]).is_err());
    }

    #[test]
    fn test_files_fall_back_without_manifest() {
        let mut iso = iso(&[TestFile::new("/EFI/redhat/grub.cfg", CFG.to_vec())]);
        assert_eq!(
            kargs_files(&mut iso, "test.iso").unwrap(),
            vec!["/EFI/redhat/grub.cfg", "/isolinux/isolinux.cfg"]
        );
    }

    #[test]
    fn test_files_from_manifest() {
        let manifest = br#"{"default":"coreos.liveiso=x","files":[{"path":"EFI/redhat/grub.cfg","offset":1},{"path":"boot/grub/grub.cfg"}],"size":1024}"#;
        let mut iso = iso(&[
            TestFile::new("/coreos/kargs.json", manifest.to_vec()),
            TestFile::new("/EFI/redhat/grub.cfg", CFG.to_vec()),
            TestFile::new("/boot/grub/grub.cfg", CFG.to_vec()),
        ]);

        assert_eq!(
            kargs_files(&mut iso, "test.iso").unwrap(),
            vec!["/EFI/redhat/grub.cfg", "/boot/grub/grub.cfg"]
        );

        let regions = kargs_regions(&mut iso, "test.iso").unwrap();
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.length == 20));
        assert_ne!(regions[0].offset, regions[1].offset);
    }

    #[test]
    fn test_malformed_manifest() {
        let mut iso = iso(&[TestFile::new("/coreos/kargs.json", b"{".to_vec())]);
        let err = kargs_files(&mut iso, "test.iso").unwrap_err();
        assert!(matches!(err, IsoEditorError::FormatIncompatible(_)));
    }

    #[test]
    fn test_missing_marker_fails() {
        let mut iso = iso(&[
            TestFile::new("/EFI/redhat/grub.cfg", CFG.to_vec()),
            TestFile::new("/isolinux/isolinux.cfg", b"append quiet\n".to_vec()),
        ]);
        let err = kargs_regions(&mut iso, "test.iso").unwrap_err();
        assert!(err.to_string().contains("COREOS_KARG_EMBED_AREA"));
        assert!(err.to_string().contains("/isolinux/isolinux.cfg"));
    }
}
