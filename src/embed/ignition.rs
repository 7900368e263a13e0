//! Ignition payloads and where they go.
//!
//! The payload is a CPIO archive holding `config.ign` and any system configs
//! under `usr/lib/ignition/base.d/`. Its destination is either the whole
//! `/images/ignition.img` placeholder or, when the image ships
//! `/coreos/igninfo.json`, a range inside the file that manifest names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::artifact::cpio::{build_cpio_with_level, CpioEntry};
use crate::boundary::{find_region_in, EmbedRegion};
use crate::config::{
    DEFAULT_GZIP_LEVEL, IGNITION_CONFIG_NAME, IGNITION_IMAGE_PATH, IGNITION_INFO_PATH,
    SYSTEM_CONFIG_DIR,
};
use crate::error::{IsoEditorError, Result};
use crate::iso::IsoFilesystem;

/// Contents of `/coreos/igninfo.json`.
///
/// `offset` and `length` are relative to `file`. A missing length means
/// "to the end of the file".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnitionInfo {
    pub file: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl IgnitionInfo {
    /// Image path of the containing file, with a leading `/`.
    pub fn image_path(&self) -> String {
        format!("/{}", self.file.trim_start_matches('/'))
    }

    /// Pretty JSON, as shipped in images.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| IsoEditorError::InvalidInput(format!("serializing ignition info: {}", e)))
    }
}

/// Where ignition content goes in a given image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnitionTarget {
    /// Absolute region in the image
    pub region: EmbedRegion,
    /// Region of the containing file, which `region` lies inside
    pub file: EmbedRegion,
    /// Parsed manifest, if the image has one
    pub info: Option<IgnitionInfo>,
}

impl IgnitionTarget {
    /// Offset of the embed area inside its containing file.
    pub fn offset_in_file(&self) -> u64 {
        self.region.offset - self.file.offset
    }
}

/// Locate the ignition embed area.
///
/// Only a missing `igninfo.json` selects the legacy placeholder; a present
/// but malformed manifest is an error.
pub fn find_ignition_target<F: IsoFilesystem + ?Sized>(iso: &mut F, image: &str) -> Result<IgnitionTarget> {
    let info = match iso.read_file(IGNITION_INFO_PATH) {
        Ok(data) => Some(serde_json::from_slice::<IgnitionInfo>(&data).map_err(|e| {
            IsoEditorError::FormatIncompatible(format!(
                "malformed {} in {}: {}",
                IGNITION_INFO_PATH, image, e
            ))
        })?),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    let Some(info) = info else {
        let region = find_region_in(iso, IGNITION_IMAGE_PATH)?;
        return Ok(IgnitionTarget {
            file: region.clone(),
            region,
            info: None,
        });
    };

    let file = find_region_in(iso, &info.image_path())?;
    let length = info
        .length
        .unwrap_or_else(|| file.length.saturating_sub(info.offset));
    if info.offset.checked_add(length).map_or(true, |end| end > file.length) {
        return Err(IsoEditorError::FormatIncompatible(format!(
            "{} describes {} bytes at offset {} but {} holds {} bytes",
            IGNITION_INFO_PATH, length, info.offset, file.file_path, file.length
        )));
    }

    let region = EmbedRegion {
        file_path: file.file_path.clone(),
        offset: file.offset + info.offset,
        length,
    };
    tracing::debug!(
        file = %file.file_path,
        offset = region.offset,
        length,
        "Using ignition area from {}",
        IGNITION_INFO_PATH
    );

    Ok(IgnitionTarget {
        region,
        file,
        info: Some(info),
    })
}

/// An ignition config plus system configs, bound for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnitionContent {
    /// Raw ignition JSON; opaque here
    pub config: Option<Vec<u8>>,
    /// File name -> content, installed under `usr/lib/ignition/base.d/`
    pub system_configs: BTreeMap<String, Vec<u8>>,
}

impl IgnitionContent {
    pub fn new(config: impl Into<Vec<u8>>) -> Self {
        Self {
            config: Some(config.into()),
            system_configs: BTreeMap::new(),
        }
    }

    pub fn with_system_config(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.system_configs.insert(name.into(), content.into());
        self
    }

    /// Build the gzipped CPIO payload.
    pub fn archive(&self) -> Result<Vec<u8>> {
        self.archive_with_level(DEFAULT_GZIP_LEVEL)
    }

    pub fn archive_with_level(&self, gzip_level: u32) -> Result<Vec<u8>> {
        build_cpio_with_level(&self.entries()?, gzip_level)
    }

    fn entries(&self) -> Result<Vec<CpioEntry>> {
        let mut entries = Vec::new();

        if let Some(config) = &self.config {
            entries.push(CpioEntry::file(IGNITION_CONFIG_NAME, config.clone(), 0o644));
        }

        if !self.system_configs.is_empty() {
            let mut dir = String::new();
            for component in SYSTEM_CONFIG_DIR.split('/') {
                if !dir.is_empty() {
                    dir.push('/');
                }
                dir.push_str(component);
                entries.push(CpioEntry::directory(dir.clone(), 0o755));
            }

            for (name, content) in &self.system_configs {
                validate_system_config_name(name)?;
                entries.push(CpioEntry::file(
                    format!("{}/{}", SYSTEM_CONFIG_DIR, name),
                    content.clone(),
                    0o644,
                ));
            }
        }

        Ok(entries)
    }
}

/// System configs land in one fixed directory, so names are bare file names.
fn validate_system_config_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(IsoEditorError::InvalidInput(format!(
            "invalid system config file name {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::cpio::tests::read_archive;
    use crate::testutil::{build_iso, TestFile};
    use crate::iso::IsoImage;
    use std::io::Cursor;

    fn iso(files: &[TestFile]) -> IsoImage<Cursor<Vec<u8>>> {
        IsoImage::new(Cursor::new(build_iso(files)), "test.iso").unwrap()
    }

    #[test]
    fn test_archive_config_only() {
        let content = IgnitionContent::new(br#"{"ignition":{"version":"3.2.0"}}"#.to_vec());
        let entries = read_archive(&content.archive().unwrap());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "config.ign");
        assert_eq!(entries[0].2, 0o100_644);
    }

    #[test]
    fn test_archive_with_system_configs() {
        let content = IgnitionContent::default()
            .with_system_config("10-network.ign", b"{}".to_vec())
            .with_system_config("20-users.ign", b"{\"passwd\":{}}".to_vec());
        let entries = read_archive(&content.archive().unwrap());

        let names: Vec<_> = entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "usr",
                "usr/lib",
                "usr/lib/ignition",
                "usr/lib/ignition/base.d",
                "usr/lib/ignition/base.d/10-network.ign",
                "usr/lib/ignition/base.d/20-users.ign",
            ]
        );
        assert_eq!(entries[3].2, 0o040_755);
        assert_eq!(entries[5].1, b"{\"passwd\":{}}");
    }

    #[test]
    fn test_rejects_traversal_names() {
        for bad in ["", ".", "..", "../etc/passwd", "a/b"] {
            let content = IgnitionContent::default().with_system_config(bad, b"x".to_vec());
            let err = content.archive().unwrap_err();
            assert!(matches!(err, IsoEditorError::InvalidInput(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_legacy_target_is_whole_placeholder() {
        let mut iso = iso(&[TestFile::new("/images/ignition.img", vec![0u8; 8192])]);
        let target = find_ignition_target(&mut iso, "test.iso").unwrap();
        assert!(target.info.is_none());
        assert_eq!(target.region, target.file);
        assert_eq!(target.region.length, 8192);
        assert_eq!(target.offset_in_file(), 0);
    }

    #[test]
    fn test_target_from_igninfo() {
        let info = br#"{"file": "images/cdboot.img", "offset": 4096, "length": 2048}"#;
        let mut iso = iso(&[
            TestFile::new("/coreos/igninfo.json", info.to_vec()),
            TestFile::new("/images/cdboot.img", vec![0u8; 8192]),
        ]);

        let target = find_ignition_target(&mut iso, "test.iso").unwrap();
        assert_eq!(target.file.file_path, "/images/cdboot.img");
        assert_eq!(target.offset_in_file(), 4096);
        assert_eq!(target.region.length, 2048);
        assert_eq!(target.info.unwrap().length, Some(2048));
    }

    #[test]
    fn test_igninfo_without_length_runs_to_end() {
        let info = br#"{"file": "images/pxeboot/initrd.img", "offset": 100}"#;
        let mut iso = iso(&[
            TestFile::new("/coreos/igninfo.json", info.to_vec()),
            TestFile::new("/images/pxeboot/initrd.img", vec![0u8; 1000]),
        ]);

        let target = find_ignition_target(&mut iso, "test.iso").unwrap();
        assert_eq!(target.region.length, 900);
    }

    #[test]
    fn test_bad_igninfo_is_incompatible() {
        let mut iso = iso(&[
            TestFile::new("/coreos/igninfo.json", b"not json".to_vec()),
            TestFile::new("/images/ignition.img", vec![0u8; 2048]),
        ]);
        let err = find_ignition_target(&mut iso, "test.iso").unwrap_err();
        assert!(matches!(err, IsoEditorError::FormatIncompatible(_)));

        let info = br#"{"file": "images/ignition.img", "offset": 1024, "length": 4096}"#;
        let mut iso = iso_with(info);
        let err = find_ignition_target(&mut iso, "test.iso").unwrap_err();
        assert!(matches!(err, IsoEditorError::FormatIncompatible(_)));
    }

    fn iso_with(info: &[u8]) -> IsoImage<Cursor<Vec<u8>>> {
        iso(&[
            TestFile::new("/coreos/igninfo.json", info.to_vec()),
            TestFile::new("/images/ignition.img", vec![0u8; 2048]),
        ])
    }

    #[test]
    fn test_info_json_round_trip_keeps_fields() {
        let info = IgnitionInfo {
            file: "images/cdboot.img".to_string(),
            offset: 4096,
            length: Some(123),
        };
        let json: serde_json::Value = serde_json::from_slice(&info.to_json().unwrap()).unwrap();
        assert_eq!(json["file"], "images/cdboot.img");
        assert_eq!(json["offset"], 4096);
        assert_eq!(json["length"], 123);
    }
}
