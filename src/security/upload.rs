//! Upload policy checks.
//!
//! Checks are pure: they look at a declared file name and size and never
//! touch the bytes, so they run before anything is buffered or stored.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::UploadConfig;

/// One reason an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UploadViolation {
    TooLarge { size: u64, max_bytes: u64 },
    DisallowedExtension { extension: Option<String> },
}

impl UploadViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadViolation::TooLarge { .. } => "too_large",
            UploadViolation::DisallowedExtension { .. } => "disallowed_extension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: BTreeSet<String>,
}

impl UploadPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Run every check and report all that fail.
    pub fn validate(&self, filename: &str, size: u64) -> Result<(), Vec<UploadViolation>> {
        let mut violations = Vec::new();
        if let Some(v) = self.check_size(size) {
            violations.push(v);
        }
        if let Some(v) = self.check_extension(filename) {
            violations.push(v);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Extension-only check, for uploads whose size is not known up front.
    pub fn validate_extension(&self, filename: &str) -> Result<(), Vec<UploadViolation>> {
        match self.check_extension(filename) {
            Some(v) => Err(vec![v]),
            None => Ok(()),
        }
    }

    fn check_size(&self, size: u64) -> Option<UploadViolation> {
        (size > self.max_bytes).then_some(UploadViolation::TooLarge {
            size,
            max_bytes: self.max_bytes,
        })
    }

    fn check_extension(&self, filename: &str) -> Option<UploadViolation> {
        let extension = extension_of(filename);
        if let Some(ext) = &extension {
            if self.allowed_extensions.contains(ext) {
                return None;
            }
        }
        Some(UploadViolation::DisallowedExtension { extension })
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// Lowercased final suffix of the last path component.
///
/// `a.tar.gz` → `gz`; `README`, `.jpg` and `photo.` have none.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
    let stem = base.trim_start_matches('.');
    let (_, ext) = stem.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
