//! # Fingerprint Storage
//!
//! A fingerprint is a spectrogram snapshot filed under
//! `{label}_{sample_rate}_{block_length}_{depth}`. Only fingerprints sharing
//! the last three fields with the live configuration can be compared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::spectrogram::Spectrogram;

const FILE_EXTENSION: &str = "json";

/// The configuration a fingerprint was captured under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub sample_rate: u32,
    pub block_length: usize,
    pub depth: usize,
}

impl Geometry {
    /// The `_{rate}_{block}_{depth}` suffix shared by compatible keys.
    pub fn suffix(&self) -> String {
        format!("_{}_{}_{}", self.sample_rate, self.block_length, self.depth)
    }
}

/// Identifies one stored fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FingerprintKey {
    pub label: String,
    pub geometry: Geometry,
}

impl FingerprintKey {
    /// Builds a key after checking the label is usable as a file name.
    pub fn new(label: &str, geometry: Geometry) -> Result<Self, StoreError> {
        validate_label(label)?;
        Ok(Self {
            label: label.to_string(),
            geometry,
        })
    }

    /// Parses `{label}_{rate}_{block}_{depth}`. Labels may themselves contain `_`.
    pub fn parse(stem: &str) -> Option<Self> {
        let mut fields = stem.rsplitn(4, '_');
        let depth = fields.next()?.parse().ok()?;
        let block_length = fields.next()?.parse().ok()?;
        let sample_rate = fields.next()?.parse().ok()?;
        let label = fields.next()?;
        validate_label(label).ok()?;
        Some(Self {
            label: label.to_string(),
            geometry: Geometry {
                sample_rate,
                block_length,
                depth,
            },
        })
    }

    /// The label with any trailing `_<digits>` counter removed.
    pub fn base_label(&self) -> &str {
        split_counter(&self.label).0
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label, self.geometry.suffix())
    }
}

/// Splits `guitar_3` into (`guitar`, Some(3)); labels without a numeric
/// suffix come back whole.
pub fn split_counter(label: &str) -> (&str, Option<u32>) {
    match label.rsplit_once('_') {
        Some((base, digits))
            if !base.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            match digits.parse() {
                Ok(n) => (base, Some(n)),
                Err(_) => (label, None),
            }
        }
        _ => (label, None),
    }
}

fn validate_label(label: &str) -> Result<(), StoreError> {
    let invalid = label.is_empty()
        || label == "."
        || label == ".."
        || label.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(StoreError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

/// Storage backend for fingerprints.
pub trait FingerprintStore {
    /// Writes `spectrogram` under `key`, replacing any previous value.
    fn put(&mut self, key: &FingerprintKey, spectrogram: &Spectrogram) -> Result<(), StoreError>;

    /// Loads the fingerprint stored under `key`, or `StoreError::NotFound`.
    fn get(&self, key: &FingerprintKey) -> Result<Spectrogram, StoreError>;

    /// All keys captured under `geometry`, ordered by label.
    fn list_compatible(&self, geometry: &Geometry) -> Result<Vec<FingerprintKey>, StoreError>;
}

/// Flat directory of `{key}.json` files.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &FingerprintKey) -> PathBuf {
        self.root.join(format!("{key}.{FILE_EXTENSION}"))
    }
}

impl FingerprintStore for DirectoryStore {
    fn put(&mut self, key: &FingerprintKey, spectrogram: &Spectrogram) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let path = self.path_for(key);
        let json = serde_json::to_string(spectrogram).map_err(|source| StoreError::Format {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        log::info!("[STORE] Saved fingerprint {}", path.display());
        Ok(())
    }

    fn get(&self, key: &FingerprintKey) -> Result<Spectrogram, StoreError> {
        let path = self.path_for(key);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let spectrogram: Spectrogram =
            serde_json::from_str(&json).map_err(|source| StoreError::Format {
                path: path.clone(),
                source,
            })?;
        if !spectrogram.is_rectangular() {
            let source = <serde_json::Error as serde::de::Error>::custom("ragged spectrogram rows");
            return Err(StoreError::Format { path, source });
        }
        Ok(spectrogram)
    }

    fn list_compatible(&self, geometry: &Geometry) -> Result<Vec<FingerprintKey>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match FingerprintKey::parse(stem) {
                Some(key) if key.geometry == *geometry => keys.push(key),
                Some(_) => {}
                None => log::debug!("[STORE] Ignoring unrecognised file {}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<FingerprintKey, Spectrogram>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FingerprintKey> {
        self.entries.keys()
    }
}

impl FingerprintStore for MemoryStore {
    fn put(&mut self, key: &FingerprintKey, spectrogram: &Spectrogram) -> Result<(), StoreError> {
        self.entries.insert(key.clone(), spectrogram.clone());
        Ok(())
    }

    fn get(&self, key: &FingerprintKey) -> Result<Spectrogram, StoreError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list_compatible(&self, geometry: &Geometry) -> Result<Vec<FingerprintKey>, StoreError> {
        Ok(self
            .entries
            .keys()
            .filter(|key| key.geometry == *geometry)
            .cloned()
            .collect())
    }
}
