//! Document fingerprinting and the processed-file registry.
//!
//! A fingerprint is the SHA-256 digest of the first 10 KiB of a file,
//! a cheap membership check that avoids hashing multi-hundred-megabyte
//! documents in full. The registry is a `registry.json` sidecar stored
//! alongside the index, mapping each source path to its fingerprint and
//! processing record. Re-ingesting a file whose fingerprint is unchanged
//! is a no-op.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bytes hashed from the head of each file.
pub const FINGERPRINT_PREFIX_BYTES: usize = 10 * 1024;

const REGISTRY_FILE: &str = "registry.json";

/// Compute the prefix fingerprint of a file on disk.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for fingerprinting: {}", path.display()))?;
    let mut buf = Vec::with_capacity(FINGERPRINT_PREFIX_BYTES);
    file.take(FINGERPRINT_PREFIX_BYTES as u64)
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(fingerprint_bytes(&buf))
}

pub fn fingerprint_bytes(prefix: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    format!("{:x}", hasher.finalize())
}

/// Processing record for one ingested source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub fingerprint: String,
    pub last_processed: DateTime<Utc>,
    pub chunk_count: usize,
    pub extractor_used: String,
}

/// The on-disk registry of processed files.
///
/// Loaded once per pipeline run and saved back after each successful
/// ingest, so a crash mid-run loses at most the file being processed.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    /// Load the registry from `<index_dir>/registry.json`, starting empty
    /// when the sidecar does not exist yet.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(REGISTRY_FILE);
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read registry: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse registry: {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create index dir: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write registry: {}", self.path.display()))?;
        Ok(())
    }

    pub fn get(&self, source: &str) -> Option<&RegistryEntry> {
        self.entries.get(source)
    }

    /// True when `source` was already processed with this fingerprint.
    pub fn is_current(&self, source: &str, fingerprint: &str) -> bool {
        self.entries
            .get(source)
            .map(|e| e.fingerprint == fingerprint)
            .unwrap_or(false)
    }

    pub fn record(&mut self, source: &str, entry: RegistryEntry) {
        self.entries.insert(source.to_string(), entry);
    }

    pub fn remove(&mut self, source: &str) -> Option<RegistryEntry> {
        self.entries.remove(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegistryEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fingerprint: &str) -> RegistryEntry {
        RegistryEntry {
            fingerprint: fingerprint.to_string(),
            last_processed: Utc::now(),
            chunk_count: 3,
            extractor_used: "pdf".to_string(),
        }
    }

    #[test]
    fn test_fingerprint_only_covers_prefix() {
        let mut a = vec![0u8; FINGERPRINT_PREFIX_BYTES + 100];
        let mut b = a.clone();
        // Diverge past the prefix: fingerprints must match.
        b[FINGERPRINT_PREFIX_BYTES + 50] = 0xFF;
        assert_eq!(
            fingerprint_bytes(&a[..FINGERPRINT_PREFIX_BYTES]),
            fingerprint_bytes(&b[..FINGERPRINT_PREFIX_BYTES])
        );
        // Diverge inside the prefix: fingerprints must differ.
        a[10] = 0xFF;
        assert_ne!(
            fingerprint_bytes(&a[..FINGERPRINT_PREFIX_BYTES]),
            fingerprint_bytes(&b[..FINGERPRINT_PREFIX_BYTES])
        );
    }

    #[test]
    fn test_fingerprint_file_reads_at_most_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.txt");
        std::fs::write(&small, b"hello").unwrap();
        let fp = fingerprint_file(&small).unwrap();
        assert_eq!(fp, fingerprint_bytes(b"hello"));

        let large = dir.path().join("large.bin");
        let mut data = vec![7u8; FINGERPRINT_PREFIX_BYTES];
        data.extend_from_slice(b"tail that is ignored");
        std::fs::write(&large, &data).unwrap();
        assert_eq!(
            fingerprint_file(&large).unwrap(),
            fingerprint_bytes(&data[..FINGERPRINT_PREFIX_BYTES])
        );
    }

    #[test]
    fn test_registry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path()).unwrap();
        assert!(registry.is_empty());

        registry.record("docs/a.pdf", entry("abc123"));
        registry.save().unwrap();

        let reloaded = Registry::load(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.is_current("docs/a.pdf", "abc123"));
        assert!(!reloaded.is_current("docs/a.pdf", "def456"));
        assert!(!reloaded.is_current("docs/b.pdf", "abc123"));
    }

    #[test]
    fn test_registry_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path()).unwrap();
        registry.record("docs/a.pdf", entry("abc123"));
        assert!(registry.remove("docs/a.pdf").is_some());
        assert!(registry.remove("docs/a.pdf").is_none());
        assert!(registry.is_empty());
    }
}
