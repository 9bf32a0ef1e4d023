//! Writes into the content-addressed repository on disk (§6.3). All writes
//! are atomic: data lands in a sibling temp file first, then is renamed into
//! place, so a crash mid-write never leaves a truncated file at the final
//! path.

use std::path::{Path, PathBuf};

use crate::error::RepositoryError;

#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn swarm_bzzr1_path(&self, hash: &str) -> PathBuf {
        self.root.join("swarm").join("bzzr1").join(hash)
    }

    pub fn ipfs_path(&self, cid: &str) -> PathBuf {
        self.root.join("ipfs").join(cid)
    }

    pub fn metadata_path(&self, chain: &str, address: &str) -> PathBuf {
        self.root
            .join("contract")
            .join(chain)
            .join(address)
            .join("metadata.json")
    }

    pub fn source_path(&self, chain: &str, address: &str, sanitized_key: &str) -> PathBuf {
        self.root
            .join("contract")
            .join(chain)
            .join(address)
            .join("sources")
            .join(sanitized_key)
    }

    pub fn keccak_path(&self, digest_hex: &str) -> PathBuf {
        self.root.join("keccak256").join(digest_hex)
    }

    /// Reads the content-addressed source cache, if `digest_hex` is present.
    /// This directory is a read-only side input populated out of band.
    pub async fn read_keccak_cache(&self, digest_hex: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.keccak_path(digest_hex)).await.ok()
    }

    pub async fn write(&self, path: PathBuf, data: Vec<u8>) -> Result<(), RepositoryError> {
        tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .expect("write_atomic task panicked")
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RepositoryError> {
    let parent = path.parent().expect("repository paths always have a parent");
    std::fs::create_dir_all(parent).map_err(|source| RepositoryError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let tmp = tempfile::NamedTempFile::new_in(parent).map_err(|source| RepositoryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(tmp.path(), data).map_err(|source| RepositoryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    tmp.persist(path).map_err(|e| RepositoryError::Io {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

/// Replaces every character outside `[A-Za-z0-9_./-]` with `_`, then, within
/// each `/`-delimited segment, replaces every character of a segment that is
/// composed solely of dots with `_` (so `..` becomes `__`, never collapsing
/// to a single separator-defeating component). Leading and trailing empty
/// segments (from a leading or trailing `/`) are left untouched.
pub fn sanitize_source_key(key: &str) -> String {
    let replaced: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    replaced
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c == '.') {
                "_".repeat(segment.len())
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_traversal() {
        assert_eq!(sanitize_source_key("../../etc/passwd"), "__/__/etc/passwd");
    }

    #[test]
    fn sanitizes_disallowed_characters() {
        assert_eq!(sanitize_source_key("a b@c.sol"), "a_b_c.sol");
    }

    #[test]
    fn preserves_ordinary_paths() {
        assert_eq!(sanitize_source_key("contracts/A.sol"), "contracts/A.sol");
    }

    #[test]
    fn preserves_structural_slashes() {
        assert_eq!(sanitize_source_key("/a/./b/"), "/a/_/b/");
    }

    #[test]
    fn sanitized_output_never_contains_a_pure_dot_segment() {
        for input in ["...", "a/.../b", "....sol", "./a"] {
            let sanitized = sanitize_source_key(input);
            for segment in sanitized.split('/') {
                assert!(
                    segment.is_empty() || !segment.chars().all(|c| c == '.'),
                    "segment {segment:?} from input {input:?} was not sanitized"
                );
            }
        }
    }

    #[tokio::test]
    async fn write_is_atomic_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path());
        let path = repo.metadata_path("mainnet", "0xabc");
        repo.write(path.clone(), b"hello".to_vec()).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");

        // Overwrite succeeds.
        repo.write(path.clone(), b"goodbye".to_vec()).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"goodbye");
    }

    #[tokio::test]
    async fn keccak_cache_is_read_only_side_input() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path());
        assert!(repo.read_keccak_cache("deadbeef").await.is_none());

        let path = repo.keccak_path("deadbeef");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"source text").await.unwrap();
        assert_eq!(
            repo.read_keccak_cache("deadbeef").await.unwrap(),
            b"source text"
        );
    }
}
