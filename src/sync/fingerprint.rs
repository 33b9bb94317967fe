//! Content fingerprints for change detection.
//!
//! Source and replica copies of a file are compared by a BLAKE3 digest of
//! their full content, streamed in bounded chunks so arbitrarily large files
//! never have to fit in memory.

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    fs::File,
    io::{ErrorKind::Interrupted, Read, Result as IoResult},
    path::Path,
};

use {blake3::Hasher, tracing::warn};

/// Default read size used while hashing.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Fixed-size digest of a file's full byte content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileFingerprint([u8; 32]);

impl FileFingerprint {
    /// Fingerprints an in-memory buffer.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl Debug for FileFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "FileFingerprint({})", &self.to_hex()[..16])
    }
}

impl Display for FileFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Computes fingerprints on demand.
///
/// Nothing is cached: every call reads the file as it currently is on disk.
#[derive(Debug, Clone)]
pub struct ContentFingerprinter {
    /// Read size used while hashing.
    chunk_size: usize,
}

impl Default for ContentFingerprinter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ContentFingerprinter {
    /// Creates a fingerprinter with a custom chunk size.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - Bytes read per step; zero is raised to one.
    ///
    /// # Returns
    ///
    /// A new `ContentFingerprinter`.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Gets the configured chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fingerprints the file at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - File to hash.
    ///
    /// # Returns
    ///
    /// The fingerprint, or `None` when it is not computable (permission
    /// denied, file vanished mid-read, path is a directory, ...). The failure
    /// is logged, never raised.
    pub fn fingerprint<P: AsRef<Path>>(&self, path: P) -> Option<FileFingerprint> {
        let path = path.as_ref();
        match self.hash_file(path) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!("Error calculating fingerprint for {:?}: {}", path, e);
                None
            }
        }
    }

    /// Returns `true` iff both files fingerprint successfully and the digests
    /// match. A missing or unreadable side always counts as different, which
    /// biases callers toward re-copying.
    pub fn same_content<A: AsRef<Path>, B: AsRef<Path>>(&self, a: A, b: B) -> bool {
        match (self.fingerprint(a), self.fingerprint(b)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    fn hash_file(&self, path: &Path) -> IoResult<FileFingerprint> {
        let mut file = File::open(path)?;
        let mut hasher = Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(FileFingerprint(*hasher.finalize().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir, write};

    use tempfile::TempDir;

    use crate::sync::fingerprint::{ContentFingerprinter, FileFingerprint};

    #[test]
    fn test_fingerprint_matches_in_memory_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        write(&path, &content).unwrap();

        // Chunk boundaries must not affect the digest.
        for chunk_size in [1, 7, 4096, 65536] {
            let fingerprinter = ContentFingerprinter::new(chunk_size);
            assert_eq!(
                fingerprinter.fingerprint(&path),
                Some(FileFingerprint::from_bytes(&content)),
                "Failed for chunk size: {}",
                chunk_size
            );
        }
    }

    #[test]
    fn test_same_content() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        let c = temp_dir.path().join("c.txt");
        write(&a, "X").unwrap();
        write(&b, "X").unwrap();
        write(&c, "Y").unwrap();

        let fingerprinter = ContentFingerprinter::default();
        assert!(fingerprinter.same_content(&a, &b));
        assert!(!fingerprinter.same_content(&a, &c));
    }

    #[test]
    fn test_not_computable_counts_as_different() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.txt");
        let missing = temp_dir.path().join("missing.txt");
        let directory = temp_dir.path().join("dir");
        write(&present, "X").unwrap();
        create_dir(&directory).unwrap();

        let fingerprinter = ContentFingerprinter::default();
        assert_eq!(fingerprinter.fingerprint(&missing), None);
        assert_eq!(fingerprinter.fingerprint(&directory), None);
        assert!(!fingerprinter.same_content(&present, &missing));
        assert!(!fingerprinter.same_content(&missing, &missing));
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        assert_eq!(ContentFingerprinter::new(0).chunk_size(), 1);
    }

    #[test]
    fn test_fingerprint_display() {
        let fingerprint = FileFingerprint::from_bytes(b"hello");
        assert_eq!(fingerprint.to_hex().len(), 64);
        assert_eq!(fingerprint.to_string().len(), 16);
        assert!(format!("{fingerprint:?}").starts_with("FileFingerprint("));
    }
}
