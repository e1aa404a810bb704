//! Candidate location probing.
//!
//! A [`Probe`] answers one question for one storage backend: does this path
//! exist, and where exactly is its content. Probes never read file content and
//! never mutate anything, which keeps the probing tiers freely composable: the
//! binder layers the bundle virtual filesystem over ordinary file probing with
//! a [`ProbeChain`], first hit wins.
//!
//! # Key Components
//!
//! - [`Location`] - A resolved candidate: a path plus an optional byte range for bundle members
//! - [`Probe`] - The storage-backend seam
//! - [`FilesystemProbe`] - Ordinary stat-level file probing
//! - [`ProbeChain`] - Ordered first-hit-wins composition of probes
//!
//! # Example
//!
//! ```rust
//! use dotbind::probe::{FilesystemProbe, Probe, ProbeChain};
//! use std::sync::Arc;
//!
//! let mut chain = ProbeChain::new();
//! chain.push(Arc::new(FilesystemProbe));
//!
//! assert!(chain.probe("/nonexistent/lib.dll".as_ref()).is_none());
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A byte range inside a packaged bundle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleRange {
    /// Offset of the member's first byte within the bundle file.
    pub offset: u64,
    /// Size of the member in bytes.
    pub size: u64,
}

/// Where a located candidate lives: a file on disk, or a byte range inside a
/// single-file bundle.
///
/// A `Location` is evidence that a probe succeeded; it carries everything the
/// image loader needs to map the binary without re-probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Path of the backing file. For bundle members this is the bundle file
    /// itself, not the virtual path that was probed.
    pub path: PathBuf,

    /// Byte range within the backing file; `None` means the whole file.
    pub bundle_range: Option<BundleRange>,
}

impl Location {
    /// A location covering an entire ordinary file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bundle_range: None,
        }
    }

    /// A location describing a member inside a bundle file.
    #[must_use]
    pub fn bundle_member(bundle_path: impl Into<PathBuf>, offset: u64, size: u64) -> Self {
        Self {
            path: bundle_path.into(),
            bundle_range: Some(BundleRange { offset, size }),
        }
    }

    /// Whether this location points into a bundle rather than a standalone file.
    #[must_use]
    pub fn is_bundled(&self) -> bool {
        self.bundle_range.is_some()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bundle_range {
            Some(range) => write!(
                f,
                "{}@{}+{}",
                self.path.display(),
                range.offset,
                range.size
            ),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// One storage backend's existence check.
///
/// Implementations must be pure lookups: no caching of negative results, no
/// side effects, no content reads. The binder calls probes outside any lock,
/// so implementations must also be thread-safe.
pub trait Probe: Send + Sync {
    /// Check whether `path` exists in this backend and, if so, where its
    /// content actually lives.
    fn probe(&self, path: &Path) -> Option<Location>;
}

/// Ordinary filesystem probing via `stat`.
///
/// Matches regular files only; a directory at the probed path is not a
/// candidate image.
pub struct FilesystemProbe;

impl Probe for FilesystemProbe {
    fn probe(&self, path: &Path) -> Option<Location> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some(Location::file(path)),
            _ => None,
        }
    }
}

/// Ordered composition of probes; the first tier to produce a location wins.
///
/// The binder builds one chain per load context at construction time: the
/// bundle index (if one is registered) followed by [`FilesystemProbe`]. The
/// chain itself is immutable after construction and safe to share.
#[derive(Clone, Default)]
pub struct ProbeChain {
    tiers: Vec<Arc<dyn Probe>>,
}

impl ProbeChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    /// Append a probe tier; earlier tiers take precedence.
    pub fn push(&mut self, probe: Arc<dyn Probe>) {
        self.tiers.push(probe);
    }

    /// Number of tiers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Whether the chain has no tiers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Probe each tier in order, returning the first hit.
    #[must_use]
    pub fn probe(&self, path: &Path) -> Option<Location> {
        self.tiers.iter().find_map(|tier| tier.probe(path))
    }
}
