//! Single-file bundle support.
//!
//! A published application may ship as one packaged binary with its assemblies
//! appended as byte ranges. The [`BundleIndex`] maps virtual paths under the
//! bundle's base path to `(offset, size)` ranges inside that one file, and
//! participates in probing as the first tier of the binder's [`ProbeChain`]
//! (cheap, in-memory) ahead of ordinary filesystem probing.
//!
//! The index is built once from the deployment manifest and immutable
//! thereafter, so lookups need no locking. At most one bundle exists per
//! process; [`register_bundle`] has explicit init-once semantics. Binders can
//! also be handed an index directly, which is what the tests do to stay
//! isolated from process-wide state.
//!
//! [`ProbeChain`]: crate::probe::ProbeChain
//!
//! # Example
//!
//! ```rust
//! use dotbind::bundle::BundleIndex;
//! use dotbind::probe::Probe;
//!
//! let index = BundleIndex::new("/app/host", "/app/")
//!     .with_member("lib.dll", 4096, 1024);
//!
//! let hit = index.probe("/app/lib.dll".as_ref()).unwrap();
//! assert_eq!(hit.to_string(), "/app/host@4096+1024");
//!
//! // Paths outside the base prefix are not bundle members
//! assert!(index.probe("/other/lib.dll".as_ref()).is_none());
//! ```

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use crate::{
    probe::{BundleRange, Location, Probe},
    Error, Result,
};

static PROCESS_BUNDLE: OnceLock<Arc<BundleIndex>> = OnceLock::new();

/// In-memory index of one single-file bundle.
///
/// Maps virtual member paths (relative to the bundle's base path) to byte
/// ranges inside the backing bundle file. Construction happens once at process
/// start from the deployment manifest; the index never mutates afterwards.
pub struct BundleIndex {
    /// The packaged binary all members live in.
    bundle_path: PathBuf,

    /// Base path prefix that marks a request as a potential bundle member.
    base_path: PathBuf,

    /// Member ranges keyed by bundle-relative path.
    members: HashMap<PathBuf, BundleRange>,
}

impl BundleIndex {
    /// Create an empty index for the bundle at `bundle_path`, claiming the
    /// virtual namespace under `base_path`.
    #[must_use]
    pub fn new(bundle_path: impl Into<PathBuf>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            base_path: base_path.into(),
            members: HashMap::new(),
        }
    }

    /// Add a member at `relative_path` (relative to the base path) covering
    /// `size` bytes starting at `offset` in the bundle file.
    #[must_use]
    pub fn with_member(mut self, relative_path: impl Into<PathBuf>, offset: u64, size: u64) -> Self {
        self.members
            .insert(relative_path.into(), BundleRange { offset, size });
        self
    }

    /// The packaged binary backing this index.
    #[must_use]
    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// The base path prefix under which members are probed.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of members in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the index has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Probe for BundleIndex {
    fn probe(&self, path: &Path) -> Option<Location> {
        // A path outside the base prefix is not a bundle member and must fall
        // through to the next probing tier.
        let relative = path.strip_prefix(&self.base_path).ok()?;

        self.members.get(relative).map(|range| {
            Location::bundle_member(self.bundle_path.clone(), range.offset, range.size)
        })
    }
}

/// Register the process-wide bundle.
///
/// Must be called at most once, before any bind occurs. The registered index
/// becomes the default first probing tier of every binder built afterwards.
///
/// # Errors
/// Returns [`Error::BundleAlreadyRegistered`] if a bundle has already been
/// registered for this process.
pub fn register_bundle(index: BundleIndex) -> Result<()> {
    PROCESS_BUNDLE
        .set(Arc::new(index))
        .map_err(|_| Error::BundleAlreadyRegistered)
}

/// The process-wide bundle, if one has been registered.
#[must_use]
pub fn process_bundle() -> Option<Arc<BundleIndex>> {
    PROCESS_BUNDLE.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> BundleIndex {
        BundleIndex::new("/app/host", "/app/")
            .with_member("lib.dll", 0, 512)
            .with_member("deps/util.dll", 512, 2048)
    }

    #[test]
    fn test_member_lookup() {
        let index = sample_index();

        let hit = index.probe("/app/lib.dll".as_ref()).unwrap();
        assert_eq!(hit, Location::bundle_member("/app/host", 0, 512));

        let nested = index.probe("/app/deps/util.dll".as_ref()).unwrap();
        assert_eq!(nested, Location::bundle_member("/app/host", 512, 2048));
    }

    #[test]
    fn test_path_outside_prefix_is_not_a_member() {
        let index = sample_index();

        assert!(index.probe("/other/lib.dll".as_ref()).is_none());
        assert!(index.probe("lib.dll".as_ref()).is_none());
    }

    #[test]
    fn test_unknown_member_under_prefix_misses() {
        let index = sample_index();

        assert!(index.probe("/app/unknown.dll".as_ref()).is_none());
    }

    #[test]
    fn test_len_and_empty() {
        assert!(BundleIndex::new("/app/host", "/app/").is_empty());
        assert_eq!(sample_index().len(), 2);
    }

    #[test]
    fn test_process_registration_is_init_once() {
        // First registration wins; every later attempt is rejected. This test
        // owns the process-wide slot, so no other test may rely on it being
        // empty.
        let first = register_bundle(sample_index());
        if first.is_ok() {
            assert_eq!(process_bundle().unwrap().len(), 2);
        }

        let second = register_bundle(BundleIndex::new("/elsewhere/host", "/elsewhere/"));
        assert!(matches!(second, Err(Error::BundleAlreadyRegistered)));
    }
}
