//! Image loading.
//!
//! Once probing has produced a [`Location`], the binder hands it to an
//! [`ImageLoader`] to map and validate the binary. Image *parsing* is a
//! collaborator concern: the loader seam only guarantees that the bytes are
//! mapped, that a bundle member's byte range is in bounds, and that the image's
//! declared identity is reported back so the binder can run its consistency
//! checks.
//!
//! # Key Components
//!
//! - [`ImageLoader`] - The loading seam consumed by every bind path
//! - [`LoadedImage`] - Mapped bytes plus the identity the image actually carries
//! - [`ModuleHandle`] - Shared read-only access to the mapped bytes
//! - [`MmapImageLoader`] - Default loader backed by memory-mapped file I/O
//!
//! # Memory Mapping
//!
//! [`MmapImageLoader`] maps the backing file once and serves bundle members as
//! bounds-checked slices of that mapping, so a thousand members of one bundle
//! never re-read the file. Identity extraction is delegated to an injected
//! reader function, which is where a real metadata parser plugs in.

use std::{fs::File, sync::Arc};

use memmap2::Mmap;

use crate::{
    identity::AssemblyName,
    probe::{BundleRange, Location},
    Result,
};

/// Read-only handle to a mapped image.
///
/// Cheap to clone; all clones share one underlying mapping. The byte range of
/// a bundle member is validated against the mapping length at load time, so
/// [`data`](Self::data) cannot go out of bounds.
#[derive(Clone)]
pub struct ModuleHandle {
    backing: Arc<Backing>,
    range: Option<BundleRange>,
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(buf) => buf,
        }
    }
}

impl ModuleHandle {
    /// Wrap an owned byte buffer, covering the whole buffer.
    ///
    /// Intended for loaders that synthesize or decompress image content rather
    /// than mapping it from disk.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            backing: Arc::new(Backing::Owned(bytes)),
            range: None,
        }
    }

    /// The image bytes this handle covers.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        let all = self.backing.bytes();
        match self.range {
            Some(range) => {
                let start = range.offset as usize;
                let end = start + range.size as usize;
                &all[start..end]
            }
            None => all,
        }
    }

    /// Length of the covered image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.range {
            Some(range) => range.size as usize,
            None => self.backing.bytes().len(),
        }
    }

    /// Whether the covered image is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A successfully mapped image together with the identity it declares.
pub struct LoadedImage {
    /// The identity of the image as actually found, which may legitimately
    /// differ from the requested identity in version.
    pub identity: AssemblyName,

    /// Shared handle to the mapped bytes.
    pub handle: ModuleHandle,
}

/// The loading seam between the binder and the image subsystem.
///
/// Called outside any binder lock; implementations may block on I/O but must
/// be thread-safe. Errors are surfaced to callers as
/// [`Error::LoadFailed`](crate::Error::LoadFailed) by the bind paths.
pub trait ImageLoader: Send + Sync {
    /// Map and validate the binary at `location`, reporting the identity the
    /// image declares.
    fn load_image(&self, location: &Location) -> Result<LoadedImage>;
}

/// Extracts an image's declared identity from its mapped bytes.
///
/// This is the seam where a metadata parser plugs in; the binder itself never
/// decodes image structure.
pub type IdentityReader = dyn Fn(&[u8], &Location) -> Result<AssemblyName> + Send + Sync;

/// Default [`ImageLoader`] backed by memory-mapped file I/O.
///
/// Maps the file named by the location and, for bundle members, restricts the
/// handle to the member's byte range after verifying it lies within the file.
pub struct MmapImageLoader {
    identity_reader: Box<IdentityReader>,
}

impl MmapImageLoader {
    /// Create a loader with the given identity reader.
    #[must_use]
    pub fn new<F>(identity_reader: F) -> Self
    where
        F: Fn(&[u8], &Location) -> Result<AssemblyName> + Send + Sync + 'static,
    {
        Self {
            identity_reader: Box::new(identity_reader),
        }
    }

    /// Create a loader that names images after the backing file's stem with an
    /// unspecified version.
    ///
    /// Suitable for hosts that bind by simple name only; a deployment that
    /// relies on version policy needs a real identity reader.
    #[must_use]
    pub fn stem_named() -> Self {
        Self::new(|_, location| {
            let stem = location
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown");
            Ok(AssemblyName::new(
                stem,
                crate::identity::AssemblyVersion::UNSPECIFIED,
            ))
        })
    }
}

impl ImageLoader for MmapImageLoader {
    fn load_image(&self, location: &Location) -> Result<LoadedImage> {
        let file = File::open(&location.path)?;

        // SAFETY: the mapping is read-only and the handle keeps the map alive
        // for as long as any caller can observe the bytes. Concurrent external
        // truncation of the backing file is undefined for any mmap consumer;
        // deployment artifacts are immutable once published.
        let map = unsafe { Mmap::map(&file)? };

        if let Some(range) = location.bundle_range {
            match range.offset.checked_add(range.size) {
                Some(end) if end <= map.len() as u64 => {}
                _ => {
                    return Err(crate::error::malformed_error!(
                        "Bundle member range {}+{} exceeds file size {}",
                        range.offset,
                        range.size,
                        map.len()
                    ));
                }
            }
        }

        let handle = ModuleHandle {
            backing: Arc::new(Backing::Mapped(map)),
            range: location.bundle_range,
        };

        let identity = (self.identity_reader)(handle.data(), location)?;

        Ok(LoadedImage { identity, handle })
    }
}
