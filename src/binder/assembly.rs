//! Resolved assembly handles.

use std::sync::{Arc, Weak};

use crate::{
    identity::AssemblyName,
    loader::ModuleHandle,
    probe::Location,
};

use super::LoadContextBinder;

/// A successfully bound assembly.
///
/// Created exactly once per successful bind and shared read-only behind an
/// [`Arc`]: the owning context's cache holds one reference, every caller holds
/// another, and the backing image is released when the last reference drops.
/// There is no manual reference management anywhere in the binding layer.
///
/// The identity is the one the image *actually carries*, which may
/// legitimately differ from the requested identity in version under the
/// binder's [`VersionPolicy`](crate::binder::VersionPolicy).
///
/// The back-reference to the binder that bound the assembly is weak, so a
/// collectible context is never kept alive by its own modules.
pub struct ResolvedAssembly {
    /// Identity as actually found in the image.
    identity: AssemblyName,

    /// Where the image came from; `None` for modules produced directly by a
    /// load override.
    source: Option<Location>,

    /// Shared handle to the mapped image bytes.
    handle: ModuleHandle,

    /// The binder that bound this assembly.
    binder: Weak<LoadContextBinder>,
}

impl ResolvedAssembly {
    pub(crate) fn new(
        identity: AssemblyName,
        source: Option<Location>,
        handle: ModuleHandle,
        binder: Weak<LoadContextBinder>,
    ) -> Self {
        Self {
            identity,
            source,
            handle,
            binder,
        }
    }

    /// The identity this assembly actually carries.
    #[must_use]
    pub fn identity(&self) -> &AssemblyName {
        &self.identity
    }

    /// Where the image was located, if it was probed rather than produced by a
    /// load override.
    #[must_use]
    pub fn source(&self) -> Option<&Location> {
        self.source.as_ref()
    }

    /// Shared handle to the mapped image bytes.
    #[must_use]
    pub fn image(&self) -> &ModuleHandle {
        &self.handle
    }

    /// The load context this assembly was bound in, if it is still alive.
    #[must_use]
    pub fn binder(&self) -> Option<Arc<LoadContextBinder>> {
        self.binder.upgrade()
    }
}

impl std::fmt::Debug for ResolvedAssembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAssembly")
            .field("identity", &self.identity.display_name())
            .field("source", &self.source)
            .field("image_len", &self.handle.len())
            .finish()
    }
}
