//! Load contexts and the resolution algorithm.
//!
//! A [`LoadContextBinder`] is one isolated resolution scope: the default
//! (platform) context that carries the TPA list, or a user-created context
//! that resolves through its own load override and falls back to a parent.
//! Binders form a tree through weak parent references; a parent never knows
//! its children, so contexts can be collected independently.
//!
//! # Resolution Algorithm
//!
//! [`bind_by_name`](LoadContextBinder::bind_by_name) runs these stages in
//! order, recording each in a per-attempt [`ResolutionTracker`]:
//!
//! 1. **FindInContext** - the identity cache; a hit returns immediately
//! 2. **ContextLoad** - the user load override, if one is configured
//! 3. **PlatformAssemblies** - TPA and probing-path lookup, bundle tier first
//! 4. **DefaultContextFallback** - delegate the whole bind to the parent
//!
//! A module resolved by stages 2 or 3 is cached under its *resolved* identity
//! in this binder's own context. A module resolved through the parent is
//! cached only by the context that actually loaded it, so one image never has
//! two owners in the tree.
//!
//! # Key Components
//!
//! - [`LoadContextBinder`] - One load context and its bind operations
//! - [`BinderBuilder`] - Construction of platform and isolated contexts
//! - [`ResolvedAssembly`] - The shared handle a successful bind returns
//! - [`VersionPolicy`] - Pluggable version acceptance rule
//! - [`CollectibleLifecycle`] - Teardown fencing for collectible contexts
//!
//! # Example
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! // An isolated context that satisfies binds from its own load override.
//! let binder = BinderBuilder::new("plugin-context")
//!     .load_hook(|request: &AssemblyName| {
//!         Ok(Some(LoadedImage {
//!             identity: request.clone(),
//!             handle: ModuleHandle::from_bytes(vec![0x4D, 0x5A]),
//!         }))
//!     })
//!     .build();
//!
//! let request = AssemblyName::parse("Plugin.Core, Version=1.0.0.0")?;
//! let assembly = binder.bind_by_name(&request)?;
//!
//! assert_eq!(assembly.identity().name, "Plugin.Core");
//! // The second bind is served from the cache, as the same shared handle.
//! let again = binder.bind_by_name(&request)?;
//! assert!(std::sync::Arc::ptr_eq(&assembly, &again));
//! # Ok::<(), dotbind::Error>(())
//! ```

mod assembly;
mod lifecycle;
mod policy;

pub use assembly::ResolvedAssembly;
pub use lifecycle::{CollectibleLifecycle, LifecycleState, TeardownCallback};
pub use policy::VersionPolicy;

use std::{
    cell::RefCell,
    path::PathBuf,
    sync::{Arc, Weak},
};

use bitflags::bitflags;

use crate::{
    bundle::BundleIndex,
    context::{ApplicationContext, InsertOutcome},
    identity::AssemblyName,
    loader::{ImageLoader, LoadedImage, MmapImageLoader},
    probe::{FilesystemProbe, Location, Probe, ProbeChain},
    trace::{BindDisposition, BindStage, ResolutionTracker, StageOutcome, TraceSink},
    Error, Result,
};

bitflags! {
    /// Properties fixed at binder construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BinderFlags: u8 {
        /// The context may be torn down once its owner is collected.
        const COLLECTIBLE = 1 << 0;
        /// The context carries platform assemblies (a TPA list or probing
        /// paths) and runs the platform resolution stage.
        const PLATFORM = 1 << 1;
    }
}

/// User-supplied resolution callback of an isolated context.
///
/// Invoked after the cache misses and before platform probing. Returning
/// `Ok(None)` advances resolution to the next stage; returning an image ends
/// the attempt with that module (subject to identity and version checks). The
/// callback may run arbitrary code, including nested binds, but a direct
/// re-entry for the same name on the same thread is rejected as
/// [`Error::RecursiveBind`].
pub type LoadHook = dyn Fn(&AssemblyName) -> Result<Option<LoadedImage>> + Send + Sync;

thread_local! {
    /// Binds in flight on this thread, keyed by (context, normalized name).
    static IN_FLIGHT: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Scope marker for one in-flight bind; popped on drop so early returns and
/// nested hook panics cannot leak an entry.
struct BindGuard {
    key: (usize, String),
}

impl BindGuard {
    fn enter(context: usize, name: String) -> Option<Self> {
        let key = (context, name);
        IN_FLIGHT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&key) {
                None
            } else {
                stack.push(key.clone());
                Some(Self { key })
            }
        })
    }
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        IN_FLIGHT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|entry| *entry == self.key) {
                stack.remove(position);
            }
        });
    }
}

/// One isolated load context.
///
/// Owns its [`ApplicationContext`] (1:1, created at construction) and holds a
/// weak reference to an optional parent binder for fallback. All bind
/// operations are callable from arbitrary threads; the identity cache is the
/// only serialization point, and probing and loading always run outside it.
///
/// Constructed through [`BinderBuilder`]; see the [module docs](self) for the
/// resolution algorithm.
pub struct LoadContextBinder {
    /// Human-readable context name, used in errors and trace events.
    name: String,

    flags: BinderFlags,

    /// Per-context state: TPA index, probing paths, identity cache.
    context: ApplicationContext,

    /// Parent context for fallback. Weak: parents never own children and the
    /// default context outlives every collectible child.
    parent: Option<Weak<LoadContextBinder>>,

    loader: Arc<dyn ImageLoader>,

    /// Probing tiers: bundle first (if registered), then custom tiers, then
    /// the filesystem.
    probes: ProbeChain,

    policy: VersionPolicy,

    load_hook: Option<Box<LoadHook>>,

    lifecycle: CollectibleLifecycle,

    sink: Option<Arc<dyn TraceSink>>,

    /// Weak self-reference handed to resolved modules as their back-pointer.
    self_ref: Weak<LoadContextBinder>,
}

impl LoadContextBinder {
    /// The context's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flags fixed at construction.
    #[must_use]
    pub fn flags(&self) -> BinderFlags {
        self.flags
    }

    /// Whether this context may be torn down after collection.
    #[must_use]
    pub fn is_collectible(&self) -> bool {
        self.flags.contains(BinderFlags::COLLECTIBLE)
    }

    /// The per-context binding state.
    #[must_use]
    pub fn context(&self) -> &ApplicationContext {
        &self.context
    }

    /// The version acceptance rule this binder applies.
    #[must_use]
    pub fn version_policy(&self) -> VersionPolicy {
        self.policy
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Resolve a requested identity to a loaded assembly.
    ///
    /// Runs the staged resolution algorithm described in the [module
    /// docs](self). Successful results are cached in this context (unless the
    /// parent resolved them), and every attempt emits one trace event.
    ///
    /// # Errors
    /// - [`Error::NotFound`] after every stage and the parent chain miss
    /// - [`Error::IdentityMismatch`] if a located candidate disagrees with the
    ///   request or the version policy rejects it
    /// - [`Error::LoadFailed`] if a located image cannot be mapped
    /// - [`Error::RecursiveBind`] on same-thread re-entry for the same name
    /// - [`Error::ContextUnloading`] once teardown has begun
    pub fn bind_by_name(&self, request: &AssemblyName) -> Result<Arc<ResolvedAssembly>> {
        self.bind_internal(request, None)
    }

    fn bind_internal(
        &self,
        request: &AssemblyName,
        parent_attempt: Option<u64>,
    ) -> Result<Arc<ResolvedAssembly>> {
        if !self.lifecycle.is_alive() {
            return Err(Error::ContextUnloading(self.name.clone()));
        }

        let mut tracker =
            ResolutionTracker::new(request, &self.name, parent_attempt, self.sink.clone());

        // Stage 1: the identity cache. A hit ends the attempt with no
        // re-verification; the entry was checked when it was inserted.
        if let Some(existing) = self.context.find_cached(request) {
            tracker.stage(BindStage::FindInContext, StageOutcome::Resolved);
            tracker.complete_success(existing.identity(), true);
            return Ok(existing);
        }
        tracker.stage(BindStage::FindInContext, StageOutcome::Miss);

        // The cache cannot hold a bind that has not finished, so a same-thread
        // cycle for the same name can never complete.
        let context_id = std::ptr::from_ref(&self.context) as usize;
        let Some(_guard) = BindGuard::enter(context_id, self.context.normalize(&request.name))
        else {
            tracker.complete_failure(BindDisposition::Unknown);
            return Err(Error::RecursiveBind(request.name.clone()));
        };

        // Stage 2: the user load override.
        if let Some(hook) = &self.load_hook {
            match hook(request) {
                Ok(Some(image)) => {
                    return self.accept_candidate(
                        request,
                        image,
                        None,
                        BindStage::ContextLoad,
                        tracker,
                    );
                }
                Ok(None) => tracker.stage(BindStage::ContextLoad, StageOutcome::Miss),
                Err(error) => {
                    tracker.stage(BindStage::ContextLoad, StageOutcome::Failed);
                    tracker.complete_failure(BindDisposition::Unknown);
                    return Err(error);
                }
            }
        }

        // Stage 3: platform assemblies, for contexts that carry them.
        if self.flags.contains(BinderFlags::PLATFORM) {
            match self.probe_platform(request) {
                Some(location) => match self.loader.load_image(&location) {
                    Ok(image) => {
                        return self.accept_candidate(
                            request,
                            image,
                            Some(location),
                            BindStage::PlatformAssemblies,
                            tracker,
                        );
                    }
                    Err(error) => {
                        tracker.stage(BindStage::PlatformAssemblies, StageOutcome::Failed);
                        tracker.complete_failure(BindDisposition::Unknown);
                        return Err(Error::LoadFailed {
                            location: location.to_string(),
                            message: error.to_string(),
                        });
                    }
                },
                None => tracker.stage(BindStage::PlatformAssemblies, StageOutcome::Miss),
            }
        }

        // Stage 4: delegate the whole bind to the parent. The result is cached
        // only by the context that loaded it, never re-inserted here.
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            match parent.bind_internal(request, Some(tracker.attempt_id())) {
                Ok(module) => {
                    tracker.stage(BindStage::DefaultContextFallback, StageOutcome::Resolved);
                    tracker.complete_success(module.identity(), false);
                    return Ok(module);
                }
                Err(Error::NotFound(_)) => {
                    tracker.stage(BindStage::DefaultContextFallback, StageOutcome::Miss);
                }
                Err(error) => {
                    tracker.stage(BindStage::DefaultContextFallback, StageOutcome::Failed);
                    tracker.complete_failure(BindDisposition::Unknown);
                    return Err(error);
                }
            }
        }

        tracker.complete_failure(BindDisposition::AssemblyNotFound);
        Err(Error::NotFound(request.display_name()))
    }

    /// Identity-check a located candidate, cache it and end the attempt.
    fn accept_candidate(
        &self,
        request: &AssemblyName,
        image: LoadedImage,
        source: Option<Location>,
        stage: BindStage,
        mut tracker: ResolutionTracker,
    ) -> Result<Arc<ResolvedAssembly>> {
        if !image
            .identity
            .matches_request(request, self.context.case_sensitive())
        {
            tracker.stage(stage, StageOutcome::Failed);
            tracker.complete_failure(BindDisposition::MismatchedAssemblyName);
            return Err(Error::IdentityMismatch {
                requested: request.display_name(),
                found: image.identity.display_name(),
            });
        }

        if !self.policy.admits(&image.identity.version, &request.version) {
            tracker.stage(stage, StageOutcome::Failed);
            tracker.complete_failure(BindDisposition::IncompatibleVersion);
            return Err(Error::IdentityMismatch {
                requested: request.display_name(),
                found: image.identity.display_name(),
            });
        }

        tracker.stage(stage, StageOutcome::Resolved);

        let module = Arc::new(ResolvedAssembly::new(
            image.identity,
            source,
            image.handle,
            self.self_ref.clone(),
        ));

        // First successful insert wins; a racing thread's module is discarded
        // here and the cache winner returned in its place.
        let module = self
            .context
            .insert_if_absent(module.identity(), module.clone())
            .winner();

        tracker.complete_success(module.identity(), false);
        Ok(module)
    }

    /// TPA lookup first, then the probing paths, every candidate path running
    /// through the probe chain (bundle tier ahead of the filesystem).
    fn probe_platform(&self, request: &AssemblyName) -> Option<Location> {
        if let Some(tpa) = self.context.probe_tpa(&request.name) {
            if let Some(location) = self.probes.probe(&tpa.path) {
                return Some(location);
            }
        }

        for dir in self.context.probing_paths() {
            for extension in ["dll", "exe"] {
                let file_name = format!("{}.{extension}", request.name);
                if let Some(location) = self.probes.probe(&dir.join(&file_name)) {
                    return Some(location);
                }

                // Satellite layout: <probing path>/<culture>/<name>.<ext>
                if let Some(culture) = request.culture.as_deref() {
                    if let Some(location) = self.probes.probe(&dir.join(culture).join(&file_name)) {
                        return Some(location);
                    }
                }
            }
        }

        None
    }

    /// Confirm an externally-supplied candidate is consistent with this
    /// context.
    ///
    /// The candidate must be able to stand in for `requested`, and its
    /// identity must agree exactly with any entry already cached under the
    /// same simple name. A conflict is a hard error and never overwrites the
    /// cache.
    ///
    /// # Errors
    /// Returns [`Error::IdentityMismatch`] on either disagreement.
    pub fn verify_bind(
        &self,
        requested: &AssemblyName,
        candidate: &ResolvedAssembly,
    ) -> Result<()> {
        if !candidate
            .identity()
            .matches_request(requested, self.context.case_sensitive())
        {
            return Err(Error::IdentityMismatch {
                requested: requested.display_name(),
                found: candidate.identity().display_name(),
            });
        }

        if let Some(existing) = self.context.find_cached(candidate.identity()) {
            if existing.identity() != candidate.identity() {
                return Err(Error::IdentityMismatch {
                    requested: candidate.identity().display_name(),
                    found: existing.identity().display_name(),
                });
            }
        }

        Ok(())
    }

    /// Bind a specific location directly, bypassing by-name resolution.
    ///
    /// The image is loaded, verified against the identity cache via
    /// [`verify_bind`](Self::verify_bind), and cached like any other
    /// successful bind. Direct binds do not run the staged algorithm and emit
    /// a single structured trace event instead of a staged resolution event.
    ///
    /// # Errors
    /// - [`Error::LoadFailed`] if the image cannot be mapped
    /// - [`Error::IdentityMismatch`] if the image conflicts with a cached entry
    /// - [`Error::ContextUnloading`] once teardown has begun
    pub fn bind_using_location(&self, location: &Location) -> Result<Arc<ResolvedAssembly>> {
        if !self.lifecycle.is_alive() {
            return Err(Error::ContextUnloading(self.name.clone()));
        }

        let image = self
            .loader
            .load_image(location)
            .map_err(|error| Error::LoadFailed {
                location: location.to_string(),
                message: error.to_string(),
            })?;

        let module = Arc::new(ResolvedAssembly::new(
            image.identity,
            Some(location.clone()),
            image.handle,
            self.self_ref.clone(),
        ));

        self.verify_bind(module.identity(), &module)?;

        let module = match self.context.insert_if_absent(module.identity(), module.clone()) {
            InsertOutcome::Inserted(module) => module,
            InsertOutcome::AlreadyPresent(existing) => {
                // Lost an insert race after the verify; the winner must agree.
                if existing.identity() != module.identity() {
                    return Err(Error::IdentityMismatch {
                        requested: module.identity().display_name(),
                        found: existing.identity().display_name(),
                    });
                }
                existing
            }
        };

        tracing::debug!(
            target: "dotbind::resolution",
            context = %self.name,
            location = %location,
            identity = %module.identity(),
            "assembly bound by location"
        );

        Ok(module)
    }

    /// Consume the GC collaborator's "context unreachable" notification.
    ///
    /// The first call begins teardown: new binds are fenced off with
    /// [`Error::ContextUnloading`], the identity cache is released (dropping
    /// the context's references to every resolved module), and the registered
    /// teardown callback runs exactly once. Later calls are no-ops.
    ///
    /// # Errors
    /// Returns [`Error::NotCollectible`] for contexts not created as
    /// collectible; the default context lives for the whole process.
    pub fn notify_collected(&self) -> Result<()> {
        if !self.is_collectible() {
            return Err(Error::NotCollectible);
        }

        if !self.lifecycle.begin_unload() {
            return Ok(());
        }

        tracing::debug!(
            target: "dotbind::lifecycle",
            context = %self.name,
            "load context teardown started"
        );

        self.context.clear_cache();
        if let Some(callback) = self.lifecycle.take_teardown() {
            callback();
        }
        self.lifecycle.finish_unload();

        Ok(())
    }
}

impl std::fmt::Debug for LoadContextBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContextBinder")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("context", &self.context)
            .field("lifecycle", &self.lifecycle.state())
            .finish()
    }
}

/// Builder for [`LoadContextBinder`] instances.
///
/// The default/platform context is typically built with a TPA list and no
/// parent; isolated contexts get a load hook and a parent for fallback:
///
/// ```rust
/// use dotbind::prelude::*;
///
/// let platform = BinderBuilder::new("default")
///     .tpa_entry("System.Runtime", "/dotnet/shared/System.Runtime.dll")
///     .build();
///
/// let isolated = BinderBuilder::new("plugins")
///     .collectible()
///     .parent(&platform)
///     .build();
///
/// assert!(isolated.is_collectible());
/// assert!(!platform.is_collectible());
/// ```
pub struct BinderBuilder {
    name: String,
    case_sensitive: bool,
    collectible: bool,
    parent: Option<Weak<LoadContextBinder>>,
    tpa_list: Option<String>,
    tpa_entries: Vec<(String, PathBuf)>,
    probing_paths: Vec<PathBuf>,
    loader: Option<Arc<dyn ImageLoader>>,
    bundle: Option<Arc<BundleIndex>>,
    extra_probes: Vec<Arc<dyn Probe>>,
    policy: VersionPolicy,
    load_hook: Option<Box<LoadHook>>,
    sink: Option<Arc<dyn TraceSink>>,
    teardown: Option<TeardownCallback>,
}

impl BinderBuilder {
    /// Start building a context with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            case_sensitive: false,
            collectible: false,
            parent: None,
            tpa_list: None,
            tpa_entries: Vec::new(),
            probing_paths: Vec::new(),
            loader: None,
            bundle: None,
            extra_probes: Vec::new(),
            policy: VersionPolicy::default(),
            load_hook: None,
            sink: None,
            teardown: None,
        }
    }

    /// Use case-sensitive simple-name matching. The default is
    /// case-insensitive, matching the source runtime.
    #[must_use]
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Mark the context collectible, making it eligible for teardown once its
    /// owner is collected.
    #[must_use]
    pub fn collectible(mut self) -> Self {
        self.collectible = true;
        self
    }

    /// Set the parent context for fallback. The binder holds only a weak
    /// reference; the parent never learns about the child.
    #[must_use]
    pub fn parent(mut self, parent: &Arc<LoadContextBinder>) -> Self {
        self.parent = Some(Arc::downgrade(parent));
        self
    }

    /// Provide the platform-delimited TPA manifest for this context.
    #[must_use]
    pub fn tpa_list(mut self, list: impl Into<String>) -> Self {
        self.tpa_list = Some(list.into());
        self
    }

    /// Register a single TPA entry.
    #[must_use]
    pub fn tpa_entry(mut self, simple_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.tpa_entries.push((simple_name.into(), path.into()));
        self
    }

    /// Add a directory to probe for assemblies not on the TPA list.
    #[must_use]
    pub fn probing_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.probing_paths.push(path.into());
        self
    }

    /// Replace the image loader. The default maps files with
    /// [`MmapImageLoader::stem_named`].
    #[must_use]
    pub fn image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Give this binder a specific bundle index as its first probing tier,
    /// instead of the process-wide registration.
    #[must_use]
    pub fn bundle(mut self, bundle: Arc<BundleIndex>) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Insert a custom probing tier between the bundle and the filesystem.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.extra_probes.push(probe);
        self
    }

    /// Set the version acceptance rule.
    #[must_use]
    pub fn version_policy(mut self, policy: VersionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Install the user load override, run after the cache misses and before
    /// platform probing.
    #[must_use]
    pub fn load_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AssemblyName) -> Result<Option<LoadedImage>> + Send + Sync + 'static,
    {
        self.load_hook = Some(Box::new(hook));
        self
    }

    /// Receive one event per completed resolution attempt.
    #[must_use]
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run a callback once during teardown, after the cache is released.
    #[must_use]
    pub fn on_teardown<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.teardown = Some(Box::new(callback));
        self
    }

    /// Build the binder.
    ///
    /// Contexts given a TPA list, TPA entries or probing paths run the
    /// platform resolution stage; all others skip it. If a process-wide
    /// bundle is registered and no explicit bundle was set, the registered
    /// one becomes the first probing tier.
    #[must_use]
    pub fn build(self) -> Arc<LoadContextBinder> {
        let mut flags = BinderFlags::empty();
        if self.collectible {
            flags |= BinderFlags::COLLECTIBLE;
        }
        if self.tpa_list.is_some() || !self.tpa_entries.is_empty() || !self.probing_paths.is_empty()
        {
            flags |= BinderFlags::PLATFORM;
        }

        let context =
            ApplicationContext::new(self.case_sensitive).with_probing_paths(self.probing_paths);
        if let Some(list) = &self.tpa_list {
            context.parse_tpa_list(list);
        }
        for (simple_name, path) in self.tpa_entries {
            context.add_tpa_entry(&simple_name, path);
        }

        let mut probes = ProbeChain::new();
        if let Some(bundle) = self.bundle.or_else(crate::bundle::process_bundle) {
            probes.push(bundle);
        }
        for probe in self.extra_probes {
            probes.push(probe);
        }
        probes.push(Arc::new(FilesystemProbe));

        let lifecycle = CollectibleLifecycle::new();
        if let Some(teardown) = self.teardown {
            lifecycle.set_teardown(teardown);
        }

        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(MmapImageLoader::stem_named()));

        Arc::new_cyclic(|self_ref| LoadContextBinder {
            name: self.name,
            flags,
            context,
            parent: self.parent,
            loader,
            probes,
            policy: self.policy,
            load_hook: self.load_hook,
            lifecycle,
            sink: self.sink,
            self_ref: self_ref.clone(),
        })
    }
}
