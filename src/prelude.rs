//! Common imports for working with `dotbind`.
//!
//! Glob-importing the prelude brings in everything needed for the typical
//! flow: construct a binder, parse a request, bind it, and inspect the
//! resolution trace.
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! let binder = BinderBuilder::new("default").build();
//! let request = AssemblyName::parse("Missing, Version=1.0.0.0")?;
//! assert!(matches!(binder.bind_by_name(&request), Err(Error::NotFound(_))));
//! # Ok::<(), dotbind::Error>(())
//! ```

pub use crate::{
    binder::{
        BinderBuilder, BinderFlags, CollectibleLifecycle, LifecycleState, LoadContextBinder,
        ResolvedAssembly, VersionPolicy,
    },
    bundle::{process_bundle, register_bundle, BundleIndex},
    context::{ApplicationContext, InsertOutcome},
    identity::{AssemblyName, AssemblyVersion, HashAlgorithm, StrongName},
    loader::{ImageLoader, LoadedImage, MmapImageLoader, ModuleHandle},
    probe::{BundleRange, FilesystemProbe, Location, Probe, ProbeChain},
    trace::{
        BindDisposition, BindStage, InMemorySink, ResolutionEvent, ResolutionTracker, StageOutcome,
        TraceSink,
    },
    Error, Result,
};
