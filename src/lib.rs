// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'loader/mod.rs' uses mmap to map a file into memory

//! # dotbind
//!
//! [![Crates.io](https://img.shields.io/crates/v/dotbind.svg)](https://crates.io/crates/dotbind)
//! [![Documentation](https://docs.rs/dotbind/badge.svg)](https://docs.rs/dotbind)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/dotbind/blob/main/LICENSE-APACHE)
//!
//! Assembly binding and load-context resolution for .NET-style managed runtimes.
//! `dotbind` maps a requested assembly name to a previously-loaded or
//! newly-probed binary, enforces identity consistency across binds, supports
//! multiple isolated load contexts per process, and layers a single-file
//! bundle virtual filesystem beneath ordinary file probing.
//!
//! ## Features
//!
//! - **🔗 Staged resolution** - Cache, load override, platform assemblies, parent fallback
//! - **🧵 At-most-once loading** - Racing binds of one name converge on a single shared module
//! - **📦 Single-file bundles** - Virtual-filesystem probing ahead of the real filesystem
//! - **🧩 Isolated load contexts** - Independently-versioned copies of one name in one process
//! - **♻️ Collectible contexts** - Teardown tied to collection of the owning context object
//! - **🔍 Resolution tracing** - One structured event per attempt, every stage recorded
//!
//! ## Quick Start
//!
//! Add `dotbind` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! dotbind = "0.2"
//! ```
//!
//! ### Using the Prelude
//!
//! For convenient access to the most commonly used types, import the prelude:
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! let binder = BinderBuilder::new("default")
//!     .tpa_entry("System.Runtime", "/dotnet/shared/System.Runtime.dll")
//!     .build();
//!
//! let request = AssemblyName::parse("System.Text.Json, Version=8.0.0.0")?;
//! match binder.bind_by_name(&request) {
//!     Ok(assembly) => println!("bound {}", assembly.identity()),
//!     Err(Error::NotFound(name)) => println!("no candidate for {}", name),
//!     Err(e) => println!("bind failed: {}", e),
//! }
//! # Ok::<(), dotbind::Error>(())
//! ```
//!
//! ### Isolated Contexts
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! // The default context resolves platform assemblies; the plugin context
//! // satisfies its own names through a load override and falls back to the
//! // default context for everything else.
//! let platform = BinderBuilder::new("default")
//!     .tpa_entry("System.Runtime", "/dotnet/shared/System.Runtime.dll")
//!     .build();
//!
//! let plugins = BinderBuilder::new("plugins")
//!     .collectible()
//!     .parent(&platform)
//!     .load_hook(|request: &AssemblyName| {
//!         if request.name.starts_with("Plugin.") {
//!             Ok(Some(LoadedImage {
//!                 identity: request.clone(),
//!                 handle: ModuleHandle::from_bytes(vec![0x4D, 0x5A]),
//!             }))
//!         } else {
//!             Ok(None)
//!         }
//!     })
//!     .build();
//!
//! let request = AssemblyName::parse("Plugin.Core, Version=1.0.0.0")?;
//! let assembly = plugins.bind_by_name(&request)?;
//! assert_eq!(assembly.identity().name, "Plugin.Core");
//!
//! // Teardown fences any further binds in the collectible context.
//! plugins.notify_collected()?;
//! assert!(plugins.bind_by_name(&request).is_err());
//! # Ok::<(), dotbind::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `dotbind` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`binder`] - Load contexts, the resolution algorithm and lifecycle
//! - [`context`] - Per-context TPA index, probing paths and identity cache
//! - [`identity`] - Assembly names, versions and strong-name identity
//! - [`probe`] / [`bundle`] - Candidate location probing and single-file bundles
//! - [`loader`] - The image-loading seam between the binder and its host
//! - [`trace`] - Per-attempt resolution diagnostics
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! ### Resolution Model
//!
//! Each [`binder::LoadContextBinder`] owns one
//! [`context::ApplicationContext`] and resolves requests through ordered
//! stages: the identity cache, the user load override, the
//! Trusted-Platform-Assembly list (bundle tier first, filesystem second), and
//! finally delegation to an optional parent context. Every attempt is
//! recorded stage by stage and emitted as one structured
//! [`trace::ResolutionEvent`].
//!
//! The identity cache is the single serialization point: probing and image
//! loading run outside any lock, racing binds of the same name both do the
//! redundant work, and the first successful insert wins. All callers observe
//! the same shared [`binder::ResolvedAssembly`] handle.
//!
//! ## Concurrency
//!
//! Binders are called from arbitrary application threads; there is no binder
//! thread. One mutex-free cache per context means sibling contexts never
//! contend, and slow I/O in one context cannot block cache reads in another.
//! Same-thread re-entry for one name is detected and rejected rather than
//! deadlocking.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result) with comprehensive error
//! information:
//!
//! ```rust
//! use dotbind::{BinderBuilder, AssemblyName, Error};
//!
//! let binder = BinderBuilder::new("default").build();
//! let request = AssemblyName::parse("Absent.Lib, Version=1.0.0.0")?;
//!
//! match binder.bind_by_name(&request) {
//!     Ok(assembly) => println!("bound {}", assembly.identity()),
//!     Err(Error::NotFound(name)) => println!("no candidate for {}", name),
//!     Err(Error::ContextUnloading(context)) => println!("{} is unloading", context),
//!     Err(e) => println!("bind failed: {}", e),
//! }
//! # Ok::<(), dotbind::Error>(())
//! ```

pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the dotbind library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust
/// use dotbind::prelude::*;
///
/// let binder = BinderBuilder::new("default").build();
/// let request = AssemblyName::parse("System.Runtime, Version=8.0.0.0")?;
/// assert!(binder.bind_by_name(&request).is_err());
/// # Ok::<(), dotbind::Error>(())
/// ```
pub mod prelude;

/// Load contexts, the resolution algorithm and context lifecycle.
///
/// The [`binder::LoadContextBinder`] is the entry point of the crate: it
/// resolves [`identity::AssemblyName`] requests through the staged algorithm,
/// enforces identity consistency, and ties collectible contexts to their
/// owner's collection.
pub mod binder;

/// Single-file bundle index and process-wide bundle registration.
pub mod bundle;

/// Per-context binding state: TPA index, probing paths, identity cache.
pub mod context;

/// Assembly names, versions and strong-name identity.
pub mod identity;

/// The image-loading seam between the binder and its host runtime.
pub mod loader;

/// Candidate location probing over composable storage backends.
pub mod probe;

/// Per-attempt resolution diagnostics and trace sinks.
pub mod trace;

/// `dotbind` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. This is used consistently throughout the crate for all
/// fallible operations.
///
/// # Examples
///
/// ```rust
/// use dotbind::{AssemblyName, Result};
///
/// fn parse_request(display_name: &str) -> Result<AssemblyName> {
///     AssemblyName::parse(display_name)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotbind` Error type
///
/// The main error type for all operations in this crate. Covers the bind
/// taxonomy (not-found, identity mismatch, load failure, recursion, context
/// unloading) plus identity parsing and I/O failures.
pub use error::Error;

/// Entry point for building load contexts.
///
/// See [`binder::BinderBuilder`] for the full construction surface.
///
/// # Example
///
/// ```rust
/// use dotbind::BinderBuilder;
///
/// let binder = BinderBuilder::new("default").build();
/// assert_eq!(binder.name(), "default");
/// ```
pub use binder::{BinderBuilder, LoadContextBinder, ResolvedAssembly};

/// Assembly identity used for requests, cache keys and mismatch detection.
pub use identity::{AssemblyName, AssemblyVersion};
