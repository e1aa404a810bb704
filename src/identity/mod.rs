//! Assembly identity for bind requests and resolved modules.
//!
//! This module provides the canonical, comparable identity used on both sides of a
//! bind: the name a caller *requests*, and the name a located image *actually carries*.
//! Identities are immutable once constructed and safe to share across threads, which
//! lets them serve directly as cache keys in the per-context identity cache.
//!
//! # Key Components
//!
//! - [`AssemblyName`] - Complete assembly identification with name, version, culture and strong name
//! - [`AssemblyVersion`] - Four-part version numbering (major.minor.build.revision)
//! - [`StrongName`] - Public-key or token based cryptographic identity
//! - [`HashAlgorithm`] - Hash selection for public-key token derivation
//!
//! # Identity Components
//!
//! An assembly is identified by the combination of:
//! - **Simple Name**: the primary assembly name (e.g. "System.Runtime")
//! - **Version**: four-part version number used by binding policy
//! - **Culture**: localization culture, `None` for culture-neutral assemblies
//! - **Strong Name**: public-key token distinguishing strong-named from unsigned assemblies
//!
//! # Equality Semantics
//!
//! Equality is exact on every component, with one carve-out that mirrors the
//! runtime's request matching: a *culture-neutral request* matches a candidate of
//! any culture (see [`AssemblyName::matches_request`]). Structural `PartialEq`
//! stays strict; the relaxed rule only applies when a request is being compared
//! against a resolved identity.
//!
//! # Example
//!
//! ```rust
//! use dotbind::identity::AssemblyName;
//!
//! let name = AssemblyName::parse(
//!     "System.Runtime, Version=8.0.0.0, Culture=neutral, PublicKeyToken=b03f5f7f11d50a3a",
//! )?;
//! assert_eq!(name.name, "System.Runtime");
//! assert_eq!(name.version.major, 8);
//! assert!(name.is_strong_named());
//! # Ok::<(), dotbind::Error>(())
//! ```

mod name;
mod strongname;

pub use name::{AssemblyName, AssemblyVersion};
pub use strongname::{HashAlgorithm, StrongName};
