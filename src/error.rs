use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use malformed_error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of assembly binding: name resolution, identity
/// verification, image loading, context lifecycle, and the parsing of identity strings
/// and deployment manifests. Each variant carries enough context to map the failure
/// back to a specific bind attempt.
///
/// # Error Categories
///
/// ## Bind Failures
/// - [`Error::NotFound`] - No probe tier located the requested name
/// - [`Error::IdentityMismatch`] - A located or cached identity conflicts with the request
/// - [`Error::LoadFailed`] - The image loader rejected the located binary
/// - [`Error::RecursiveBind`] - A bind re-entered itself for the same name on the same thread
/// - [`Error::ContextUnloading`] - Bind attempted on a context whose teardown has begun
///
/// ## Configuration Errors
/// - [`Error::BundleAlreadyRegistered`] - A second process-wide bundle registration
/// - [`Error::NotCollectible`] - Unload requested for a non-collectible context
///
/// ## Parsing and I/O
/// - [`Error::Malformed`] - Invalid assembly display name or manifest fragment
/// - [`Error::FileError`] - Filesystem I/O errors during probing or mapping
///
/// # Examples
///
/// ```rust
/// use dotbind::{AssemblyName, BinderBuilder, Error};
///
/// let binder = BinderBuilder::new("app").build();
/// let request = AssemblyName::parse("Missing.Lib, Version=1.0.0.0")?;
///
/// match binder.bind_by_name(&request) {
///     Ok(assembly) => println!("bound {}", assembly.identity()),
///     Err(Error::NotFound(name)) => eprintln!("no candidate for {}", name),
///     Err(e) => eprintln!("bind failed: {}", e),
/// }
/// # Ok::<(), dotbind::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// No probe tier located the requested assembly.
    ///
    /// Returned only after every stage of the resolution algorithm has been
    /// exhausted, including the parent-context fallback chain. A miss at an
    /// individual stage is expected control flow and is not an error.
    ///
    /// The associated value is the display name of the requested assembly.
    #[error("Assembly not found - {0}")]
    NotFound(String),

    /// A located or supplied identity conflicts with what the bind expects.
    ///
    /// Raised when a located image disagrees with the requested identity (or
    /// its version is rejected by the binder's policy), and when a candidate
    /// conflicts with an entry already cached under the same simple name. Two
    /// binds of one simple name within one context must resolve to the same
    /// identity; a conflict is rejected with the cache left unchanged, never
    /// silently resolved by picking one side.
    #[error("Assembly identity mismatch - requested '{requested}', found '{found}'")]
    IdentityMismatch {
        /// Display name of the identity being requested or verified
        requested: String,
        /// Display name of the conflicting identity that was found
        found: String,
    },

    /// The image loader rejected the located binary.
    ///
    /// The location probe succeeded but the external loader could not map or
    /// validate the image (corrupt file, wrong architecture, truncated bundle
    /// member, and similar).
    #[error("Failed to load image from '{location}' - {message}")]
    LoadFailed {
        /// The location that was being loaded
        location: String,
        /// Loader-provided description of the failure
        message: String,
    },

    /// A bind re-entered itself for the same name on the same thread.
    ///
    /// A user load override may legitimately trigger nested binds, but a
    /// direct cycle on one thread for one simple name can never complete,
    /// since the cache cannot hold the not-yet-finished result.
    ///
    /// The associated value is the simple name on which the cycle was detected.
    #[error("Recursive bind detected for '{0}'")]
    RecursiveBind(String),

    /// Bind attempted on a context whose teardown has begun.
    ///
    /// Once a collectible context has been reported unreachable, its cache is
    /// released and no new binds are admitted.
    ///
    /// The associated value is the name of the unloading context.
    #[error("Load context '{0}' is unloading")]
    ContextUnloading(String),

    /// Unload requested for a context that is not collectible.
    ///
    /// The default/platform context lives for the whole process and can never
    /// be torn down; only contexts created as collectible accept the
    /// collection notification.
    #[error("Load context is not collectible")]
    NotCollectible,

    /// A process-wide bundle was registered more than once.
    ///
    /// The single-file bundle is process-lifetime state set exactly once
    /// before the first bind; repeat registrations are rejected rather than
    /// silently ignored.
    #[error("A bundle is already registered for this process")]
    BundleAlreadyRegistered,

    /// An assembly display name or manifest fragment could not be parsed.
    ///
    /// Includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while probing for candidate
    /// files or memory-mapping a located image.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Catch-all for collaborator failures that don't map to the taxonomy above.
    #[error("{0}")]
    Unknown(String),
}
