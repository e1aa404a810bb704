//! Version acceptance policy.

use crate::identity::AssemblyVersion;

/// Decides whether a found version may satisfy a request for a different one.
///
/// The policy only sees versions; name, culture and strong-name consistency
/// are checked unconditionally before it runs. A request with an
/// [unspecified](AssemblyVersion::UNSPECIFIED) version accepts any candidate
/// under every policy.
///
/// The rule is deliberately pluggable per binder rather than baked into the
/// resolution algorithm, so hosts with stricter deployment contracts can opt
/// out of unification without touching the binder.
///
/// # Example
///
/// ```rust
/// use dotbind::binder::VersionPolicy;
/// use dotbind::identity::AssemblyVersion;
///
/// let requested = AssemblyVersion::new(4, 0, 0, 0);
/// let found = AssemblyVersion::new(4, 5, 0, 0);
///
/// assert!(VersionPolicy::SameMajorMinimum.admits(&found, &requested));
/// assert!(!VersionPolicy::Exact.admits(&found, &requested));
/// assert!(VersionPolicy::AcceptAny.admits(&found, &requested));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// The found version must equal the requested version exactly.
    Exact,

    /// The found version must share the requested major version and not be
    /// lower. This mirrors the runtime's framework-unification rule and is the
    /// default.
    #[default]
    SameMajorMinimum,

    /// Any found version satisfies any request.
    AcceptAny,
}

impl VersionPolicy {
    /// Whether a candidate carrying `found` may satisfy a request for
    /// `requested`.
    #[must_use]
    pub fn admits(&self, found: &AssemblyVersion, requested: &AssemblyVersion) -> bool {
        if requested.is_unspecified() {
            return true;
        }

        match self {
            VersionPolicy::Exact => found == requested,
            VersionPolicy::SameMajorMinimum => found.is_compatible_with(requested),
            VersionPolicy::AcceptAny => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_policy() {
        let requested = AssemblyVersion::new(2, 1, 0, 0);

        assert!(VersionPolicy::Exact.admits(&AssemblyVersion::new(2, 1, 0, 0), &requested));
        assert!(!VersionPolicy::Exact.admits(&AssemblyVersion::new(2, 2, 0, 0), &requested));
        assert!(!VersionPolicy::Exact.admits(&AssemblyVersion::new(2, 0, 0, 0), &requested));
    }

    #[test]
    fn test_same_major_minimum_policy() {
        let requested = AssemblyVersion::new(4, 2, 0, 0);
        let policy = VersionPolicy::SameMajorMinimum;

        assert!(policy.admits(&AssemblyVersion::new(4, 2, 0, 0), &requested));
        assert!(policy.admits(&AssemblyVersion::new(4, 9, 1, 0), &requested));
        assert!(!policy.admits(&AssemblyVersion::new(4, 1, 0, 0), &requested));
        assert!(!policy.admits(&AssemblyVersion::new(5, 0, 0, 0), &requested));
        assert!(!policy.admits(&AssemblyVersion::new(3, 9, 0, 0), &requested));
    }

    #[test]
    fn test_unspecified_request_accepts_anything() {
        let any = AssemblyVersion::new(7, 3, 1, 9);

        for policy in [
            VersionPolicy::Exact,
            VersionPolicy::SameMajorMinimum,
            VersionPolicy::AcceptAny,
        ] {
            assert!(policy.admits(&any, &AssemblyVersion::UNSPECIFIED));
        }
    }

    #[test]
    fn test_default_is_same_major_minimum() {
        assert_eq!(VersionPolicy::default(), VersionPolicy::SameMajorMinimum);
    }
}
