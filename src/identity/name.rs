//! Assembly names and versions.
//!
//! [`AssemblyName`] is the request and cache key of the whole binding layer: a
//! caller asks a load context to resolve one, every probe tier matches against
//! one, and a successful bind caches the identity *as actually found*. The
//! display-name round trip (`parse` / `display_name`) follows the textual
//! format used by the runtime:
//!
//! ```text
//! Name[, Version=Major.Minor.Build.Revision][, Culture=culture][, PublicKeyToken=token]
//! ```

use std::{fmt, fmt::Write as _, str::FromStr};

use crate::{
    error::malformed_error,
    identity::strongname::StrongName,
    Error, Result,
};

/// Complete identity of a requested or resolved assembly.
///
/// Immutable once constructed. The [`name`](Self::name) field is kept exactly
/// as given; whether lookups treat it case-insensitively is decided by the
/// owning context (see [`crate::context::ApplicationContext`]), not baked into
/// the identity itself.
///
/// # Request Matching
///
/// Structural equality (`==`) is exact on all fields. Matching a *request*
/// against a found identity goes through [`matches_request`](Self::matches_request),
/// which relaxes exactly one rule: a culture-neutral request accepts a
/// candidate of any culture.
///
/// # Examples
///
/// ```rust
/// use dotbind::identity::{AssemblyName, AssemblyVersion};
///
/// // Simple, unsigned request
/// let plain = AssemblyName::new("MyLib", AssemblyVersion::new(1, 0, 0, 0));
///
/// // Fully qualified display name
/// let full = AssemblyName::parse(
///     "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
/// )?;
/// assert!(full.is_strong_named());
/// assert!(!plain.is_strong_named());
/// # Ok::<(), dotbind::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyName {
    /// Simple assembly name (e.g. "System.Runtime").
    pub name: String,

    /// Four-part version used by the binding policy.
    pub version: AssemblyVersion,

    /// Localization culture; `None` is culture-neutral.
    pub culture: Option<String>,

    /// Strong-name identity; `None` marks an unsigned assembly.
    pub strong_name: Option<StrongName>,
}

/// Four-part assembly version (major.minor.build.revision).
///
/// Ordering is component-wise, which is what the version policy relies on when
/// deciding whether a found version may satisfy a lower request.
///
/// ```rust
/// use dotbind::identity::AssemblyVersion;
///
/// let requested = AssemblyVersion::new(4, 0, 0, 0);
/// let found = AssemblyVersion::new(4, 5, 0, 0);
/// assert!(found > requested);
/// assert!(found.is_compatible_with(&requested));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssemblyVersion {
    /// Major version component.
    pub major: u16,
    /// Minor version component.
    pub minor: u16,
    /// Build version component.
    pub build: u16,
    /// Revision version component.
    pub revision: u16,
}

impl AssemblyName {
    /// Create an unsigned, culture-neutral assembly name.
    #[must_use]
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        Self {
            name: name.into(),
            version,
            culture: None,
            strong_name: None,
        }
    }

    /// Attach a culture to this name, `"neutral"` mapping to culture-neutral.
    #[must_use]
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        let culture = culture.into();
        self.culture = if culture == "neutral" {
            None
        } else {
            Some(culture)
        };
        self
    }

    /// Attach a strong-name identity to this name.
    #[must_use]
    pub fn with_strong_name(mut self, strong_name: StrongName) -> Self {
        self.strong_name = Some(strong_name);
        self
    }

    /// Parse an assembly display name.
    ///
    /// Accepts a bare simple name or any combination of the optional
    /// `Version=`, `Culture=` and `PublicKeyToken=` components. `Culture=neutral`
    /// maps to `None`, `PublicKeyToken=null` to an unsigned identity. Unknown
    /// components are rejected rather than skipped, since a mistyped component
    /// would otherwise silently change the requested identity.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the display name or any component cannot
    /// be parsed.
    pub fn parse(display_name: &str) -> Result<Self> {
        let parts: Vec<&str> = display_name.split(',').map(str::trim).collect();

        let name = parts[0].to_string();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut version = AssemblyVersion::UNSPECIFIED;
        let mut culture = None;
        let mut strong_name = None;

        for part in parts.iter().skip(1) {
            if let Some(value) = part.strip_prefix("Version=") {
                version = AssemblyVersion::parse(value)?;
            } else if let Some(value) = part.strip_prefix("Culture=") {
                if value != "neutral" {
                    culture = Some(value.to_string());
                }
            } else if let Some(value) = part.strip_prefix("PublicKeyToken=") {
                if value != "null" && !value.is_empty() {
                    let token_bytes = hex::decode(value).map_err(|e| {
                        malformed_error!("Invalid hex in PublicKeyToken '{}': {}", value, e)
                    })?;

                    if token_bytes.len() != 8 {
                        return Err(malformed_error!(
                            "PublicKeyToken must be exactly 8 bytes (16 hex characters), got {} bytes from '{}'",
                            token_bytes.len(),
                            value
                        ));
                    }

                    let mut token_array = [0u8; 8];
                    token_array.copy_from_slice(&token_bytes);
                    strong_name = Some(StrongName::Token(u64::from_le_bytes(token_array)));
                }
            } else if !part.is_empty() {
                return Err(malformed_error!(
                    "Unrecognized display name component '{}'",
                    part
                ));
            }
        }

        Ok(Self {
            name,
            version,
            culture,
            strong_name,
        })
    }

    /// Compose the display name for this identity.
    ///
    /// Always includes the version, culture and public-key-token components so
    /// the output is unambiguous, e.g.
    /// `MyLib, Version=1.2.3.4, Culture=neutral, PublicKeyToken=null`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);

        result.push_str(&self.name);

        let _ = write!(result, ", Version={}", self.version);

        let culture_str = self.culture.as_deref().unwrap_or("neutral");
        let _ = write!(result, ", Culture={}", culture_str);

        result.push_str(", PublicKeyToken=");
        match &self.strong_name {
            Some(strong) => result.push_str(&strong.token_hex()),
            None => result.push_str("null"),
        }

        result
    }

    /// The simple name, without version or culture qualifiers.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        &self.name
    }

    /// Whether this assembly carries a strong-name identity.
    #[must_use]
    pub fn is_strong_named(&self) -> bool {
        self.strong_name.is_some()
    }

    /// Whether this assembly is culture-neutral.
    #[must_use]
    pub fn is_culture_neutral(&self) -> bool {
        self.culture.is_none()
    }

    /// Whether a found identity can stand in for this *requested* identity,
    /// ignoring version (version acceptance is the policy's decision).
    ///
    /// Rules, in order:
    /// 1. simple names must match (case per `case_sensitive`)
    /// 2. a culture-specific request requires the exact culture; a neutral
    ///    request accepts any
    /// 3. a strong-named request requires a matching token; an unsigned
    ///    request accepts anything
    #[must_use]
    pub fn matches_request(&self, requested: &AssemblyName, case_sensitive: bool) -> bool {
        let names_match = if case_sensitive {
            self.name == requested.name
        } else {
            self.name.eq_ignore_ascii_case(&requested.name)
        };
        if !names_match {
            return false;
        }

        if !requested.is_culture_neutral() && self.culture != requested.culture {
            return false;
        }

        match (&requested.strong_name, &self.strong_name) {
            (Some(required), Some(found)) => required == found,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// The cache-key form of the simple name under the given case rule.
    #[must_use]
    pub fn normalized_name(&self, case_sensitive: bool) -> String {
        if case_sensitive {
            self.name.clone()
        } else {
            self.name.to_lowercase()
        }
    }
}

impl AssemblyVersion {
    /// Sentinel for a request that did not specify a version (0.0.0.0).
    ///
    /// A request carrying this version accepts any found version under every
    /// policy; see [`crate::binder::VersionPolicy`].
    pub const UNSPECIFIED: Self = Self {
        major: 0,
        minor: 0,
        build: 0,
        revision: 0,
    };

    /// Create a new version from its four components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Whether this version is the [`UNSPECIFIED`](Self::UNSPECIFIED) sentinel.
    #[must_use]
    pub const fn is_unspecified(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.build == 0 && self.revision == 0
    }

    /// Whether this version can satisfy a request for `required` under the
    /// runtime's unification rule: same major version and not lower.
    ///
    /// An unspecified requirement accepts any version.
    #[must_use]
    pub fn is_compatible_with(&self, required: &AssemblyVersion) -> bool {
        if required.is_unspecified() {
            return true;
        }

        self.major == required.major && *self >= *required
    }

    /// Parse a dotted version string with one to four components; omitted
    /// components default to zero.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for empty input, more than four components,
    /// or a component that is not a valid `u16`.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();

        if parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0u16; 4];

        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for AssemblyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl FromStr for AssemblyName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_new() {
        let version = AssemblyVersion::new(1, 2, 3, 4);
        assert_eq!(version.major, 1);
        assert_eq!(version.minor, 2);
        assert_eq!(version.build, 3);
        assert_eq!(version.revision, 4);
    }

    #[test]
    fn test_version_parse_partial() {
        assert_eq!(
            AssemblyVersion::parse("1.2.3").unwrap(),
            AssemblyVersion::new(1, 2, 3, 0)
        );
        assert_eq!(
            AssemblyVersion::parse("1.2").unwrap(),
            AssemblyVersion::new(1, 2, 0, 0)
        );
        assert_eq!(
            AssemblyVersion::parse("1").unwrap(),
            AssemblyVersion::new(1, 0, 0, 0)
        );
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!(AssemblyVersion::parse("").is_err());
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.2.abc.4").is_err());
        assert!(AssemblyVersion::parse("1.2.99999.4").is_err());
    }

    #[test]
    fn test_version_ordering_and_display() {
        let v1 = AssemblyVersion::new(1, 0, 0, 0);
        let v1_1 = AssemblyVersion::new(1, 1, 0, 0);
        let v2 = AssemblyVersion::new(2, 0, 0, 0);

        assert!(v1 < v1_1);
        assert!(v1_1 < v2);
        assert_eq!(v1_1.to_string(), "1.1.0.0");
    }

    #[test]
    fn test_version_compatibility() {
        let v4_0 = AssemblyVersion::new(4, 0, 0, 0);
        let v4_5 = AssemblyVersion::new(4, 5, 0, 0);
        let v5_0 = AssemblyVersion::new(5, 0, 0, 0);

        assert!(v4_5.is_compatible_with(&v4_0));
        assert!(!v4_0.is_compatible_with(&v4_5));
        assert!(!v5_0.is_compatible_with(&v4_0));
        assert!(v4_0.is_compatible_with(&AssemblyVersion::UNSPECIFIED));
    }

    #[test]
    fn test_parse_simple_name() {
        let name = AssemblyName::parse("MyLibrary").unwrap();
        assert_eq!(name.name, "MyLibrary");
        assert!(name.version.is_unspecified());
        assert!(name.is_culture_neutral());
        assert!(!name.is_strong_named());
    }

    #[test]
    fn test_parse_full_display_name() {
        let name = AssemblyName::parse(
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
        )
        .unwrap();

        assert_eq!(name.name, "mscorlib");
        assert_eq!(name.version, AssemblyVersion::new(4, 0, 0, 0));
        assert!(name.culture.is_none());

        let expected = u64::from_le_bytes([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]);
        assert_eq!(name.strong_name, Some(StrongName::Token(expected)));
    }

    #[test]
    fn test_parse_culture_and_null_token() {
        let name =
            AssemblyName::parse("Resources, Version=1.0.0.0, Culture=en-US, PublicKeyToken=null")
                .unwrap();

        assert_eq!(name.culture, Some("en-US".to_string()));
        assert!(name.strong_name.is_none());
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        assert!(AssemblyName::parse("").is_err());
        assert!(AssemblyName::parse(", Version=1.0.0.0").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_token() {
        assert!(AssemblyName::parse("Lib, PublicKeyToken=not_hex").is_err());
        assert!(AssemblyName::parse("Lib, PublicKeyToken=b77a5c56").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_component() {
        assert!(AssemblyName::parse("Lib, Flavor=Strawberry").is_err());
    }

    #[test]
    fn test_display_name_round_trip() {
        let original = AssemblyName::parse(
            "System.Core, Version=3.5.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
        )
        .unwrap();

        let reparsed = AssemblyName::parse(&original.display_name()).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_display_name_unsigned() {
        let name = AssemblyName::new("MyLib", AssemblyVersion::new(1, 2, 3, 4));
        assert_eq!(
            name.display_name(),
            "MyLib, Version=1.2.3.4, Culture=neutral, PublicKeyToken=null"
        );
    }

    #[test]
    fn test_matches_request_name_case() {
        let request = AssemblyName::new("MyLib", AssemblyVersion::UNSPECIFIED);
        let found = AssemblyName::new("mylib", AssemblyVersion::new(1, 0, 0, 0));

        assert!(found.matches_request(&request, false));
        assert!(!found.matches_request(&request, true));
    }

    #[test]
    fn test_matches_request_culture_rules() {
        let neutral_request = AssemblyName::new("Lib", AssemblyVersion::UNSPECIFIED);
        let specific_request =
            AssemblyName::new("Lib", AssemblyVersion::UNSPECIFIED).with_culture("fr-FR");

        let neutral_found = AssemblyName::new("Lib", AssemblyVersion::new(1, 0, 0, 0));
        let french_found =
            AssemblyName::new("Lib", AssemblyVersion::new(1, 0, 0, 0)).with_culture("fr-FR");

        // Neutral request accepts any culture
        assert!(neutral_found.matches_request(&neutral_request, false));
        assert!(french_found.matches_request(&neutral_request, false));

        // Specific request requires the exact culture
        assert!(french_found.matches_request(&specific_request, false));
        assert!(!neutral_found.matches_request(&specific_request, false));
    }

    #[test]
    fn test_matches_request_strong_name_rules() {
        let token = StrongName::Token(0xDEAD_BEEF_0000_0001);
        let other = StrongName::Token(0xDEAD_BEEF_0000_0002);

        let signed_request = AssemblyName::new("Lib", AssemblyVersion::UNSPECIFIED)
            .with_strong_name(token.clone());
        let unsigned_request = AssemblyName::new("Lib", AssemblyVersion::UNSPECIFIED);

        let signed_found =
            AssemblyName::new("Lib", AssemblyVersion::new(1, 0, 0, 0)).with_strong_name(token);
        let wrong_found =
            AssemblyName::new("Lib", AssemblyVersion::new(1, 0, 0, 0)).with_strong_name(other);
        let unsigned_found = AssemblyName::new("Lib", AssemblyVersion::new(1, 0, 0, 0));

        assert!(signed_found.matches_request(&signed_request, false));
        assert!(!wrong_found.matches_request(&signed_request, false));
        assert!(!unsigned_found.matches_request(&signed_request, false));

        // Unsigned request accepts signed and unsigned candidates alike
        assert!(signed_found.matches_request(&unsigned_request, false));
        assert!(unsigned_found.matches_request(&unsigned_request, false));
    }

    #[test]
    fn test_normalized_name() {
        let name = AssemblyName::new("MyLib", AssemblyVersion::UNSPECIFIED);

        assert_eq!(name.normalized_name(false), "mylib");
        assert_eq!(name.normalized_name(true), "MyLib");
    }

    #[test]
    fn test_from_str() {
        let name: AssemblyName = "MyLib, Version=2.0.0.0".parse().unwrap();
        assert_eq!(name.version, AssemblyVersion::new(2, 0, 0, 0));

        let version: AssemblyVersion = "4.0.0.0".parse().unwrap();
        assert_eq!(version, AssemblyVersion::new(4, 0, 0, 0));
    }
}
