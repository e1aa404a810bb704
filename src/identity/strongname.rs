//! Strong-name identity for assemblies.
//!
//! A strong-named assembly carries either its full RSA public key or the 8-byte
//! token derived from it. The token is the trailing 8 bytes of a hash of the
//! public key, stored little-endian, and is what appears in display names as
//! `PublicKeyToken=...`.

use md5::{Digest, Md5};
use sha1::Sha1;

/// Hash algorithm used when deriving a public-key token.
///
/// Mirrors the assembly hash algorithm identifiers found in assembly metadata.
/// [`HashAlgorithm::None`] is treated as SHA-1, which is what the runtime
/// falls back to when no algorithm is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// No algorithm recorded; token derivation uses SHA-1.
    #[default]
    None,
    /// MD5 digest of the public key.
    Md5,
    /// SHA-1 digest of the public key (the standard choice).
    Sha1,
}

/// Cryptographic identity of a strong-named assembly.
///
/// Either the full public key as stored in the assembly manifest, or the
/// 8-byte token that stands in for it everywhere else. Two strong names are
/// considered equal when their SHA-1 tokens agree, so a `PubKey` and the
/// `Token` derived from it compare equal.
///
/// # Example
///
/// ```rust
/// use dotbind::identity::StrongName;
///
/// let key = StrongName::PubKey(vec![1, 2, 3, 4, 5, 6, 7, 8]);
/// let token = StrongName::Token(key.sha1_token());
/// assert_eq!(key, token);
/// ```
#[derive(Debug, Clone)]
pub enum StrongName {
    /// The full RSA public key from the assembly manifest.
    PubKey(Vec<u8>),
    /// The trailing 8 bytes of the hash of the public key, little-endian.
    Token(u64),
}

impl StrongName {
    /// Derive the token for this identity using the given hash algorithm.
    ///
    /// For a [`StrongName::Token`] the stored value is returned unchanged
    /// regardless of the algorithm; for a [`StrongName::PubKey`] the key is
    /// hashed and the trailing 8 bytes are read little-endian.
    #[must_use]
    pub fn token(&self, algo: HashAlgorithm) -> u64 {
        match self {
            StrongName::PubKey(data) => match algo {
                HashAlgorithm::Md5 => {
                    let mut hasher = Md5::new();
                    hasher.update(data);

                    let result = hasher.finalize();
                    trailing_u64(&result)
                }
                HashAlgorithm::Sha1 | HashAlgorithm::None => {
                    let mut hasher = Sha1::new();
                    hasher.update(data);

                    let result = hasher.finalize();
                    trailing_u64(&result)
                }
            },
            StrongName::Token(token) => *token,
        }
    }

    /// Derive the SHA-1 token, the representation used for display names and equality.
    #[must_use]
    pub fn sha1_token(&self) -> u64 {
        self.token(HashAlgorithm::Sha1)
    }

    /// Format the SHA-1 token as the 16-character lowercase hex string used in
    /// display names (byte order preserved, e.g. `b77a5c561934e089`).
    #[must_use]
    pub fn token_hex(&self) -> String {
        hex::encode(self.sha1_token().to_le_bytes())
    }
}

impl PartialEq for StrongName {
    fn eq(&self, other: &Self) -> bool {
        self.sha1_token() == other.sha1_token()
    }
}

impl Eq for StrongName {}

impl std::hash::Hash for StrongName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sha1_token().hash(state);
    }
}

fn trailing_u64(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[digest.len() - 8..]);
    u64::from_le_bytes(bytes)
}
