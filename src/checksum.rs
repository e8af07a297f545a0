//! Expected digests and streaming digest computation.

use std::fmt;

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};

/// Digest algorithms accepted for download verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Lowercase name, as used in `name:hex` checksum strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Guesses the algorithm from the length of a bare hex digest.
    ///
    /// Anything that is not a SHA-2 length is treated as MD5, the format
    /// upstream projects most often publish next to their archives.
    const fn from_hex_len(len: usize) -> Self {
        match len {
            64 => Self::Sha256,
            128 => Self::Sha512,
            _ => Self::Md5,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest the downloaded content must match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: Algorithm,
    expected: String,
}

impl Checksum {
    /// Parses a checksum string.
    ///
    /// Accepts either `algorithm:hex` (`md5`, `sha256`, `sha512`) or a bare hex
    /// digest whose algorithm is inferred from its length. The digest is
    /// compared case-insensitively. Malformed digests are not rejected here:
    /// they simply never match, which surfaces as a corrupted download.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Some((name, hex)) = value.split_once(':')
            && let Some(algorithm) = Algorithm::from_name(name)
        {
            return Self::new(algorithm, hex);
        }
        Self::new(Algorithm::from_hex_len(value.len()), value)
    }

    /// Creates a checksum for an explicit algorithm.
    #[must_use]
    pub fn new(algorithm: Algorithm, expected: &str) -> Self {
        Self {
            algorithm,
            expected: expected.trim().to_ascii_lowercase(),
        }
    }

    /// The digest algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The expected digest, lowercase hex.
    #[must_use]
    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Starts a running digest for this checksum's algorithm.
    #[must_use]
    pub fn hasher(&self) -> Hasher {
        Hasher::new(self.algorithm)
    }

    /// Compares a computed hex digest against the expected one.
    #[must_use]
    pub fn matches(&self, actual_hex: &str) -> bool {
        self.expected.eq_ignore_ascii_case(actual_hex)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.expected)
    }
}

/// Running digest fed block by block during a download.
pub enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    /// Creates an empty digest state.
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => Self::Md5(Md5::new()),
            Algorithm::Sha256 => Self::Sha256(Sha256::new()),
            Algorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    /// Feeds a block into the digest.
    pub fn update(&mut self, block: &[u8]) {
        match self {
            Self::Md5(h) => h.update(block),
            Self::Sha256(h) => h.update(block),
            Self::Sha512(h) => h.update(block),
        }
    }

    /// Consumes the state and returns the lowercase hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}
