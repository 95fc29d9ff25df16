use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// Prefix of the textual form, `sha256:<64 hex digits>`.
pub const HASH_PREFIX: &str = "sha256:";

const DIGEST_LEN: usize = 32;

/// SHA-256 digest addressing an entry in a content-addressed store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; DIGEST_LEN]);

impl Hash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&Sha256::digest(bytes));
        Hash(digest)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Digits only, as used for file names.
    pub fn hex_digits(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_hex(&self) -> String {
        format!("{HASH_PREFIX}{}", self.hex_digits())
    }

    pub fn from_hex_str(text: &str) -> Result<Self, HashParseError> {
        text.parse()
    }
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let digits = text
            .strip_prefix(HASH_PREFIX)
            .ok_or(HashParseError::MissingPrefix)?;
        if digits.len() != DIGEST_LEN * 2 {
            return Err(HashParseError::InvalidLength(digits.len()));
        }
        let mut digest = [0u8; DIGEST_LEN];
        hex::decode_to_slice(digits, &mut digest)?;
        Ok(Hash(digest))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HASH_PREFIX}{}", self.hex_digits())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
    #[error("hash must start with '{HASH_PREFIX}'")]
    MissingPrefix,
    #[error("expected 64 hex digits, found {0}")]
    InvalidLength(usize),
    #[error("invalid hex digits: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
