//! Core identifier types for pulse.
//!
//! This module provides strongly-typed identifiers for collections, precomputation
//! runs, and ingested records. All IDs are designed for efficient storage and lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The code naming a collection of ingested records.
///
/// Codes are free-form strings supplied by the ingestion path. Surrounding
/// whitespace is dropped and an empty code is rejected, so a `CollectionCode`
/// always names something.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionCode(String);

impl CollectionCode {
    /// Longest code accepted, in bytes. Store keys carry a `u16` length prefix.
    pub const MAX_LEN: usize = u16::MAX as usize;

    /// Create a `CollectionCode`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError::EmptyCollectionCode` if nothing is left after trimming,
    /// or `IdError::CollectionCodeTooLong` if the code exceeds [`Self::MAX_LEN`].
    pub fn new(code: impl AsRef<str>) -> Result<Self, IdError> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(IdError::EmptyCollectionCode);
        }
        if code.len() > Self::MAX_LEN {
            return Err(IdError::CollectionCodeTooLong(code.len()));
        }
        Ok(Self(code.to_string()))
    }

    /// Return the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the UTF-8 bytes of the code.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for CollectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionCode({})", self.0)
    }
}

impl fmt::Display for CollectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CollectionCode {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CollectionCode {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CollectionCode> for String {
    fn from(code: CollectionCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CollectionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A 16-byte precomputation run identifier based on UUID v4.
///
/// A fresh `RunId` is handed out every time a precomputation run starts, and
/// progress for that run is tracked under it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Create a new `RunId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `RunId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for RunId {
    type Err = IdError;

    /// Parse a `RunId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0.to_string()
    }
}

/// A 32-byte record identifier.
///
/// Every ingested record gets its own ID, so two posts with identical text
/// and creation time are still stored as two records. IDs are either freshly
/// generated or derived via blake3 from an ID supplied by the ingestion
/// source, which makes reloading the same source idempotent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId([u8; 32]);

impl RecordId {
    /// Create a new `RecordId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a new random `RecordId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(*blake3::hash(uuid::Uuid::new_v4().as_bytes()).as_bytes())
    }

    /// Derive the `RecordId` of a record from the ID its source assigned it.
    ///
    /// Source IDs are only unique within a collection.
    #[must_use]
    pub fn derive(code: &CollectionCode, source_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(code.as_bytes());
        hasher.update(&[0]);
        hasher.update(source_id.as_bytes());

        Self(*hasher.finalize().as_bytes())
    }

    /// Parse a `RecordId` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 32,
            got: s.len() / 2,
        })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.to_hex())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for RecordId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_hex()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The collection code was empty or only whitespace.
    #[error("collection code is empty")]
    EmptyCollectionCode,

    /// The collection code is longer than a store key can carry.
    #[error("collection code is {0} bytes long")]
    CollectionCodeTooLong(usize),
}
