//! # Peer Addresses
//!
//! An `Address` names a participant on the overlay. It is a fixed-width,
//! comparable value; the core never looks inside it beyond parse and compare.
//!
//! ## Format
//!
//! - **Text**: `node:` followed by 40 lowercase hex digits.
//! - **Binary**: 20 raw bytes.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Number of bytes in an address.
pub const ADDRESS_LEN: usize = 20;

const SCHEME: &str = "node:";

/// Errors produced when reading an address from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// The input was empty after trimming.
    Empty,
    /// The input did not start with `node:`.
    MissingScheme,
    /// The body was not valid hex.
    InvalidHex(String),
    /// The body decoded to the wrong number of bytes.
    WrongLength(usize),
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "address is empty"),
            Self::MissingScheme => write!(f, "address must start with '{}'", SCHEME),
            Self::InvalidHex(msg) => write!(f, "address is not valid hex: {}", msg),
            Self::WrongLength(len) => {
                write!(f, "address must be {} bytes, got {}", ADDRESS_LEN, len)
            }
        }
    }
}

impl std::error::Error for AddressParseError {}

/// An overlay address.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Generates a fresh address from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }

        let body = s.strip_prefix(SCHEME).ok_or(AddressParseError::MissingScheme)?;
        let bytes = hex::decode(body).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let bytes: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AddressParseError::WrongLength(len))?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SCHEME, hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the first few bytes are enough to tell nodes apart in logs
        write!(f, "Address({}…)", &hex::encode(self.0)[..8])
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
