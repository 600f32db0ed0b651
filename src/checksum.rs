// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A validated 64-character lowercase hex commit id.

use std::fmt;

use thiserror::Error;

const LEN: usize = 64;

/// A commit id in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(String);

#[derive(Debug, Error)]
#[error("{0:?} is not a 64-character lowercase hex checksum")]
pub struct Error(String);

impl Checksum {
    pub fn parse(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();

        let valid = raw.len() == LEN && raw.bytes().all(|b| !b.is_ascii_uppercase()) && hex::decode(&raw).is_ok();

        if valid {
            Ok(Self(raw))
        } else {
            Err(Error(raw))
        }
    }

    /// True if `name` has the shape of a checksum directory name (64 chars, not dotfile).
    /// Used by enumeration code that only has a directory name, not a validated value.
    pub fn looks_like(name: &str) -> bool {
        !name.starts_with('.') && name.len() == LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<std::path::Path> for Checksum {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_checksum() {
        let c = "a".repeat(64);
        assert!(Checksum::parse(c).is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Checksum::parse("abc").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        let c = "A".repeat(64);
        assert!(Checksum::parse(c).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let c = "g".repeat(64);
        assert!(Checksum::parse(c).is_err());
    }
}
