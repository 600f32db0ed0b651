// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Parsed `{type}/{name}/{arch}/{branch}` reference identifiers.

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

/// The kind of artifact a [`Ref`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    App,
    Runtime,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::App => "app",
            Kind::Runtime => "runtime",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A four-component reference: `{type}/{name}/{arch}/{branch}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    raw: String,
    kind: Kind,
    name_end: usize,
    arch_end: usize,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("ref {0:?} must have exactly 4 non-empty components separated by '/'")]
    MalformedRef(String),
    #[error("ref {0:?} has unknown type, expected \"app\" or \"runtime\"")]
    UnknownKind(String),
}

impl Ref {
    /// Parse and validate a ref string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();

        let parts: Vec<&str> = raw.split('/').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::MalformedRef(raw));
        }

        let kind = match parts[0] {
            "app" => Kind::App,
            "runtime" => Kind::Runtime,
            _ => return Err(Error::UnknownKind(raw)),
        };

        let name_end = parts[0].len() + 1 + parts[1].len();
        let arch_end = name_end + 1 + parts[2].len();

        Ok(Self {
            raw,
            kind,
            name_end,
            arch_end,
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.raw[self.kind.as_str().len() + 1..self.name_end]
    }

    pub fn arch(&self) -> &str {
        &self.raw[self.name_end + 1..self.arch_end]
    }

    pub fn branch(&self) -> &str {
        &self.raw[self.arch_end + 1..]
    }

    pub fn is_app(&self) -> bool {
        matches!(self.kind, Kind::App)
    }

    /// The relative path `{type}/{name}/{arch}/{branch}`, used to build the deploy base.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.as_str())
            .join(self.name())
            .join(self.arch())
            .join(self.branch())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl FromStr for Ref {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ref::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_app_ref() {
        let r = Ref::parse("app/com.example.Hello/x86_64/stable").unwrap();
        assert!(r.is_app());
        assert_eq!(r.name(), "com.example.Hello");
        assert_eq!(r.arch(), "x86_64");
        assert_eq!(r.branch(), "stable");
        assert_eq!(
            r.relative_path(),
            PathBuf::from("app/com.example.Hello/x86_64/stable")
        );
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert!(matches!(
            Ref::parse("app/com.example.Hello/x86_64"),
            Err(Error::MalformedRef(_))
        ));
        assert!(matches!(
            Ref::parse("app/com.example.Hello//x86_64/stable"),
            Err(Error::MalformedRef(_))
        ));
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(matches!(
            Ref::parse("library/com.example.Hello/x86_64/stable"),
            Err(Error::UnknownKind(_))
        ));
    }
}
