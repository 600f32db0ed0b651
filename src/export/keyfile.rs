// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A minimal INI-like key-file parser/serializer for `.desktop` and `.service`
//! files, and the `Exec=` rewrite that turns them into sandbox-aware launchers.
//!
//! Group and key order (including translated keys like `Name[fr]`, which are
//! distinct keys from `Name`) is preserved across a parse/serialize round trip,
//! so a file that has already been rewritten is untouched by a second pass.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("key-file is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("key-file entry {0:?} appears before any [group] header")]
    EntryOutsideGroup(String),
    #[error("service file {file:?} has Name={name:?}, expected {expected:?}")]
    ServiceNameMismatch {
        file: String,
        name: String,
        expected: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Comment(String),
    Blank,
    Group(String),
    Entry(String, String),
}

#[derive(Debug, Clone, Default)]
pub struct KeyFile {
    lines: Vec<Line>,
}

impl KeyFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(bytes)?;
        let mut lines = Vec::new();
        let mut current_group: Option<String> = None;

        for raw_line in text.lines() {
            let trimmed = raw_line.trim_end_matches('\r');

            if trimmed.is_empty() {
                lines.push(Line::Blank);
            } else if trimmed.starts_with('#') {
                lines.push(Line::Comment(trimmed.to_owned()));
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].to_owned();
                current_group = Some(name.clone());
                lines.push(Line::Group(name));
            } else if let Some((key, value)) = trimmed.split_once('=') {
                if current_group.is_none() {
                    return Err(Error::EntryOutsideGroup(trimmed.to_owned()));
                }
                lines.push(Line::Entry(key.trim().to_owned(), value.to_owned()));
            } else {
                // Unparseable line; preserve verbatim as a comment rather than fail.
                lines.push(Line::Comment(trimmed.to_owned()));
            }
        }

        Ok(Self { lines })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Comment(text) => {
                    out.push_str(text);
                    out.push('\n');
                }
                Line::Blank => out.push('\n'),
                Line::Group(name) => {
                    out.push('[');
                    out.push_str(name);
                    out.push_str("]\n");
                }
                Line::Entry(key, value) => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                    out.push('\n');
                }
            }
        }
        out.into_bytes()
    }

    fn group_bounds(&self, group: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|line| matches!(line, Line::Group(name) if name == group))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|line| matches!(line, Line::Group(_)))
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        let (start, end) = self.group_bounds(group)?;
        self.lines[start..end].iter().find_map(|line| match line {
            Line::Entry(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Group names in file order.
    pub fn groups(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Group(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Remove `key` from `group`, if present.
    pub fn remove(&mut self, group: &str, key: &str) {
        if let Some((start, end)) = self.group_bounds(group) {
            self.lines[start..end].retain(|line| !matches!(line, Line::Entry(k, _) if k == key));
        }
    }

    /// Set `key` in `group` to `value`, appending a new entry at the end of the
    /// group if the key does not already exist. Updates in place otherwise, so
    /// position in the file is preserved.
    pub fn set(&mut self, group: &str, key: &str, value: String) {
        if let Some((start, end)) = self.group_bounds(group) {
            if let Some(line) = self.lines[start..end].iter_mut().find_map(|line| match line {
                Line::Entry(k, v) if k == key => Some(v),
                _ => None,
            }) {
                *line = value;
                return;
            }

            self.lines.insert(end, Line::Entry(key.to_owned(), value));
        }
    }
}

/// Rewrite every group's `Exec=` to invoke the sandboxed launcher, removing
/// `TryExec` and `X-GNOME-Bugzilla-ExtraInfoScript` along the way.
///
/// `bindir` is the directory containing the launcher binary (`environment::XDG_APP_BINDIR`).
/// A group whose `Exec=` already starts with the launcher invocation is left
/// untouched, so running this twice on the same file is a no-op after the
/// first pass rather than wrapping the launcher around itself.
pub fn rewrite_exec(keyfile: &mut KeyFile, bindir: &str, app: &str, branch: &str, arch: &str) {
    let launcher_prefix = format!("{bindir}/xdg-app run ");

    for group in keyfile.groups().into_iter().map(str::to_owned).collect::<Vec<_>>() {
        keyfile.remove(&group, "TryExec");
        keyfile.remove(&group, "X-GNOME-Bugzilla-ExtraInfoScript");

        let Some(old_exec) = keyfile.get(&group, "Exec") else {
            continue;
        };

        if old_exec.starts_with(&launcher_prefix) {
            continue;
        }

        let mut new_exec = format!(
            "{bindir}/xdg-app run --branch={} --arch={}",
            single_quote(branch),
            single_quote(arch)
        );

        match shell_words::split(old_exec) {
            Ok(argv) if !argv.is_empty() => {
                new_exec.push_str(" --command=");
                new_exec.push_str(&shell_words::quote(&argv[0]));
                new_exec.push(' ');
                new_exec.push_str(&shell_words::quote(app));
                for arg in &argv[1..] {
                    new_exec.push(' ');
                    new_exec.push_str(&shell_words::quote(arg));
                }
            }
            _ => {
                new_exec.push(' ');
                new_exec.push_str(&shell_words::quote(app));
            }
        }

        keyfile.set(&group, "Exec", new_exec);
    }
}

/// Wrap `s` in single quotes, escaping embedded single quotes the POSIX shell way
/// (`'...'\''...'`), so `--branch='...'`/`--arch='...'` stays a single shell token
/// even if the ref's branch or arch component itself contains a quote.
fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// For `.service` files: the `[D-BUS Service] Name` key must equal `expected_name`
/// (the file's basename without extension).
pub fn validate_service_name(keyfile: &KeyFile, file_name: &str, expected_name: &str) -> Result<(), Error> {
    let name = keyfile.get("D-BUS Service", "Name").unwrap_or_default();
    if name != expected_name {
        return Err(Error::ServiceNameMismatch {
            file: file_name.to_owned(),
            name: name.to_owned(),
            expected: expected_name.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP: &str = "[Desktop Entry]\nName=Hello\nExec=hello --flag foo\nTryExec=/usr/bin/hello\n";

    #[test]
    fn round_trips_untouched_file() {
        let kf = KeyFile::parse(DESKTOP.as_bytes()).unwrap();
        assert_eq!(kf.serialize(), DESKTOP.as_bytes());
    }

    #[test]
    fn rewrite_builds_expected_exec_line() {
        let mut kf = KeyFile::parse(DESKTOP.as_bytes()).unwrap();
        rewrite_exec(&mut kf, "/usr/bin", "com.example.Hello", "stable", "x86_64");

        assert_eq!(kf.get("Desktop Entry", "TryExec"), None);
        assert_eq!(
            kf.get("Desktop Entry", "Exec"),
            Some(
                "/usr/bin/xdg-app run --branch='stable' --arch='x86_64' --command='hello' 'com.example.Hello' '--flag' 'foo'"
            )
        );
    }

    #[test]
    fn rewrite_escapes_quotes_in_branch_and_arch() {
        let mut kf = KeyFile::parse(DESKTOP.as_bytes()).unwrap();
        rewrite_exec(&mut kf, "/usr/bin", "com.example.Hello", "o'brien", "x86_64");

        assert_eq!(
            kf.get("Desktop Entry", "Exec"),
            Some(
                "/usr/bin/xdg-app run --branch='o'\\''brien' --arch='x86_64' --command='hello' 'com.example.Hello' '--flag' 'foo'"
            )
        );
    }

    #[test]
    fn rewrite_is_a_fixed_point() {
        let mut kf = KeyFile::parse(DESKTOP.as_bytes()).unwrap();
        rewrite_exec(&mut kf, "/usr/bin", "com.example.Hello", "stable", "x86_64");
        let once = kf.serialize();

        let mut kf2 = KeyFile::parse(&once).unwrap();
        rewrite_exec(&mut kf2, "/usr/bin", "com.example.Hello", "stable", "x86_64");
        assert_eq!(kf2.serialize(), once);
    }

    #[test]
    fn translated_keys_are_distinct_from_base_key() {
        let text = "[Desktop Entry]\nName=Hello\nName[fr]=Bonjour\n";
        let kf = KeyFile::parse(text.as_bytes()).unwrap();
        assert_eq!(kf.get("Desktop Entry", "Name"), Some("Hello"));
        assert_eq!(kf.get("Desktop Entry", "Name[fr]"), Some("Bonjour"));
        assert_eq!(kf.serialize(), text.as_bytes());
    }

    #[test]
    fn service_name_validation() {
        let text = "[D-BUS Service]\nName=com.example.Hello\nExec=/usr/bin/hello\n";
        let kf = KeyFile::parse(text.as_bytes()).unwrap();
        assert!(validate_service_name(&kf, "com.example.Hello.service", "com.example.Hello").is_ok());
        assert!(validate_service_name(&kf, "com.example.Hello.service", "com.example.Wrong").is_err());
    }
}
