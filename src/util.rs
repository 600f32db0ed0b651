// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Small helpers shared across modules that otherwise have nothing in common.

use rand::{distributions::Alphanumeric, Rng};

/// A random alphanumeric string of `len` characters, used to build throwaway
/// unique names for temp-then-rename idioms (`active`, `.removed/`, desktop-file
/// rewrites).
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_suffix_has_requested_length() {
        assert_eq!(random_suffix(6).len(), 6);
        assert_eq!(random_suffix(8).len(), 8);
    }
}
