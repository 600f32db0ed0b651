// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Runs the post-export trigger helper over every `*.trigger` file (§4.8).

use std::{fs, path::Path, process::Command};

use log::warn;

use crate::{
    cancel::{self, Cancellable, Cancelled},
    environment,
};

/// Enumerate [`environment::XDG_APP_TRIGGERDIR`] and spawn the helper once per
/// `*.trigger` file found there, passing `root` as the installation to act on.
///
/// A single trigger failing to spawn or exiting non-zero is logged and skipped;
/// the call only fails if the trigger directory itself cannot be enumerated or
/// cancellation is observed between triggers.
pub fn run_triggers(root: &Path, cancellable: Option<&Cancellable>) -> Result<(), Error> {
    let entries = match fs::read_dir(environment::XDG_APP_TRIGGERDIR) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    for entry in entries {
        cancel::check(cancellable)?;

        let entry = entry?;
        let path = entry.path();

        let is_trigger = path.extension().is_some_and(|ext| ext == "trigger")
            && entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_trigger {
            continue;
        }

        run_one(root, &path);
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

fn run_one(root: &Path, trigger: &Path) {
    let status = Command::new(environment::HELPER)
        .arg("-a")
        .arg(root)
        .arg("-e")
        .arg("-F")
        .arg("/usr")
        .arg(trigger)
        .current_dir("/")
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("trigger {} exited with {status}", trigger.display()),
        Err(err) => warn!("failed to spawn trigger {}: {err}", trigger.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `XDG_APP_TRIGGERDIR` is a fixed compile-time path (§6); this test only
    /// exercises the case every other test environment actually hits, where
    /// that directory is absent.
    #[test]
    fn missing_trigger_dir_is_not_an_error() {
        assert!(!Path::new(environment::XDG_APP_TRIGGERDIR).exists());

        let dir = tempfile::tempdir().unwrap();
        run_triggers(dir.path(), None).unwrap();
    }
}
