// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Undeploy, `.removed/` garbage collection, and repository pruning (§4.6).

use std::{fs, io, path::Path};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    active,
    cancel::{self, Cancellable, Cancelled},
    checksum::Checksum,
    export,
    installation::{self, Installation},
    lock,
    reference::Ref,
    repo::{PruneFlags, Repository, RepositoryFactory},
    util::random_suffix,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("{0} version {1} already undeployed")]
    AlreadyUndeployed(String, String),
    #[error(transparent)]
    Installation(#[from] installation::Error),
    #[error(transparent)]
    Export(#[from] export::Error),
    #[error("while pruning: {0}")]
    Prune(#[source] crate::repo::StoreError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Remove `checksum`'s checkout from `reference`'s deploy base.
///
/// Repoints `active` away from the removed checkout first if it was the active
/// one. Moves the checkout into `.removed/` and deletes it immediately unless it
/// is still lock-held, in which case [`cleanup_removed`] will finish the job later.
pub fn undeploy<F: RepositoryFactory>(
    installation: &mut Installation,
    reference: &Ref,
    checksum: &Checksum,
    force_remove: bool,
    cancellable: Option<&Cancellable>,
) -> Result<(), Error> {
    cancel::check(cancellable)?;

    let root = installation.root.clone();
    let deploy_base = installation.deploy_base(reference);
    let exports_dir = installation.exports_dir();
    let removed_dir = installation.removed_dir();

    let checkout_dir = deploy_base.join(checksum.as_str());
    if !checkout_dir.is_dir() {
        return Err(Error::AlreadyUndeployed(
            reference.as_str().to_owned(),
            checksum.as_str().to_owned(),
        ));
    }

    installation.ensure_repo::<F>()?;

    if active::read_active(&deploy_base)?.as_deref() == Some(checksum.as_str()) {
        let some_other = list_deployed_dir(&deploy_base)?
            .into_iter()
            .find(|c| c != checksum);
        active::set_active(&deploy_base, some_other.as_ref())?;
    }

    cancel::check(cancellable)?;

    fs::create_dir_all(&removed_dir)?;
    let removed_subdir = removed_dir.join(format!("{}-{}", random_suffix(6), checksum));
    fs::rename(&checkout_dir, &removed_subdir)?;

    if force_remove || !lock::is_locked(&removed_subdir) {
        if let Err(err) = remove_dir_all_best_effort(&removed_subdir) {
            warn!("failed to remove {}: {err}", removed_subdir.display());
        }
    }

    if reference.is_app() {
        export::update_exports(&root, &exports_dir, cancellable)?;
    }

    Ok(())
}

fn list_deployed_dir(deploy_base: &Path) -> io::Result<Vec<Checksum>> {
    let entries = match fs::read_dir(deploy_base) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if Checksum::looks_like(&name) && entry.file_type()?.is_dir() {
            if let Ok(checksum) = Checksum::parse(name.into_owned()) {
                out.push(checksum);
            }
        }
    }
    Ok(out)
}

fn remove_dir_all_best_effort(path: &Path) -> io::Result<()> {
    fs::remove_dir_all(path)
}

/// Recursively delete any unlocked subdirectory of `.removed/`.
///
/// Best-effort: failures are logged and skipped rather than propagated, since
/// this is background GC, not a user-initiated operation.
pub fn cleanup_removed(installation: &Installation, cancellable: Option<&Cancellable>) -> Result<(), Error> {
    let removed_dir = installation.removed_dir();
    if !removed_dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(&removed_dir)? {
        cancel::check(cancellable)?;

        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() && !lock::is_locked(&path) {
            if let Err(err) = fs::remove_dir_all(&path) {
                warn!("failed to remove {}: {err}", path.display());
            }
        }
    }

    Ok(())
}

/// Prune unreachable objects from the repository. Returns the store's stats.
pub fn prune<F: RepositoryFactory>(
    installation: &mut Installation,
    cancellable: Option<&Cancellable>,
) -> Result<crate::repo::PruneStats, Error> {
    let repo = installation.ensure_repo::<F>()?;
    let stats = repo.prune(PruneFlags::RefsOnly, 0, cancellable).map_err(Error::Prune)?;
    debug!(
        "pruned {}/{} objects, freed {} bytes",
        stats.objects_pruned, stats.objects_total, stats.bytes_freed
    );
    Ok(stats)
}
