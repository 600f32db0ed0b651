// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The deploy entry point: pull-if-needed, checkout, publish `active`, export (§4.4).

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;

use crate::{
    active,
    cancel::{self, Cancellable, Cancelled},
    checksum::Checksum,
    environment,
    export,
    installation::{self, Installation},
    reference::Ref,
    repo::{CheckoutMode, OverwriteMode, PullTarget, Repository, RepositoryFactory},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("{0} version {1} already deployed")]
    AlreadyDeployed(String, String),
    #[error(transparent)]
    Installation(#[from] installation::Error),
    #[error("while trying to resolve ref {0}: {1}")]
    ResolveRev(String, #[source] crate::repo::StoreError),
    #[error("ref {0} has no resolvable tip")]
    NoSuchRef(String),
    #[error("while pulling {0} from remote {1}: {2}")]
    Pull(String, String, #[source] crate::repo::StoreError),
    #[error("failed to read commit {0}: {1}")]
    ReadCommit(String, #[source] crate::repo::StoreError),
    #[error("commit {0} not found in store")]
    CommitNotFound(String),
    #[error("while trying to check out {0} into {1}: {2}")]
    Checkout(String, PathBuf, #[source] crate::repo::StoreError),
    #[error(transparent)]
    Export(#[from] export::Error),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Deploy `reference` at `checksum` (or the ref's current tip, if `None`).
///
/// Returns the checksum actually deployed. Opens the installation's repository
/// on first use via `F`.
pub fn deploy<F: RepositoryFactory>(
    installation: &mut Installation,
    reference: &Ref,
    checksum: Option<&Checksum>,
    cancellable: Option<&Cancellable>,
) -> Result<Checksum, Error> {
    let root = installation.root.clone();
    let deploy_base = installation.deploy_base(reference);
    let exports_dir = installation.exports_dir();
    let origin_path = installation.origin_path(reference);
    let is_user = installation.is_user();

    let repo = installation.ensure_repo::<F>()?;

    deploy_with_repo(
        repo,
        &root,
        &deploy_base,
        &exports_dir,
        &origin_path,
        is_user,
        reference,
        checksum,
        cancellable,
    )
}

/// The testable core of [`deploy`]: operates against an already-opened repository
/// and plain path inputs, so it can be exercised against a test double without an
/// `Installation` in the loop.
#[allow(clippy::too_many_arguments)]
fn deploy_with_repo(
    repo: &dyn Repository,
    root: &Path,
    deploy_base: &Path,
    exports_dir: &Path,
    origin_path: &Path,
    is_user: bool,
    reference: &Ref,
    checksum: Option<&Checksum>,
    cancellable: Option<&Cancellable>,
) -> Result<Checksum, Error> {
    cancel::check(cancellable)?;

    let checksum = match checksum {
        Some(checksum) => checksum.clone(),
        None => {
            debug!("no checksum specified, resolving tip of {reference}");
            repo.resolve_rev(reference, false, cancellable)
                .map_err(|err| Error::ResolveRev(reference.as_str().to_owned(), err))?
                .ok_or_else(|| Error::NoSuchRef(reference.as_str().to_owned()))?
        }
    };

    let checkout_dir = deploy_base.join(checksum.as_str());
    if checkout_dir.exists() {
        return Err(Error::AlreadyDeployed(
            reference.as_str().to_owned(),
            checksum.as_str().to_owned(),
        ));
    }

    cancel::check(cancellable)?;

    debug!("looking for checksum {checksum} in local repo");
    let commit = match repo.read_commit(&checksum, cancellable) {
        Ok(Some(commit)) => commit,
        Ok(None) | Err(_) => {
            let repository = fs::read_to_string(origin_path)?;
            debug!("pulling checksum {checksum} from remote {repository}");
            repo.pull(repository.trim(), &[PullTarget::Commit(&checksum)], None, cancellable)
                .map_err(|err| Error::Pull(checksum.as_str().to_owned(), repository.clone(), err))?;

            repo.read_commit(&checksum, cancellable)
                .map_err(|err| Error::ReadCommit(checksum.as_str().to_owned(), err))?
                .ok_or_else(|| Error::CommitNotFound(checksum.as_str().to_owned()))?
        }
    };

    cancel::check(cancellable)?;

    let checkout_mode = if is_user { CheckoutMode::User } else { CheckoutMode::None };

    repo.checkout_tree(checkout_mode, OverwriteMode::None, &checkout_dir, &commit, cancellable)
        .map_err(|err| Error::Checkout(checksum.as_str().to_owned(), checkout_dir.clone(), err))?;

    fs::create_dir_all(checkout_dir.join("files"))?;
    fs::write(checkout_dir.join("files/.ref"), b"")?;

    if reference.is_app() {
        let export_src = checkout_dir.join("export");
        if export_src.is_dir() {
            let relative_path = export_src
                .strip_prefix(root)
                .unwrap_or(&export_src)
                .to_string_lossy()
                .into_owned();
            let symlink_prefix = format!("../{relative_path}");

            export::export_dir(
                reference.name(),
                reference.branch(),
                reference.arch(),
                environment::XDG_APP_BINDIR,
                &export_src,
                exports_dir,
                &symlink_prefix,
                cancellable,
            )?;
        }
    }

    cancel::check(cancellable)?;
    active::set_active(deploy_base, Some(&checksum))?;

    if reference.is_app() {
        export::update_exports(root, exports_dir, cancellable)?;
    }

    Ok(checksum)
}

/// Pull `reference` from `remote` into the repository, without deploying it.
pub fn pull<F: RepositoryFactory>(
    installation: &mut Installation,
    remote: &str,
    reference: &Ref,
    cancellable: Option<&Cancellable>,
) -> Result<(), Error> {
    let repo = installation.ensure_repo::<F>()?;
    repo.pull(remote, &[PullTarget::Ref(reference)], None, cancellable)
        .map_err(|err| Error::Pull(reference.as_str().to_owned(), remote.to_owned(), err))
}
