// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mirrors an app's `export/` subtree into the shared `exports/` tree as relative
//! symlinks, rewriting `.desktop`/`.service` files along the way (§4.5).

pub mod keyfile;

use std::{collections::HashSet, fs, io, os::unix::fs::symlink, path::Path};

use log::warn;
use nix::{
    sys::stat::Mode,
    unistd::{mkdir, unlinkat, UnlinkatFlags},
};
use thiserror::Error;

use crate::{
    cancel::{self, Cancellable, Cancelled},
    util::random_suffix,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("key-file: {0}")]
    KeyFile(#[from] keyfile::Error),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Trigger(#[from] crate::trigger::Error),
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Error::Io(io::Error::from(err))
    }
}

/// Recursively mirror `source` onto `destination`.
///
/// `symlink_prefix` is the relative path prepended to every planted symlink's
/// target, e.g. `../export` at the top level; it gains one more `..` per
/// directory of recursion.
pub fn export_dir(
    app: &str,
    branch: &str,
    arch: &str,
    bindir: &str,
    source: &Path,
    destination: &Path,
    symlink_prefix: &str,
    cancellable: Option<&Cancellable>,
) -> Result<(), Error> {
    ensure_dir(destination)?;

    let mut visited = HashSet::new();

    for entry in fs::read_dir(source)? {
        cancel::check(cancellable)?;

        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();

        if visited.contains(&name) {
            continue;
        }
        visited.insert(name.clone());

        let source_entry = source.join(&name);
        let meta = match fs::symlink_metadata(&source_entry) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };

        if meta.is_dir() {
            let child_prefix = format!("../{symlink_prefix}/{name}");
            export_dir(
                app,
                branch,
                arch,
                bindir,
                &source_entry,
                &destination.join(&name),
                &child_prefix,
                cancellable,
            )?;
        } else if meta.is_file() {
            if !has_name_prefix(&name, app) {
                warn!("non-prefixed filename {name} in app {app}, ignoring");
                continue;
            }

            if name.ends_with(".desktop") || name.ends_with(".service") {
                let new_name = export_desktop_file(app, branch, arch, bindir, source, &name)?;
                visited.insert(new_name.clone());
                fs::rename(source.join(&new_name), &source_entry)?;
            }

            let target = format!("{symlink_prefix}/{name}");
            plant_symlink(&target, &destination.join(&name))?;
        } else {
            warn!("not exporting {} of unsupported type", source_entry.display());
        }
    }

    Ok(())
}

fn ensure_dir(path: &Path) -> io::Result<()> {
    match mkdir(path, Mode::from_bits_truncate(0o777)) {
        Ok(()) | Err(nix::Error::EEXIST) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn plant_symlink(target: &str, link: &Path) -> io::Result<()> {
    match unlinkat(None, link, UnlinkatFlags::NoRemoveDir) {
        Ok(()) | Err(nix::Error::ENOENT) => {}
        Err(err) => return Err(err.into()),
    }
    symlink(target, link)
}

fn has_name_prefix(name: &str, app: &str) -> bool {
    name.starts_with(app)
}

fn export_desktop_file(
    app: &str,
    branch: &str,
    arch: &str,
    bindir: &str,
    dir: &Path,
    name: &str,
) -> Result<String, Error> {
    let bytes = fs::read(dir.join(name))?;

    let mut kf = keyfile::KeyFile::parse(&bytes)?;

    if let Some(expected) = name.strip_suffix(".service") {
        keyfile::validate_service_name(&kf, name, expected)?;
    }

    keyfile::rewrite_exec(&mut kf, bindir, app, branch, arch);

    let new_bytes = kf.serialize();
    let tmp_name = format!(".export-{}", random_suffix(8));
    let tmp_path = dir.join(&tmp_name);

    fs::write(&tmp_path, &new_bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(tmp_name)
}

/// Remove every symlink beneath `exports` whose target no longer exists.
pub fn prune_dangling_symlinks(exports: &Path, cancellable: Option<&Cancellable>) -> Result<(), Error> {
    if !exports.exists() {
        return Ok(());
    }
    prune_dangling_symlinks_inner(exports, cancellable)
}

fn prune_dangling_symlinks_inner(dir: &Path, cancellable: Option<&Cancellable>) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        cancel::check(cancellable)?;

        let entry = entry?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path)?;

        if meta.is_dir() {
            prune_dangling_symlinks_inner(&path, cancellable)?;
        } else if meta.file_type().is_symlink() && fs::metadata(&path).is_err() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// After an app deploy or undeploy: drop dangling symlinks and run triggers.
pub fn update_exports(root: &Path, exports: &Path, cancellable: Option<&Cancellable>) -> Result<(), Error> {
    if exports.exists() {
        prune_dangling_symlinks(exports, cancellable)?;
        crate::trigger::run_triggers(root, cancellable)?;
    }
    Ok(())
}
