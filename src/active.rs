// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Reading and atomically switching the `active` symlink under a deploy base (§4.2).

use std::{fs, io, os::unix::fs::symlink, path::Path};

use log::trace;

use crate::{checksum::Checksum, util::random_suffix};

/// Read the `active` symlink's target under `deploy_base`, without following it.
///
/// Returns `Ok(None)` if the link does not exist; does not validate that the
/// target is itself a well-formed checksum, mirroring the original's behavior of
/// returning whatever string the link happens to hold.
pub fn read_active(deploy_base: &Path) -> io::Result<Option<String>> {
    let link = deploy_base.join("active");

    match fs::read_link(&link) {
        Ok(target) => Ok(Some(target.to_string_lossy().into_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Atomically point `active` at `checksum`, or remove it if `checksum` is `None`.
///
/// The pointed-to checksum is switched via a temp-symlink-then-rename so `active`
/// is never observably missing or dangling mid-update.
pub fn set_active(deploy_base: &Path, checksum: Option<&Checksum>) -> io::Result<()> {
    let link = deploy_base.join("active");

    match checksum {
        Some(checksum) => {
            let tmp_name = format!(".active-{}", random_suffix(6));
            let tmp_link = deploy_base.join(&tmp_name);

            symlink(checksum.as_str(), &tmp_link)?;
            fs::rename(&tmp_link, &link)?;
            trace!("active for {} now -> {checksum}", deploy_base.display());
        }
        None => match fs::remove_file(&link) {
            Ok(()) => trace!("active for {} cleared", deploy_base.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum(byte: char) -> Checksum {
        Checksum::parse(byte.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn round_trips_through_set_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let c = checksum('a');

        assert_eq!(read_active(dir.path()).unwrap(), None);

        set_active(dir.path(), Some(&c)).unwrap();
        assert_eq!(read_active(dir.path()).unwrap(), Some(c.as_str().to_owned()));

        set_active(dir.path(), None).unwrap();
        assert_eq!(read_active(dir.path()).unwrap(), None);
    }

    #[test]
    fn clearing_absent_active_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        set_active(dir.path(), None).unwrap();
    }

    #[test]
    fn switching_active_leaves_no_temp_entries_behind() {
        let dir = tempfile::tempdir().unwrap();
        set_active(dir.path(), Some(&checksum('a'))).unwrap();
        set_active(dir.path(), Some(&checksum('b'))).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "active")
            .collect();
        assert!(leftovers.is_empty(), "leftover entries: {leftovers:?}");
    }
}
