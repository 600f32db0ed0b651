// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! An [`Installation`] is the general encapsulation pattern for a deployment root as
//! seen by this crate: one per system-wide or per-user tree.

use std::{
    fmt, fs, io,
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

use thiserror::Error;

use crate::{
    environment,
    reference::Ref,
    repo::{RepoMode, Repository, RepositoryFactory, StoreError},
};

/// Whether an [`Installation`] is the per-user or the system-wide tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    System,
    User,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::System => "system".fmt(f),
            Scope::User => "user".fmt(f),
        }
    }
}

/// Owns an installation root and lazily opens the repository beneath it.
///
/// Multiple handles may be constructed over the same root; callers are responsible for
/// serializing write operations against a given root externally (§5).
pub struct Installation {
    pub root: PathBuf,
    pub scope: Scope,
    repo: Option<Box<dyn Repository>>,
}

impl fmt::Debug for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installation")
            .field("root", &self.root)
            .field("scope", &self.scope)
            .field("repo_open", &self.repo.is_some())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("store")]
    Store(#[from] StoreError),
}

impl Installation {
    /// Open a handle over `root`. Does not touch the filesystem.
    pub fn new(root: impl Into<PathBuf>, scope: Scope) -> Self {
        Self {
            root: root.into(),
            scope,
            repo: None,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self.scope, Scope::User)
    }

    /// Recursively create the installation root with mode 0777 (umask applies).
    /// Idempotent.
    pub fn ensure_path(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.root)?.permissions();
            perms.set_mode(0o777);
            fs::set_permissions(&self.root, perms)?;
        }
        Ok(())
    }

    /// Open the object store under `root/repo`, creating it via `F` on first use.
    ///
    /// Subsequent calls are no-ops. On create failure the partial `repo/` directory is
    /// recursively removed before the error is returned.
    pub fn ensure_repo<F: RepositoryFactory>(&mut self) -> Result<&dyn Repository, Error> {
        if self.repo.is_none() {
            self.ensure_path()?;

            let repo_path = self.repo_path();
            let repo: Box<dyn Repository> = if repo_path.exists() {
                Box::new(F::open(&repo_path)?)
            } else {
                let mode = if self.is_user() {
                    RepoMode::BareUser
                } else {
                    RepoMode::Bare
                };

                match F::create(&repo_path, mode) {
                    Ok(repo) => Box::new(repo),
                    Err(source) => {
                        let _ = fs::remove_dir_all(&repo_path);
                        return Err(source.into());
                    }
                }
            };

            self.repo = Some(repo);
        }

        Ok(self.repo.as_deref().expect("just populated"))
    }

    pub fn repo_path(&self) -> PathBuf {
        self.root.join("repo")
    }

    /// Deploy base for `reference`: `{root}/{type}/{name}/{arch}/{branch}`.
    pub fn deploy_base(&self, reference: &Ref) -> PathBuf {
        self.root.join(reference.relative_path())
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn removed_dir(&self) -> PathBuf {
        self.root.join(".removed")
    }

    /// Per-app writable data area; owned by the app, not touched by this crate.
    pub fn app_data_dir(&self, app_name: &str) -> PathBuf {
        self.root.join("app").join(app_name).join("data")
    }

    pub fn origin_path(&self, reference: &Ref) -> PathBuf {
        self.deploy_base(reference).join("origin")
    }
}

/// Build the canonical system installation root.
pub fn system_base_dir() -> PathBuf {
    PathBuf::from(environment::XDG_APP_SYSTEMDIR)
}

/// Build the canonical per-user installation root: `$XDG_DATA_HOME/xdg-app`.
pub fn user_base_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|base| base.join(environment::USER_INSTALLATION_SUBDIR))
}

/// Process-wide memoized system [`Installation`] handle (§4.1).
///
/// A convenience, not a correctness requirement: callers that want multiple handles
/// over the same root are free to construct [`Installation::new`] directly, as long as
/// writes against a given root are serialized externally (§5).
pub fn get_system() -> &'static Mutex<Installation> {
    static CELL: OnceLock<Mutex<Installation>> = OnceLock::new();
    CELL.get_or_init(|| Mutex::new(Installation::new(system_base_dir(), Scope::System)))
}

/// Process-wide memoized per-user [`Installation`] handle (§4.1).
///
/// Panics if the user data directory cannot be determined (no `$HOME`), which mirrors
/// the original's behavior of treating that as an unrecoverable environment error.
pub fn get_user() -> &'static Mutex<Installation> {
    static CELL: OnceLock<Mutex<Installation>> = OnceLock::new();
    CELL.get_or_init(|| {
        let root = user_base_dir().expect("could not determine user data directory");
        Mutex::new(Installation::new(root, Scope::User))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_path_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("install");
        let install = Installation::new(&root, Scope::User);

        install.ensure_path().unwrap();
        install.ensure_path().unwrap();

        assert!(root.is_dir());
    }

    #[test]
    fn deploy_base_joins_ref_components() {
        let dir = tempfile::tempdir().unwrap();
        let install = Installation::new(dir.path(), Scope::System);
        let r = Ref::parse("app/com.example.Hello/x86_64/stable").unwrap();

        assert_eq!(
            install.deploy_base(&r),
            dir.path().join("app/com.example.Hello/x86_64/stable")
        );
    }
}
