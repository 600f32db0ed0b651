// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! An in-memory-backed [`Repository`] test double shared by this crate's unit tests.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    cancel::Cancellable,
    checksum::Checksum,
    reference::Ref,
    repo::{
        CheckoutMode, Commit, CommitInfo, OverwriteMode, PruneFlags, PruneStats, PullProgress, PullTarget, Repository,
        RepositoryFactory, RepoMode, RootTree, StoreError,
    },
};

/// An owned record of one [`PullTarget`], kept around after the borrowed original
/// is gone so tests can assert on exactly what a `pull` call asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulledTarget {
    Ref(String),
    Commit(String),
}

impl From<&PullTarget<'_>> for PulledTarget {
    fn from(target: &PullTarget<'_>) -> Self {
        match target {
            PullTarget::Ref(reference) => PulledTarget::Ref(reference.as_str().to_owned()),
            PullTarget::Commit(checksum) => PulledTarget::Commit(checksum.as_str().to_owned()),
        }
    }
}

struct Tree(String);

impl RootTree for Tree {
    fn id(&self) -> &str {
        &self.0
    }
}

struct Info(String);

impl CommitInfo for Info {
    fn id(&self) -> &str {
        &self.0
    }
}

/// A store double: commits are just directories on disk, keyed by checksum.
/// `checkout_tree` copies that directory to the destination.
#[derive(Default)]
pub struct MockRepo {
    commits: Mutex<HashMap<String, PathBuf>>,
    /// Commits that exist "on the remote" but aren't locally readable until a
    /// `pull` asks for them by checksum or by the ref whose tip they are.
    remote_commits: Mutex<HashMap<String, PathBuf>>,
    tips: Mutex<HashMap<String, String>>,
    pulled: Mutex<Vec<PulledTarget>>,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `checksum` as resolving to the contents of `content_dir`, and as
    /// the tip of `reference`. Available locally from the start.
    pub fn add_commit(&self, reference: &Ref, checksum: &Checksum, content_dir: &Path) {
        self.commits
            .lock()
            .unwrap()
            .insert(checksum.as_str().to_owned(), content_dir.to_owned());
        self.tips
            .lock()
            .unwrap()
            .insert(reference.as_str().to_owned(), checksum.as_str().to_owned());
    }

    /// Register `checksum` as resolving to `content_dir`, but only once `pull`
    /// is asked for that exact checksum (or the ref whose tip it is) — not
    /// readable locally beforehand.
    pub fn add_remote_commit(&self, checksum: &Checksum, content_dir: &Path) {
        self.remote_commits
            .lock()
            .unwrap()
            .insert(checksum.as_str().to_owned(), content_dir.to_owned());
    }

    /// Every target passed to `pull` so far, in call order.
    pub fn pulled_targets(&self) -> Vec<PulledTarget> {
        self.pulled.lock().unwrap().clone()
    }
}

impl Repository for MockRepo {
    fn pull(
        &self,
        _remote: &str,
        targets: &[PullTarget<'_>],
        _progress: Option<&dyn PullProgress>,
        _cancellable: Option<&Cancellable>,
    ) -> Result<(), StoreError> {
        let mut pulled = self.pulled.lock().unwrap();
        let mut remote_commits = self.remote_commits.lock().unwrap();
        let mut commits = self.commits.lock().unwrap();
        let tips = self.tips.lock().unwrap();

        for target in targets {
            pulled.push(PulledTarget::from(target));

            let checksum = match target {
                PullTarget::Commit(checksum) => Some(checksum.as_str().to_owned()),
                PullTarget::Ref(reference) => tips.get(reference.as_str()).cloned(),
            };

            if let Some(checksum) = checksum {
                if let Some(content_dir) = remote_commits.remove(&checksum) {
                    commits.insert(checksum, content_dir);
                }
            }
        }

        Ok(())
    }

    fn resolve_rev(
        &self,
        reference: &Ref,
        _allow_missing: bool,
        _cancellable: Option<&Cancellable>,
    ) -> Result<Option<Checksum>, StoreError> {
        Ok(self
            .tips
            .lock()
            .unwrap()
            .get(reference.as_str())
            .and_then(|c| Checksum::parse(c.clone()).ok()))
    }

    fn read_commit(&self, checksum: &Checksum, _cancellable: Option<&Cancellable>) -> Result<Option<Commit>, StoreError> {
        let commits = self.commits.lock().unwrap();
        Ok(commits.get(checksum.as_str()).map(|_| Commit {
            root: Box::new(Tree(checksum.as_str().to_owned())),
            info: Box::new(Info(checksum.as_str().to_owned())),
        }))
    }

    fn checkout_tree(
        &self,
        _mode: CheckoutMode,
        _overwrite: OverwriteMode,
        dest: &Path,
        commit: &Commit,
        _cancellable: Option<&Cancellable>,
    ) -> Result<(), StoreError> {
        let commits = self.commits.lock().unwrap();
        let source = commits
            .get(commit.root.id())
            .ok_or_else(|| StoreError::new(std::io::Error::new(std::io::ErrorKind::NotFound, "unknown commit")))?;

        copy_dir_recursive(source, dest).map_err(StoreError::new)?;
        Ok(())
    }

    fn prune(&self, _flags: PruneFlags, _depth: i32, _cancellable: Option<&Cancellable>) -> Result<PruneStats, StoreError> {
        Ok(PruneStats {
            objects_total: 4,
            objects_pruned: 1,
            bytes_freed: 1024,
        })
    }
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

pub struct MockFactory;

impl RepositoryFactory for MockFactory {
    type Repo = MockRepo;

    fn create(_path: &Path, _mode: RepoMode) -> Result<Self::Repo, StoreError> {
        Ok(MockRepo::new())
    }

    fn open(_path: &Path) -> Result<Self::Repo, StoreError> {
        Ok(MockRepo::new())
    }
}
