// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The external interface this crate consumes from the content-addressed object store.
//!
//! The store itself is out of scope (§1 of the design): this module only defines the
//! trait boundary so the deploy engine can be exercised against a test double. The
//! trait is kept object-safe (`Box<dyn Repository>`) so an [`crate::installation::Installation`]
//! can hold one without becoming generic over the concrete backend.

use std::{error, fmt, path::Path};

use crate::{cancel::Cancellable, checksum::Checksum, reference::Ref};

/// Checkout mode for [`Repository::checkout_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    /// Bare checkout: metadata preserved as xattrs, no ownership changes.
    None,
    /// User checkout: uid/gid/xattrs kept as metadata only, files owned by the caller.
    User,
}

/// Overwrite mode for [`Repository::checkout_tree`]. Only `None` is ever used by this
/// crate (§4.4 step 5): any collision at the destination is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteMode {
    #[default]
    None,
}

/// Mode used when creating a fresh repository (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoMode {
    Bare,
    BareUser,
}

/// Reachability used by [`Repository::prune`]. Only `RefsOnly` is used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneFlags {
    #[default]
    RefsOnly,
}

/// Result of a [`Repository::prune`] call, in the store's own argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneStats {
    pub objects_total: u64,
    pub objects_pruned: u64,
    pub bytes_freed: u64,
}

/// Opaque handle to a resolved root tree, as returned by [`Repository::read_commit`].
pub trait RootTree {
    fn id(&self) -> &str;
}

/// Opaque commit metadata, as returned by [`Repository::read_commit`].
pub trait CommitInfo {
    fn id(&self) -> &str;
}

/// A resolved commit: its root tree plus the metadata `checkout_tree` needs alongside it.
pub struct Commit {
    pub root: Box<dyn RootTree>,
    pub info: Box<dyn CommitInfo>,
}

/// Passthrough progress sink for long running pulls; forwarded as-is (§1 non-goals:
/// no progress UI is implemented here, only the callback boundary).
pub trait PullProgress {
    fn on_progress(&self, bytes_transferred: u64, bytes_total: Option<u64>);
}

/// What a [`Repository::pull`] call should fetch: a ref's current tip, or one
/// specific already-known commit id.
///
/// The original's `refs[]` array is just untyped strings, so it can hold either
/// shape (a `type/name/arch/branch` ref or a raw checksum) without distinguishing
/// them; a `Ref` can never parse from a 64-char hex checksum, so this crate needs
/// an explicit sum type at the trait boundary instead (§4.4 step 2: a checksum
/// that isn't locally readable must be pulled *by checksum*, not by re-pulling
/// the ref's tip, which may point at a different commit).
#[derive(Debug, Clone, Copy)]
pub enum PullTarget<'a> {
    Ref(&'a Ref),
    Commit(&'a Checksum),
}

/// Opaque error from the store, carrying enough context to chain into this crate's
/// own error types without the store's error type leaking through as a generic param.
#[derive(Debug)]
pub struct StoreError(Box<dyn error::Error + Send + Sync + 'static>);

impl StoreError {
    pub fn new(source: impl error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// The object store, as consumed by this crate. Implementations own everything about
/// the wire protocol, on-disk object format, and ref resolution; this crate only issues
/// the operations below and interprets their results.
///
/// Every operation takes an optional [`Cancellable`] (§5): implementations are
/// expected to poll it at their own I/O boundaries (network round-trips, object
/// reads) and abort promptly, the same cooperative contract this crate applies
/// to its own filesystem enumerations.
pub trait Repository: Send + Sync {
    fn pull(
        &self,
        remote: &str,
        targets: &[PullTarget<'_>],
        progress: Option<&dyn PullProgress>,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), StoreError>;

    fn resolve_rev(
        &self,
        reference: &Ref,
        allow_missing: bool,
        cancellable: Option<&Cancellable>,
    ) -> Result<Option<Checksum>, StoreError>;

    fn read_commit(&self, checksum: &Checksum, cancellable: Option<&Cancellable>) -> Result<Option<Commit>, StoreError>;

    fn checkout_tree(
        &self,
        mode: CheckoutMode,
        overwrite: OverwriteMode,
        dest: &Path,
        commit: &Commit,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), StoreError>;

    fn prune(&self, flags: PruneFlags, depth: i32, cancellable: Option<&Cancellable>) -> Result<PruneStats, StoreError>;
}

/// Opens or creates a repository at `path`; kept separate from the [`Repository`]
/// instance methods since it runs before one exists (mirrors `ensure_repo`, §4.1).
pub trait RepositoryFactory {
    type Repo: Repository + 'static;

    fn create(path: &Path, mode: RepoMode) -> Result<Self::Repo, StoreError>;
    fn open(path: &Path) -> Result<Self::Repo, StoreError>;
}
