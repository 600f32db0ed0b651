// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Compile-time constants describing where the runtime's fixed pieces live.

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Root of the system-wide installation.
pub const XDG_APP_SYSTEMDIR: &str = "/var/lib/xdg-app";

/// Directory scanned by [`crate::trigger::run_triggers`] for `*.trigger` files.
pub const XDG_APP_TRIGGERDIR: &str = "/usr/share/xdg-app/triggers";

/// Directory containing the sandboxed launcher, used to build `Exec=` lines.
pub const XDG_APP_BINDIR: &str = "/usr/bin";

/// Path to the trigger helper binary spawned by [`crate::trigger::run_triggers`].
pub const HELPER: &str = "/usr/lib/xdg-app/xdg-app-helper";

/// Subdirectory of the user data dir ($XDG_DATA_HOME) used for per-user installations.
pub const USER_INSTALLATION_SUBDIR: &str = "xdg-app";
