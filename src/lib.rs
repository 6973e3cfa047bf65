// smbfs-core is a library exposing a remote SMB share as a handle-oriented,
// async filesystem.
// Copyright (c) 2016 Konstantin Gribov
//
// This file is part of smbfs-core.
//
// smbfs-core is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// smbfs-core is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with smbfs-core. If not, see <http://www.gnu.org/licenses/>.

//! smbfs-core exposes a remote SMB/CIFS share as a hierarchical,
//! handle-oriented, async filesystem, mirroring the shape of the browser
//! File System Access API over a wire libsmbclient speaks instead of one a
//! sandboxed local filesystem does.
//!
//! Primary entrypoint is [`Client`]; `Client::open_directory` returns the
//! [`DirectoryHandle`] naming the path in the URL, from which every other
//! operation (traversal, reading, writing, watching, permission checks)
//! hangs off.
//!
//! Basic example:
//! ```no_run
//! # async fn run() -> smbfs_core::Result<()> {
//! let client = smbfs_core::Client::new();
//! let root = client.open_directory("smb://host/share").await?;
//! let file = root.get_file_handle("annar", Default::default()).await?;
//! let text = file.get_file().await?.text().await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

mod driver;
mod endpoint;
mod error;
mod handle;
mod path;
mod pool;
mod stat;
mod sys;

pub mod directory;
pub mod file;
pub mod watch;
pub mod writable;

pub use endpoint::{AuthMode, SmbEndpoint};
pub use error::{Error, Result};
pub use handle::{Client, Handle, HandleKind, PermissionMode, PermissionState};
pub use path::PathRef;
pub use pool::{ContextPool, DEFAULT_IDLE_TTL};
pub use stat::{mime_type_for_name, StatRecord};

pub use directory::{DirEntry, DirectoryCursor, DirectoryHandle, GetOptions};
pub use file::{Blob, ByteStream, FileHandle, MAX_READ};
pub use watch::{watch, ChangeEvent, ChangeKind, WatchOptions, WatchSubscription};
pub use writable::{CreateWritableOptions, Writer, WritableFileStream, MAX_WRITE};

use std::sync::Arc;
use std::time::Duration;

/// Spawns a background task that periodically reaps idle pooled contexts
/// (§4.B). `Client::new` does not start this on its own — callers running
/// inside a Tokio runtime should call this once per `ContextPool` they
/// intend to keep long-lived; short-lived tools that open a handful of
/// handles and exit don't need it.
pub fn spawn_idle_reaper(pool: Arc<ContextPool>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            pool.reap_idle();
        }
    })
}
