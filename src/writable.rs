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

//! Writable Stream (§4.I): `createWritable`'s state machine, chunked
//! writes, and the single-holder `Writer` lock.
//!
//! ```text
//!            createWritable
//!                  |
//!                  v
//!             +----------+   close()/abort()   +----------+
//!             | Writable | -------------------> |  Closed  |
//!             +----------+                      | (terminal)|
//!                  ^   |
//!        getWriter |   | releaseLock
//!                  |   v
//!             +----------+
//!             |  Locked  |  (a Writer is checked out)
//!             +----------+
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::pool::ContextLease;
use crate::sys;

/// Writes are chunked at this size (§4.I), mirroring [`crate::file::MAX_READ`]
/// for reads.
pub const MAX_WRITE: usize = 8 * 1024 * 1024;

/// §4.I `createWritable` options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateWritableOptions {
    /// If `false` (the default), the file is truncated to empty when the
    /// stream opens, matching `FileSystemCreateWritableOptions`'s default.
    pub keep_existing_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Writable,
    Closed,
}

struct Inner {
    lease: ContextLease,
    fd: *mut smbclient_sys::SMBCFILE,
    position: u64,
    state: Lifecycle,
}

// `fd` only ever crosses into a job run on its owning Driver thread.
unsafe impl Send for Inner {}

struct Shared {
    inner: Mutex<Inner>,
    locked: AtomicBool,
}

/// A handle-scoped writable byte stream (§4.I). Cloning shares the same
/// underlying open file and lock state — exactly one of the stream itself
/// or a checked-out [`Writer`] may perform operations at a time.
#[derive(Clone)]
pub struct WritableFileStream {
    shared: Arc<Shared>,
}

impl WritableFileStream {
    pub(crate) async fn open(handle: Handle, options: CreateWritableOptions) -> Result<WritableFileStream> {
        let lease = handle.acquire().await?;
        let smb_path = handle.path().to_smb_path();
        let mut flags = libc::O_WRONLY | libc::O_CREAT;
        if !options.keep_existing_data {
            flags |= libc::O_TRUNC;
        }
        let fd = lease
            .driver
            .submit(move |ctx| sys::open(ctx, &smb_path, flags, 0o644))
            .await?;

        Ok(WritableFileStream {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    lease,
                    fd,
                    position: 0,
                    state: Lifecycle::Writable,
                }),
                locked: AtomicBool::new(false),
            }),
        })
    }

    /// §4.I `write`: appends `data` at the stream's current position and
    /// advances it, chunked at [`MAX_WRITE`].
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.require_unlocked()?;
        write_locked(&self.shared, None, data).await
    }

    /// §4.I `write` with a UTF-8 string chunk.
    pub async fn write_str(&self, data: &str) -> Result<()> {
        self.write(data.as_bytes()).await
    }

    /// §4.I `write` with an explicit `{type: 'write', position, data}`
    /// chunk: writes at `position` regardless of the stream's current
    /// cursor and leaves the cursor at `position + data.len()` afterward.
    /// Bytes between the previous end of file and `position` read back as
    /// zero (relies on the server producing a sparse hole for a `pwrite`
    /// past the current end, same as a local sparse file would).
    pub async fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        self.require_unlocked()?;
        write_locked(&self.shared, Some(position), data).await
    }

    /// §4.I `seek`: moves the write cursor without touching file contents.
    pub async fn seek(&self, offset: u64) -> Result<()> {
        self.require_unlocked()?;
        seek_locked(&self.shared, offset).await
    }

    /// §4.I `truncate`.
    pub async fn truncate(&self, size: u64) -> Result<()> {
        self.require_unlocked()?;
        truncate_locked(&self.shared, size).await
    }

    /// §4.I `close`: terminal; any further operation fails with
    /// `InvalidState("WritableStream is closed")`.
    pub async fn close(&self) -> Result<()> {
        self.require_unlocked()?;
        close_locked(&self.shared).await
    }

    /// §4.I `abort`: same terminal effect as `close` on the underlying
    /// resource; `reason` is accepted for API parity but only logged, since
    /// libsmbclient has no partial-write rollback to perform.
    pub async fn abort(&self, reason: Option<&str>) -> Result<()> {
        self.require_unlocked()?;
        if let Some(reason) = reason {
            log::debug!(target: "smbfs::writable", "stream aborted: {reason}");
        }
        close_locked(&self.shared).await
    }

    /// §4.I `getWriter`: checks out exclusive access. Fails with
    /// `InvalidState("WritableStream is locked")` if already checked out.
    pub fn get_writer(&self) -> Result<Writer> {
        if self
            .shared
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::InvalidState("WritableStream is locked"));
        }
        Ok(Writer {
            shared: self.shared.clone(),
            released: false,
        })
    }

    fn require_unlocked(&self) -> Result<()> {
        if self.shared.locked.load(Ordering::SeqCst) {
            Err(Error::InvalidState("WritableStream is locked"))
        } else {
            Ok(())
        }
    }
}

/// An exclusive writer checked out from a [`WritableFileStream`] (§4.I).
/// Dropping without calling `release_lock` still releases the lock (on a
/// background best-effort basis) so a panicking caller can't wedge the
/// stream forever, but `release_lock` is the well-defined way to do it.
pub struct Writer {
    shared: Arc<Shared>,
    released: bool,
}

impl Writer {
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        write_locked(&self.shared, None, data).await
    }

    pub async fn write_str(&self, data: &str) -> Result<()> {
        self.write(data.as_bytes()).await
    }

    pub async fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        write_locked(&self.shared, Some(position), data).await
    }

    pub async fn seek(&self, offset: u64) -> Result<()> {
        seek_locked(&self.shared, offset).await
    }

    pub async fn truncate(&self, size: u64) -> Result<()> {
        truncate_locked(&self.shared, size).await
    }

    pub async fn close(mut self) -> Result<()> {
        let result = close_locked(&self.shared).await;
        self.release_lock();
        result
    }

    /// §4.I `releaseLock`: returns control to the originating
    /// [`WritableFileStream`] without closing the underlying resource.
    pub fn release_lock(&mut self) {
        if !self.released {
            self.shared.locked.store(false, Ordering::SeqCst);
            self.released = true;
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.release_lock();
    }
}

async fn write_locked(shared: &Arc<Shared>, explicit_position: Option<u64>, data: &[u8]) -> Result<()> {
    let mut inner = shared.inner.lock().await;
    if inner.state != Lifecycle::Writable {
        return Err(Error::InvalidState("WritableStream is closed"));
    }
    let fd = inner.fd;
    let mut pos = explicit_position.unwrap_or(inner.position);
    let mut offset_in_data = 0usize;
    while offset_in_data < data.len() {
        let chunk_len = (data.len() - offset_in_data).min(MAX_WRITE);
        let chunk = data[offset_in_data..offset_in_data + chunk_len].to_vec();
        let write_pos = pos;
        let n = inner
            .lease
            .driver
            .submit(move |ctx| sys::pwrite(ctx, fd, &chunk, write_pos))
            .await?;
        if n == 0 {
            break;
        }
        pos += n as u64;
        offset_in_data += n;
    }
    inner.position = pos;
    Ok(())
}

async fn seek_locked(shared: &Arc<Shared>, offset: u64) -> Result<()> {
    let mut inner = shared.inner.lock().await;
    if inner.state != Lifecycle::Writable {
        return Err(Error::InvalidState("WritableStream is closed"));
    }
    inner.position = offset;
    Ok(())
}

async fn truncate_locked(shared: &Arc<Shared>, size: u64) -> Result<()> {
    let mut inner = shared.inner.lock().await;
    if inner.state != Lifecycle::Writable {
        return Err(Error::InvalidState("WritableStream is closed"));
    }
    let fd = inner.fd;
    inner
        .lease
        .driver
        .submit(move |ctx| sys::ftruncate(ctx, fd, size))
        .await?;
    // Always land the cursor at the new end: this both satisfies the
    // clamp-down rule (cursor > n => cursor = n) and, when growing, moves
    // the cursor past the zero-filled gap so a following write lands right
    // after it rather than re-overwriting from the old cursor (§8 scenario
    // 4).
    inner.position = size;
    Ok(())
}

async fn close_locked(shared: &Arc<Shared>) -> Result<()> {
    let mut inner = shared.inner.lock().await;
    if inner.state != Lifecycle::Writable {
        return Err(Error::InvalidState("WritableStream is closed"));
    }
    let fd = inner.fd;
    inner
        .lease
        .driver
        .submit(move |ctx| {
            sys::close(ctx, fd);
            Ok(())
        })
        .await?;
    inner.state = Lifecycle::Closed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_error_message_matches_external_contract() {
        assert_eq!(
            Error::InvalidState("WritableStream is locked").to_string(),
            "Invalid state: WritableStream is locked"
        );
    }
}
