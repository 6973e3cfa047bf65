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

//! Read path (§4.H): `FileHandle::get_file`, [`Blob`] (`arrayBuffer`/`text`/
//! `slice`/`stream`), and the chunked reader both of those build on.

use crate::error::Result;
use crate::handle::{Handle, HandleKind, PermissionMode, PermissionState};
use crate::stat::{mime_type_for_name, StatRecord};
use crate::sys;
use crate::writable::{CreateWritableOptions, WritableFileStream};

/// Reads are chunked at this size regardless of the caller's requested
/// range, bounding peak memory use per Driver round-trip (§4.H).
pub const MAX_READ: usize = 8 * 1024 * 1024;

/// A handle naming a file. Cheap to clone; carries no open resource.
#[derive(Clone)]
pub struct FileHandle {
    inner: Handle,
}

impl FileHandle {
    pub(crate) fn from_handle(inner: Handle) -> FileHandle {
        debug_assert_eq!(inner.kind(), HandleKind::File);
        FileHandle { inner }
    }

    pub fn as_handle(&self) -> &Handle {
        &self.inner
    }

    pub fn kind(&self) -> HandleKind {
        HandleKind::File
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn is_same_entry(&self, other: &FileHandle) -> bool {
        self.inner.is_same_entry(&other.inner)
    }

    pub async fn stat(&self) -> Result<StatRecord> {
        self.inner.stat().await
    }

    pub async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.query_permission(mode).await
    }

    pub async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.request_permission(mode).await
    }

    /// §4.H `getFile`: snapshots the current size and returns a [`Blob`]
    /// covering the whole file. The snapshot is taken now; bytes are only
    /// actually read from the server when a `Blob` method is called, and
    /// each such call re-reads independently (see [`Blob`]).
    pub async fn get_file(&self) -> Result<Blob> {
        let stat = self.stat().await?;
        Ok(Blob {
            handle: self.inner.clone(),
            name: self.name().to_owned(),
            offset: 0,
            length: stat.size,
        })
    }

    /// §4.I `createWritable`.
    pub async fn create_writable(&self, options: CreateWritableOptions) -> Result<WritableFileStream> {
        WritableFileStream::open(self.inner.clone(), options).await
    }
}

/// An immutable view over a byte range of a file (§4.H). Every accessor
/// (`array_buffer`, `text`, `stream`) performs its own independent
/// open/read/close against the server — a `Blob` taken before a concurrent
/// write does not see that write's bytes on one call and miss them on the
/// next; each call is a fresh, consistent snapshot at the time it runs.
#[derive(Clone)]
pub struct Blob {
    handle: Handle,
    name: String,
    offset: u64,
    length: u64,
}

impl Blob {
    pub fn size(&self) -> u64 {
        self.length
    }

    /// MIME type inferred from the originating file's name (§4.H).
    pub fn mime_type(&self) -> &'static str {
        mime_type_for_name(&self.name)
    }

    /// §4.H `slice`: a sub-range of this Blob, clamped to its bounds.
    /// `end` is exclusive, `None` meaning "to the end".
    pub fn slice(&self, start: u64, end: Option<u64>) -> Blob {
        let start = start.min(self.length);
        let end = end.unwrap_or(self.length).min(self.length).max(start);
        Blob {
            handle: self.handle.clone(),
            name: self.name.clone(),
            offset: self.offset + start,
            length: end - start,
        }
    }

    /// §4.H `arrayBuffer`: reads this Blob's full range in one call.
    pub async fn array_buffer(&self) -> Result<Vec<u8>> {
        read_range(&self.handle, self.offset, self.length).await
    }

    /// §4.H `text`: UTF-8 decodes `array_buffer`'s bytes, replacing invalid
    /// sequences rather than failing, matching the browser `Blob.text()`
    /// contract this mirrors.
    pub async fn text(&self) -> Result<String> {
        let bytes = self.array_buffer().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// §4.H `stream`: an incremental reader over this Blob's range, chunked
    /// at [`MAX_READ`].
    pub fn stream(&self) -> ByteStream {
        ByteStream {
            handle: self.handle.clone(),
            end: self.offset + self.length,
            cursor: self.offset,
            state: StreamState::Unopened,
        }
    }
}

async fn read_range(handle: &Handle, offset: u64, length: u64) -> Result<Vec<u8>> {
    if length == 0 {
        return Ok(Vec::new());
    }
    let lease = handle.acquire().await?;
    let smb_path = handle.path().to_smb_path();
    let open_path = smb_path.clone();
    let fd = lease
        .driver
        .submit(move |ctx| sys::open(ctx, &open_path, libc::O_RDONLY, 0))
        .await?;

    let mut out = Vec::with_capacity(length.min(16 * 1024 * 1024) as usize);
    let mut pos = offset;
    let mut left = length;
    let mut read_err = None;
    while left > 0 {
        let chunk_len = left.min(MAX_READ as u64) as usize;
        match lease
            .driver
            .submit(move |ctx| {
                let mut buf = vec![0u8; chunk_len];
                let n = sys::pread(ctx, fd, &mut buf, pos)?;
                Ok((n, buf))
            })
            .await
        {
            Ok((0, _)) => break,
            Ok((n, buf)) => {
                out.extend_from_slice(&buf[..n]);
                pos += n as u64;
                left -= n as u64;
            }
            Err(err) => {
                read_err = Some(err);
                break;
            }
        }
    }

    lease.driver.submit(move |ctx| {
        sys::close(ctx, fd);
        Ok(())
    }).await?;

    if let Some(err) = read_err {
        return Err(err);
    }
    Ok(out)
}

enum StreamState {
    Unopened,
    Open(crate::pool::ContextLease, *mut smbclient_sys::SMBCFILE),
    Done,
}

unsafe impl Send for StreamState {}

/// Incremental reader returned by [`Blob::stream`]. Each call to
/// [`ByteStream::next_chunk`] reads up to [`MAX_READ`] bytes.
pub struct ByteStream {
    handle: Handle,
    end: u64,
    cursor: u64,
    state: StreamState,
}

impl ByteStream {
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.cursor >= self.end {
            return Ok(None);
        }
        if matches!(self.state, StreamState::Unopened) {
            let lease = self.handle.acquire().await?;
            let smb_path = self.handle.path().to_smb_path();
            let fd = lease
                .driver
                .submit(move |ctx| sys::open(ctx, &smb_path, libc::O_RDONLY, 0))
                .await?;
            self.state = StreamState::Open(lease, fd);
        }

        let (lease, fd) = match &self.state {
            StreamState::Open(lease, fd) => (lease, *fd),
            _ => unreachable!(),
        };
        let chunk_len = (self.end - self.cursor).min(MAX_READ as u64) as usize;
        let pos = self.cursor;
        let (n, buf) = lease
            .driver
            .submit(move |ctx| {
                let mut buf = vec![0u8; chunk_len];
                let n = sys::pread(ctx, fd, &mut buf, pos)?;
                Ok((n, buf))
            })
            .await?;
        if n == 0 {
            self.close().await?;
            return Ok(None);
        }
        self.cursor += n as u64;
        let mut buf = buf;
        buf.truncate(n);
        if self.cursor >= self.end {
            self.close().await?;
        }
        Ok(Some(buf))
    }

    async fn close(&mut self) -> Result<()> {
        if let StreamState::Open(lease, fd) = std::mem::replace(&mut self.state, StreamState::Done) {
            lease.driver.submit(move |ctx| {
                sys::close(ctx, fd);
                Ok(())
            }).await?;
        }
        Ok(())
    }
}

impl Drop for ByteStream {
    fn drop(&mut self) {
        if let StreamState::Open(lease, fd) = &self.state {
            let fd = *fd;
            lease.driver.submit_detached(move |ctx| sys::close(ctx, fd));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{AuthMode, SmbEndpoint};
    use crate::pool::ContextPool;
    use std::sync::Arc;

    fn blob(length: u64) -> Blob {
        let endpoint = Arc::new(SmbEndpoint {
            server: "host".into(),
            port: 445,
            share: "share".into(),
            auth: AuthMode::Anonymous,
        });
        Blob {
            handle: Handle {
                pool: Arc::new(ContextPool::default()),
                endpoint,
                path: crate::path::PathRef::parse("annar").unwrap(),
                kind: HandleKind::File,
            },
            name: "annar".into(),
            offset: 0,
            length,
        }
    }

    #[test]
    fn slice_clamps_to_bounds() {
        let b = blob(123);
        let s = b.slice(10, Some(1000));
        assert_eq!(s.offset, 10);
        assert_eq!(s.length, 113);

        let empty = b.slice(200, Some(300));
        assert_eq!(empty.length, 0);
    }

    #[test]
    fn slice_of_slice_composes_offsets() {
        let b = blob(123);
        let s1 = b.slice(10, Some(100));
        let s2 = s1.slice(5, Some(20));
        assert_eq!(s2.offset, 15);
        assert_eq!(s2.length, 15);
    }

    #[test]
    fn mime_type_from_name() {
        let b = blob(0);
        assert_eq!(b.mime_type(), "unknown");
    }
}
