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

//! Directory Operations (§4.G): `getDirectoryHandle`, `getFileHandle`,
//! `removeEntry`, and async iteration over a directory's entries.

use crate::error::{Error, Result};
use crate::file::FileHandle;
use crate::handle::{Handle, HandleKind, PermissionMode, PermissionState};
use crate::stat::StatRecord;
use crate::sys;

/// Options controlling whether `getDirectoryHandle`/`getFileHandle` create
/// the entry if it doesn't exist (§4.G).
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub create: bool,
}

/// A handle naming a directory. Cheap to clone; carries no open resource.
#[derive(Clone)]
pub struct DirectoryHandle {
    inner: Handle,
}

impl DirectoryHandle {
    pub(crate) fn from_handle(inner: Handle) -> DirectoryHandle {
        debug_assert_eq!(inner.kind(), HandleKind::Directory);
        DirectoryHandle { inner }
    }

    pub fn as_handle(&self) -> &Handle {
        &self.inner
    }

    pub fn kind(&self) -> HandleKind {
        HandleKind::Directory
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn is_same_entry(&self, other: &DirectoryHandle) -> bool {
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

    /// §4.G `getDirectoryHandle`. With `options.create == false`, fails with
    /// `DirectoryNotFound`/`TypeMismatch` if the entry is missing or is a
    /// file; with `create == true`, creates the directory idempotently (an
    /// existing directory of the same name is accepted, an existing file is
    /// a `TypeMismatch`).
    pub async fn get_directory_handle(&self, name: &str, options: GetOptions) -> Result<DirectoryHandle> {
        let path = self.inner.path().join(name)?;
        let child = self.inner.child(HandleKind::Directory, path.clone());

        match child.stat().await {
            Ok(stat) => {
                if stat.kind != HandleKind::Directory {
                    return Err(Error::TypeMismatch);
                }
                Ok(DirectoryHandle { inner: child })
            }
            Err(Error::DirectoryNotFound(_)) | Err(Error::EntryNotFound(_)) if options.create => {
                let lease = self.inner.acquire().await?;
                let smb_path = path.to_smb_path();
                lease
                    .driver
                    .submit(move |ctx| sys::mkdir(ctx, &smb_path, 0o755))
                    .await?;
                Ok(DirectoryHandle { inner: child })
            }
            Err(err) => Err(err),
        }
    }

    /// §4.G `getFileHandle`. Mirrors `get_directory_handle`; creating makes
    /// an empty file.
    pub async fn get_file_handle(&self, name: &str, options: GetOptions) -> Result<FileHandle> {
        let path = self.inner.path().join(name)?;
        let child = self.inner.child(HandleKind::File, path.clone());

        match child.stat().await {
            Ok(stat) => {
                if stat.kind != HandleKind::File {
                    return Err(Error::TypeMismatch);
                }
                Ok(FileHandle::from_handle(child))
            }
            Err(Error::FileNotFound(_)) | Err(Error::EntryNotFound(_)) if options.create => {
                let lease = self.inner.acquire().await?;
                let smb_path = path.to_smb_path();
                let fd = lease
                    .driver
                    .submit(move |ctx| {
                        sys::open(ctx, &smb_path, libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL, 0o644)
                    })
                    .await?;
                lease.driver.submit(move |ctx| {
                    sys::close(ctx, fd);
                    Ok(())
                }).await?;
                Ok(FileHandle::from_handle(child))
            }
            Err(err) => Err(err),
        }
    }

    /// §4.G `removeEntry`. `recursive` mirrors the browser API: without it,
    /// removing a non-empty directory fails with `NotEmpty`.
    pub async fn remove_entry(&self, name: &str, recursive: bool) -> Result<()> {
        let path = self.inner.path().join(name)?;
        let child = self.inner.child(HandleKind::Directory, path.clone());
        let stat = match child.stat().await {
            Ok(stat) => stat,
            Err(Error::DirectoryNotFound(_)) | Err(Error::FileNotFound(_)) | Err(Error::EntryNotFound(_)) => {
                return Err(Error::EntryNotFound(name.to_owned()));
            }
            Err(err) => return Err(err),
        };

        match stat.kind {
            HandleKind::File => {
                let lease = self.inner.acquire().await?;
                let smb_path = path.to_smb_path();
                lease.driver.submit(move |ctx| sys::unlink(ctx, &smb_path)).await
            }
            HandleKind::Directory => {
                if recursive {
                    self.remove_directory_recursive(&child).await
                } else {
                    let lease = self.inner.acquire().await?;
                    let smb_path = path.to_smb_path();
                    lease.driver.submit(move |ctx| sys::rmdir(ctx, &smb_path)).await
                }
            }
        }
    }

    async fn remove_directory_recursive(&self, dir: &Handle) -> Result<()> {
        let dir_handle = DirectoryHandle { inner: dir.clone() };
        let mut cursor = dir_handle.entries();
        let mut children = Vec::new();
        while let Some(entry) = cursor.next().await? {
            children.push(entry);
        }
        for entry in children {
            match entry.kind {
                HandleKind::File => {
                    let lease = dir.acquire().await?;
                    let smb_path = entry.path.to_smb_path();
                    lease.driver.submit(move |ctx| sys::unlink(ctx, &smb_path)).await?;
                }
                HandleKind::Directory => {
                    let child = dir.child(HandleKind::Directory, entry.path);
                    Box::pin(self.remove_directory_recursive(&child)).await?;
                }
            }
        }
        let lease = dir.acquire().await?;
        let smb_path = dir.path().to_smb_path();
        lease.driver.submit(move |ctx| sys::rmdir(ctx, &smb_path)).await
    }

    /// §4.G async iteration entry point. Each call to
    /// [`DirectoryCursor::next`] reads one more entry from the server;
    /// the listing is not pre-materialized.
    pub fn entries(&self) -> DirectoryCursor {
        DirectoryCursor {
            dir: self.inner.clone(),
            state: CursorState::Unopened,
        }
    }
}

/// One entry yielded by [`DirectoryCursor`]: enough to build a child
/// [`Handle`] without a second `stat` round-trip for `kind`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: HandleKind,
    pub path: crate::path::PathRef,
}

enum CursorState {
    Unopened,
    Open(crate::pool::ContextLease, *mut smbclient_sys::SMBCFILE),
    Done,
}

// `*mut SMBCFILE` only ever crosses into a job run on its owning Driver
// thread (see `next`), never dereferenced from the cursor's own thread.
unsafe impl Send for CursorState {}

/// §4.G directory iterator, backing `entries`/`keys`/`values`. Opens the
/// directory lazily on the first call to `next` and closes it on `Drop` or
/// once exhausted.
pub struct DirectoryCursor {
    dir: Handle,
    state: CursorState,
}

impl DirectoryCursor {
    /// Returns the next entry, or `None` once the directory is exhausted.
    pub async fn next(&mut self) -> Result<Option<DirEntry>> {
        loop {
            match &self.state {
                CursorState::Done => return Ok(None),
                CursorState::Unopened => {
                    let lease = self.dir.acquire().await?;
                    let smb_path = self.dir.path().to_smb_path();
                    let dh = lease
                        .driver
                        .submit(move |ctx| sys::opendir(ctx, &smb_path))
                        .await?;
                    self.state = CursorState::Open(lease, dh);
                }
                CursorState::Open(lease, dh) => {
                    let driver = lease.driver.clone();
                    let dh = *dh;
                    let raw = driver.submit(move |ctx| sys::readdir(ctx, dh)).await?;
                    match raw {
                        Some(entry) => {
                            let kind = if entry.is_dir {
                                HandleKind::Directory
                            } else {
                                HandleKind::File
                            };
                            let path = self.dir.path().join(&entry.name)?;
                            return Ok(Some(DirEntry {
                                name: entry.name,
                                kind,
                                path,
                            }));
                        }
                        None => {
                            driver.submit(move |ctx| {
                                sys::closedir(ctx, dh);
                                Ok(())
                            }).await?;
                            self.state = CursorState::Done;
                        }
                    }
                }
            }
        }
    }
}

impl Drop for DirectoryCursor {
    fn drop(&mut self) {
        if let CursorState::Open(lease, dh) = &self.state {
            let dh = *dh;
            // The cursor is being dropped without exhaustion (e.g. an
            // early `break` in caller code); there's no async context
            // here to await a close, so enqueue it and move on.
            lease.driver.submit_detached(move |ctx| sys::closedir(ctx, dh));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{AuthMode, SmbEndpoint};
    use crate::pool::ContextPool;
    use std::sync::Arc;

    fn dir(path: &str) -> DirectoryHandle {
        let endpoint = Arc::new(SmbEndpoint {
            server: "host".into(),
            port: 445,
            share: "share".into(),
            auth: AuthMode::Anonymous,
        });
        DirectoryHandle {
            inner: Handle {
                pool: Arc::new(ContextPool::default()),
                endpoint,
                path: crate::path::PathRef::parse(path).unwrap(),
                kind: HandleKind::Directory,
            },
        }
    }

    #[test]
    fn name_is_last_segment() {
        assert_eq!(dir("first/comment").name(), "comment");
    }

    #[test]
    fn get_options_default_is_no_create() {
        assert!(!GetOptions::default().create);
    }
}
