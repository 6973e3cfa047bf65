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

//! Handle Objects (§4.F) and the crate's entry point, [`Client`].

use std::sync::Arc;

use crate::endpoint::SmbEndpoint;
use crate::error::Result;
use crate::path::PathRef;
use crate::pool::{ContextLease, ContextPool};
use crate::stat::StatRecord;
use crate::sys;

/// Tag distinguishing a directory from a file handle (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Directory,
    File,
}

/// Result of a permission probe (§4.K).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// What permission is being asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    Read,
    ReadWrite,
}

/// Core of every handle: which entry it names. Value-like — equality and
/// `is_same_entry` both reduce to (endpoint, kind, path) per spec.md §9's
/// resolution of the isSameEntry ambiguity. Independent of any live SMB
/// open: a `Handle` can outlive deletion of the entry it names.
#[derive(Clone)]
pub struct Handle {
    pub(crate) pool: Arc<ContextPool>,
    pub(crate) endpoint: Arc<SmbEndpoint>,
    pub(crate) path: PathRef,
    pub(crate) kind: HandleKind,
}

impl Handle {
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn path(&self) -> &PathRef {
        &self.path
    }

    /// Last path segment, or the share name at the root.
    pub fn name(&self) -> &str {
        self.path.last().unwrap_or(&self.endpoint.share)
    }

    /// §4.F `isSameEntry`: same endpoint, same kind, same path. Reflexive
    /// by construction.
    pub fn is_same_entry(&self, other: &Handle) -> bool {
        self.endpoint == other.endpoint && self.kind == other.kind && self.path == other.path
    }

    /// §4.E `resolve`: if `other` is this handle's path or a descendant of
    /// it (same endpoint), returns the relative segment list.
    pub fn resolve(&self, other: &Handle) -> Option<Vec<String>> {
        if self.endpoint != other.endpoint {
            return None;
        }
        other.path.strip_prefix(&self.path)
    }

    pub async fn stat(&self) -> Result<StatRecord> {
        let lease = self.acquire().await?;
        let smb_path = self.path.to_smb_path();
        let is_dir_hint = self.kind == HandleKind::Directory;
        let raw = lease
            .driver
            .submit(move |ctx| sys::stat(ctx, &smb_path, is_dir_hint))
            .await?;
        Ok(StatRecord::from_raw(raw))
    }

    /// §4.K `queryPermission`/`requestPermission`. Read is always granted
    /// for an existing handle (we already opened the share to get here);
    /// read-write probes the entry's effective ACL without mutating it.
    pub async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        match mode {
            PermissionMode::Read => {
                // Still validate existence: a handle to a deleted entry
                // must not silently report `granted`.
                self.stat().await?;
                Ok(PermissionState::Granted)
            }
            PermissionMode::ReadWrite => self.probe_readwrite().await,
        }
    }

    /// `requestPermission` has no interactive prompt in this environment;
    /// it is defined identically to `queryPermission` (§4.K).
    pub async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.query_permission(mode).await
    }

    async fn probe_readwrite(&self) -> Result<PermissionState> {
        let lease = self.acquire().await?;
        let smb_path = self.path.to_smb_path();
        let kind = self.kind;
        let granted = lease
            .driver
            .submit(move |ctx| match kind {
                HandleKind::File => {
                    // Open read-write without create/truncate and close
                    // immediately; never touches file contents.
                    match sys::open(ctx, &smb_path, libc::O_RDWR, 0) {
                        Ok(fd) => {
                            sys::close(ctx, fd);
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                }
                HandleKind::Directory => {
                    // No direct "can I write here" query in libsmbclient;
                    // create-then-remove a probe entry with a name unlikely
                    // to collide, leaving the directory exactly as found.
                    let probe = format!("{smb_path}/.smbfs-perm-probe");
                    match sys::open(ctx, &probe, libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL, 0o600) {
                        Ok(fd) => {
                            sys::close(ctx, fd);
                            if let Err(err) = sys::unlink(ctx, &probe) {
                                log::warn!(
                                    target: "smbfs::permission",
                                    "failed to remove permission probe file {probe}: {err}"
                                );
                            }
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                }
            })
            .await?;
        Ok(if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        })
    }

    pub(crate) async fn acquire(&self) -> Result<ContextLease> {
        self.pool.acquire(&self.endpoint).await
    }

    pub(crate) fn child(&self, kind: HandleKind, path: PathRef) -> Handle {
        Handle {
            pool: self.pool.clone(),
            endpoint: self.endpoint.clone(),
            path,
            kind,
        }
    }
}

/// Entry point: connects a share URL (§6 grammar) and returns its root as a
/// directory handle.
pub struct Client {
    pool: Arc<ContextPool>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Client {
        Client {
            pool: Arc::new(ContextPool::default()),
        }
    }

    pub fn with_pool(pool: Arc<ContextPool>) -> Client {
        Client { pool }
    }

    /// Parses `url` (§6) and returns the directory handle it names. The
    /// root of a share is always a directory; a non-root path that turns
    /// out to be a file fails with `TypeMismatch`.
    pub async fn open_directory(&self, url: &str) -> Result<crate::directory::DirectoryHandle> {
        let (endpoint, path) = SmbEndpoint::parse(url)?;
        let handle = Handle {
            pool: self.pool.clone(),
            endpoint: Arc::new(endpoint),
            path,
            kind: HandleKind::Directory,
        };
        if !handle.path.is_root() {
            let stat = handle.stat().await?;
            if stat.kind != HandleKind::Directory {
                return Err(crate::error::Error::TypeMismatch);
            }
        }
        Ok(crate::directory::DirectoryHandle::from_handle(handle))
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::AuthMode;

    fn endpoint() -> Arc<SmbEndpoint> {
        Arc::new(SmbEndpoint {
            server: "host".into(),
            port: 445,
            share: "share".into(),
            auth: AuthMode::Anonymous,
        })
    }

    fn handle(kind: HandleKind, path: &str) -> Handle {
        Handle {
            pool: Arc::new(ContextPool::default()),
            endpoint: endpoint(),
            path: PathRef::parse(path).unwrap(),
            kind,
        }
    }

    #[test]
    fn is_same_entry_reflexive() {
        let h = handle(HandleKind::File, "a/b");
        assert!(h.is_same_entry(&h.clone()));
    }

    #[test]
    fn is_same_entry_requires_same_kind_and_path() {
        let a = handle(HandleKind::File, "a/b");
        let dir = handle(HandleKind::Directory, "a/b");
        let other_path = handle(HandleKind::File, "a/c");
        assert!(!a.is_same_entry(&dir));
        assert!(!a.is_same_entry(&other_path));
    }

    #[test]
    fn is_same_entry_requires_same_endpoint() {
        let a = handle(HandleKind::File, "a/b");
        let mut b = a.clone();
        b.endpoint = Arc::new(SmbEndpoint {
            server: "otherhost".into(),
            port: 445,
            share: "share".into(),
            auth: AuthMode::Anonymous,
        });
        assert!(!a.is_same_entry(&b));
    }

    #[test]
    fn resolve_returns_relative_segments() {
        let anchor = handle(HandleKind::Directory, "first");
        let cand = handle(HandleKind::Directory, "first/comment");
        assert_eq!(anchor.resolve(&cand), Some(vec!["comment".to_string()]));
    }

    #[test]
    fn resolve_none_across_unrelated_paths() {
        let anchor = handle(HandleKind::Directory, "first");
        let cand = handle(HandleKind::Directory, "quatre/points");
        assert_eq!(anchor.resolve(&cand), None);
    }
}
