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

//! Change Notifications (§4.J).
//!
//! `libsmbclient` has no native change-notification callback reachable from
//! a blocking FFI binding the way `libsmb2`'s reference design assumes, so
//! a [`WatchSubscription`] polls a directory's immediate children on an
//! interval and diffs successive snapshots into create/write/remove
//! events. `cancel` is a real join: it signals the background task and
//! waits for it to actually stop polling before returning, so a caller
//! that cancels and immediately drops the directory handle never races a
//! poll still in flight against it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::directory::DirectoryHandle;
use crate::handle::HandleKind;
use crate::path::PathRef;

/// §4.J watch options.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathRef,
    pub kind: ChangeKind,
}

#[derive(Clone, PartialEq, Eq)]
struct Snapshot {
    kind: HandleKind,
    size: u64,
    modified_time_ms: i64,
}

/// A live subscription started by [`watch`]. Dropping it without calling
/// `cancel` still stops the background task eventually (it notices the
/// channel receiver is gone on its next send), but `cancel` is the
/// deterministic way to wait for it to be fully stopped.
pub struct WatchSubscription {
    events: mpsc::Receiver<ChangeEvent>,
    cancel: std::sync::Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl WatchSubscription {
    /// Waits for the next change event, or `None` once the subscription
    /// has been cancelled and fully drained.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Signals the background poller to stop and waits for it to actually
    /// exit before returning (§4.J: cancellation is a real join, not a
    /// fire-and-forget flag flip).
    pub async fn cancel(mut self) {
        self.cancel.notify_one();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// §4.J `watch`: begins polling `dir`'s immediate children for changes.
pub fn watch(dir: DirectoryHandle, options: WatchOptions) -> WatchSubscription {
    let (tx, rx) = mpsc::channel(64);
    let cancel = std::sync::Arc::new(Notify::new());
    let cancel_for_task = cancel.clone();

    let task = tokio::spawn(async move {
        let mut previous: Option<HashMap<String, Snapshot>> = None;
        loop {
            tokio::select! {
                _ = cancel_for_task.notified() => break,
                _ = tokio::time::sleep(options.interval) => {}
            }

            let current = match snapshot(&dir).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    log::warn!(target: "smbfs::watch", "poll failed: {err}");
                    continue;
                }
            };

            if let Some(previous) = &previous {
                for (name, entry) in &current {
                    match previous.get(name) {
                        None => {
                            if send_event(&tx, &dir, name, ChangeKind::Create).await.is_err() {
                                return;
                            }
                        }
                        Some(prev) if prev != entry => {
                            if send_event(&tx, &dir, name, ChangeKind::Write).await.is_err() {
                                return;
                            }
                        }
                        _ => {}
                    }
                }
                for name in previous.keys() {
                    if !current.contains_key(name) {
                        if send_event(&tx, &dir, name, ChangeKind::Remove).await.is_err() {
                            return;
                        }
                    }
                }
            }

            previous = Some(current);
        }
    });

    WatchSubscription {
        events: rx,
        cancel,
        task: Some(task),
    }
}

async fn send_event(
    tx: &mpsc::Sender<ChangeEvent>,
    dir: &DirectoryHandle,
    name: &str,
    kind: ChangeKind,
) -> Result<(), ()> {
    let path = match dir.as_handle().path().join(name) {
        Ok(path) => path,
        Err(_) => return Ok(()),
    };
    tx.send(ChangeEvent { path, kind }).await.map_err(|_| ())
}

async fn snapshot(dir: &DirectoryHandle) -> crate::error::Result<HashMap<String, Snapshot>> {
    let mut out = HashMap::new();
    let mut cursor = dir.entries();
    while let Some(entry) = cursor.next().await? {
        let stat = dir
            .as_handle()
            .child(entry.kind, entry.path.clone())
            .stat()
            .await?;
        out.insert(
            entry.name,
            Snapshot {
                kind: stat.kind,
                size: stat.size,
                modified_time_ms: stat.modified_time_ms,
            },
        );
    }
    Ok(out)
}
