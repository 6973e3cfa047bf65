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

//! I/O Driver (§4.C) and Request Broker (§4.D).
//!
//! `libsmbclient`'s `SMBCCTX` is not thread-safe: every call touching it
//! must come from one thread. Rather than pump `smb2_service` over a poll
//! loop the way the spec's reference `libsmb2` binding does, this Driver
//! runs a single OS thread per context that drains a FIFO queue of boxed
//! jobs, each a blocking call into `sys.rs` plus a oneshot sender that
//! fulfils the caller's future. This preserves every invariant the spec
//! cares about — one thread owns the context, submissions are FIFO,
//! dropping a future before its completion arrives just discards the
//! result (the "tombstone" in spec.md §4.C) — without requiring a
//! poll-driven backend.

use std::thread::JoinHandle;

use smbclient_sys::SMBCCTX;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce(*mut SMBCCTX) + Send + 'static>;

/// Handle to a running Driver thread for one context. Cloning is cheap
/// (just the channel sender); the thread itself is joined on `shutdown`.
#[derive(Clone)]
pub struct Driver {
    tx: mpsc::UnboundedSender<Job>,
}

impl Driver {
    /// Spawns the dedicated thread for a context. `init` runs on the new
    /// thread itself and produces the context to own (this is where
    /// `connect_share` happens, per spec.md §4.B — connecting must run on
    /// the thread that will subsequently own the context); its result is
    /// reported back through the returned future. `destroy` runs on the
    /// same thread once the job queue is drained, after `init` succeeded.
    ///
    /// On `init` failure the thread exits immediately without calling
    /// `destroy` — spec.md §4.B: "partially initialized contexts are never
    /// exposed".
    pub async fn spawn<I, D>(init: I, destroy: D) -> (Result<Driver>, Option<JoinHandle<()>>)
    where
        I: FnOnce() -> Result<*mut SMBCCTX> + Send + 'static,
        D: FnOnce(*mut SMBCCTX) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let join = std::thread::Builder::new()
            .name("smbfs-driver".into())
            .spawn(move || {
                let mut rx = rx;
                let ctx = match init() {
                    Ok(ctx) => {
                        let _ = ready_tx.send(Ok(()));
                        ctx
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                log::debug!(target: "smbfs::driver", "driver thread started");
                while let Some(job) = rx.blocking_recv() {
                    job(ctx);
                }
                log::debug!(target: "smbfs::driver", "driver queue drained, destroying context");
                destroy(ctx);
            })
            .expect("failed to spawn smbfs driver thread");

        match ready_rx.await {
            Ok(Ok(())) => (Ok(Driver { tx }), Some(join)),
            Ok(Err(err)) => {
                let _ = join.join();
                (Err(err), None)
            }
            Err(_) => (
                Err(Error::ConnectFailed("driver thread died during init".into())),
                None,
            ),
        }
    }

    /// Submits a blocking operation to be run on the Driver thread and
    /// returns a future that resolves with its result. If the returned
    /// future is dropped before the Driver gets to it, the job still runs
    /// (it cannot be recalled once queued) but its result is silently
    /// discarded — the tombstone behavior spec.md §4.C requires.
    pub async fn submit<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(*mut SMBCCTX) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx| {
            let result = f(ctx);
            // Ignore the send failure: it only happens when the awaiting
            // future was dropped, which is exactly the cancellation case
            // this is meant to tolerate silently.
            let _ = done_tx.send(result);
        });

        self.tx
            .send(job)
            .map_err(|_| Error::IoError("driver thread is no longer running".into()))?;

        match done_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Enqueues a job without waiting for it to run or reporting its
    /// result. For `Drop` impls that need to release a server-side
    /// resource (closing a file or directory handle) but cannot `.await`
    /// from a synchronous context. Silently does nothing if the Driver
    /// thread is already gone.
    pub fn submit_detached<F>(&self, f: F)
    where
        F: FnOnce(*mut SMBCCTX) + Send + 'static,
    {
        let _ = self.tx.send(Box::new(f));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a `Driver` around a channel whose receiving end is discarded,
    /// for tests elsewhere in the crate that need a `Driver`-shaped value
    /// but never actually submit a job to it (e.g. `pool.rs`'s refcount
    /// bookkeeping tests).
    pub(crate) fn fake() -> Driver {
        let (tx, _rx) = mpsc::unbounded_channel::<Job>();
        Driver { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_fifo_order() {
        let (driver, join) = Driver::spawn(|| Ok(std::ptr::null_mut()), |_| {}).await;
        let driver = driver.unwrap();
        let join = join.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for expected in 0..10 {
            let counter = counter.clone();
            let got = driver
                .submit(move |_ctx| {
                    let prev = counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(prev)
                })
                .await
                .unwrap();
            assert_eq!(got, expected);
        }

        drop(driver);
        join.join().unwrap();
    }

    #[tokio::test]
    async fn dropped_future_does_not_panic_driver() {
        let (driver, join) = Driver::spawn(|| Ok(std::ptr::null_mut()), |_| {}).await;
        let driver = driver.unwrap();
        let join = join.unwrap();
        let fut = driver.submit(|_ctx| Ok::<_, Error>(42));
        drop(fut);

        // The driver must still be alive and answer subsequent requests.
        let got = driver.submit(|_ctx| Ok::<_, Error>(7)).await.unwrap();
        assert_eq!(got, 7);

        drop(driver);
        join.join().unwrap();
    }

    #[tokio::test]
    async fn init_failure_is_reported_and_thread_exits() {
        let (driver, join) = Driver::spawn(
            || Err::<*mut SMBCCTX, _>(Error::ConnectFailed("boom".into())),
            |_| {},
        )
        .await;
        assert!(driver.is_err());
        assert!(join.is_none());
    }
}
