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

//! SMB Context Pool (§4.B, §3 "SmbContext").
//!
//! Maps [`SmbEndpoint`] to a live, refcounted [`SmbContext`]. Contexts are
//! created on first `acquire` and torn down on their own Driver thread once
//! the refcount drops to zero and `idle_ttl` elapses with no new acquire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::driver::Driver;
use crate::endpoint::SmbEndpoint;
use crate::error::Result;
use crate::sys;

/// Idle time a refcount-zero context is kept warm before teardown (§4.B).
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30);

/// A live client attached to an [`SmbEndpoint`] (§3).
pub struct SmbContext {
    pub endpoint: SmbEndpoint,
    pub driver: Driver,
}

struct PoolEntry {
    context: Arc<SmbContext>,
    refcount: usize,
    idle_since: Option<Instant>,
    generation: u64,
}

struct Inner {
    contexts: HashMap<SmbEndpoint, PoolEntry>,
    next_generation: u64,
}

/// Pool of live [`SmbContext`]s, one per distinct [`SmbEndpoint`] (§4.B).
pub struct ContextPool {
    inner: Mutex<Inner>,
    idle_ttl: Duration,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TTL)
    }
}

impl ContextPool {
    pub fn new(idle_ttl: Duration) -> Self {
        ContextPool {
            inner: Mutex::new(Inner {
                contexts: HashMap::new(),
                next_generation: 0,
            }),
            idle_ttl,
        }
    }

    /// Acquires a context for `endpoint`, reusing a live one or connecting a
    /// new one. On connect failure the context is never inserted into the
    /// map (spec.md §4.B: "partially initialized contexts are never
    /// exposed").
    pub async fn acquire(self: &Arc<Self>, endpoint: &SmbEndpoint) -> Result<ContextLease> {
        {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.contexts.get_mut(endpoint) {
                entry.refcount += 1;
                entry.idle_since = None;
                return Ok(ContextLease {
                    pool: self.clone(),
                    endpoint: endpoint.clone(),
                    generation: entry.generation,
                    context: entry.context.clone(),
                });
            }
        }

        // Connect outside the lock: connecting is slow and must not block
        // unrelated acquires on other endpoints.
        let context = connect(endpoint).await?;

        let mut inner = self.inner.lock();
        // Another caller may have raced us and already inserted a context
        // for this endpoint; prefer the existing one and let ours be
        // dropped (its Driver thread shuts itself down once its queue,
        // which never receives any job, is closed).
        if let Some(entry) = inner.contexts.get_mut(endpoint) {
            entry.refcount += 1;
            entry.idle_since = None;
            return Ok(ContextLease {
                pool: self.clone(),
                endpoint: endpoint.clone(),
                generation: entry.generation,
                context: entry.context.clone(),
            });
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.contexts.insert(
            endpoint.clone(),
            PoolEntry {
                context: context.clone(),
                refcount: 1,
                idle_since: None,
                generation,
            },
        );

        Ok(ContextLease {
            pool: self.clone(),
            endpoint: endpoint.clone(),
            generation,
            context,
        })
    }

    fn release(&self, endpoint: &SmbEndpoint, generation: u64) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.contexts.get_mut(endpoint) {
            if entry.generation != generation {
                // Already superseded/evicted; nothing to do.
                return;
            }
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                entry.idle_since = Some(Instant::now());
            }
        }
    }

    /// Drops contexts whose refcount has been zero for longer than
    /// `idle_ttl`. Intended to be driven by a background timer task (see
    /// `lib.rs`'s pool maintenance loop), but safe to call directly from
    /// tests too.
    pub fn reap_idle(&self) {
        let mut inner = self.inner.lock();
        let idle_ttl = self.idle_ttl;
        inner.contexts.retain(|endpoint, entry| {
            let expired = entry
                .idle_since
                .map(|since| since.elapsed() >= idle_ttl)
                .unwrap_or(false);
            if expired {
                log::debug!(target: "smbfs::pool", "tearing down idle context for {:?}", endpoint);
            }
            !expired
        });
    }
}

async fn connect(endpoint: &SmbEndpoint) -> Result<Arc<SmbContext>> {
    let endpoint_for_init = endpoint.clone();
    let endpoint_for_ctx = endpoint.clone();

    // `init` runs on the Driver's own thread, so `smbc_new_context` /
    // `smbc_init_context` (our `connect_share` equivalent) execute on the
    // same thread that will own the context from then on, per spec.md §4.B.
    let (driver, _join) = Driver::spawn(
        move || sys::new_context(&endpoint_for_init.auth),
        sys::destroy_context,
    )
    .await;
    let driver = driver?;

    log::debug!(target: "smbfs::pool", "connected context for {:?}", endpoint_for_ctx);

    Ok(Arc::new(SmbContext {
        endpoint: endpoint_for_ctx,
        driver,
    }))
}

/// An acquired reference to a pooled [`SmbContext`]; releases on drop.
pub struct ContextLease {
    pool: Arc<ContextPool>,
    endpoint: SmbEndpoint,
    generation: u64,
    context: Arc<SmbContext>,
}

impl std::ops::Deref for ContextLease {
    type Target = Arc<SmbContext>;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl Clone for ContextLease {
    fn clone(&self) -> Self {
        let mut inner = self.pool.inner.lock();
        if let Some(entry) = inner.contexts.get_mut(&self.endpoint) {
            if entry.generation == self.generation {
                entry.refcount += 1;
                entry.idle_since = None;
            }
        }
        ContextLease {
            pool: self.pool.clone(),
            endpoint: self.endpoint.clone(),
            generation: self.generation,
            context: self.context.clone(),
        }
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        self.pool.release(&self.endpoint, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::AuthMode;

    fn fake_endpoint(share: &str) -> SmbEndpoint {
        SmbEndpoint {
            server: "host".into(),
            port: 445,
            share: share.into(),
            auth: AuthMode::Anonymous,
        }
    }

    fn fake_context(endpoint: &SmbEndpoint) -> Arc<SmbContext> {
        // No Driver thread is actually spawned here: these tests only
        // exercise the pool's refcount/idle bookkeeping (see driver.rs for
        // Driver's own tests).
        Arc::new(SmbContext {
            endpoint: endpoint.clone(),
            driver: crate::driver::test_support::fake(),
        })
    }

    #[test]
    fn reap_idle_only_evicts_after_ttl() {
        let pool = ContextPool::new(Duration::from_millis(0));
        let endpoint = fake_endpoint("share");
        let ctx = fake_context(&endpoint);
        {
            let mut inner = pool.inner.lock();
            inner.contexts.insert(
                endpoint.clone(),
                PoolEntry {
                    context: ctx,
                    refcount: 0,
                    idle_since: Some(Instant::now() - Duration::from_secs(1)),
                    generation: 0,
                },
            );
        }
        pool.reap_idle();
        assert!(pool.inner.lock().contexts.is_empty());
    }

    #[test]
    fn reap_idle_keeps_referenced_contexts() {
        let pool = ContextPool::new(Duration::from_millis(0));
        let endpoint = fake_endpoint("share");
        let ctx = fake_context(&endpoint);
        {
            let mut inner = pool.inner.lock();
            inner.contexts.insert(
                endpoint.clone(),
                PoolEntry {
                    context: ctx,
                    refcount: 1,
                    idle_since: None,
                    generation: 0,
                },
            );
        }
        pool.reap_idle();
        assert_eq!(pool.inner.lock().contexts.len(), 1);
    }
}
