// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-pool: a warm pool of pre-built agent instances so that a turn can
//! start without paying cold-start latency.
//!
//! Agents are built ahead of time by an [`AgentBuilder`] collaborator,
//! handed out via [`AgentPool::acquire`], and returned via
//! [`AgentPool::release`]. Entries are retired once they exceed
//! `max_turns_per_agent` or `max_age`. When the pool dips below
//! `warmup_threshold` of its target size, a single background warmup task
//! is spawned to replenish it; concurrent `acquire` calls never spawn more
//! than one at a time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Builds a fresh agent instance. Implemented by the runtime's concrete
/// agent-construction collaborator; `ag3nt-pool` knows nothing about what
/// an agent actually is.
#[async_trait]
pub trait AgentBuilder<A>: Send + Sync {
    async fn build(&self) -> anyhow::Result<A>;
}

/// A single pooled agent instance plus its lifetime bookkeeping.
pub struct PoolEntry<A> {
    pub agent: A,
    created_at: Instant,
    turns_executed: u32,
}

impl<A> PoolEntry<A> {
    fn new(agent: A) -> Self {
        Self {
            agent,
            created_at: Instant::now(),
            turns_executed: 0,
        }
    }

    fn is_stale(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() > max_age
    }

    fn is_exhausted(&self, max_turns: u32) -> bool {
        self.turns_executed >= max_turns
    }
}

/// Pool performance counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    pub total_acquires: u64,
    pub total_releases: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub retirements: u64,
    pub current_size: usize,
    pub warmups_started: u64,
    pub warmups_completed: u64,
}

impl PoolStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.pool_hits + self.pool_misses;
        if total == 0 {
            0.0
        } else {
            self.pool_hits as f64 / total as f64
        }
    }
}

struct PoolState<A> {
    entries: VecDeque<PoolEntry<A>>,
    warming: bool,
    shutdown: bool,
    stats: PoolStats,
}

/// Configuration knobs for [`AgentPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub max_turns_per_agent: u32,
    pub max_age: Duration,
    pub warmup_threshold: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            max_turns_per_agent: 100,
            max_age: Duration::from_secs(3600),
            warmup_threshold: 0.5,
        }
    }
}

/// A warm pool of pre-built agent instances.
pub struct AgentPool<A, B: AgentBuilder<A>> {
    config: PoolConfig,
    builder: Arc<B>,
    state: Arc<Mutex<PoolState<A>>>,
}

impl<A, B> AgentPool<A, B>
where
    A: Send + 'static,
    B: AgentBuilder<A> + Send + Sync + 'static,
{
    pub fn new(config: PoolConfig, builder: B) -> Self {
        Self {
            config,
            builder: Arc::new(builder),
            state: Arc::new(Mutex::new(PoolState {
                entries: VecDeque::new(),
                warming: false,
                shutdown: false,
                stats: PoolStats::default(),
            })),
        }
    }

    /// Pre-warm the pool by building every agent concurrently.
    pub async fn initialize(&self) {
        info!(pool_size = self.config.pool_size, "initializing agent pool");
        let start = Instant::now();

        let mut set = tokio::task::JoinSet::new();
        for i in 0..self.config.pool_size {
            let builder = self.builder.clone();
            set.spawn(async move {
                let result = builder.build().await;
                (i, result)
            });
        }

        let mut state = self.state.lock();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, Ok(agent))) => {
                    state.entries.push_back(PoolEntry::new(agent));
                    state.stats.warmups_completed += 1;
                    debug!(index = i, "warmed agent");
                }
                Ok((i, Err(err))) => error!(index = i, %err, "failed to warm agent"),
                Err(err) => error!(%err, "warmup task panicked"),
            }
        }
        state.stats.current_size = state.entries.len();
        info!(
            warmed = state.entries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "agent pool initialized"
        );
    }

    /// Acquire an agent, building one on demand if the pool is exhausted.
    pub async fn acquire(&self) -> anyhow::Result<PoolEntry<A>> {
        let mut replenish = false;
        let found = {
            let mut state = self.state.lock();
            state.stats.total_acquires += 1;

            let mut result = None;
            while let Some(entry) = state.entries.pop_front() {
                if entry.is_stale(self.config.max_age) || entry.is_exhausted(self.config.max_turns_per_agent)
                {
                    state.stats.retirements += 1;
                    continue;
                }
                result = Some(entry);
                break;
            }

            if result.is_some() {
                state.stats.pool_hits += 1;
                state.stats.current_size = state.entries.len();
                if (state.entries.len() as f64) < self.config.pool_size as f64 * self.config.warmup_threshold
                {
                    replenish = true;
                }
            } else {
                state.stats.pool_misses += 1;
            }
            result
        };

        if replenish {
            self.spawn_replenish();
        }

        match found {
            Some(entry) => Ok(entry),
            None => {
                warn!("pool exhausted, building agent on demand");
                let agent = self.builder.build().await?;
                Ok(PoolEntry::new(agent))
            }
        }
    }

    /// Return an agent to the pool, or let it fall out of scope if it
    /// should be retired.
    pub fn release(&self, mut entry: PoolEntry<A>) {
        entry.turns_executed += 1;

        let mut state = self.state.lock();
        state.stats.total_releases += 1;

        if entry.is_stale(self.config.max_age) || entry.is_exhausted(self.config.max_turns_per_agent) {
            state.stats.retirements += 1;
            return;
        }
        if state.shutdown {
            return;
        }
        if state.entries.len() < self.config.pool_size {
            state.entries.push_back(entry);
            state.stats.current_size = state.entries.len();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut state = self.state.lock();
        state.stats.current_size = state.entries.len();
        state.stats.clone()
    }

    pub fn shutdown(&self) {
        info!("shutting down agent pool");
        let mut state = self.state.lock();
        state.shutdown = true;
        state.entries.clear();
        state.stats.current_size = 0;
    }

    /// Single-flight background replenishment: `warming` is set and
    /// cleared under the pool's own lock so that concurrent `acquire`
    /// calls never spawn more than one warmup task at a time.
    fn spawn_replenish(&self) {
        let mut state = self.state.lock();
        if state.warming || state.shutdown {
            return;
        }
        state.warming = true;
        state.stats.warmups_started += 1;
        drop(state);

        let builder = self.builder.clone();
        let state = self.state.clone();
        let pool_size = self.config.pool_size;

        tokio::spawn(async move {
            let result = builder.build().await;
            let mut state = state.lock();
            match result {
                Ok(agent) if !state.shutdown && state.entries.len() < pool_size => {
                    state.entries.push_back(PoolEntry::new(agent));
                    state.stats.warmups_completed += 1;
                    state.stats.current_size = state.entries.len();
                    debug!("background warmup completed");
                }
                Ok(_) => {}
                Err(err) => error!(%err, "background warmup failed"),
            }
            state.warming = false;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingBuilder {
        built: Arc<AtomicU32>,
    }

    #[async_trait]
    impl AgentBuilder<u32> for CountingBuilder {
        async fn build(&self) -> anyhow::Result<u32> {
            Ok(self.built.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn acquire_after_initialize_is_a_pool_hit() {
        let built = Arc::new(AtomicU32::new(0));
        let pool = AgentPool::new(
            PoolConfig {
                pool_size: 2,
                ..Default::default()
            },
            CountingBuilder { built },
        );
        pool.initialize().await;

        let entry = pool.acquire().await.unwrap();
        pool.release(entry);

        let stats = pool.stats();
        assert_eq!(stats.pool_hits, 1);
        assert_eq!(stats.pool_misses, 0);
    }

    #[tokio::test]
    async fn acquire_with_empty_pool_builds_on_demand() {
        let built = Arc::new(AtomicU32::new(0));
        let pool = AgentPool::new(
            PoolConfig {
                pool_size: 1,
                ..Default::default()
            },
            CountingBuilder { built },
        );

        let entry = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().pool_misses, 1);
        pool.release(entry);
    }

    #[tokio::test]
    async fn exhausted_entry_is_retired_not_reused() {
        let built = Arc::new(AtomicU32::new(0));
        let pool = AgentPool::new(
            PoolConfig {
                pool_size: 1,
                max_turns_per_agent: 1,
                ..Default::default()
            },
            CountingBuilder { built },
        );
        pool.initialize().await;

        let entry = pool.acquire().await.unwrap();
        pool.release(entry); // turns_executed becomes 1, now exhausted

        let stats = pool.stats();
        assert_eq!(stats.retirements, 1);
        assert_eq!(stats.current_size, 0);
    }

    #[tokio::test]
    async fn shutdown_clears_pool_and_rejects_returns() {
        let built = Arc::new(AtomicU32::new(0));
        let pool = AgentPool::new(
            PoolConfig {
                pool_size: 2,
                ..Default::default()
            },
            CountingBuilder { built },
        );
        pool.initialize().await;
        pool.shutdown();
        assert_eq!(pool.stats().current_size, 0);
    }
}
