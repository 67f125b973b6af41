//! Shard state tracking
//!
//! Tracks health and counters of the shards owned by this process.

use crate::topology::ShardRange;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Health status for a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardHealth {
    /// Shard is connecting
    Connecting,
    /// Shard is ready and receiving events
    Ready,
    /// Shard is resuming after disconnect
    Resuming,
    /// Shard is disconnected
    Disconnected,
    /// Shard encountered a fatal error
    Dead,
}

impl ShardHealth {
    /// Returns true if the shard is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, ShardHealth::Ready | ShardHealth::Resuming)
    }

    /// Returns true if the shard is ready to receive events
    pub fn is_ready(&self) -> bool {
        matches!(self, ShardHealth::Ready)
    }
}

/// State for a single shard
#[derive(Debug)]
pub struct ShardStateEntry {
    pub health: ShardHealth,
    pub guilds: u64,
    pub events_received: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub dispatch_failures: AtomicU64,
    pub last_heartbeat: Option<Instant>,
    pub connected_at: Option<Instant>,
}

impl Default for ShardStateEntry {
    fn default() -> Self {
        Self {
            health: ShardHealth::Connecting,
            guilds: 0,
            events_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            last_heartbeat: None,
            connected_at: None,
        }
    }
}

/// Shared state across all shards of this process
#[derive(Debug, Clone)]
pub struct ShardState {
    inner: Arc<ShardStateInner>,
}

#[derive(Debug)]
struct ShardStateInner {
    range: ShardRange,
    total_shards: u32,
    shards: DashMap<u64, ShardStateEntry>,
}

impl ShardState {
    /// Create a tracker with one entry per shard in `range`
    pub fn new(range: ShardRange, total_shards: u32) -> Self {
        let shards = DashMap::new();
        for shard_id in range.indices() {
            shards.insert(u64::from(shard_id), ShardStateEntry::default());
        }

        Self {
            inner: Arc::new(ShardStateInner {
                range,
                total_shards,
                shards,
            }),
        }
    }

    /// Shard indices owned by this process
    pub fn range(&self) -> ShardRange {
        self.inner.range
    }

    /// Total shards across every process
    pub fn total_shards(&self) -> u32 {
        self.inner.total_shards
    }

    /// Update shard health
    pub fn set_health(&self, shard_id: u64, health: ShardHealth) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.health = health;
            if health == ShardHealth::Ready && entry.connected_at.is_none() {
                entry.connected_at = Some(Instant::now());
            }
        }
    }

    /// Update shard guild count
    pub fn set_guilds(&self, shard_id: u64, count: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.guilds = count;
        }
    }

    /// Adjust one shard's guild count by a signed delta
    pub fn adjust_guilds(&self, shard_id: u64, delta: i64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.guilds = entry.guilds.saturating_add_signed(delta);
        }
    }

    pub fn record_event(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.events_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an event handed to at least one handler
    pub fn record_dispatch(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.events_dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dispatch_failure(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_heartbeat(&self, shard_id: u64) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.last_heartbeat = Some(Instant::now());
        }
    }

    pub fn get_health(&self, shard_id: u64) -> Option<ShardHealth> {
        self.inner.shards.get(&shard_id).map(|e| e.health)
    }

    pub fn total_events_received(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.events_received.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_events_dispatched(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.events_dispatched.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_guilds(&self) -> u64 {
        self.inner.shards.iter().map(|e| e.guilds).sum()
    }

    pub fn ready_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.health.is_ready())
            .count()
    }

    pub fn healthy_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.health.is_healthy())
            .count()
    }

    /// Shards owned by this process
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// At least one shard ready
    pub fn is_ready(&self) -> bool {
        self.ready_shards() > 0
    }

    /// Every shard ready or resuming
    pub fn is_healthy(&self) -> bool {
        self.healthy_shards() == self.shard_count()
    }
}
