//! Capacity-ranked view over the host's workers.
//!
//! Capacity is polled, never reserved. Another consumer on the same host can
//! take capacity between a query here and the launch that follows it; the
//! launch then fails and dispatch moves on to the next worker.

use hackbatch_core::config::PoolConfig;

use crate::host::{Host, WorkerNode};

/// Usable capacity of one worker, home capped at its configured share.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCapacity {
    pub name: String,
    /// Capacity this worker could ever offer.
    pub usable: f64,
    /// Capacity free right now.
    pub available: f64,
    pub cores: u32,
}

impl WorkerCapacity {
    /// Whole threads of `unit_cost` that fit right now.
    pub fn threads_fitting(&self, unit_cost: f64) -> u32 {
        if unit_cost <= 0.0 {
            return u32::MAX;
        }
        (self.available / unit_cost).floor().min(u32::MAX as f64) as u32
    }
}

/// Theoretical bounds of the pool, ignoring current usage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoolCapacity {
    pub total: f64,
    pub largest: f64,
    pub available: f64,
}

pub struct WorkerPool<'a, H: ?Sized> {
    host: &'a H,
    config: &'a PoolConfig,
}

impl<'a, H: Host + ?Sized> WorkerPool<'a, H> {
    pub fn new(host: &'a H, config: &'a PoolConfig) -> Self {
        Self { host, config }
    }

    fn capacity_of(&self, node: WorkerNode) -> WorkerCapacity {
        let usable = if node.name == self.config.home_name {
            node.total_capacity * self.config.home_max_fraction.clamp(0.0, 1.0)
        } else {
            node.total_capacity
        };
        WorkerCapacity {
            available: (usable - node.used_capacity).max(0.0),
            usable: usable.max(0.0),
            name: node.name,
            cores: node.cores,
        }
    }

    /// Workers by available capacity, largest first. Ties go by name.
    pub fn ranked(&self) -> Vec<WorkerCapacity> {
        let mut workers: Vec<WorkerCapacity> = self
            .host
            .worker_nodes()
            .into_iter()
            .map(|node| self.capacity_of(node))
            .collect();
        workers.sort_by(|a, b| {
            b.available
                .total_cmp(&a.available)
                .then_with(|| a.name.cmp(&b.name))
        });
        workers
    }

    pub fn capacity(&self) -> PoolCapacity {
        self.host
            .worker_nodes()
            .into_iter()
            .map(|node| self.capacity_of(node))
            .fold(PoolCapacity::default(), |acc, w| PoolCapacity {
                total: acc.total + w.usable,
                largest: acc.largest.max(w.usable),
                available: acc.available + w.available,
            })
    }
}
