//! In-memory host: a simulated network with a virtual clock.
//!
//! Launched scripts are held as in-flight entries. A script first sleeps
//! its start delay, then measures its duration against the target as it is
//! at that moment. Sleeping advances the clock and replays every start and
//! landing that falls inside the window in time order. A landing releases
//! the worker's capacity and folds the effect into the target with the same
//! transition the planner uses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use hackbatch_core::config::ScriptConfig;
use hackbatch_core::target::DEFAULT_MAX_SECURITY;
use hackbatch_core::{Actor, Formulas, OperationKind, StandardFormulas, TargetState};
use serde::{Deserialize, Serialize};

use crate::host::{Host, HostError, LaunchHandle, LaunchRequest, WorkerNode};

// ── Network description ───────────────────────────────────────────────────────

/// JSON description of a simulated network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    pub actor: Actor,
    /// Capacity per thread for any script without an explicit cost.
    pub unit_cost: f64,
    /// Per-script capacity overrides.
    pub script_costs: HashMap<String, f64>,
    pub workers: Vec<WorkerSpec>,
    pub targets: Vec<TargetState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    pub capacity: f64,
    #[serde(default)]
    pub used: f64,
    #[serde(default = "one")]
    pub cores: u32,
}

fn one() -> u32 {
    1
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            actor: Actor {
                name: "home".to_string(),
                skill: 100,
                cores: 1,
            },
            unit_cost: 1.75,
            script_costs: HashMap::new(),
            workers: Vec::new(),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
}

impl NetworkSpec {
    pub fn load(path: &Path) -> Result<Self, NetworkError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| NetworkError::ReadFailed(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| NetworkError::ParseFailed(path.to_path_buf(), e))
    }

    /// A small early-game network: home, two purchased servers, a few
    /// rooted nodes, and three targets.
    pub fn demo() -> Self {
        let worker = |name: &str, capacity: f64, cores: u32| WorkerSpec {
            name: name.to_string(),
            capacity,
            used: 0.0,
            cores,
        };
        let target = |name: &str, min: f64, security: f64, max: f64, resource: f64, growth: f64| {
            TargetState {
                name: name.to_string(),
                security,
                min_security: min,
                resource,
                max_resource: max,
                growth,
            }
        };

        let mut script_costs = HashMap::new();
        script_costs.insert(ScriptConfig::default().hack, 1.7);

        Self {
            actor: Actor {
                name: "home".to_string(),
                skill: 120,
                cores: 2,
            },
            unit_cost: 1.75,
            script_costs,
            workers: vec![
                worker("home", 128.0, 2),
                worker("pserv-0", 64.0, 1),
                worker("pserv-1", 64.0, 1),
                worker("n00dles", 4.0, 1),
                worker("foodnstuff", 16.0, 1),
                worker("sigma-cosmetics", 16.0, 1),
                worker("joesguns", 16.0, 1),
            ],
            targets: vec![
                target("n00dles", 1.0, 1.0, 1_750_000.0, 70_000.0, 3000.0),
                target("foodnstuff", 3.0, 10.0, 50_000_000.0, 2_000_000.0, 5.0),
                target("joesguns", 5.0, 15.0, 62_500_000.0, 2_500_000.0, 20.0),
            ],
        }
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimServer {
    capacity: f64,
    used: f64,
    cores: u32,
    target: Option<TargetState>,
}

#[derive(Debug, Clone)]
struct InFlight {
    worker: String,
    target: String,
    kind: OperationKind,
    threads: u32,
    cost: f64,
    cores: u32,
    start_at: f64,
    /// Known once the start delay has elapsed.
    end_at: Option<f64>,
}

impl InFlight {
    fn next_event(&self) -> f64 {
        self.end_at.unwrap_or(self.start_at)
    }
}

/// A launch the host accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRecord {
    pub handle: LaunchHandle,
    pub request: LaunchRequest,
    pub kind: OperationKind,
    /// Clock at launch.
    pub at_ms: f64,
}

pub struct SimHost {
    servers: DashMap<String, SimServer>,
    inflight: DashMap<u64, InFlight>,
    failing: DashSet<String>,
    clock: Mutex<f64>,
    launches: Mutex<Vec<LaunchRecord>>,
    completed: AtomicU64,
    next_pid: AtomicU64,
    actor: Actor,
    unit_cost: f64,
    script_costs: HashMap<String, f64>,
    formulas: Arc<dyn Formulas>,
    scripts: ScriptConfig,
    time_scale: f64,
    max_security: f64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Attach `state` to its node, creating a zero-capacity node if needed.
fn place_target(servers: &DashMap<String, SimServer>, state: TargetState) {
    let name = state.name.clone();
    let mut server = servers.entry(name).or_insert_with(|| SimServer {
        capacity: 0.0,
        used: 0.0,
        cores: 1,
        target: None,
    });
    server.target = Some(state);
}

impl SimHost {
    pub fn from_network(spec: NetworkSpec) -> Self {
        let servers = DashMap::new();
        for w in spec.workers {
            servers.insert(
                w.name,
                SimServer {
                    capacity: w.capacity,
                    used: w.used,
                    cores: w.cores,
                    target: None,
                },
            );
        }
        for t in spec.targets {
            place_target(&servers, t);
        }

        Self {
            servers,
            inflight: DashMap::new(),
            failing: DashSet::new(),
            clock: Mutex::new(0.0),
            launches: Mutex::new(Vec::new()),
            completed: AtomicU64::new(0),
            next_pid: AtomicU64::new(1),
            actor: spec.actor,
            unit_cost: spec.unit_cost,
            script_costs: spec.script_costs,
            formulas: Arc::new(StandardFormulas),
            scripts: ScriptConfig::default(),
            time_scale: 0.0,
            max_security: DEFAULT_MAX_SECURITY,
        }
    }

    pub fn with_formulas(mut self, formulas: Arc<dyn Formulas>) -> Self {
        self.formulas = formulas;
        self
    }

    pub fn with_scripts(mut self, scripts: ScriptConfig) -> Self {
        self.scripts = scripts;
        self
    }

    /// Also sleep `ms * time_scale` of real time on every [`Host::sleep`].
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    pub fn with_max_security(mut self, max_security: f64) -> Self {
        self.max_security = max_security;
        self
    }

    /// Advance the virtual clock and settle everything that has landed.
    pub fn advance(&self, ms: f64) {
        let now = {
            let mut clock = lock(&self.clock);
            *clock += ms.max(0.0);
            *clock
        };
        self.settle(now);
    }

    fn settle(&self, now: f64) {
        loop {
            let next = self
                .inflight
                .iter()
                .map(|e| (e.next_event(), *e.key()))
                .filter(|(at, _)| *at <= now)
                .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let Some((at, pid)) = next else {
                break;
            };

            let started = self.inflight.get(&pid).map(|e| e.end_at.is_some());
            match started {
                Some(false) => self.start(pid, at),
                Some(true) => {
                    if let Some((_, job)) = self.inflight.remove(&pid) {
                        self.complete(pid, job);
                    }
                }
                None => {}
            }
        }
    }

    fn start(&self, pid: u64, at: f64) {
        let Some((kind, target)) = self.inflight.get(&pid).map(|e| (e.kind, e.target.clone()))
        else {
            return;
        };
        // A target that vanished mid-flight lands immediately with no effect.
        let duration = self
            .target_state(&target)
            .map(|state| self.formulas.duration(kind, &state, &self.actor))
            .unwrap_or(0.0);
        if let Some(mut job) = self.inflight.get_mut(&pid) {
            job.end_at = Some(at + duration.max(0.0));
        }
    }

    /// Clock time at which `handle` lands, once its start delay has elapsed.
    pub fn landing_time(&self, handle: LaunchHandle) -> Option<f64> {
        self.inflight.get(&handle.0).and_then(|e| e.end_at)
    }

    fn complete(&self, pid: u64, job: InFlight) {
        if let Some(mut worker) = self.servers.get_mut(&job.worker) {
            worker.used = (worker.used - job.cost).max(0.0);
        }

        let actor = Actor {
            cores: job.cores,
            ..self.actor.clone()
        };
        if let Some(mut server) = self.servers.get_mut(&job.target) {
            if let Some(state) = server.target.as_mut() {
                *state = state.applied(
                    job.kind,
                    job.threads,
                    self.formulas.as_ref(),
                    &actor,
                    self.max_security,
                );
                tracing::trace!(
                    pid,
                    kind = %job.kind,
                    threads = job.threads,
                    target_node = %job.target,
                    security = state.security,
                    resource = state.resource,
                    "sim operation landed"
                );
            }
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Refuse every launch on `worker` from now on.
    pub fn fail_launches_on(&self, worker: &str) {
        self.failing.insert(worker.to_string());
    }

    /// Occupy capacity on a worker as an outside consumer would.
    pub fn set_used(&self, worker: &str, used: f64) -> Result<(), HostError> {
        let mut server = self
            .servers
            .get_mut(worker)
            .ok_or_else(|| HostError::UnknownWorker(worker.to_string()))?;
        server.used = used.max(0.0);
        Ok(())
    }

    pub fn set_target(&self, state: TargetState) {
        place_target(&self.servers, state);
    }

    /// Every accepted launch, in launch order.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        lock(&self.launches).clone()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl Host for SimHost {
    fn worker_nodes(&self) -> Vec<WorkerNode> {
        let mut nodes: Vec<WorkerNode> = self
            .servers
            .iter()
            .filter(|s| s.capacity > 0.0)
            .map(|s| WorkerNode {
                name: s.key().clone(),
                total_capacity: s.capacity,
                used_capacity: s.used,
                cores: s.cores,
            })
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    fn target_state(&self, name: &str) -> Result<TargetState, HostError> {
        self.servers
            .get(name)
            .and_then(|s| s.target.clone())
            .ok_or_else(|| HostError::UnknownTarget(name.to_string()))
    }

    fn actor(&self) -> Actor {
        self.actor.clone()
    }

    fn unit_cost(&self, script: &str) -> f64 {
        self.script_costs
            .get(script)
            .copied()
            .unwrap_or(self.unit_cost)
    }

    fn launch(&self, request: &LaunchRequest) -> Option<LaunchHandle> {
        if request.threads == 0 || self.failing.contains(&request.worker) {
            return None;
        }
        let kind = OperationKind::from_script(&self.scripts, &request.script)?;
        self.target_state(&request.target).ok()?;
        let cost = self.unit_cost(&request.script) * request.threads as f64;
        let now = self.now_ms();

        let cores = {
            let mut worker = self.servers.get_mut(&request.worker)?;
            if worker.capacity - worker.used + 1e-9 < cost {
                return None;
            }
            worker.used += cost;
            worker.cores
        };

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        self.inflight.insert(
            pid,
            InFlight {
                worker: request.worker.clone(),
                target: request.target.clone(),
                kind,
                threads: request.threads,
                cost,
                cores,
                start_at: now + request.delay_ms.max(0.0),
                end_at: None,
            },
        );
        lock(&self.launches).push(LaunchRecord {
            handle: LaunchHandle(pid),
            request: request.clone(),
            kind,
            at_ms: now,
        });
        self.settle(now);
        Some(LaunchHandle(pid))
    }

    fn now_ms(&self) -> f64 {
        *lock(&self.clock)
    }

    fn sleep(&self, ms: f64) -> impl std::future::Future<Output = ()> + Send {
        async move {
            if self.time_scale > 0.0 && ms.is_finite() && ms > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(ms * self.time_scale / 1000.0)).await;
            } else {
                tokio::task::yield_now().await;
            }
            self.advance(ms);
        }
    }
}
