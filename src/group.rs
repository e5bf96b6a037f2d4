//! # Process Group Runtime
//!
//! The benchmark core only ever talks to its peers through the [`Collective`]
//! trait: rank and size queries, a blocking barrier, a split-phase
//! synchronization (post now, wait later) and scalar reductions. Any runtime
//! that can provide those calls can host the benchmarks.
//!
//! [`ThreadGroup`] is the runtime shipped with the crate. Each rank is a
//! dedicated OS thread, optionally pinned to its own CPU core, and all
//! collectives are built on one generation-counting barrier:
//!
//! - `sync_post` registers the caller's arrival and returns immediately with
//!   the generation it arrived in.
//! - `sync_wait` blocks until that generation has been completed by every
//!   rank.
//! - A reduction writes the caller's value into its slot of one of two slot
//!   banks, synchronizes once, then copies every slot into the caller-owned
//!   [`ReduceScratch`]. Consecutive reductions alternate banks, so a fast rank
//!   can never overwrite a slot a slow rank has not read yet.
//!
//! ## Ordering Contract
//!
//! The n-th collective call on one rank pairs with the n-th collective call on
//! every other rank. Callers must therefore issue the same collectives in the
//! same order on every rank. There are no timeouts: a rank that skips a call
//! stalls the whole group. A rank that fails (returns an error or panics)
//! aborts the group, which wakes every blocked peer with
//! [`GroupError::Aborted`].

use crate::error::{BenchError, GroupError};
use anyhow::Result;
use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Scalar reduction operators offered by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    Min,
    Max,
    Sum,
}

impl ReduceOp {
    /// Neutral element of the operator.
    pub fn identity(self) -> f64 {
        match self {
            ReduceOp::Min => f64::INFINITY,
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::Sum => 0.0,
        }
    }

    /// Combine two values. NaN on either side yields NaN.
    pub fn combine(self, a: f64, b: f64) -> f64 {
        if a.is_nan() || b.is_nan() {
            return f64::NAN;
        }
        match self {
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::Sum => a + b,
        }
    }

    /// Fold a full set of per-rank values.
    pub fn fold(self, values: &[f64]) -> f64 {
        values
            .iter()
            .fold(self.identity(), |acc, &value| self.combine(acc, value))
    }
}

/// Caller-owned work buffer for reductions, one entry per rank.
///
/// Allocate once per group with [`ReduceScratch::new`] and pass it to every
/// reduction; the buffer is reused across calls.
#[derive(Debug, Clone)]
pub struct ReduceScratch {
    values: Vec<f64>,
}

impl ReduceScratch {
    pub fn new(group_size: usize) -> Self {
        Self {
            values: vec![0.0; group_size],
        }
    }

    /// The per-rank values gathered by the most recent reduction.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ticket for an outstanding split-phase synchronization.
#[must_use = "a posted synchronization must be completed with sync_wait"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncHandle {
    generation: u64,
}

impl SyncHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Collective operations available to one member of a process group.
pub trait Collective {
    /// This member's rank in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of members in the group.
    fn size(&self) -> usize;

    /// Complete outstanding memory effects, then synchronize the group.
    fn barrier(&self) -> Result<(), GroupError>;

    /// Start a group synchronization without blocking.
    fn sync_post(&self) -> Result<SyncHandle, GroupError>;

    /// Block until a posted synchronization has completed on every member.
    fn sync_wait(&self, handle: SyncHandle) -> Result<(), GroupError>;

    /// Blocking group synchronization.
    fn sync_all(&self) -> Result<(), GroupError> {
        let handle = self.sync_post()?;
        self.sync_wait(handle)
    }

    /// Contribute `value` and receive every member's value in rank order.
    fn all_gather(&self, value: f64, scratch: &mut ReduceScratch) -> Result<(), GroupError>;

    /// Combine one value per member with `op`; every member gets the result.
    fn reduce(
        &self,
        op: ReduceOp,
        value: f64,
        scratch: &mut ReduceScratch,
    ) -> Result<f64, GroupError> {
        self.all_gather(value, scratch)?;
        Ok(op.fold(scratch.values()))
    }
}

/// Whether this member is the one that renders reports.
pub fn is_reporting_rank<G: Collective + ?Sized>(group: &G) -> bool {
    group.rank() == 0
}

#[derive(Debug)]
struct SyncState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// State shared by every member of one [`ThreadGroup`] launch.
struct Shared {
    size: usize,
    state: Mutex<SyncState>,
    released: Condvar,
    banks: [Vec<CachePadded<AtomicU64>>; 2],
}

impl Shared {
    fn new(size: usize) -> Self {
        let bank = || -> Vec<CachePadded<AtomicU64>> {
            (0..size)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect()
        };
        Self {
            size,
            state: Mutex::new(SyncState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            released: Condvar::new(),
            banks: [bank(), bank()],
        }
    }

    fn arrive(&self, rank: usize) -> Result<u64, GroupError> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(GroupError::Aborted { rank });
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
        }
        Ok(generation)
    }

    fn wait_for(&self, rank: usize, generation: u64) -> Result<(), GroupError> {
        let mut state = self.state.lock();
        while state.generation == generation {
            if state.aborted {
                return Err(GroupError::Aborted { rank });
            }
            self.released.wait(&mut state);
        }
        Ok(())
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        if !state.aborted {
            state.aborted = true;
            self.released.notify_all();
        }
    }
}

/// Aborts the group if the owning rank unwinds.
struct AbortOnPanic<'a>(&'a Shared);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

/// One rank's view of a [`ThreadGroup`].
pub struct GroupMember {
    rank: usize,
    shared: Arc<Shared>,
    reductions: Cell<u64>,
    pending: Cell<Option<u64>>,
}

impl GroupMember {
    fn new(rank: usize, shared: Arc<Shared>) -> Self {
        Self {
            rank,
            shared,
            reductions: Cell::new(0),
            pending: Cell::new(None),
        }
    }
}

impl Collective for GroupMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<(), GroupError> {
        fence(Ordering::SeqCst);
        self.sync_all()
    }

    fn sync_post(&self) -> Result<SyncHandle, GroupError> {
        if self.pending.get().is_some() {
            return Err(GroupError::SyncInProgress { rank: self.rank });
        }
        let generation = self.shared.arrive(self.rank)?;
        self.pending.set(Some(generation));
        Ok(SyncHandle { generation })
    }

    fn sync_wait(&self, handle: SyncHandle) -> Result<(), GroupError> {
        self.shared.wait_for(self.rank, handle.generation)?;
        self.pending.set(None);
        Ok(())
    }

    fn all_gather(&self, value: f64, scratch: &mut ReduceScratch) -> Result<(), GroupError> {
        let round = self.reductions.get();
        self.reductions.set(round + 1);
        let bank = &self.shared.banks[(round % 2) as usize];

        bank[self.rank].store(value.to_bits(), Ordering::Release);
        self.sync_all()?;

        if scratch.len() != self.shared.size {
            scratch.values.resize(self.shared.size, 0.0);
        }
        for (dst, slot) in scratch.values.iter_mut().zip(bank.iter()) {
            *dst = f64::from_bits(slot.load(Ordering::Acquire));
        }
        Ok(())
    }
}

/// Launch options for [`ThreadGroup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Pin rank `r` to CPU core `r % cores`.
    pub pin_cores: bool,
}

/// Thread-backed process group runtime.
///
/// `launch` is the whole `init()/finalize()` bracket: it starts one rank per
/// thread, runs `body` on each, waits for all of them and returns their
/// outputs in rank order.
pub struct ThreadGroup;

impl ThreadGroup {
    pub fn launch<T, F>(size: usize, options: LaunchOptions, body: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&GroupMember) -> Result<T> + Sync,
    {
        if size == 0 {
            return Err(BenchError::InvalidGroupSize(size).into());
        }

        let cores = num_cpus::get();
        if size > cores {
            warn!(
                "Group size {} exceeds the {} available CPU cores; synchronization latency will include scheduler delays",
                size, cores
            );
        }

        info!("Launching process group with {} ranks", size);
        let shared = Arc::new(Shared::new(size));
        let body = &body;

        let outcomes: Vec<Result<T>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            let mut spawn_failure = None;

            for rank in 0..size {
                let rank_shared = Arc::clone(&shared);
                let spawned = thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(scope, move || {
                        let _guard = AbortOnPanic(&rank_shared);
                        if options.pin_cores {
                            pin_to_core(rank);
                        }
                        let member = GroupMember::new(rank, Arc::clone(&rank_shared));
                        let result = body(&member);
                        if result.is_err() {
                            rank_shared.abort();
                        }
                        result
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        spawn_failure = Some(abort_on_spawn_failure(&shared, rank, source));
                        break;
                    }
                }
            }

            let mut outcomes: Vec<Result<T>> = handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(GroupError::RankPanicked { rank }.into()),
                })
                .collect();
            if let Some(failure) = spawn_failure {
                outcomes.push(Err(failure.into()));
            }
            outcomes
        });

        let mut outputs = Vec::with_capacity(size);
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(value) => outputs.push(value),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            debug!("All {} ranks finished", size);
            return Ok(outputs);
        }

        // Report the failure that caused the abort rather than a peer's
        // wake-up error.
        let root = errors
            .iter()
            .position(|e| !is_abort(e))
            .unwrap_or(0);
        Err(errors.swap_remove(root))
    }
}

/// Wake every rank already blocked in a collective and describe the failure.
fn abort_on_spawn_failure(shared: &Shared, rank: usize, source: std::io::Error) -> GroupError {
    warn!("Failed to spawn rank {}: {}", rank, source);
    shared.abort();
    GroupError::Spawn { rank, source }
}

fn is_abort(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<GroupError>(),
        Some(GroupError::Aborted { .. })
    ) || matches!(
        error.downcast_ref::<BenchError>(),
        Some(BenchError::Group(GroupError::Aborted { .. }))
    )
}

fn pin_to_core(rank: usize) {
    match core_affinity::get_core_ids() {
        Some(ids) if !ids.is_empty() => {
            let core = ids[rank % ids.len()];
            if core_affinity::set_for_current(core) {
                debug!("Pinned rank {} to core {}", rank, core.id);
            } else {
                warn!("Failed to pin rank {} to core {}", rank, core.id);
            }
        }
        _ => warn!("Unable to query CPU cores; rank {} is not pinned", rank),
    }
}
