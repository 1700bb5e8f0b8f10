//! Fixed-size pool of fetch units with a FIFO overflow queue and crash recovery.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use strata_cache::{Buffer, TileCache};
use tracing::{debug, trace, warn};

use crate::{
    CancellationToken, Completion, ContentFetcher, FetchError, Outcome, PoolError, RequestId,
    TileRequest,
};

/// Pool construction parameters.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of units. `0` selects the number of logical CPUs.
    pub concurrency: usize,
    /// How many times a request lost to a unit crash is resubmitted.
    pub crash_retries: u32,
    /// Thread name prefix for the units.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            crash_retries: 1,
            thread_name: "strata-fetch".to_string(),
        }
    }
}

impl PoolConfig {
    /// Concurrency with `0` resolved to the hardware parallelism.
    #[must_use]
    pub fn resolved_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            self.concurrency
        }
    }
}

/// A request owned by the pool, queued or assigned to a unit.
struct Job {
    id: RequestId,
    request: Arc<TileRequest>,
    token: CancellationToken,
    crashes: u32,
}

/// Message from the pool to one unit.
struct Assignment {
    id: RequestId,
    request: Arc<TileRequest>,
    token: CancellationToken,
}

/// Message from a unit back to the pool.
///
/// `generation` identifies the thread incarnation of the unit so reports from
/// a replaced thread are ignored.
enum UnitEvent {
    Finished {
        unit: usize,
        generation: u64,
        id: RequestId,
        outcome: Outcome,
    },
    Crashed {
        unit: usize,
        generation: u64,
    },
}

struct Unit {
    sender: Option<Sender<Assignment>>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
    job: Option<Job>,
}

/// Shared state every unit thread needs.
#[derive(Clone)]
struct UnitContext {
    fetcher: Arc<dyn ContentFetcher>,
    cache: Arc<dyn TileCache>,
    events: Sender<UnitEvent>,
    thread_name: String,
}

/// Bounded pool of fetch units.
///
/// Owned and driven by a single thread: [`dispatch`](Self::dispatch) and
/// [`cancel`](Self::cancel) issue work, [`pump`](Self::pump) collects the
/// terminal [`Completion`] of every request.
pub struct WorkerPool {
    config: PoolConfig,
    context: UnitContext,
    units: Vec<Unit>,
    queue: VecDeque<Job>,
    events: Receiver<UnitEvent>,
    /// Completions produced without a unit round trip (queued cancels).
    ready: Vec<Completion>,
    next_id: u64,
}

impl WorkerPool {
    /// Start `config.concurrency` units that fetch with `fetcher` and write
    /// successful payloads through to `cache`.
    pub fn new(
        config: PoolConfig,
        fetcher: Arc<dyn ContentFetcher>,
        cache: Arc<dyn TileCache>,
    ) -> Result<Self, PoolError> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let context = UnitContext {
            fetcher,
            cache,
            events: event_tx,
            thread_name: config.thread_name.clone(),
        };

        let count = config.resolved_concurrency();
        let mut units = Vec::with_capacity(count);
        for index in 0..count {
            let (sender, handle) = spawn_unit(index, 0, &context)?;
            units.push(Unit {
                sender: Some(sender),
                handle: Some(handle),
                generation: 0,
                job: None,
            });
        }
        debug!(units = count, "worker pool started");

        Ok(Self {
            config,
            context,
            units,
            queue: VecDeque::new(),
            events: event_rx,
            ready: Vec::new(),
            next_id: 0,
        })
    }

    /// Submit a request. It runs on the first idle unit, or waits in the
    /// overflow queue (first in, first out) until a unit frees up.
    pub fn dispatch(&mut self, request: TileRequest) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        let job = Job {
            id,
            request: Arc::new(request),
            token: CancellationToken::new(),
            crashes: 0,
        };
        match self.idle_unit() {
            Some(unit) => self.assign(unit, job),
            None => {
                trace!(%id, queued = self.queue.len() + 1, "all units busy, queueing request");
                self.queue.push_back(job);
                let mut failed = Vec::new();
                self.fail_queue_if_no_units(&mut failed);
                self.ready.extend(failed);
            }
        }
        id
    }

    /// Cancel a request.
    ///
    /// Queued requests are removed and reported as cancelled on the next
    /// pump. Running requests get their token cancelled; the unit reports the
    /// terminal completion once it notices. Returns `false` for unknown or
    /// already completed ids.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        if let Some(pos) = self.queue.iter().position(|job| job.id == id) {
            if let Some(job) = self.queue.remove(pos) {
                self.ready.push(completion(&job, Outcome::Cancelled));
            }
            return true;
        }
        match self.units.iter().filter_map(|unit| unit.job.as_ref()).find(|job| job.id == id) {
            Some(job) => {
                job.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Collect every completion available now without blocking.
    ///
    /// Each freed unit immediately picks up the oldest queued request.
    pub fn pump(&mut self) -> Vec<Completion> {
        let mut completions = std::mem::take(&mut self.ready);
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event, &mut completions);
        }
        completions
    }

    /// Like [`pump`](Self::pump), but waits up to `timeout` for the first
    /// completion when none is available yet.
    pub fn pump_timeout(&mut self, timeout: Duration) -> Vec<Completion> {
        let mut completions = std::mem::take(&mut self.ready);
        if completions.is_empty() && self.in_flight() > 0 {
            let deadline = std::time::Instant::now() + timeout;
            while completions.is_empty() {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                match self.events.recv_timeout(remaining) {
                    Ok(event) => self.handle_event(event, &mut completions),
                    Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event, &mut completions);
        }
        completions
    }

    /// Number of units.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.units.len()
    }

    /// Units currently holding an assignment.
    #[must_use]
    pub fn active(&self) -> usize {
        self.units.iter().filter(|unit| unit.job.is_some()).count()
    }

    /// Requests waiting in the overflow queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Requests that have not yet produced a completion.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.active() + self.queue.len()
    }

    /// Cancel everything and join the unit threads.
    pub fn shutdown(&mut self) {
        for job in self.queue.drain(..) {
            job.token.cancel();
        }
        for unit in &mut self.units {
            if let Some(job) = &unit.job {
                job.token.cancel();
            }
            unit.sender.take();
        }
        for unit in &mut self.units {
            if let Some(handle) = unit.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn idle_unit(&self) -> Option<usize> {
        self.units
            .iter()
            .position(|unit| unit.job.is_none() && unit.sender.is_some())
    }

    fn assign(&mut self, unit: usize, job: Job) {
        let assignment = Assignment {
            id: job.id,
            request: Arc::clone(&job.request),
            token: job.token.clone(),
        };
        let assignment = match self.send(unit, assignment) {
            Ok(()) => {
                self.units[unit].job = Some(job);
                return;
            }
            Err(assignment) => assignment,
        };

        warn!(unit, id = %job.id, "worker unit unreachable, respawning");
        if self.respawn(unit) && self.send(unit, assignment).is_ok() {
            self.units[unit].job = Some(job);
            return;
        }
        self.units[unit].sender = None;
        self.queue.push_front(job);
        let mut failed = Vec::new();
        self.fail_queue_if_no_units(&mut failed);
        self.ready.extend(failed);
    }

    fn send(&self, unit: usize, assignment: Assignment) -> Result<(), Assignment> {
        match &self.units[unit].sender {
            Some(sender) => sender.send(assignment).map_err(|err| err.into_inner()),
            None => Err(assignment),
        }
    }

    /// Replace the thread of `unit`. Returns `false` if no thread could be started.
    fn respawn(&mut self, unit: usize) -> bool {
        let generation = self.units[unit].generation + 1;
        if let Some(handle) = self.units[unit].handle.take() {
            // Unwinding threads exit right after reporting; a thread that is
            // merely unreachable has already exited.
            let _ = handle.join();
        }
        self.units[unit].generation = generation;
        match spawn_unit(unit, generation, &self.context) {
            Ok((sender, handle)) => {
                self.units[unit].sender = Some(sender);
                self.units[unit].handle = Some(handle);
                true
            }
            Err(err) => {
                warn!(unit, error = %err, "failed to respawn worker unit");
                self.units[unit].sender = None;
                false
            }
        }
    }

    /// Hand the oldest queued request to `unit`, or leave it idle.
    fn dispatch_next(&mut self, unit: usize) {
        if self.units[unit].sender.is_none() {
            return;
        }
        if let Some(job) = self.queue.pop_front() {
            self.assign(unit, job);
        }
    }

    /// With every unit gone, queued requests can never run.
    fn fail_queue_if_no_units(&mut self, completions: &mut Vec<Completion>) {
        if self.units.iter().all(|unit| unit.sender.is_none()) {
            for job in self.queue.drain(..) {
                completions.push(completion(&job, Outcome::Failed(FetchError::WorkerCrash)));
            }
        }
    }

    fn handle_event(&mut self, event: UnitEvent, completions: &mut Vec<Completion>) {
        match event {
            UnitEvent::Finished {
                unit,
                generation,
                id,
                outcome,
            } => {
                if generation != self.units[unit].generation {
                    return;
                }
                let Some(job) = self.units[unit].job.take() else {
                    return;
                };
                debug_assert_eq!(job.id, id, "unit reported a request it was not assigned");
                completions.push(completion(&job, outcome));
                self.dispatch_next(unit);
            }
            UnitEvent::Crashed { unit, generation } => {
                if generation != self.units[unit].generation {
                    return;
                }
                warn!(unit, "worker unit terminated abnormally, respawning");
                let job = self.units[unit].job.take();
                let alive = self.respawn(unit);

                match job {
                    Some(job) if job.token.is_cancelled() => {
                        completions.push(completion(&job, Outcome::Cancelled));
                    }
                    Some(mut job) if alive && job.crashes < self.config.crash_retries => {
                        job.crashes += 1;
                        debug!(id = %job.id, nonce = job.request.nonce, "resubmitting request lost to crash");
                        self.assign(unit, job);
                        return;
                    }
                    Some(job) => {
                        warn!(id = %job.id, key = %job.request.key, "request lost to repeated worker crashes");
                        completions.push(completion(&job, Outcome::Failed(FetchError::WorkerCrash)));
                    }
                    None => {}
                }
                self.dispatch_next(unit);
                self.fail_queue_if_no_units(completions);
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.units.len())
            .field("active", &self.active())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn completion(job: &Job, outcome: Outcome) -> Completion {
    Completion {
        id: job.id,
        key: job.request.key,
        nonce: job.request.nonce,
        outcome,
    }
}

/// Reports a crash if the unit thread unwinds.
struct CrashGuard {
    unit: usize,
    generation: u64,
    events: Sender<UnitEvent>,
}

impl Drop for CrashGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let _ = self.events.send(UnitEvent::Crashed {
                unit: self.unit,
                generation: self.generation,
            });
        }
    }
}

fn spawn_unit(
    index: usize,
    generation: u64,
    context: &UnitContext,
) -> Result<(Sender<Assignment>, JoinHandle<()>), PoolError> {
    let (sender, receiver) = crossbeam_channel::bounded::<Assignment>(1);
    let context = context.clone();
    let handle = std::thread::Builder::new()
        .name(format!("{}-{index}", context.thread_name))
        .spawn(move || run_unit(index, generation, &receiver, &context))
        .map_err(|source| PoolError::Spawn { unit: index, source })?;
    Ok((sender, handle))
}

fn run_unit(index: usize, generation: u64, receiver: &Receiver<Assignment>, context: &UnitContext) {
    let _guard = CrashGuard {
        unit: index,
        generation,
        events: context.events.clone(),
    };
    while let Ok(assignment) = receiver.recv() {
        let outcome = execute(&assignment, context);
        let finished = UnitEvent::Finished {
            unit: index,
            generation,
            id: assignment.id,
            outcome,
        };
        if context.events.send(finished).is_err() {
            break;
        }
    }
}

fn execute(assignment: &Assignment, context: &UnitContext) -> Outcome {
    if assignment.token.is_cancelled() {
        return Outcome::Cancelled;
    }
    if let Some(data) = cached(&assignment.request, context) {
        trace!(key = %assignment.request.key, "served from cache");
        return Outcome::Loaded(data);
    }
    match context.fetcher.fetch(&assignment.request, &assignment.token) {
        Ok(data) => {
            write_through(&assignment.request, &data, context);
            if assignment.token.is_cancelled() {
                Outcome::Cancelled
            } else {
                Outcome::Loaded(data)
            }
        }
        Err(FetchError::Cancelled) => Outcome::Cancelled,
        Err(err) => Outcome::Failed(err),
    }
}

fn cached(request: &TileRequest, context: &UnitContext) -> Option<Buffer> {
    if !request.read_cache {
        return None;
    }
    request.cache_key.as_ref().and_then(|key| context.cache.get(key))
}

fn write_through(request: &TileRequest, data: &Buffer, context: &UnitContext) {
    if let Some(key) = &request.cache_key {
        context.cache.put(key.clone(), Buffer::clone(data));
    }
}
