//! Two-pool job scheduler with per-thread time accounting.
//!
//! One CPU pool and an optional IO pool share a single accounting table. Only the thread
//! that built the [`Scheduler`] may wait on it. A failing or panicking job stops its pool:
//! later calls return the first failure instead of silently dropping work.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use log::{error, info};

use crate::error::PoolError;

pub type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Cpu,
    Io,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Cpu => write!(f, "cpu"),
            PoolKind::Io => write!(f, "io"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Master,
    Cpu,
    Io,
}

pub const THREAD_KINDS: usize = 3;

/// Categories of time a thread can be charged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeKind {
    MasterIdle,
    CpuIdle,
    IoIdle,
    Midsolve,
}

pub const TIME_KINDS: usize = 4;

impl TimeKind {
    pub const ALL: [TimeKind; TIME_KINDS] =
        [TimeKind::MasterIdle, TimeKind::CpuIdle, TimeKind::IoIdle, TimeKind::Midsolve];

    pub fn name(self) -> &'static str {
        match self {
            TimeKind::MasterIdle => "master-idle",
            TimeKind::CpuIdle => "cpu-idle",
            TimeKind::IoIdle => "io-idle",
            TimeKind::Midsolve => "midsolve",
        }
    }
}

// A poisoned lock only means some job panicked; the state it guards stays consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct TimeEntry {
    total: f64,
    local: f64,
    /// Set while a timer of this kind is running
    start: Option<Instant>,
}

struct TimeTable {
    kind: ThreadKind,
    entries: [TimeEntry; TIME_KINDS],
    missing: f64,
}

struct Timing {
    tables: Mutex<Vec<Arc<Mutex<TimeTable>>>>,
    local_start: Mutex<Instant>,
}

impl Timing {
    fn new() -> Self {
        Self { tables: Mutex::new(Vec::new()), local_start: Mutex::new(Instant::now()) }
    }

    /// Give the calling thread its own accounting table.
    fn register(&self, kind: ThreadKind) {
        let table = Arc::new(Mutex::new(TimeTable {
            kind,
            entries: Default::default(),
            missing: 0.0,
        }));
        lock(&self.tables).push(Arc::clone(&table));
        TIME_TABLE.with(|t| *t.borrow_mut() = Some(table));
    }
}

thread_local! {
    static TIME_TABLE: RefCell<Option<Arc<Mutex<TimeTable>>>> = const { RefCell::new(None) };
}

/// Charges the time until drop to `kind` on the current thread.
///
/// Does nothing on threads that no scheduler has registered. Timers of the same kind
/// must not nest.
pub struct ThreadTime {
    table: Option<Arc<Mutex<TimeTable>>>,
    kind: TimeKind,
}

impl ThreadTime {
    pub fn new(kind: TimeKind) -> Self {
        let table = TIME_TABLE.with(|t| t.borrow().clone());
        if let Some(table) = &table {
            lock(table).entries[kind as usize].start = Some(Instant::now());
        }
        Self { table, kind }
    }
}

impl Drop for ThreadTime {
    fn drop(&mut self) {
        if let Some(table) = &self.table {
            let now = Instant::now();
            let mut table = lock(table);
            let entry = &mut table.entries[self.kind as usize];
            if let Some(start) = entry.start.take() {
                entry.local += (now - start).as_secs_f64();
            }
        }
    }
}

/// Seconds charged to each time kind, plus the unaccounted time of each thread kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeReport {
    pub kinds: [f64; TIME_KINDS],
    pub missing: [f64; THREAD_KINDS],
}

impl TimeReport {
    pub fn get(&self, kind: TimeKind) -> f64 {
        self.kinds[kind as usize]
    }
}

impl fmt::Display for TimeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in TimeKind::ALL {
            writeln!(f, "{:>12} {:10.4} s", kind.name(), self.get(kind))?;
        }
        for (name, missing) in ["master", "cpu", "io"].iter().zip(self.missing) {
            writeln!(f, "{:>12} {:10.4} s", format!("{name}-missing"), missing)?;
        }
        Ok(())
    }
}

struct PoolState {
    jobs: VecDeque<Job>,
    /// First failure, returned from every later call
    error: Option<PoolError>,
    waiting: usize,
    die: bool,
}

struct Pool {
    kind: PoolKind,
    count: usize,
    state: Mutex<PoolState>,
    /// Signalled when a worker goes idle or the pool stops
    master_cond: Condvar,
    /// Signalled when a job arrives or the pool stops
    worker_cond: Condvar,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

impl Pool {
    fn idle(&self, state: &PoolState) -> bool {
        state.jobs.is_empty() && state.waiting == self.count
    }

    fn check(state: &PoolState) -> Result<(), PoolError> {
        match &state.error {
            Some(e) => Err(e.clone()),
            None if state.die => Err(PoolError::ShutDown),
            None => Ok(()),
        }
    }

    fn schedule(&self, job: Job, soon: bool) -> Result<(), PoolError> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        if soon {
            state.jobs.push_front(job);
        } else {
            state.jobs.push_back(job);
        }
        if state.waiting > 0 {
            self.worker_cond.notify_one();
        }
        Ok(())
    }

    fn wait(&self) -> Result<(), PoolError> {
        let _time = ThreadTime::new(TimeKind::MasterIdle);
        let mut state = lock(&self.state);
        while !state.die && !self.idle(&state) {
            state = self.master_cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        Self::check(&state)
    }

    fn worker(&self, timing: &Timing) {
        let (thread_kind, idle) = match self.kind {
            PoolKind::Cpu => (ThreadKind::Cpu, TimeKind::CpuIdle),
            PoolKind::Io => (ThreadKind::Io, TimeKind::IoIdle),
        };
        timing.register(thread_kind);
        loop {
            let job = {
                let _time = ThreadTime::new(idle);
                let mut state = lock(&self.state);
                loop {
                    if state.die {
                        return;
                    }
                    if let Some(job) = state.jobs.pop_front() {
                        break job;
                    }
                    state.waiting += 1;
                    self.master_cond.notify_all();
                    state = self.worker_cond.wait(state).unwrap_or_else(PoisonError::into_inner);
                    state.waiting -= 1;
                }
            };

            let message = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => panic_message(&*payload),
            };
            error!("{} job failed: {}", self.kind, message);
            let mut state = lock(&self.state);
            if state.error.is_none() {
                state.error = Some(PoolError::Job { pool: self.kind, message });
            }
            state.die = true;
            self.master_cond.notify_all();
            self.worker_cond.notify_all();
            return;
        }
    }
}

struct PoolHandle {
    pool: Arc<Pool>,
    threads: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    fn start(kind: PoolKind, count: usize, timing: &Arc<Timing>) -> Result<Self, PoolError> {
        let pool = Arc::new(Pool {
            kind,
            count,
            state: Mutex::new(PoolState {
                jobs: VecDeque::new(),
                error: None,
                waiting: 0,
                die: false,
            }),
            master_cond: Condvar::new(),
            worker_cond: Condvar::new(),
        });
        let mut handle = PoolHandle { pool, threads: Vec::with_capacity(count) };
        for id in 0..count {
            let pool = Arc::clone(&handle.pool);
            let timing = Arc::clone(timing);
            let spawned = thread::Builder::new()
                .name(format!("{kind}-worker-{id}"))
                .spawn(move || pool.worker(&timing));
            match spawned {
                Ok(thread) => handle.threads.push(thread),
                // dropping the handle stops the threads already started
                Err(e) => return Err(PoolError::Spawn(e.to_string())),
            }
        }
        info!("{kind} thread pool: threads = {count}");
        Ok(handle)
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.pool.state);
            state.die = true;
            self.pool.worker_cond.notify_all();
            self.pool.master_cond.notify_all();
        }
        for thread in self.threads.drain(..) {
            // Job panics are caught inside the worker, so join only fails on runtime bugs
            let _ = thread.join();
        }
    }
}

/// Cloneable handle for queueing work from inside jobs.
#[derive(Clone)]
pub struct Spawner {
    cpu: Arc<Pool>,
    io: Option<Arc<Pool>>,
}

impl Spawner {
    pub fn schedule<F>(&self, kind: PoolKind, job: F, soon: bool) -> Result<(), PoolError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let pool = match kind {
            PoolKind::Cpu => &self.cpu,
            PoolKind::Io => self.io.as_ref().ok_or(PoolError::NoPool(PoolKind::Io))?,
        };
        pool.schedule(Box::new(job), soon)
    }
}

pub struct Scheduler {
    master: ThreadId,
    timing: Arc<Timing>,
    cpu: PoolHandle,
    io: Option<PoolHandle>,
}

impl Scheduler {
    /// Start `cpu_threads` CPU workers (0 picks one per core) and `io_threads` IO workers
    /// (0 starts no IO pool). The calling thread becomes the master.
    pub fn new(cpu_threads: usize, io_threads: usize) -> Result<Self, PoolError> {
        let cpu_threads = if cpu_threads == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            cpu_threads
        };
        let timing = Arc::new(Timing::new());
        timing.register(ThreadKind::Master);
        let cpu = PoolHandle::start(PoolKind::Cpu, cpu_threads, &timing)?;
        let io = if io_threads > 0 {
            Some(PoolHandle::start(PoolKind::Io, io_threads, &timing)?)
        } else {
            None
        };
        Ok(Self { master: thread::current().id(), timing, cpu, io })
    }

    pub fn threads(&self, kind: PoolKind) -> usize {
        match kind {
            PoolKind::Cpu => self.cpu.pool.count,
            PoolKind::Io => self.io.as_ref().map_or(0, |io| io.pool.count),
        }
    }

    pub fn spawner(&self) -> Spawner {
        Spawner {
            cpu: Arc::clone(&self.cpu.pool),
            io: self.io.as_ref().map(|io| Arc::clone(&io.pool)),
        }
    }

    fn pool(&self, kind: PoolKind) -> Result<&Pool, PoolError> {
        match kind {
            PoolKind::Cpu => Ok(&self.cpu.pool),
            PoolKind::Io => self.io.as_ref().map(|io| &*io.pool).ok_or(PoolError::NoPool(kind)),
        }
    }

    /// Queue a job at the back, or at the front when `soon` is set.
    pub fn schedule<F>(&self, kind: PoolKind, job: F, soon: bool) -> Result<(), PoolError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.pool(kind)?.schedule(Box::new(job), soon)
    }

    fn check_master(&self) -> Result<(), PoolError> {
        if thread::current().id() != self.master {
            return Err(PoolError::NotMaster);
        }
        Ok(())
    }

    /// Block until `kind` has no queued jobs and every worker is idle.
    pub fn wait(&self, kind: PoolKind) -> Result<(), PoolError> {
        self.check_master()?;
        self.pool(kind)?.wait()
    }

    /// Block until both pools are idle at the same moment.
    ///
    /// Jobs may feed each other across pools, so one pass of waits is not enough.
    pub fn wait_all(&self) -> Result<(), PoolError> {
        self.check_master()?;
        let cpu = &self.cpu.pool;
        let Some(io) = self.io.as_ref().map(|io| &io.pool) else {
            return cpu.wait();
        };
        loop {
            cpu.wait()?;
            io.wait()?;
            let cpu_state = lock(&cpu.state);
            let io_state = lock(&io.state);
            Pool::check(&cpu_state)?;
            Pool::check(&io_state)?;
            if cpu.idle(&cpu_state) && io.idle(&io_state) {
                return Ok(());
            }
        }
    }

    /// Wait for both pools, then move every thread's accumulated time into the report
    /// and restart the local interval.
    pub fn clear_thread_times(&self) -> Result<TimeReport, PoolError> {
        self.wait_all()?;
        let tables = lock(&self.timing.tables);
        let mut local_start = lock(&self.timing.local_start);
        let now = Instant::now();
        let interval = (now - *local_start).as_secs_f64();
        let mut report = TimeReport::default();
        for table in tables.iter() {
            let mut table = lock(table);
            let mut charged = 0.0;
            for (k, entry) in table.entries.iter_mut().enumerate() {
                // Split running timers at `now`
                if let Some(start) = entry.start {
                    entry.local += (now - start).as_secs_f64();
                    entry.start = Some(now);
                }
                report.kinds[k] += entry.local;
                entry.total += entry.local;
                charged += entry.local;
                entry.local = 0.0;
            }
            let missing = (interval - charged).max(0.0);
            report.missing[table.kind as usize] += missing;
            table.missing += missing;
        }
        *local_start = now;
        Ok(report)
    }

    /// All time charged since the scheduler started.
    pub fn total_thread_times(&self) -> Result<TimeReport, PoolError> {
        self.clear_thread_times()?;
        let tables = lock(&self.timing.tables);
        let mut report = TimeReport::default();
        for table in tables.iter() {
            let table = lock(table);
            for (k, entry) in table.entries.iter().enumerate() {
                report.kinds[k] += entry.total;
            }
            report.missing[table.kind as usize] += table.missing;
        }
        Ok(report)
    }
}
