//! Shared worker pool, per-connection serial executors and the timer
//! service.
//!
//! Connection state is mutated exclusively from tasks funneled through
//! that connection's serial executor: a single-producer FIFO drained on
//! the shared pool, never by two workers at once. Different connections
//! proceed in parallel; one connection's tasks are strictly ordered.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// Fixed-size pool of worker threads fed from a shared channel.
pub(crate) struct WorkerPool {
    tx: Sender<Job>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Arc<WorkerPool> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx: Receiver<Job> = rx.clone();
            let shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("cadmium-worker-{}", i))
                .spawn(move || loop {
                    match rx.recv_timeout(Duration::from_millis(20)) {
                        Ok(job) => job(),
                        Err(RecvTimeoutError::Timeout) => {
                            if shutdown.load(Ordering::Acquire) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                })
                .expect("spawn worker thread");
            handles.push(handle);
        }

        Arc::new(WorkerPool {
            tx,
            handles: Mutex::new(handles),
            shutdown,
        })
    }

    pub fn execute(&self, job: Job) {
        // Send fails only during shutdown; jobs arriving then are dropped.
        let _ = self.tx.send(job);
    }

    /// Stop accepting progress and wait up to `drain_timeout` for workers
    /// to finish their current jobs.
    pub fn shutdown(&self, drain_timeout: Duration) {
        self.shutdown.store(true, Ordering::Release);

        let deadline = Instant::now() + drain_timeout;
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(2));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
            // Workers still busy past the deadline are detached; they
            // exit at their next channel timeout.
        }
    }
}

/// Per-connection FIFO executed on the shared pool.
///
/// At most one drain job per executor is on the pool at a time, so tasks
/// of one connection never run concurrently and run in submission order.
#[derive(Clone)]
pub(crate) struct SerialExecutor {
    inner: Arc<SerialInner>,
}

struct SerialInner {
    queue: Mutex<SerialQueue>,
    pool: Arc<WorkerPool>,
}

struct SerialQueue {
    jobs: VecDeque<Job>,
    draining: bool,
}

impl SerialExecutor {
    pub fn new(pool: Arc<WorkerPool>) -> SerialExecutor {
        SerialExecutor {
            inner: Arc::new(SerialInner {
                queue: Mutex::new(SerialQueue {
                    jobs: VecDeque::new(),
                    draining: false,
                }),
                pool,
            }),
        }
    }

    pub fn submit(&self, job: Job) {
        let inner = Arc::clone(&self.inner);

        let start_drain = {
            let mut queue = inner.queue.lock();
            queue.jobs.push_back(job);
            if queue.draining {
                false
            } else {
                queue.draining = true;
                true
            }
        };

        if start_drain {
            let drain_inner = Arc::clone(&self.inner);
            self.inner.pool.execute(Box::new(move || {
                loop {
                    let job = {
                        let mut queue = drain_inner.queue.lock();
                        match queue.jobs.pop_front() {
                            Some(job) => job,
                            None => {
                                queue.draining = false;
                                break;
                            }
                        }
                    };
                    job();
                }
            }));
        }
    }
}

/// Handle for a scheduled timer; cancellation is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// Single-threaded timer wheel: schedule a task after a delay, cancel by
/// handle. Tasks are small (they submit serial-executor jobs), so they
/// run on the timer thread itself.
pub(crate) struct TimerService {
    state: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

struct TimerShared {
    state: Mutex<TimerState>,
    condvar: Condvar,
}

struct TimerState {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, Job>,
    shutdown: bool,
}

impl TimerService {
    pub fn new() -> Arc<TimerService> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                tasks: HashMap::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("cadmium-timer".to_string())
            .spawn(move || Self::run(thread_shared))
            .expect("spawn timer thread");

        Arc::new(TimerService {
            state: shared,
            thread: Mutex::new(Some(thread)),
            next_id: AtomicU64::new(1),
        })
    }

    fn run(shared: Arc<TimerShared>) {
        let mut due: Vec<Job> = Vec::new();

        loop {
            {
                let mut state = shared.state.lock();

                loop {
                    if state.shutdown {
                        return;
                    }

                    let now = Instant::now();
                    while let Some(Reverse((at, id))) = state.heap.peek().copied() {
                        if at > now {
                            break;
                        }
                        state.heap.pop();
                        // Cancelled timers have no task entry.
                        if let Some(job) = state.tasks.remove(&id) {
                            due.push(job);
                        }
                    }

                    if !due.is_empty() {
                        break;
                    }

                    match state.heap.peek().copied() {
                        Some(Reverse((at, _))) => {
                            shared.condvar.wait_until(&mut state, at);
                        }
                        None => {
                            shared.condvar.wait(&mut state);
                        }
                    }
                }
            }

            for job in due.drain(..) {
                job();
            }
        }
    }

    pub fn schedule_after(&self, delay: Duration, job: Job) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let at = Instant::now() + delay;

        {
            let mut state = self.state.state.lock();
            state.heap.push(Reverse((at, id)));
            state.tasks.insert(id, job);
        }
        self.state.condvar.notify_one();

        TimerHandle(id)
    }

    pub fn cancel(&self, handle: TimerHandle) {
        let mut state = self.state.state.lock();
        state.tasks.remove(&handle.0);
    }

    pub fn shutdown(&self) {
        {
            let mut state = self.state.state.lock();
            state.shutdown = true;
            state.tasks.clear();
            state.heap.clear();
        }
        self.state.condvar.notify_one();

        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}
