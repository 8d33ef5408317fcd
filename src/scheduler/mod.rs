//! The scheduler (C6): a directed graph of steps exchanging chunks over a
//! fixed-size worker pool, honouring per-step ordered/parallel discipline
//! and propagating EOF to a topologically-consistent `finalize()`.

pub mod step_ids;

use crate::chunk::Chunk;
use crate::error::{ReadCleanError, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A step that must see its inputs in producer-emit order and run them one
/// at a time (read/demultiplex/compress/split/write).
pub trait OrderedStep: Send {
    fn name(&self) -> &'static str;
    fn process(&mut self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>>;
    fn finalize(&mut self) -> Result<Vec<(usize, Chunk)>> {
        Ok(Vec::new())
    }
}

/// A step safe under unboundedly many concurrent invocations, with no
/// per-instance state carried across calls (reads processor, adaptive
/// split-compressor).
pub trait ParallelStep: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>>;
    fn finalize(&self) -> Result<Vec<(usize, Chunk)>> {
        Ok(Vec::new())
    }
}

enum StepHandle {
    Ordered(Mutex<Box<dyn OrderedStep>>),
    Parallel(Box<dyn ParallelStep>),
}

impl StepHandle {
    fn is_ordered(&self) -> bool {
        matches!(self, StepHandle::Ordered(_))
    }

    fn name(&self) -> &'static str {
        match self {
            StepHandle::Ordered(step) => step.lock().expect("step mutex poisoned").name(),
            StepHandle::Parallel(step) => step.name(),
        }
    }

    fn process(&self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        match self {
            // The guard lock here is defensive: the dispatcher already
            // guarantees at most one in-flight chunk per ordered step.
            StepHandle::Ordered(step) => step.lock().expect("step mutex poisoned").process(chunk),
            StepHandle::Parallel(step) => step.process(chunk),
        }
    }

    fn finalize(&self) -> Result<Vec<(usize, Chunk)>> {
        match self {
            StepHandle::Ordered(step) => step.lock().expect("step mutex poisoned").finalize(),
            StepHandle::Parallel(step) => step.finalize(),
        }
    }
}

#[derive(Default)]
struct ReorderState {
    next_expected: u64,
    pending:       BTreeMap<u64, Chunk>,
}

/// Buffers a `ParallelStep`'s results by the arrival sequence of the input
/// chunk that produced them, so they are handed to `route` in the order the
/// step originally received them rather than the order workers finished
/// processing them.
#[derive(Default)]
struct ParallelReorderState {
    next_expected: u64,
    pending:       BTreeMap<u64, Vec<(usize, Chunk)>>,
}

struct SharedState {
    ready:            Mutex<VecDeque<(usize, Chunk)>>,
    cv:               Condvar,
    reorder:          Mutex<HashMap<usize, ReorderState>>,
    parallel_reorder: Mutex<HashMap<usize, ParallelReorderState>>,
    next_seq_out:     Mutex<HashMap<usize, u64>>,
    eof_received:     Mutex<HashMap<usize, usize>>,
    terminated:       Mutex<HashSet<usize>>,
    error:            Mutex<Option<ReadCleanError>>,
    outstanding:      Mutex<i64>,
    shutting_down:    AtomicBool,
}

impl SharedState {
    fn record_error(&self, err: ReadCleanError) {
        let mut slot = self.error.lock().expect("error mutex poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
        self.shutting_down.store(true, Ordering::SeqCst);
        self.cv.notify_all();
    }
}

/// Executes a registered directed graph of [`OrderedStep`]s and
/// [`ParallelStep`]s.
pub struct Scheduler {
    steps:          HashMap<usize, StepHandle>,
    producer_count: HashMap<usize, usize>,
    source_step:    usize,
}

impl Scheduler {
    pub fn new(source_step: usize) -> Self {
        Scheduler {
            steps: HashMap::new(),
            producer_count: HashMap::new(),
            source_step,
        }
    }

    /// Registers an ordered step. `producers` is the number of distinct
    /// upstream step ids that will feed it an EOF chunk before it can
    /// finalize (almost always 1 in this pipeline's tree-shaped graph).
    pub fn add_ordered_step(&mut self, step_id: usize, step: Box<dyn OrderedStep>, producers: usize) {
        self.steps.insert(step_id, StepHandle::Ordered(Mutex::new(step)));
        self.producer_count.insert(step_id, producers.max(1));
    }

    /// Registers a parallel step.
    pub fn add_parallel_step(&mut self, step_id: usize, step: Box<dyn ParallelStep>, producers: usize) {
        self.steps.insert(step_id, StepHandle::Parallel(step));
        self.producer_count.insert(step_id, producers.max(1));
    }

    /// Runs the graph to completion with a fixed pool of `max_threads`
    /// workers. Returns `Ok(())` on success; the first captured step error
    /// otherwise.
    pub fn run(self, max_threads: usize) -> Result<()> {
        let shared = Arc::new(SharedState {
            ready:            Mutex::new(VecDeque::new()),
            cv:               Condvar::new(),
            reorder:          Mutex::new(HashMap::new()),
            parallel_reorder: Mutex::new(HashMap::new()),
            next_seq_out:     Mutex::new(HashMap::new()),
            eof_received:     Mutex::new(HashMap::new()),
            terminated:       Mutex::new(HashSet::new()),
            error:            Mutex::new(None),
            outstanding:      Mutex::new(0),
            shutting_down:    AtomicBool::new(false),
        });
        let steps = Arc::new(self.steps);
        let producer_count = Arc::new(self.producer_count);

        // Seed the ready queue with a synthetic empty chunk routed to the
        // unique source step.
        submit(&shared, &steps, self.source_step, crate::chunk::ReadChunk::default().into(), 0);

        let max_threads = max_threads.max(1);
        let mut handles = Vec::with_capacity(max_threads);
        for _ in 0..max_threads {
            let shared = Arc::clone(&shared);
            let steps = Arc::clone(&steps);
            let producer_count = Arc::clone(&producer_count);
            handles.push(std::thread::spawn(move || worker_loop(shared, steps, producer_count)));
        }

        for handle in handles {
            let _ = handle.join();
        }

        let error = shared.error.lock().expect("error mutex poisoned").take();
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn worker_loop(shared: Arc<SharedState>, steps: Arc<HashMap<usize, StepHandle>>, producer_count: Arc<HashMap<usize, usize>>) {
    loop {
        let item = {
            let mut queue = shared.ready.lock().expect("ready mutex poisoned");
            loop {
                if shared.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(item) = queue.pop_front() {
                    break item;
                }
                if *shared.outstanding.lock().expect("outstanding mutex poisoned") == 0 {
                    shared.cv.notify_all();
                    return;
                }
                queue = shared.cv.wait(queue).expect("condvar wait poisoned");
            }
        };

        let (step_id, chunk) = item;
        let is_eof = chunk.is_eof();
        let arrival_seq = chunk.arrival_seq();
        let Some(handle) = steps.get(&step_id) else {
            shared.record_error(ReadCleanError::internal(format!("no step registered for id {step_id}")));
            continue;
        };
        let is_ordered = handle.is_ordered();

        let result = handle.process(chunk);
        let mut children = match result {
            Ok(children) => children,
            Err(err) => {
                shared.record_error(err);
                continue;
            }
        };

        if is_ordered {
            advance_ordered(&shared, &steps, &producer_count, step_id);
        }

        if is_eof {
            let terminated_now = {
                let mut received = shared.eof_received.lock().expect("eof mutex poisoned");
                let count = received.entry(step_id).or_insert(0);
                *count += 1;
                let required = *producer_count.get(&step_id).unwrap_or(&1);
                *count >= required
            };

            if terminated_now {
                let mut terminated = shared.terminated.lock().expect("terminated mutex poisoned");
                if terminated.insert(step_id) {
                    drop(terminated);
                    match handle.finalize() {
                        Ok(mut extra) => children.append(&mut extra),
                        Err(err) => {
                            shared.record_error(err);
                            continue;
                        }
                    }
                }
            }
        }

        if is_ordered {
            // This step only ever has one invocation in flight, gated by
            // `advance_ordered` above, so its own emission order already
            // matches its input order.
            route(&shared, &steps, children);
        } else {
            // Multiple workers may run this step concurrently and finish in
            // any order; replay its results in the order their input
            // chunks originally arrived before routing them onward.
            advance_parallel(&shared, &steps, step_id, arrival_seq, children);
        }

        let mut outstanding = shared.outstanding.lock().expect("outstanding mutex poisoned");
        *outstanding -= 1;
        let finished = *outstanding == 0;
        drop(outstanding);
        if finished {
            shared.cv.notify_all();
        }
    }
}

/// Releases the next pending chunk(s) for an ordered step once its current
/// in-flight invocation has completed.
fn advance_ordered(shared: &Arc<SharedState>, steps: &Arc<HashMap<usize, StepHandle>>, _producer_count: &Arc<HashMap<usize, usize>>, step_id: usize) {
    let mut reorder = shared.reorder.lock().expect("reorder mutex poisoned");
    let Some(state) = reorder.get_mut(&step_id) else {
        return;
    };
    state.next_expected += 1;

    let mut released = Vec::new();
    while let Some(chunk) = state.pending.remove(&state.next_expected) {
        released.push(chunk);
        state.next_expected += 1;
    }
    drop(reorder);

    if released.is_empty() {
        return;
    }

    // Each released chunk was already counted in `outstanding` when it was
    // first submitted; moving it from `pending` to `ready` is not a new
    // submission and must not increment the counter again.
    let mut queue = shared.ready.lock().expect("ready mutex poisoned");
    for chunk in released {
        queue.push_back((step_id, chunk));
    }
    drop(queue);
    shared.cv.notify_all();
    let _ = steps;
}

/// Buffers one `ParallelStep` invocation's results at `seq` (the arrival
/// order of the input chunk that produced them) and releases any now-
/// contiguous run of results to `route`, in order. `seq` values for a given
/// `step_id` are assigned once, in order, at the single ordered producer
/// that feeds it (see `submit`), so they are gap-free from this step's
/// point of view.
fn advance_parallel(shared: &Arc<SharedState>, steps: &Arc<HashMap<usize, StepHandle>>, step_id: usize, seq: u64, children: Vec<(usize, Chunk)>) {
    let mut ready = Vec::new();
    {
        let mut reorder = shared.parallel_reorder.lock().expect("parallel reorder mutex poisoned");
        let state = reorder.entry(step_id).or_default();
        state.pending.insert(seq, children);
        while let Some(group) = state.pending.remove(&state.next_expected) {
            ready.push(group);
            state.next_expected += 1;
        }
    }

    for group in ready {
        route(shared, steps, group);
    }
}

/// Assigns each emitted `(next_step_id, chunk)` pair a fresh sequence
/// number scoped to its destination and submits it.
fn route(shared: &Arc<SharedState>, steps: &Arc<HashMap<usize, StepHandle>>, children: Vec<(usize, Chunk)>) {
    for (next_id, chunk) in children {
        let seq = {
            let mut counters = shared.next_seq_out.lock().expect("seq mutex poisoned");
            let counter = counters.entry(next_id).or_insert(0);
            let this_seq = *counter;
            *counter += 1;
            this_seq
        };
        submit(shared, steps, next_id, chunk, seq);
    }
}

/// Submits one `(step_id, chunk)` at sequence `seq`, either dispatching it
/// directly (parallel steps, or an ordered step whose turn it is) or
/// parking it on the step's reorder buffer.
fn submit(shared: &Arc<SharedState>, steps: &Arc<HashMap<usize, StepHandle>>, step_id: usize, mut chunk: Chunk, seq: u64) {
    {
        let mut outstanding = shared.outstanding.lock().expect("outstanding mutex poisoned");
        *outstanding += 1;
    }

    let ordered = steps.get(&step_id).map(StepHandle::is_ordered).unwrap_or(false);

    if !ordered {
        // `seq` was assigned by `route` from a counter scoped to this
        // destination; since only one ordered producer ever feeds a given
        // parallel step, these values are already gap-free and in true
        // arrival order. Stamp it onto the chunk so the parallel step's
        // results can be reordered by `advance_parallel` once processed.
        chunk.set_arrival_seq(seq);
        let mut queue = shared.ready.lock().expect("ready mutex poisoned");
        queue.push_back((step_id, chunk));
        drop(queue);
        shared.cv.notify_all();
        return;
    }

    let mut reorder = shared.reorder.lock().expect("reorder mutex poisoned");
    let state = reorder.entry(step_id).or_default();

    if seq == state.next_expected {
        drop(reorder);
        let mut queue = shared.ready.lock().expect("ready mutex poisoned");
        queue.push_back((step_id, chunk));
        drop(queue);
        shared.cv.notify_all();
    } else {
        state.pending.insert(seq, chunk);
    }
}
