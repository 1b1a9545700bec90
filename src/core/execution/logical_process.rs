use super::config::{DispatchMode, SimulationConfig};
use crate::core::errors::{KernelError, LpSnapshot};
use crate::core::event::{Event, EventKind};
use crate::core::event_scheduler::EventQueue;
use crate::core::sync::{lock, InFlight, InFlightGuard};
use crate::core::types::{ElementId, SimTime};
use log::{debug, error, info, trace};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Executes the events a logical process dispatches.
///
/// Implementations are shared by every worker thread of the pool.
pub trait EventExecutor: Send + Sync + 'static {
    fn execute(&self, event: Event, ctx: &mut EventContext<'_>) -> Result<(), KernelError>;
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub final_time: SimTime,
    pub events_executed: u64,
    /// Events still queued past the end time
    pub events_beyond_end: usize,
}

/// State shared between the controlling thread and the workers
struct LpCore {
    mode: DispatchMode,
    end_time: SimTime,
    lvt: AtomicU64,
    queue: Mutex<EventQueue>,
    /// Events produced under buffered dispatch, merged on the next advance
    buffer: Mutex<Vec<Event>>,
    in_flight: InFlight,
    fatal: Mutex<Option<KernelError>>,
    executed: AtomicU64,
}

impl LpCore {
    fn lvt(&self) -> SimTime {
        self.lvt.load(Ordering::Acquire)
    }

    fn check_causality(&self, event_time: SimTime, lvt: SimTime) -> Result<(), KernelError> {
        if event_time < lvt {
            error!(
                "causality violation: event at {} scheduled while LVT is {}",
                event_time, lvt
            );
            return Err(KernelError::CausalityViolation { event_time, lvt });
        }
        Ok(())
    }

    /// Keep the first fatal error; later ones are logged only
    fn record_fatal(&self, err: KernelError) {
        let mut slot = lock(&self.fatal);
        match slot.as_ref() {
            None => *slot = Some(err),
            Some(first) => error!("suppressed fatal error after {}: {}", first, err),
        }
    }

    fn snapshot(&self) -> LpSnapshot {
        LpSnapshot {
            lvt: self.lvt(),
            in_flight: self.in_flight.current(),
            pending: lock(&self.queue).timestamps(),
            buffered: lock(&self.buffer).len(),
        }
    }
}

struct LpShared<X> {
    core: LpCore,
    executor: X,
}

/// Handle given to an executing event for reading the clock and producing
/// follow-on events
pub struct EventContext<'a> {
    core: &'a LpCore,
    now: SimTime,
    same_instant: Vec<Event>,
    outgoing: Vec<Event>,
}

impl<'a> EventContext<'a> {
    fn new(core: &'a LpCore, now: SimTime) -> Self {
        Self {
            core,
            now,
            same_instant: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    /// The LVT at which the current event was dispatched
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.core.mode
    }

    /// Schedule a follow-on event. Scheduling into the past is a causality
    /// violation and aborts the run once the error reaches the run loop.
    pub fn schedule(&mut self, event: Event) -> Result<(), KernelError> {
        self.core.check_causality(event.time(), self.now)?;
        match self.core.mode {
            DispatchMode::Direct if event.time() == self.now => self.same_instant.push(event),
            DispatchMode::Direct => lock(&self.core.queue).push(event),
            DispatchMode::Buffered => self.outgoing.push(event),
        }
        Ok(())
    }

    /// Schedule a flow-layer closure
    pub fn schedule_callback<F>(
        &mut self,
        time: SimTime,
        owner: Option<ElementId>,
        f: F,
    ) -> Result<(), KernelError>
    where
        F: FnOnce(&mut EventContext<'_>) -> Result<(), KernelError> + Send + 'static,
    {
        self.schedule(Event::callback(time, owner, f))
    }

    pub fn schedule_kind(
        &mut self,
        time: SimTime,
        owner: Option<ElementId>,
        kind: EventKind,
    ) -> Result<(), KernelError> {
        self.schedule(Event::new(time, owner, kind))
    }

    fn take_same_instant(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.same_instant)
    }

    fn flush(self) {
        if !self.outgoing.is_empty() {
            lock(&self.core.buffer).extend(self.outgoing);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Worker body: run one dispatched event (and, under direct dispatch, the
/// same-instant chain it produces) then leave the in-flight counter
fn execute_dispatched<X: EventExecutor>(shared: &LpShared<X>, event: Event) {
    let core = &shared.core;
    let _in_flight = InFlightGuard::adopt(&core.in_flight);
    let mut ctx = EventContext::new(core, core.lvt());
    let mut pending = VecDeque::from([event]);

    while let Some(event) = pending.pop_front() {
        let time = event.time();
        let kind = event.kind().name();
        trace!("executing {} event at {}", kind, time);

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| shared.executor.execute(event, &mut ctx)));
        core.executed.fetch_add(1, Ordering::Relaxed);

        let result = outcome.unwrap_or_else(|payload| {
            Err(KernelError::WorkerPanic {
                time,
                message: panic_message(payload.as_ref()),
            })
        });
        if let Err(err) = result {
            error!("{} event at {} failed: {}", kind, time, err);
            core.record_fatal(err);
            break;
        }
        pending.extend(ctx.take_same_instant());
    }

    ctx.flush();
}

/// A logical process: one clock, one wait-queue, one worker pool and the
/// barrier that keeps the clock still while dispatched events run
pub struct LogicalProcess<X: EventExecutor> {
    shared: Arc<LpShared<X>>,
    pool: rayon::ThreadPool,
}

impl<X: EventExecutor> LogicalProcess<X> {
    pub fn new(executor: X, config: &SimulationConfig) -> Result<Self, KernelError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|index| format!("lp-worker-{}", index));
        if let Some(size) = config.thread_pool_size {
            builder = builder.num_threads(size);
        }
        let pool = builder.build()?;

        let mut queue = EventQueue::new();
        queue.push(Event::sentinel(config.end_time));

        let core = LpCore {
            mode: config.dispatch_mode,
            end_time: config.end_time,
            lvt: AtomicU64::new(0),
            queue: Mutex::new(queue),
            buffer: Mutex::new(Vec::new()),
            in_flight: InFlight::default(),
            fatal: Mutex::new(None),
            executed: AtomicU64::new(0),
        };

        Ok(Self {
            shared: Arc::new(LpShared { core, executor }),
            pool,
        })
    }

    /// Local virtual time
    pub fn now(&self) -> SimTime {
        self.shared.core.lvt()
    }

    pub fn end_time(&self) -> SimTime {
        self.shared.core.end_time
    }

    pub fn executor(&self) -> &X {
        &self.shared.executor
    }

    pub fn in_flight(&self) -> usize {
        self.shared.core.in_flight.current()
    }

    /// Number of events in the wait-queue, sentinel included
    pub fn pending(&self) -> usize {
        lock(&self.shared.core.queue).len()
    }

    pub fn events_executed(&self) -> u64 {
        self.shared.core.executed.load(Ordering::Relaxed)
    }

    /// Schedule an event from outside the worker pool.
    ///
    /// Future events wait in the queue; an event at the current LVT is handed
    /// straight to a worker.
    pub fn schedule(&self, event: Event) -> Result<(), KernelError> {
        let lvt = self.now();
        self.shared.core.check_causality(event.time(), lvt)?;
        if event.time() == lvt {
            self.dispatch(event);
        } else {
            lock(&self.shared.core.queue).push(event);
        }
        Ok(())
    }

    /// Block until no dispatched event is running
    pub fn wait_idle(&self) {
        self.shared.core.in_flight.wait_idle();
    }

    fn dispatch(&self, event: Event) {
        if event.is_sentinel() {
            trace!("sentinel reached at {}", event.time());
            return;
        }
        self.shared.core.in_flight.enter();
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || execute_dispatched(&shared, event));
    }

    /// Move the clock to the next timestamp and dispatch every event due then.
    ///
    /// Must only be called while no event is in flight.
    pub fn advance(&self) -> Result<SimTime, KernelError> {
        let core = &self.shared.core;
        let (next, batch) = {
            let mut queue = lock(&core.queue);
            let buffered = std::mem::take(&mut *lock(&core.buffer));
            for event in buffered {
                queue.push(event);
            }

            let lvt = core.lvt();
            let next = queue
                .peek_next_time()
                .ok_or(KernelError::QueueExhausted { lvt })?;
            core.check_causality(next, lvt)?;
            core.lvt.store(next, Ordering::Release);
            (next, queue.pop_next_time())
        };

        debug!("LVT advanced to {} with {} event(s)", next, batch.len());
        for event in batch {
            self.dispatch(event);
        }
        Ok(next)
    }

    fn abort(&self, cause: KernelError) -> KernelError {
        let snapshot = self.shared.core.snapshot();
        error!(
            "run aborted at LVT {} ({} in flight, {} pending, {} buffered): {}",
            snapshot.lvt,
            snapshot.in_flight,
            snapshot.pending.len(),
            snapshot.buffered,
            cause
        );
        KernelError::Aborted {
            source: Box::new(cause),
            snapshot,
        }
    }

    /// Run until the end time, then shut the worker pool down
    pub fn run(self) -> Result<RunSummary, KernelError> {
        let run_id = Uuid::new_v4();
        let core = &self.shared.core;
        info!(
            "run {} starting: end time {}, {:?} dispatch, {} worker(s)",
            run_id,
            core.end_time,
            core.mode,
            self.pool.current_num_threads()
        );

        loop {
            core.in_flight.wait_idle();
            let fatal = lock(&core.fatal).take();
            if let Some(err) = fatal {
                return Err(self.abort(err));
            }
            if core.lvt() >= core.end_time {
                break;
            }
            if let Err(err) = self.advance() {
                core.in_flight.wait_idle();
                return Err(self.abort(err));
            }
        }
        core.in_flight.wait_idle();

        let summary = RunSummary {
            run_id,
            final_time: core.lvt(),
            events_executed: core.executed.load(Ordering::Relaxed),
            events_beyond_end: lock(&core.queue).len() + lock(&core.buffer).len(),
        };
        info!(
            "run {} finished at {} after {} event(s)",
            summary.run_id, summary.final_time, summary.events_executed
        );
        Ok(summary)
    }
}
