//! Worker threads and the dispatch ↔ worker handoff.
//!
//! Each worker owns one OS thread and shares exactly two things with the
//! dispatch thread: a four-value atomic state cell and a single work slot.
//! The cell is the commit point. To hand off, the dispatch thread writes
//! the slot, then swaps the cell to `Working` with release ordering; the
//! worker's acquire load of `Working` makes the slot write visible. To hand
//! back, the worker stores `Polling` (or `Postprocessing` first, for an
//! early reply) with release ordering; the dispatcher's acquire load in
//! `poll` makes the handler's writes visible.
//!
//! A worker that has seen no work for its poll budget parks in the kernel:
//! it compare-exchanges `Polling` → `Sleeping` (so a concurrent handoff
//! that already raised the cell to `Working` wins the race), then parks on
//! the cell expecting `Sleeping`. The park primitive re-checks the value
//! in the kernel, closing the remaining window; the dispatcher wakes one
//! waiter whenever its handoff swap observed `Sleeping`.

use crate::clock::DispatchClock;
use crate::parking::{ParkOutcome, StatePark};
use rsvc_core::rpc::{ReplyNotify, ServerRpc, Service, ServiceRpc};
use rsvc_core::state::WorkerState;
use rsvc_core::{rerror, rtrace};
use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const POLLING: u32 = WorkerState::Polling as u32;
const WORKING: u32 = WorkerState::Working as u32;
const SLEEPING: u32 = WorkerState::Sleeping as u32;

/// One unit of work carried through the handoff slot.
///
/// The request rides as a raw pointer (a `Box` leaked at handoff) so the
/// worker can build its handler view in place while the dispatch thread
/// retains the right to move the item out of the slot during
/// postprocessing. Whichever side takes the item out of the slot
/// reconstitutes the `Box` and owns the request from then on.
pub(crate) enum WorkItem {
    Rpc {
        rpc: *mut dyn ServerRpc,
        service: Arc<dyn Service>,
    },
    Exit,
}

// Safety: the raw pointer is a uniquely-owned heap request handed between
// the dispatch thread and one worker under the state-cell protocol below.
unsafe impl Send for WorkItem {}

impl WorkItem {
    pub(crate) fn rpc(rpc: Box<dyn ServerRpc>, service: Arc<dyn Service>) -> Self {
        WorkItem::Rpc {
            rpc: Box::into_raw(rpc),
            service,
        }
    }
}

/// State shared between the dispatch thread and one worker thread. This is
/// the only memory both sides touch.
pub(crate) struct WorkerCore {
    /// The four-value state cell; also the futex word workers park on.
    state: AtomicU32,

    /// Single-slot work cell, guarded by `state` rather than a lock.
    /// The dispatch thread touches it only while its last acquire load of
    /// `state` returned something other than `Working`; the worker only
    /// between its acquire observation of `Working` and its release store
    /// of the next state.
    slot: UnsafeCell<Option<WorkItem>>,

    clock: Arc<DispatchClock>,
    parker: Arc<dyn StatePark>,
    poll_budget_ns: u64,
}

// Safety: `slot` access alternates between the two threads as described
// above; every transfer of access rides a release/acquire edge on `state`.
unsafe impl Send for WorkerCore {}
unsafe impl Sync for WorkerCore {}

impl WorkerCore {
    fn new(clock: Arc<DispatchClock>, parker: Arc<dyn StatePark>, poll_budget_ns: u64) -> Self {
        Self {
            state: AtomicU32::new(POLLING),
            slot: UnsafeCell::new(None),
            clock,
            parker,
            poll_budget_ns,
        }
    }

    /// Current state, with acquire ordering so a subsequent `take_item`
    /// sees everything published before the state was stored.
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from(self.state.load(Ordering::Acquire))
    }

    /// Dispatch-thread side of the handoff. The worker must be in
    /// `Polling` or `Sleeping`.
    pub(crate) fn handoff(&self, item: WorkItem) {
        // The worker is not reading the slot in either eligible state.
        unsafe {
            let slot = &mut *self.slot.get();
            debug_assert!(slot.is_none(), "handoff into an occupied slot");
            *slot = Some(item);
        }
        // Release publishes the slot write; `Working` commits the transfer.
        let prev = self.state.swap(WORKING, Ordering::AcqRel);
        debug_assert!(
            WorkerState::from(prev).accepts_handoff(),
            "handoff to a worker in state {}",
            WorkerState::from(prev)
        );
        if prev == SLEEPING {
            // The worker got tired of polling and went to sleep; wake it.
            // Any later store the worker makes will find `Working` already
            // in the cell, so an unconditional wake is safe.
            if let Err(errno) = self.parker.wake_one(&self.state) {
                rerror!("wake failed during handoff: errno {}", errno);
            }
        }
    }

    /// Take whatever is in the slot. Callable only by the side that
    /// currently owns slot access (see `slot`).
    pub(crate) fn take_item(&self) -> Option<WorkItem> {
        unsafe { (*self.slot.get()).take() }
    }

    /// Park on the state cell until woken. Benign outcomes are folded
    /// away; real failures are logged and the worker carries on polling.
    fn park(&self) {
        match self.parker.park(&self.state, SLEEPING) {
            ParkOutcome::Woken | ParkOutcome::WouldBlock => {}
            ParkOutcome::Failed(errno) => {
                rerror!("park failed in worker loop: errno {}", errno);
            }
        }
    }
}

impl ReplyNotify for WorkerCore {
    /// Early-reply signal from the handler, on the worker thread. Release
    /// pairs with the dispatcher's acquire state load in `poll`; from here
    /// on the dispatch thread may transmit and release the request.
    fn reply_ready(&self) {
        self.state.store(WorkerState::Postprocessing as u32, Ordering::Release);
    }
}

/// Dispatch-side record of one worker thread. Everything here other than
/// `core` is touched only by the dispatch thread.
pub(crate) struct Worker {
    pub(crate) core: Arc<WorkerCore>,

    /// Position in the dispatcher's busy list; -1 when idle.
    pub(crate) busy_index: i32,

    /// Tag of the service this worker is currently bound to.
    pub(crate) service: u16,

    handle: Option<JoinHandle<()>>,
    exited: bool,
}

impl Worker {
    /// Spawn a new worker thread, idle and polling.
    pub(crate) fn spawn(
        id: usize,
        clock: Arc<DispatchClock>,
        parker: Arc<dyn StatePark>,
        poll_budget_ns: u64,
    ) -> Worker {
        let core = Arc::new(WorkerCore::new(clock, parker, poll_budget_ns));
        let thread_core = Arc::clone(&core);
        let handle = thread::Builder::new()
            .name(format!("rsvc-worker-{}", id))
            .spawn(move || worker_main(thread_core))
            .expect("failed to spawn worker thread");
        Worker {
            core,
            busy_index: -1,
            service: 0,
            handle: Some(handle),
            exited: false,
        }
    }

    pub(crate) fn handoff(&self, item: WorkItem) {
        self.core.handoff(item);
    }

    /// Stop this worker's thread and wait for it to exit. The worker must
    /// be idle; the dispatcher drains its busy list before calling this.
    pub(crate) fn exit(&mut self) {
        if self.exited {
            return;
        }
        debug_assert!(self.busy_index < 0, "exit() on a busy worker");
        self.core.handoff(WorkItem::Exit);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.exited = true;
    }
}

/// Top-level function for worker threads: wait for a handoff, run the
/// handler, hand the request back, repeat.
fn worker_main(core: Arc<WorkerCore>) {
    loop {
        // Wait for the dispatch thread to supply some work.
        let stop_polling_at = core.clock.now_ns().saturating_add(core.poll_budget_ns);
        while core.state.load(Ordering::Acquire) != WORKING {
            if core.clock.now_ns() >= stop_polling_at {
                // It's been a long time since we've had any work to do; go
                // to sleep so we don't burn more CPU. The dispatch thread
                // could be raising the state to Working right now, so only
                // move to Sleeping if the cell still reads Polling.
                match core
                    .state
                    .compare_exchange(POLLING, SLEEPING, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => core.park(),
                    // A spurious wakeup left us in Sleeping; park again.
                    Err(actual) if actual == SLEEPING => core.park(),
                    // Handoff already committed.
                    Err(_) => {}
                }
            }
            std::hint::spin_loop();
        }

        // The acquire load above pairs with the handoff's release swap, so
        // the slot contents are visible. Copy what we need out and end the
        // borrow of the slot before the handler runs: during
        // postprocessing the dispatch thread will move the item out from
        // under us.
        let fetched = unsafe {
            match &*core.slot.get() {
                Some(WorkItem::Exit) => None,
                Some(WorkItem::Rpc { rpc, service }) => Some((*rpc, Arc::clone(service))),
                None => unreachable!("worker in Working state with an empty slot"),
            }
        };

        let Some((rpc, service)) = fetched else {
            // Exit request: consume it and stop.
            let _ = core.take_item();
            rtrace!("worker exiting");
            break;
        };

        // Run the handler against the request in place; the item stays in
        // the slot so the dispatch thread can complete the reply.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let (request, reply) = unsafe { (*rpc).payloads() };
            let view = ServiceRpc::with_notify(request, reply, &*core);
            service.handle_rpc(view);
        }));
        if let Err(payload) = result {
            let msg = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            rerror!("service handler panicked: {}", msg);
            // A half-built reply must never be committed.
            process::abort();
        }

        // Hand the request back to the dispatch thread. Release pairs with
        // the acquire state load in `poll`.
        core.state.store(POLLING, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parking::new_park;
    use rsvc_core::buffer::Buffer;
    use rsvc_core::wire;
    use std::sync::Mutex;
    use std::time::Duration;

    struct TestRpc {
        request: Vec<u8>,
        reply: Buffer,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ServerRpc for TestRpc {
        fn request_payload(&self) -> &[u8] {
            &self.request
        }
        fn reply_payload(&mut self) -> &mut Buffer {
            &mut self.reply
        }
        fn payloads(&mut self) -> (&[u8], &mut Buffer) {
            (&self.request, &mut self.reply)
        }
        fn send_reply(self: Box<Self>) {
            self.sent.lock().unwrap().push(self.reply.as_slice().to_vec());
        }
        fn epoch(&self) -> Option<u64> {
            Some(1)
        }
    }

    struct Echo;

    impl Service for Echo {
        fn handle_rpc(&self, mut rpc: ServiceRpc<'_>) {
            let request = rpc.request().to_vec();
            rpc.reply().append_u32(wire::Status::Ok.into());
            rpc.reply().append(&request);
        }
    }

    fn wait_for_state(core: &WorkerCore, state: WorkerState) {
        let start = std::time::Instant::now();
        while core.state() != state {
            assert!(
                start.elapsed() < Duration::from_secs(5),
                "worker never reached {}",
                state
            );
            std::hint::spin_loop();
        }
    }

    #[test]
    fn test_handoff_runs_handler() {
        let clock = Arc::new(DispatchClock::new());
        let parker = new_park();
        let mut worker = Worker::spawn(0, clock, parker, u64::MAX);

        let sent = Arc::new(Mutex::new(Vec::new()));
        let rpc = Box::new(TestRpc {
            request: vec![9, 9, 9],
            reply: Buffer::new(),
            sent: Arc::clone(&sent),
        });

        worker.handoff(WorkItem::rpc(rpc, Arc::new(Echo)));
        wait_for_state(&worker.core, WorkerState::Polling);

        // Complete the reply the way the dispatch thread would.
        match worker.core.take_item() {
            Some(WorkItem::Rpc { rpc, .. }) => {
                let rpc = unsafe { Box::from_raw(rpc) };
                rpc.send_reply();
            }
            _ => panic!("expected an rpc in the slot"),
        }

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][4..], &[9u8, 9, 9][..]);

        worker.exit();
    }

    #[test]
    fn test_exit_joins_thread() {
        let clock = Arc::new(DispatchClock::new());
        let mut worker = Worker::spawn(1, clock, new_park(), u64::MAX);
        worker.exit();
        // Idempotent.
        worker.exit();
    }
}
