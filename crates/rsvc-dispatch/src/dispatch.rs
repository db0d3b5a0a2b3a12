//! The dispatcher: service registry, admission control, and the poll loop
//! that completes worker replies.
//!
//! Transports deliver fully-formed requests to [`Dispatcher::handle_rpc`]
//! on the dispatch thread. The dispatcher routes each request by the
//! service tag in its header, enforces the per-service concurrency cap
//! (overflow queues FIFO per service, so one slow service cannot starve
//! another and order within a service is preserved), and hands admitted
//! requests to worker threads. [`Dispatcher::poll`], invoked on every tick
//! of the dispatch loop, scans busy workers, transmits finished replies,
//! and returns workers to the idle pool.
//!
//! Everything in this module runs on the dispatch thread; the only state
//! shared with workers lives in [`crate::worker`].

use crate::clock::DispatchClock;
use crate::config::DispatchConfig;
use crate::parking::StatePark;
use crate::worker::{WorkItem, Worker};
use rsvc_core::error::{DispatchError, Result};
use rsvc_core::rpc::{ServerRpc, Service};
use rsvc_core::state::WorkerState;
use rsvc_core::wire::{self, RpcHeader, Status, MAX_SERVICE};
use rsvc_core::{rdebug, rwarn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

const SERVICE_SLOTS: usize = MAX_SERVICE as usize + 1;

/// Registry entry for one service tag.
struct ServiceEntry {
    service: Arc<dyn Service>,

    /// Concurrency cap for this service.
    max_threads: usize,

    /// Number of workers currently bound to this entry.
    requests_running: usize,

    /// Overflow requests, admitted FIFO as workers free up. Non-empty only
    /// while `requests_running == max_threads`.
    waiting: VecDeque<Box<dyn ServerRpc>>,
}

/// Routes incoming requests to registered services and drives the worker
/// pool. Single-threaded: construct it, feed it, poll it, and drop it on
/// the same thread.
pub struct Dispatcher {
    clock: Arc<DispatchClock>,
    parker: Arc<dyn StatePark>,
    poll_budget_ns: u64,

    /// Registered services, indexed by service tag.
    services: [Option<ServiceEntry>; SERVICE_SLOTS],
    service_count: usize,

    /// Workers currently bound to a request. A worker's `busy_index` is
    /// its position here.
    busy: Vec<Worker>,

    /// Workers available for handoff.
    idle: Vec<Worker>,

    /// Workers spawned over the lifetime of this dispatcher; never shrinks.
    next_worker_id: usize,

    /// Unrouted requests, collected only while no services are registered.
    /// Test use; see [`Dispatcher::wait_for_rpc`].
    test_rpcs: VecDeque<Box<dyn ServerRpc>>,

    /// Thread the dispatcher was built on; every entry point asserts it.
    owner: ThreadId,
}

impl Dispatcher {
    /// Build a dispatcher on the calling thread, which becomes the
    /// dispatch thread.
    ///
    /// Panics if the configuration fails validation.
    pub fn new(config: DispatchConfig) -> Dispatcher {
        config.validate().expect("invalid dispatch configuration");
        Dispatcher {
            clock: Arc::new(DispatchClock::new()),
            parker: config.parker,
            poll_budget_ns: config.poll_budget.as_nanos() as u64,
            services: [const { None }; SERVICE_SLOTS],
            service_count: 0,
            busy: Vec::new(),
            idle: Vec::new(),
            next_worker_id: 0,
            test_rpcs: VecDeque::new(),
            owner: thread::current().id(),
        }
    }

    /// Register a service under `tag`; from now on, incoming requests
    /// carrying that tag in their header are dispatched to it, at most
    /// `max_threads` concurrently.
    ///
    /// Registration is startup-only: not safe to call once requests are
    /// flowing.
    pub fn add_service(
        &mut self,
        service: Arc<dyn Service>,
        tag: u16,
        max_threads: usize,
    ) -> Result<()> {
        if tag > MAX_SERVICE {
            return Err(DispatchError::TagOutOfRange(tag));
        }
        if max_threads == 0 {
            return Err(DispatchError::InvalidConfig("max_threads must be at least 1"));
        }
        let slot = &mut self.services[tag as usize];
        if slot.is_some() {
            return Err(DispatchError::ServiceTaken(tag));
        }
        *slot = Some(ServiceEntry {
            service,
            max_threads,
            requests_running: 0,
            waiting: VecDeque::new(),
        });
        self.service_count += 1;
        Ok(())
    }

    /// Transports invoke this when an incoming request is complete and
    /// ready for processing. The request will (eventually) be serviced and
    /// its `send_reply` invoked; malformed or unroutable requests are
    /// answered immediately with an error reply.
    pub fn handle_rpc(&mut self, mut rpc: Box<dyn ServerRpc>) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "handle_rpc called off the dispatch thread"
        );
        debug_assert!(rpc.epoch().is_some(), "rpc admitted without an epoch");
        self.clock.tick();

        // Find the service for this request.
        let header = RpcHeader::parse(rpc.request_payload());
        let tag = match header {
            Some(h) if h.service <= MAX_SERVICE && self.services[h.service as usize].is_some() => {
                h.service
            }
            _ => {
                if self.service_count == 0 {
                    // No services registered at all: park the request for a
                    // test to collect.
                    self.test_rpcs.push_back(rpc);
                    return;
                }
                match header {
                    None => {
                        rwarn!(
                            "incoming rpc contains no header (message length {})",
                            rpc.request_payload().len()
                        );
                        wire::prepare_error_response(rpc.reply_payload(), Status::MessageTooShort);
                    }
                    Some(h) => {
                        rwarn!("incoming rpc requested unavailable service {}", h.service);
                        wire::prepare_error_response(
                            rpc.reply_payload(),
                            Status::ServiceNotAvailable,
                        );
                    }
                }
                rpc.send_reply();
                return;
            }
        };

        // Present: checked in the match above.
        let entry = self.services[tag as usize].as_mut().unwrap();

        // See if we have exceeded the concurrency limit for the service.
        if entry.requests_running >= entry.max_threads {
            entry.waiting.push_back(rpc);
            return;
        }
        entry.requests_running += 1;
        let service = Arc::clone(&entry.service);

        // Find a thread to execute the request, and hand it off.
        let mut worker = match self.idle.pop() {
            Some(worker) => worker,
            None => {
                let id = self.next_worker_id;
                self.next_worker_id += 1;
                Worker::spawn(
                    id,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.parker),
                    self.poll_budget_ns,
                )
            }
        };
        worker.service = tag;
        worker.handoff(WorkItem::rpc(rpc, service));
        worker.busy_index = self.busy.len() as i32;
        self.busy.push(worker);
    }

    /// True iff no request is currently being serviced. When this returns
    /// true, every memory write made by a completed handler is visible to
    /// the caller: the path that removed each worker from the busy list
    /// went through an acquire load of that worker's state.
    pub fn idle(&self) -> bool {
        self.busy.is_empty()
    }

    /// One tick of the dispatch loop: check every busy worker for
    /// completion, transmit finished replies, and start queued work.
    pub fn poll(&mut self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "poll called off the dispatch thread"
        );
        self.clock.tick();

        // Each iteration checks one busy worker. Reverse order matters: it
        // lets the loop swap-remove the current entry without disturbing
        // the entries it has not visited yet.
        let mut i = self.busy.len();
        while i > 0 {
            i -= 1;
            debug_assert_eq!(self.busy[i].busy_index, i as i32);
            let state = self.busy[i].core.state();
            if state == WorkerState::Working {
                continue;
            }

            // The worker is either post-processing or idle; in either
            // case, if there is a request we haven't yet responded to,
            // respond now.
            if let Some(item) = self.busy[i].core.take_item() {
                match item {
                    WorkItem::Rpc { rpc, .. } => {
                        // Reclaim the Box leaked at handoff.
                        let rpc = unsafe { Box::from_raw(rpc) };
                        rpc.send_reply();
                    }
                    WorkItem::Exit => unreachable!("exit item on a busy worker"),
                }
            }

            if state == WorkerState::Postprocessing {
                // The handler has more work to finish.
                continue;
            }

            // Bound at admission.
            let entry = self.services[self.busy[i].service as usize].as_mut().unwrap();
            if let Some(rpc) = entry.waiting.pop_front() {
                // Work is waiting for this service; start the next request
                // on the same worker.
                let service = Arc::clone(&entry.service);
                self.busy[i].handoff(WorkItem::rpc(rpc, service));
            } else {
                // This worker is now idle; remove it from the busy list
                // (the back entry fills its slot) and make it available.
                entry.requests_running -= 1;
                let mut worker = self.busy.swap_remove(i);
                if i < self.busy.len() {
                    self.busy[i].busy_index = i as i32;
                }
                worker.busy_index = -1;
                self.idle.push(worker);
            }
        }
    }

    /// Wait for a request to appear in the test queue, but give up if it
    /// takes too long. Intended only for testing; the queue is fed only
    /// while no services are registered.
    pub fn wait_for_rpc(&mut self, timeout: Duration) -> Option<Box<dyn ServerRpc>> {
        let start = Instant::now();
        loop {
            if let Some(rpc) = self.test_rpcs.pop_front() {
                return Some(rpc);
            }
            if start.elapsed() > timeout {
                return None;
            }
            self.poll();
        }
    }

    /// Number of workers currently bound to a request.
    pub fn active_workers(&self) -> usize {
        self.busy.len()
    }

    /// Number of workers available for handoff.
    pub fn idle_workers(&self) -> usize {
        self.idle.len()
    }

    /// Workers spawned over this dispatcher's lifetime (the pool never
    /// shrinks before shutdown).
    pub fn total_workers(&self) -> usize {
        self.next_worker_id
    }

    /// Requests currently running for `tag` (0 if unregistered).
    pub fn requests_running(&self, tag: u16) -> usize {
        self.services
            .get(tag as usize)
            .and_then(|s| s.as_ref())
            .map_or(0, |e| e.requests_running)
    }

    /// Requests queued for `tag` behind its concurrency cap (0 if
    /// unregistered).
    pub fn waiting_rpcs(&self, tag: u16) -> usize {
        self.services
            .get(tag as usize)
            .and_then(|s| s.as_ref())
            .map_or(0, |e| e.waiting.len())
    }
}

impl Drop for Dispatcher {
    /// Drains in-flight and queued work, then stops and joins every
    /// worker thread. Must run on the dispatch thread; no request may
    /// arrive once this has started.
    fn drop(&mut self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "dispatcher dropped off the dispatch thread"
        );
        while !self.busy.is_empty() {
            self.poll();
        }
        for worker in &mut self.idle {
            worker.exit();
        }
        self.idle.clear();
        if self.next_worker_id > 0 {
            rdebug!("dispatcher shut down; {} workers joined", self.next_worker_id);
        }
    }
}
