//! In-process transport for exercising the dispatcher without a network.
//!
//! A `BindTransport` maps locator strings to dispatchers it owns. A client
//! send injects the request straight into the named server's
//! `handle_rpc`, and `wait` drives that server's `poll` loop on the
//! calling thread until the reply lands. No sockets, no timers: the thread
//! using the transport *is* every registered server's dispatch thread, so
//! test runs are deterministic.

use crate::dispatch::Dispatcher;
use rsvc_core::buffer::Buffer;
use rsvc_core::rpc::ServerRpc;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A locator named no registered server.
#[derive(Debug)]
pub struct UnknownHost(pub String);

impl fmt::Display for UnknownHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mock host: {}", self.0)
    }
}

impl std::error::Error for UnknownHost {}

/// Completion cell shared between a pending client RPC and the server-side
/// request that will fill it.
type ReplyCell = Arc<Mutex<Option<Vec<u8>>>>;

/// Server side of one injected request.
struct BindServerRpc {
    request: Vec<u8>,
    reply: Buffer,
    epoch: u64,
    reply_to: ReplyCell,
}

impl ServerRpc for BindServerRpc {
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
        let mut cell = self.reply_to.lock().unwrap();
        debug_assert!(cell.is_none(), "reply sent twice for one request");
        *cell = Some(self.reply.as_slice().to_vec());
    }

    fn epoch(&self) -> Option<u64> {
        Some(self.epoch)
    }
}

/// Client side of one injected request. Becomes ready when the server's
/// dispatcher invokes `send_reply`.
#[derive(Debug)]
pub struct BindClientRpc {
    locator: String,
    reply: ReplyCell,
}

impl BindClientRpc {
    pub fn is_ready(&self) -> bool {
        self.reply.lock().unwrap().is_some()
    }
}

/// The transport itself: a registry of named in-process servers.
pub struct BindTransport {
    servers: HashMap<String, Dispatcher>,
    next_epoch: u64,
}

impl BindTransport {
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            next_epoch: 1,
        }
    }

    /// Register a server under a locator such as `"mock:"`.
    pub fn add_server(&mut self, locator: impl Into<String>, dispatcher: Dispatcher) {
        self.servers.insert(locator.into(), dispatcher);
    }

    /// Direct access to a registered server, for inspecting dispatcher
    /// state mid-test.
    pub fn server_mut(&mut self, locator: &str) -> Option<&mut Dispatcher> {
        self.servers.get_mut(locator)
    }

    /// Stamp an epoch on `request` and inject it into the named server.
    /// The returned RPC completes during subsequent `poll`/`wait` calls.
    pub fn send(
        &mut self,
        locator: &str,
        request: &[u8],
    ) -> std::result::Result<BindClientRpc, UnknownHost> {
        let server = self
            .servers
            .get_mut(locator)
            .ok_or_else(|| UnknownHost(locator.to_string()))?;
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let reply = ReplyCell::default();
        server.handle_rpc(Box::new(BindServerRpc {
            request: request.to_vec(),
            reply: Buffer::new(),
            epoch,
            reply_to: Arc::clone(&reply),
        }));
        Ok(BindClientRpc {
            locator: locator.to_string(),
            reply,
        })
    }

    /// Drive the owning server until `rpc` completes, then take its reply.
    pub fn wait(&mut self, rpc: &BindClientRpc) -> Vec<u8> {
        while !rpc.is_ready() {
            if let Some(server) = self.servers.get_mut(&rpc.locator) {
                server.poll();
            }
        }
        self.take_reply(rpc).expect("reply just observed")
    }

    /// Take the reply if it has already arrived.
    pub fn take_reply(&mut self, rpc: &BindClientRpc) -> Option<Vec<u8>> {
        rpc.reply.lock().unwrap().take()
    }

    /// One tick across every registered server.
    pub fn poll(&mut self) {
        for server in self.servers.values_mut() {
            server.poll();
        }
    }

    /// Send and wait in one step.
    pub fn client_send(
        &mut self,
        locator: &str,
        request: &[u8],
    ) -> std::result::Result<Vec<u8>, UnknownHost> {
        let rpc = self.send(locator, request)?;
        Ok(self.wait(&rpc))
    }
}

impl Default for BindTransport {
    fn default() -> Self {
        Self::new()
    }
}
