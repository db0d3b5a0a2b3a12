//! Basic dispatcher example
//!
//! Registers a ping service and a small key-value service, then drives
//! both through the in-process BindTransport.

use rsvc_core::buffer::Buffer;
use rsvc_core::rpc::{Service, ServiceRpc};
use rsvc_core::wire::{self, opcode, RpcHeader, Status};
use rsvc_dispatch::{BindTransport, DispatchConfig, Dispatcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const PING_SERVICE: u16 = 0;
const KV_SERVICE: u16 = 1;

struct PingService;

impl Service for PingService {
    fn handle_rpc(&self, mut rpc: ServiceRpc<'_>) {
        rpc.reply().append_u32(Status::Ok.into());
    }
}

/// In-memory key-value store.
///
/// Request layout after the header: key (u64), then the value bytes for
/// WRITE. Replies carry a status word, then the value bytes for READ.
struct KvService {
    objects: Mutex<HashMap<u64, Vec<u8>>>,
}

impl KvService {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    fn key_of(body: &[u8]) -> Option<u64> {
        let bytes = body.get(..8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Some(u64::from_le_bytes(raw))
    }
}

impl Service for KvService {
    fn handle_rpc(&self, mut rpc: ServiceRpc<'_>) {
        let header = match RpcHeader::parse(rpc.request()) {
            Some(h) => h,
            None => return,
        };
        let body = &rpc.request()[wire::HEADER_LEN..];
        match (header.opcode, Self::key_of(body)) {
            (opcode::WRITE, Some(key)) => {
                let value = body[8..].to_vec();
                self.objects.lock().unwrap().insert(key, value);
                rpc.reply().append_u32(Status::Ok.into());
                // The store is committed; the reply can go out while we
                // finish up off the critical path.
                rpc.send_reply();
            }
            (opcode::READ, Some(key)) => {
                match self.objects.lock().unwrap().get(&key) {
                    Some(value) => {
                        rpc.reply().append_u32(Status::Ok.into());
                        rpc.reply().append(value);
                    }
                    None => {
                        rpc.reply().append_u32(Status::ObjectDoesntExist.into());
                    }
                }
            }
            _ => {
                rpc.reply().append_u32(Status::UnimplementedRequest.into());
            }
        }
    }
}

fn request(service: u16, op: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = RpcHeader::new(service, op).encode().to_vec();
    bytes.extend_from_slice(body);
    bytes
}

/// Body of a kv request: key, then the value bytes (empty for READ).
fn kv_body(key: u64, value: &[u8]) -> Buffer {
    let mut body = Buffer::new();
    body.append_u64(key);
    body.append(value);
    body
}

fn main() {
    println!("=== rsvc dispatcher example ===\n");

    let mut dispatcher = Dispatcher::new(DispatchConfig::default());
    dispatcher
        .add_service(Arc::new(PingService), PING_SERVICE, 2)
        .expect("register ping service");
    dispatcher
        .add_service(Arc::new(KvService::new()), KV_SERVICE, 3)
        .expect("register kv service");

    let mut transport = BindTransport::new();
    transport.add_server("mock:", dispatcher);

    // Ping burst.
    let total_pings = 1000;
    let start = Instant::now();
    let mut ok = 0;
    for _ in 0..total_pings {
        let reply = transport
            .client_send("mock:", &request(PING_SERVICE, opcode::PING, &[]))
            .expect("ping");
        if wire::read_status(&reply) == Some(Status::Ok) {
            ok += 1;
        }
    }
    let elapsed = start.elapsed();
    println!(
        "{}/{} pings OK in {:?} ({:.1} us/rpc)",
        ok,
        total_pings,
        elapsed,
        elapsed.as_micros() as f64 / total_pings as f64
    );

    // Store and fetch a few objects.
    for key in 0..5u64 {
        let body = kv_body(key, format!("value-{}", key).as_bytes());
        let reply = transport
            .client_send("mock:", &request(KV_SERVICE, opcode::WRITE, body.as_slice()))
            .expect("write");
        assert_eq!(wire::read_status(&reply), Some(Status::Ok));
    }
    for key in 0..6u64 {
        let body = kv_body(key, &[]);
        let reply = transport
            .client_send("mock:", &request(KV_SERVICE, opcode::READ, body.as_slice()))
            .expect("read");
        match wire::read_status(&reply) {
            Some(Status::Ok) => {
                let value = String::from_utf8_lossy(&reply[4..]).into_owned();
                println!("key {} -> {}", key, value);
            }
            Some(status) => println!("key {} -> {}", key, status),
            None => println!("key {} -> malformed reply", key),
        }
    }

    // A request for a tag nobody registered is answered by the
    // dispatcher itself.
    let reply = transport
        .client_send("mock:", &request(5, 0, &[]))
        .expect("unroutable");
    println!(
        "\nservice 5 (unregistered) -> {}",
        wire::read_status(&reply).unwrap()
    );

    // Drain before shutdown so the final counts are settled.
    loop {
        let server = transport.server_mut("mock:").unwrap();
        server.poll();
        if server.idle() {
            break;
        }
    }
    let server = transport.server_mut("mock:").unwrap();
    println!(
        "\nworkers: {} spawned, {} idle, {} busy",
        server.total_workers(),
        server.idle_workers(),
        server.active_workers()
    );

    println!("\n=== example complete ===");
}
