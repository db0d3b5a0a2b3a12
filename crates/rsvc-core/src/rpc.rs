//! Transport-facing and service-facing contracts.
//!
//! A transport produces [`ServerRpc`] objects and hands them to the
//! dispatcher; the dispatcher runs a registered [`Service`] against each
//! one on a worker thread, then invokes [`ServerRpc::send_reply`] exactly
//! once. The handler never sees the `ServerRpc` itself, only a
//! [`ServiceRpc`] view of its payloads.

use crate::buffer::Buffer;

/// One fully-formed incoming request, owned by exactly one of: the
/// transport, a service's admission queue, a worker, or the dispatcher's
/// post-reply cleanup.
pub trait ServerRpc: Send {
    /// The request payload, read-only for the lifetime of the request.
    fn request_payload(&self) -> &[u8];

    /// The reply payload under construction.
    fn reply_payload(&mut self) -> &mut Buffer;

    /// Both payloads at once, for handlers that read the request while
    /// appending to the reply.
    fn payloads(&mut self) -> (&[u8], &mut Buffer);

    /// Transmit the reply. Consuming the request enforces that the reply
    /// for any given request is sent at most once.
    fn send_reply(self: Box<Self>);

    /// Epoch stamp attached by the transport; must be set before the
    /// request reaches the dispatcher. The dispatcher only asserts it is
    /// present; lifetime tracking happens elsewhere in the system.
    fn epoch(&self) -> Option<u64>;
}

/// A registered request handler.
///
/// Handlers run on worker threads and may block. They must not touch the
/// dispatcher's internal state; everything they need arrives through the
/// [`ServiceRpc`] view.
pub trait Service: Send + Sync {
    fn handle_rpc(&self, rpc: ServiceRpc<'_>);
}

/// Receiver of the early-reply signal. Implemented by the worker; handlers
/// reach it only through [`ServiceRpc::send_reply`].
pub trait ReplyNotify: Sync {
    /// The reply is complete and may be transmitted, even though the
    /// handler has not returned yet.
    fn reply_ready(&self);
}

/// A handler's view of one request: the request payload (read-only), the
/// reply payload (append-only), and the early-reply signal.
pub struct ServiceRpc<'a> {
    request: &'a [u8],
    reply: &'a mut Buffer,
    notify: Option<&'a dyn ReplyNotify>,
}

impl<'a> ServiceRpc<'a> {
    /// A view with no early-reply signal; `send_reply` becomes a no-op.
    /// Useful for invoking a handler outside the dispatcher.
    pub fn new(request: &'a [u8], reply: &'a mut Buffer) -> Self {
        Self {
            request,
            reply,
            notify: None,
        }
    }

    pub fn with_notify(
        request: &'a [u8],
        reply: &'a mut Buffer,
        notify: &'a dyn ReplyNotify,
    ) -> Self {
        Self {
            request,
            reply,
            notify: Some(notify),
        }
    }

    #[inline]
    pub fn request(&self) -> &[u8] {
        self.request
    }

    #[inline]
    pub fn reply(&mut self) -> &mut Buffer {
        self.reply
    }

    /// Signal that the reply may be sent before the handler returns.
    ///
    /// Consumes the view: once the signal is published the dispatcher may
    /// transmit and release the request at any moment, so no borrow of its
    /// payloads can be allowed to survive this call.
    pub fn send_reply(self) {
        let notify = self.notify;
        drop(self);
        if let Some(notify) = notify {
            notify.reply_ready();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotify {
        count: AtomicUsize,
    }

    impl ReplyNotify for CountingNotify {
        fn reply_ready(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_view_accessors() {
        let request = [1u8, 2, 3];
        let mut reply = Buffer::new();
        let mut rpc = ServiceRpc::new(&request, &mut reply);

        assert_eq!(rpc.request(), &[1, 2, 3]);
        rpc.reply().append(b"pong");
        assert_eq!(reply.as_slice(), b"pong");
    }

    #[test]
    fn test_send_reply_signals_once() {
        let notify = CountingNotify {
            count: AtomicUsize::new(0),
        };
        let request = [0u8; 4];
        let mut reply = Buffer::new();

        let rpc = ServiceRpc::with_notify(&request, &mut reply, &notify);
        rpc.send_reply();
        assert_eq!(notify.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_send_reply_without_notify() {
        let request = [0u8; 4];
        let mut reply = Buffer::new();
        ServiceRpc::new(&request, &mut reply).send_reply();
    }
}
