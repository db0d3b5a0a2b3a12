//! Common request header, service tags, and status codes.
//!
//! Every request payload begins with a fixed 4-byte header identifying the
//! target service and the operation within it. The dispatcher only reads the
//! header; everything after it belongs to the service. Fields are
//! little-endian on the wire.

use crate::buffer::Buffer;
use core::fmt;

/// Highest valid service tag. Tags above this are rejected before a
/// handler is ever consulted.
pub const MAX_SERVICE: u16 = 7;

/// Size of [`RpcHeader`] on the wire.
pub const HEADER_LEN: usize = 4;

/// The common header at the start of every request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcHeader {
    /// Selects the registered service that will handle this request.
    pub service: u16,
    /// Operation within the service; opaque to the dispatcher.
    pub opcode: u16,
}

impl RpcHeader {
    pub const fn new(service: u16, opcode: u16) -> Self {
        Self { service, opcode }
    }

    /// Decode the header from the front of a request payload.
    ///
    /// Returns `None` if the payload is shorter than [`HEADER_LEN`].
    pub fn parse(payload: &[u8]) -> Option<RpcHeader> {
        if payload.len() < HEADER_LEN {
            return None;
        }
        Some(RpcHeader {
            service: u16::from_le_bytes([payload[0], payload[1]]),
            opcode: u16::from_le_bytes([payload[2], payload[3]]),
        })
    }

    /// Encode the header for the front of a request payload.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let service = self.service.to_le_bytes();
        let opcode = self.opcode.to_le_bytes();
        [service[0], service[1], opcode[0], opcode[1]]
    }
}

/// Completion status carried at the front of every reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// The operation succeeded.
    Ok = 0,

    /// The request payload was too short to contain [`RpcHeader`].
    MessageTooShort = 1,

    /// The request named a service tag with no registered handler.
    ServiceNotAvailable = 2,

    /// The named object was not found (service-level).
    ObjectDoesntExist = 3,

    /// The service does not implement the requested opcode.
    UnimplementedRequest = 4,
}

impl From<Status> for u32 {
    fn from(status: Status) -> u32 {
        status as u32
    }
}

impl From<u32> for Status {
    fn from(v: u32) -> Self {
        match v {
            0 => Status::Ok,
            1 => Status::MessageTooShort,
            2 => Status::ServiceNotAvailable,
            3 => Status::ObjectDoesntExist,
            4 => Status::UnimplementedRequest,
            _ => Status::Ok, // Default for invalid values
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::MessageTooShort => write!(f, "MESSAGE_TOO_SHORT"),
            Status::ServiceNotAvailable => write!(f, "SERVICE_NOT_AVAILABLE"),
            Status::ObjectDoesntExist => write!(f, "OBJECT_DOESNT_EXIST"),
            Status::UnimplementedRequest => write!(f, "UNIMPLEMENTED_REQUEST"),
        }
    }
}

/// Size of [`ErrorResponse`] on the wire.
pub const ERROR_RESPONSE_LEN: usize = 4;

/// The fixed error-reply structure: a bare status word. Written by the
/// dispatcher in place of whatever a handler might have produced; every
/// successful reply also begins with the same status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u32,
}

impl ErrorResponse {
    pub fn new(status: Status) -> Self {
        Self {
            status: status.into(),
        }
    }

    pub fn encode(&self) -> [u8; ERROR_RESPONSE_LEN] {
        self.status.to_le_bytes()
    }

    /// Decode from the front of a reply payload.
    ///
    /// Returns `None` if the reply is shorter than [`ERROR_RESPONSE_LEN`].
    pub fn parse(reply: &[u8]) -> Option<ErrorResponse> {
        let bytes = reply.get(..ERROR_RESPONSE_LEN)?;
        Some(ErrorResponse {
            status: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }

    pub fn status(&self) -> Status {
        Status::from(self.status)
    }
}

/// Replace whatever is in `reply` with a fixed error response.
///
/// Used by the dispatcher for requests that never reach a handler
/// (short payload, unknown service tag).
pub fn prepare_error_response(reply: &mut Buffer, status: Status) {
    reply.reset();
    reply.append(&ErrorResponse::new(status).encode());
}

/// Read the status word from the front of a reply payload.
///
/// Returns `None` if the reply is shorter than [`ERROR_RESPONSE_LEN`].
pub fn read_status(reply: &[u8]) -> Option<Status> {
    ErrorResponse::parse(reply).map(|r| r.status())
}

/// Well-known opcodes used by the bundled services. Opcodes are otherwise
/// private to each service.
pub mod opcode {
    pub const PING: u16 = 0;
    pub const READ: u16 = 1;
    pub const WRITE: u16 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_payload() {
        assert_eq!(RpcHeader::parse(&[]), None);
        assert_eq!(RpcHeader::parse(&[1]), None);
        assert_eq!(RpcHeader::parse(&[1, 0, 7]), None);
    }

    #[test]
    fn test_parse_round_trip() {
        let header = RpcHeader::new(3, 0x1234);
        let bytes = header.encode();
        assert_eq!(RpcHeader::parse(&bytes), Some(header));

        // Trailing payload bytes are ignored by the header.
        let mut payload = bytes.to_vec();
        payload.extend_from_slice(b"extra");
        assert_eq!(RpcHeader::parse(&payload), Some(header));
    }

    #[test]
    fn test_status_conversions() {
        assert_eq!(u32::from(Status::ServiceNotAvailable), 2);
        assert_eq!(Status::from(1u32), Status::MessageTooShort);
        assert_eq!(Status::from(99u32), Status::Ok);
    }

    #[test]
    fn test_error_response_replaces_partial_reply() {
        let mut reply = Buffer::new();
        reply.append(b"stale partial reply");
        prepare_error_response(&mut reply, Status::ServiceNotAvailable);
        assert_eq!(reply.len(), ERROR_RESPONSE_LEN);
        assert_eq!(read_status(reply.as_slice()), Some(Status::ServiceNotAvailable));
    }

    #[test]
    fn test_error_response_round_trip() {
        let response = ErrorResponse::new(Status::MessageTooShort);
        let decoded = ErrorResponse::parse(&response.encode()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.status(), Status::MessageTooShort);
    }

    #[test]
    fn test_read_status_short() {
        assert_eq!(read_status(&[0, 0]), None);
    }
}
