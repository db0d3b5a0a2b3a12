//! Dispatcher error types.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// A service is already registered under this tag.
    ServiceTaken(u16),
    /// The tag exceeds the maximum service tag.
    TagOutOfRange(u16),
    /// A configuration value failed validation.
    InvalidConfig(&'static str),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceTaken(tag) => write!(f, "service tag {} already registered", tag),
            Self::TagOutOfRange(tag) => write!(f, "service tag {} out of range", tag),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

pub type Result<T> = std::result::Result<T, DispatchError>;
