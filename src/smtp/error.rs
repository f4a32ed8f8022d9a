//! Error types for the SMTP conversations

use thiserror::Error;

use crate::smtp::response::SmtpResponse;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(&'static str),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Expected {expected} reply, got '{}'", .reply.format_line())]
    UnexpectedReply {
        expected: u16,
        reply: SmtpResponse,
    },
}

/// Size limits enforced by the line transport
pub struct SmtpLimits;

impl SmtpLimits {
    /// Longest line accepted from a peer, excluding the line ending
    pub const MAX_LINE_LENGTH: usize = 64 * 1024;
}
