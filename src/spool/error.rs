//! Error types for the spool

use thiserror::Error;

use crate::smtp::SmtpError;
use crate::spool::ItemId;

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spool item {0} not found")]
    NotFound(ItemId),

    #[error("Spool item {id} is malformed: {reason}")]
    Malformed { id: ItemId, reason: &'static str },

    #[error("Unreadable retry state: {0}")]
    StateDecode(#[from] toml::de::Error),

    #[error("Cannot write retry state: {0}")]
    StateEncode(#[from] toml::ser::Error),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] SmtpError),
}
