//! SMTP protocol: line transport, state table, inbound server and outbound client

pub mod client;
pub mod commands;
pub mod error;
pub mod message;
pub mod response;
pub mod server;
pub mod session;
pub mod transport;

pub use client::SmtpClient;
pub use commands::{Verb, extract_address};
pub use error::{SmtpError, SmtpLimits};
pub use message::Message;
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SmtpSession, SmtpState};
pub use transport::{LineReader, LineWriter};
