//! # relaymail
//!
//! relaymail is a small store-and-forward SMTP relay.
//!
//! It accepts messages over SMTP, writes each one to a durable spool, and
//! a background loop later forwards everything in the spool to a single
//! downstream relay. A message leaves the spool only after the downstream
//! relay has accepted it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaymail::spool::{DeliveryAgent, FsSpool, TcpConnector};
//! use relaymail::SmtpServer;
//! use std::sync::Arc;
//!
//! let spool = Arc::new(FsSpool::open("spool").unwrap());
//!
//! DeliveryAgent::new(
//!     spool.clone(),
//!     Box::new(TcpConnector::new("smtp.example.com", 25)),
//!     "relay.example.com",
//! )
//! .spawn()
//! .unwrap();
//!
//! SmtpServer::new("relay.example.com", spool)
//!     .start("0.0.0.0:2525")
//!     .unwrap();
//! ```
//!
//! ## Runnable example
//!
//! `demos/basic_usage.rs` runs a spooling relay in front of an in-memory
//! one and forwards a message between them. It is registered as the
//! `basic_usage` example, so `cargo run --example basic_usage` starts it;
//! the file lives under `demos/` rather than the default `examples/`.
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP`, `HELP` - Accepted in any state
//! - `VRFY`, `EXPN` - Always answered with 502
//! - `QUIT` - Close connection
//!
//! One message is accepted per connection.
//!
//! ## Notes
//!
//! - There is no local delivery; everything goes to the downstream relay.
//! - Message content is stored and forwarded without inspection.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.

pub mod config;
pub mod console;
pub mod logging;
pub mod smtp;
pub mod spool;

pub use config::Config;
pub use smtp::{Message, SmtpClient, SmtpError, SmtpResponse, SmtpServer, SmtpSession, SmtpState};
pub use spool::{DeliveryAgent, FsSpool, MemorySpool, SpoolError, SpoolStore};
