//! SMTP server: accepts connections and spools the messages they carry

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use crate::smtp::error::SmtpError;
use crate::smtp::message::Message;
use crate::smtp::session::SmtpSession;
use crate::smtp::transport::{LineReader, LineWriter};
use crate::spool::SpoolStore;

/// Accepts inbound conversations, one thread each, and hands every
/// completed message to the spool
#[derive(Clone)]
pub struct SmtpServer {
    /// Server hostname
    hostname: String,
    banner: String,
    spool: Arc<dyn SpoolStore>,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(hostname: &str, spool: Arc<dyn SpoolStore>) -> Self {
        Self {
            hostname: hostname.to_owned(),
            banner: format!("{hostname} relaymail v{}", env!("CARGO_PKG_VERSION")),
            spool,
        }
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// Accept connections forever on an existing listener (blocking)
    pub fn serve(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!("SMTP server listening on {}", listener.local_addr()?);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_client(stream),
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }

        Ok(())
    }

    fn spawn_client(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(%peer, "accepted client connection");

        let server = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("smtp-{peer}"))
            .spawn(move || {
                if let Err(e) = server.handle_client(stream) {
                    error!(%peer, "Error handling client: {e}");
                }
                debug!(%peer, "connection finished");
            });
        if let Err(e) = spawned {
            error!("Can't start connection thread: {e}");
        }
    }

    /// Handle a client connection
    fn handle_client(&self, stream: TcpStream) -> Result<(), SmtpError> {
        let reader = stream.try_clone()?;
        self.handle_conversation(reader, stream)
    }

    /// Run one inbound conversation to completion.
    ///
    /// Returns once the peer has quit or closed its end of the connection.
    pub fn handle_conversation<R: Read, W: Write>(
        &self,
        reader: R,
        writer: W,
    ) -> Result<(), SmtpError> {
        let mut reader = LineReader::new(reader);
        let mut writer = LineWriter::new(writer);
        let mut session = SmtpSession::new(&self.hostname);

        writer.send_response(&session.greet(&self.banner))?;

        while !session.is_done() {
            let Some(line) = reader.read_line()? else {
                debug!(state = ?session.state, "peer closed the connection");
                break;
            };

            let output = session.process_line(&line);
            if let Some(message) = output.completed {
                self.spool_message(message);
            }
            if let Some(reply) = output.reply {
                if reply.is_error() {
                    info!("relay replies: {}", reply.format_line());
                }
                writer.send_response(&reply)?;
            }
        }

        Ok(())
    }

    /// Enqueue failures are logged and the message is dropped; the peer
    /// still receives its acknowledgment.
    fn spool_message(&self, message: Message) {
        match self.spool.enqueue(&message) {
            Ok(id) => info!(
                %id,
                sender = %message.sender,
                recipients = message.recipients.len(),
                "message spooled"
            ),
            Err(e) => error!(
                sender = %message.sender,
                "Can't spool message, dropping it: {e}"
            ),
        }
    }
}
