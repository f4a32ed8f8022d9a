//! Outbound side of the protocol: hands one message to a downstream relay

use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::debug;

use crate::smtp::commands::Verb;
use crate::smtp::error::SmtpError;
use crate::smtp::message::Message;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{SmtpState, Transition};
use crate::smtp::transport::{LineReader, LineWriter};

/// Drives one conversation with a downstream relay.
///
/// The client walks the same state table as the inbound session, from the
/// other end: for every command it sends, the table names the reply a
/// well-behaved server gives, and anything else fails the delivery.
#[derive(Debug)]
pub struct SmtpClient<R, W> {
    reader: LineReader<R>,
    writer: LineWriter<W>,
    hostname: String,
    state: SmtpState,
}

impl SmtpClient<TcpStream, TcpStream> {
    pub fn from_tcp(stream: TcpStream, hostname: &str) -> Result<Self, SmtpError> {
        let reader = stream.try_clone()?;
        Ok(Self::new(reader, stream, hostname))
    }
}

impl<R: Read, W: Write> SmtpClient<R, W> {
    /// `hostname` is announced in HELO
    pub fn new(reader: R, writer: W, hostname: &str) -> Self {
        Self {
            reader: LineReader::new(reader),
            writer: LineWriter::new(writer),
            hostname: hostname.to_owned(),
            state: SmtpState::GreetingSent,
        }
    }

    /// Run a whole conversation transmitting `message`, from the greeting
    /// through the closing reply to QUIT.
    pub fn send(&mut self, message: &Message) -> Result<(), SmtpError> {
        if message.recipients.is_empty() {
            return Err(SmtpError::InvalidArgument("message has no recipients"));
        }

        self.expect(self.state.on_connect())?;
        self.command(Verb::Helo, &format!("HELO {}", self.hostname))?;
        self.command(Verb::Mail, &format!("MAIL FROM:<{}>", message.sender))?;
        for recipient in &message.recipients {
            self.command(Verb::Rcpt, &format!("RCPT TO:<{recipient}>"))?;
        }
        self.command(Verb::Data, "DATA")?;

        // Body lines were stored exactly as received, so only a bare period
        // still needs escaping
        for line in &message.body {
            if line == "." {
                self.writer.send_data_line("..")?;
            } else {
                self.writer.send_data_line(line)?;
            }
        }
        self.writer.send_line(".")?;
        self.expect(self.state.on_end_of_body())?;

        self.command(Verb::Quit, "QUIT")?;
        Ok(())
    }

    fn command(&mut self, verb: Verb, line: &str) -> Result<SmtpResponse, SmtpError> {
        debug!("relay: {line}");
        self.writer.send_line(line)?;
        self.expect(self.state.on_command(verb))
    }

    fn expect(&mut self, transition: Transition) -> Result<SmtpResponse, SmtpError> {
        let reply = self.reader.read_response()?;
        debug!("server: {}", reply.format_line());

        let expected = transition.reply.code();
        if reply.code != expected {
            return Err(SmtpError::UnexpectedReply { expected, reply });
        }
        self.state = transition.next;
        Ok(reply)
    }
}
