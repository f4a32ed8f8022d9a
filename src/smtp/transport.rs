//! CRLF line transport shared by the server and the client side

use std::io::{BufRead, BufReader, Read, Write};

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;

/// Reads CRLF (or bare LF) terminated text lines from a byte stream
#[derive(Debug)]
pub struct LineReader<R> {
    inner: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buffer: Vec::new(),
        }
    }

    /// Read the next line, without its line ending.
    ///
    /// Returns `None` once the stream is exhausted. A final line that is not
    /// terminated is still returned. Invalid UTF-8 is replaced lossily.
    pub fn read_line(&mut self) -> Result<Option<String>, SmtpError> {
        self.buffer.clear();

        let limit = (SmtpLimits::MAX_LINE_LENGTH + 2) as u64;
        let read = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buffer)?;
        if read == 0 {
            return Ok(None);
        }

        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
            if self.buffer.last() == Some(&b'\r') {
                self.buffer.pop();
            }
        } else if read as u64 == limit {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::MAX_LINE_LENGTH,
            });
        }

        if self.buffer.len() > SmtpLimits::MAX_LINE_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::MAX_LINE_LENGTH,
            });
        }

        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }

    /// Read one complete (possibly multiline) reply from a peer.
    ///
    /// Each line is checked as it arrives, so a peer that is not speaking
    /// SMTP fails here instead of being waited on for a final line.
    pub fn read_response(&mut self) -> Result<SmtpResponse, SmtpError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?.ok_or(SmtpError::ConnectionClosed)?;
            SmtpResponse::split_line(&line)?;
            let last = SmtpResponse::is_last_line(&line);
            lines.push(line);
            if last {
                break;
            }
        }
        SmtpResponse::parse(&lines)
    }
}

/// Writes CRLF terminated text lines to a byte stream
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Send a command or reply line. The payload must be non-empty.
    pub fn send_line(&mut self, text: &str) -> Result<(), SmtpError> {
        if text.is_empty() {
            return Err(SmtpError::InvalidArgument("empty line payload"));
        }
        self.send_data_line(text)
    }

    /// Send a line of message body; blank lines are allowed here.
    pub fn send_data_line(&mut self, text: &str) -> Result<(), SmtpError> {
        if text.contains(['\r', '\n']) {
            return Err(SmtpError::InvalidArgument("line payload contains a line ending"));
        }
        self.inner.write_all(text.as_bytes())?;
        self.inner.write_all(b"\r\n")?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn send_response(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        for line in response.lines() {
            self.send_line(&line)?;
        }
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}
