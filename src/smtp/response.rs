//! SMTP reply handling

use crate::smtp::error::SmtpError;

/// Represents an SMTP reply, either sent by the relay or read from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// The SMTP reply code (e.g., 250, 354, 500)
    pub code: u16,
    /// The human-readable message
    pub message: String,
    /// Continuation lines of a multiline reply, after the first
    pub multiline: Option<Vec<String>>,
}

impl SmtpResponse {
    pub const GREETING: u16 = 220;
    pub const CLOSING: u16 = 221;
    pub const OK: u16 = 250;
    pub const START_INPUT: u16 = 354;
    pub const SYNTAX_ERROR: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 502;
    pub const BAD_SEQUENCE: u16 = 503;

    /// Create a new SMTP reply
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_owned(),
            multiline: None,
        }
    }

    /// Create a new multiline SMTP reply
    pub fn new_multiline(code: u16, message: &str, lines: Vec<String>) -> Self {
        Self {
            code,
            message: message.to_owned(),
            multiline: Some(lines),
        }
    }

    /// Greeting sent as soon as a connection is accepted (220)
    pub fn greeting(banner: &str) -> Self {
        Self::new(Self::GREETING, banner)
    }

    /// Generic success (250 OK)
    pub fn ok() -> Self {
        Self::new(Self::OK, "OK")
    }

    /// Body start (354)
    pub fn start_input() -> Self {
        Self::new(Self::START_INPUT, "Start mail input; end with <CRLF>.<CRLF>")
    }

    /// Closing acknowledgment for QUIT (221)
    pub fn closing(service: &str) -> Self {
        Self::new(Self::CLOSING, &format!("{service} service ending"))
    }

    pub fn syntax_error() -> Self {
        Self::new(Self::SYNTAX_ERROR, "Syntax error")
    }

    pub fn not_implemented() -> Self {
        Self::new(Self::NOT_IMPLEMENTED, "Command not implemented")
    }

    pub fn bad_sequence() -> Self {
        Self::new(Self::BAD_SEQUENCE, "Bad sequence of commands")
    }

    /// The wire lines of this reply, without line endings
    pub fn lines(&self) -> Vec<String> {
        match self.multiline {
            Some(ref rest) if !rest.is_empty() => {
                let mut result = Vec::with_capacity(rest.len() + 1);
                result.push(format!("{}-{}", self.code, self.message));
                for (i, line) in rest.iter().enumerate() {
                    let separator = if i == rest.len() - 1 { ' ' } else { '-' };
                    result.push(format!("{}{}{}", self.code, separator, line));
                }
                result
            }
            _ => vec![self.format_line()],
        }
    }

    /// The first line of this reply, without line ending
    pub fn format_line(&self) -> String {
        format!("{} {}", self.code, self.message)
    }

    /// Parse the lines of a reply read from a peer.
    ///
    /// Every line must start with the same three digit code; all but the
    /// last use `-` as separator.
    pub fn parse(lines: &[String]) -> Result<Self, SmtpError> {
        let (first, rest) = lines
            .split_first()
            .ok_or_else(|| SmtpError::MalformedReply("empty reply".to_string()))?;

        let (code, message) = Self::split_line(first)?;
        let mut continuation = Vec::with_capacity(rest.len());
        for line in rest {
            let (line_code, text) = Self::split_line(line)?;
            if line_code != code {
                return Err(SmtpError::MalformedReply(line.clone()));
            }
            continuation.push(text.to_owned());
        }

        Ok(if continuation.is_empty() {
            Self::new(code, message)
        } else {
            Self::new_multiline(code, message, continuation)
        })
    }

    /// Split a reply line into its code and text, rejecting anything that
    /// does not start with three digits followed by ` `, `-` or nothing
    pub(crate) fn split_line(line: &str) -> Result<(u16, &str), SmtpError> {
        let malformed = || SmtpError::MalformedReply(line.to_owned());

        let digits = line.get(..3).ok_or_else(malformed)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let code = digits.parse::<u16>().map_err(|_| malformed())?;

        match line.as_bytes().get(3) {
            None => Ok((code, "")),
            Some(b' ') | Some(b'-') => Ok((code, &line[4..])),
            Some(_) => Err(malformed()),
        }
    }

    /// Whether a reply line is the last one of its reply
    pub fn is_last_line(line: &str) -> bool {
        line.len() == 3 || line.as_bytes().get(3) == Some(&b' ')
    }

    /// Check if this is an error reply (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code)
    }
}
