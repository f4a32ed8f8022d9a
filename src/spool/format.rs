//! On-disk encoding of a spooled message
//!
//! ```text
//! sender@example.com
//! =====
//! first@example.com
//! second@example.com
//! =====
//! Subject: hello
//!
//! body lines, verbatim
//! ```

use crate::smtp::Message;
use crate::spool::{ItemId, SpoolError};

/// Line closing the sender and the recipient sections
pub const SEPARATOR: &str = "=====";

pub fn encode(message: &Message) -> String {
    let capacity = message.sender.len()
        + message.recipients.iter().map(|r| r.len() + 1).sum::<usize>()
        + message.body_size()
        + 2 * (SEPARATOR.len() + 1)
        + 1;
    let mut out = String::with_capacity(capacity);

    out.push_str(&message.sender);
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push('\n');
    for recipient in &message.recipients {
        out.push_str(recipient);
        out.push('\n');
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    for line in &message.body {
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub fn decode(id: &ItemId, content: &str) -> Result<Message, SpoolError> {
    let malformed = |reason| SpoolError::Malformed {
        id: id.clone(),
        reason,
    };

    let mut lines = content.split_terminator('\n');
    let mut message = Message::new();

    let sender = lines.next().ok_or_else(|| malformed("missing sender"))?;
    message.set_sender(sender.to_owned());
    if lines.next() != Some(SEPARATOR) {
        return Err(malformed("missing separator after sender"));
    }

    loop {
        match lines.next() {
            Some(SEPARATOR) => break,
            Some(recipient) => message.add_recipient(recipient.to_owned()),
            None => return Err(malformed("unterminated recipient list")),
        }
    }

    for line in lines {
        message.append_line(line);
    }
    Ok(message)
}
