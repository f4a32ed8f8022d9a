//! Message envelope and body

/// One message as accumulated from a conversation or read back from the spool.
///
/// Body lines never carry line endings; they are added when the message is
/// written to the spool or transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// The sender address, empty until MAIL has been accepted
    pub sender: String,

    /// Recipient addresses in the order given; duplicates are kept
    pub recipients: Vec<String>,

    /// Body lines exactly as received
    pub body: Vec<String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sender(&mut self, sender: String) {
        self.sender = sender;
    }

    pub fn add_recipient(&mut self, recipient: String) {
        self.recipients.push(recipient);
    }

    /// Append a body line. Any CR or LF in `line` is dropped.
    pub fn append_line(&mut self, line: &str) {
        if line.contains(['\r', '\n']) {
            self.body.push(line.replace(['\r', '\n'], ""));
        } else {
            self.body.push(line.to_owned());
        }
    }

    /// Forget sender, recipients and body
    pub fn clear(&mut self) {
        self.sender.clear();
        self.recipients.clear();
        self.body.clear();
    }

    /// Total size of the body in bytes, counting a CRLF per line
    pub fn body_size(&self) -> usize {
        self.body.iter().map(|line| line.len() + 2).sum()
    }
}
