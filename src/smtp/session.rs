//! SMTP conversation state
//!
//! [`SmtpState::on_command`] is the single transition table of the protocol.
//! The inbound [`SmtpSession`] uses it to decide how to answer a peer, and
//! the outbound client uses the same table to know which reply to expect for
//! each command it sends.

use std::mem;

use tracing::{debug, info};

use crate::smtp::commands::{Verb, extract_address};
use crate::smtp::message::Message;
use crate::smtp::response::SmtpResponse;

/// The states of one conversation, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Connection accepted, greeting not yet answered
    GreetingSent,
    /// Waiting for HELO/EHLO
    AwaitHello,
    /// Waiting for MAIL
    AwaitSender,
    /// Waiting for the first RCPT
    AwaitFirstRecipient,
    /// At least one RCPT seen; more RCPT or DATA
    AwaitRecipient,
    /// Between DATA and the lone period
    ReceivingBody,
    /// Message accepted; waiting for QUIT
    AwaitQuit,
    Done,
}

/// Which reply a transition produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Greeting,
    Ok,
    StartInput,
    Closing,
    SyntaxError,
    NotImplemented,
    BadSequence,
}

impl ReplyKind {
    pub fn code(self) -> u16 {
        match self {
            ReplyKind::Greeting => SmtpResponse::GREETING,
            ReplyKind::Ok => SmtpResponse::OK,
            ReplyKind::StartInput => SmtpResponse::START_INPUT,
            ReplyKind::Closing => SmtpResponse::CLOSING,
            ReplyKind::SyntaxError => SmtpResponse::SYNTAX_ERROR,
            ReplyKind::NotImplemented => SmtpResponse::NOT_IMPLEMENTED,
            ReplyKind::BadSequence => SmtpResponse::BAD_SEQUENCE,
        }
    }

    /// Build the reply; `service` is the banner for a greeting and the
    /// service name for a closing reply.
    pub fn response(self, service: &str) -> SmtpResponse {
        match self {
            ReplyKind::Greeting => SmtpResponse::greeting(service),
            ReplyKind::Ok => SmtpResponse::ok(),
            ReplyKind::StartInput => SmtpResponse::start_input(),
            ReplyKind::Closing => SmtpResponse::closing(service),
            ReplyKind::SyntaxError => SmtpResponse::syntax_error(),
            ReplyKind::NotImplemented => SmtpResponse::not_implemented(),
            ReplyKind::BadSequence => SmtpResponse::bad_sequence(),
        }
    }
}

/// What a transition does to the message under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    SetSender,
    AddRecipient,
    ClearMessage,
    /// The body is complete and the message leaves the conversation
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub reply: ReplyKind,
    pub next: SmtpState,
    pub effect: Effect,
}

impl Transition {
    fn to(reply: ReplyKind, next: SmtpState, effect: Effect) -> Self {
        Self {
            reply,
            next,
            effect,
        }
    }

    fn stay(state: SmtpState, reply: ReplyKind) -> Self {
        Self::to(reply, state, Effect::None)
    }
}

impl SmtpState {
    /// Transition taken once the greeting has been sent
    pub fn on_connect(self) -> Transition {
        match self {
            SmtpState::GreetingSent => {
                Transition::to(ReplyKind::Greeting, SmtpState::AwaitHello, Effect::None)
            }
            other => Transition::stay(other, ReplyKind::BadSequence),
        }
    }

    /// Transition taken on the lone period ending a body
    pub fn on_end_of_body(self) -> Transition {
        match self {
            SmtpState::ReceivingBody => {
                Transition::to(ReplyKind::Ok, SmtpState::AwaitQuit, Effect::Complete)
            }
            other => Transition::stay(other, ReplyKind::BadSequence),
        }
    }

    /// Transition taken on a command line in any state but the body
    pub fn on_command(self, verb: Verb) -> Transition {
        use SmtpState::*;

        if matches!(self, ReceivingBody | Done | GreetingSent) {
            return Transition::stay(self, ReplyKind::BadSequence);
        }

        // Commands legal everywhere that never change state
        match verb {
            Verb::Noop | Verb::Help => return Transition::stay(self, ReplyKind::Ok),
            Verb::Vrfy | Verb::Expn => return Transition::stay(self, ReplyKind::NotImplemented),
            Verb::Quit => return Transition::to(ReplyKind::Closing, Done, Effect::None),
            _ => {}
        }

        let reset = Transition::to(ReplyKind::Ok, AwaitSender, Effect::ClearMessage);
        match (self, verb) {
            (AwaitHello, Verb::Helo | Verb::Ehlo) => {
                Transition::to(ReplyKind::Ok, AwaitSender, Effect::None)
            }
            (AwaitHello, Verb::Rset) => Transition::stay(AwaitHello, ReplyKind::Ok),
            (AwaitHello, v) if v.is_transaction() => {
                Transition::stay(AwaitHello, ReplyKind::BadSequence)
            }

            (AwaitSender, Verb::Mail) => {
                Transition::to(ReplyKind::Ok, AwaitFirstRecipient, Effect::SetSender)
            }
            (AwaitSender, Verb::Rset) => reset,
            (AwaitSender, Verb::Rcpt | Verb::Data) => {
                Transition::stay(AwaitSender, ReplyKind::BadSequence)
            }

            (AwaitFirstRecipient, Verb::Rcpt) => {
                Transition::to(ReplyKind::Ok, AwaitRecipient, Effect::AddRecipient)
            }
            (AwaitFirstRecipient, Verb::Rset) => reset,
            (AwaitFirstRecipient, Verb::Mail | Verb::Data) => {
                Transition::stay(AwaitFirstRecipient, ReplyKind::BadSequence)
            }

            (AwaitRecipient, Verb::Rcpt) => {
                Transition::to(ReplyKind::Ok, AwaitRecipient, Effect::AddRecipient)
            }
            (AwaitRecipient, Verb::Data) => {
                Transition::to(ReplyKind::StartInput, ReceivingBody, Effect::None)
            }
            (AwaitRecipient, Verb::Rset) => reset,
            (AwaitRecipient, Verb::Mail) => {
                Transition::stay(AwaitRecipient, ReplyKind::BadSequence)
            }

            (AwaitQuit, Verb::Rset) => reset,
            (AwaitQuit, v) if v.is_transaction() => {
                Transition::stay(AwaitQuit, ReplyKind::BadSequence)
            }

            (state, _) => Transition::stay(state, ReplyKind::SyntaxError),
        }
    }
}

/// Manages the state and data for a single inbound conversation
#[derive(Debug)]
pub struct SmtpSession {
    /// Current state of the conversation
    pub state: SmtpState,
    /// The message under construction
    pub message: Message,
    /// Name used in the closing reply
    service: String,
}

/// The result of feeding one line to a session
#[derive(Debug, Default)]
pub struct SessionOutput {
    /// Reply to send back, if any; body lines get none
    pub reply: Option<SmtpResponse>,
    /// The finished message, handed over at end of body
    pub completed: Option<Message>,
}

impl SmtpSession {
    /// Create a new session for a freshly accepted connection
    pub fn new(service: &str) -> Self {
        Self {
            state: SmtpState::GreetingSent,
            message: Message::new(),
            service: service.to_owned(),
        }
    }

    /// Produce the greeting and start waiting for HELO
    pub fn greet(&mut self, banner: &str) -> SmtpResponse {
        let transition = self.state.on_connect();
        self.state = transition.next;
        transition.reply.response(banner)
    }

    pub fn is_done(&self) -> bool {
        self.state == SmtpState::Done
    }

    /// Feed one received line (without line ending) to the session
    pub fn process_line(&mut self, line: &str) -> SessionOutput {
        if self.state == SmtpState::ReceivingBody {
            return self.process_body_line(line);
        }

        debug!(state = ?self.state, "client: {line}");
        let transition = self.state.on_command(Verb::parse(line));

        match transition.effect {
            Effect::SetSender | Effect::AddRecipient => match extract_address(line) {
                Ok(address) if transition.effect == Effect::SetSender => {
                    self.message.set_sender(address)
                }
                Ok(address) => self.message.add_recipient(address),
                Err(e) => {
                    info!("client error: {e}");
                    return SessionOutput {
                        reply: Some(SmtpResponse::syntax_error()),
                        completed: None,
                    };
                }
            },
            Effect::ClearMessage => self.message.clear(),
            Effect::None | Effect::Complete => {}
        }

        self.state = transition.next;
        SessionOutput {
            reply: Some(transition.reply.response(&self.service)),
            completed: None,
        }
    }

    fn process_body_line(&mut self, line: &str) -> SessionOutput {
        if line != "." {
            self.message.append_line(line);
            return SessionOutput::default();
        }

        let transition = self.state.on_end_of_body();
        self.state = transition.next;
        SessionOutput {
            reply: Some(transition.reply.response(&self.service)),
            completed: Some(mem::take(&mut self.message)),
        }
    }
}
