//! Connection protocol state machine.
//!
//! Tracks which frontend messages may be sent next and validates every
//! backend message against the current state. It performs no I/O: the
//! transport layer reports each write and each received message, and acts
//! on the returned [`Step`].

use crate::error::{Error, ErrorFields, Result};
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::FrontendKind;

/// Protocol state of an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// Idle; any top-level command may be issued.
    #[default]
    Ready,
    /// Inside an extended-query sequence that must be closed by Sync.
    Busy,
    /// A request is outstanding and ReadyForQuery has not arrived yet.
    WaitReady,
}

/// Outcome of feeding one backend message to the state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Hand the message to the caller and keep reading.
    Yield(BackendMessage),
    /// ReadyForQuery arrived; the iteration is over.
    Ready,
    /// ErrorResponse arrived; pass the fields to
    /// [`ConnectionStateMachine::on_error`].
    Error(ErrorFields),
}

/// Per-connection protocol state plus the sticky broken flag.
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ProtocolState,
    broken: bool,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Fails with [`Error::ConnectionBroken`] once the connection is broken.
    pub fn check_broken(&self) -> Result<()> {
        if self.broken {
            Err(Error::ConnectionBroken)
        } else {
            Ok(())
        }
    }

    /// Validate and apply the transition for a message about to be sent.
    ///
    /// An illegal write is [`Error::InvalidState`] and leaves the state
    /// untouched. Nothing has reached the server, so the connection stays
    /// usable.
    pub fn on_write(&mut self, kind: FrontendKind) -> Result<()> {
        self.check_broken()?;

        use FrontendKind::*;
        use ProtocolState::*;

        let next = match (kind, self.state) {
            (Startup | Query | CopyData | CopyDone | CopyFail, Ready) => WaitReady,
            (Parse | Describe | Bind | Execute, Ready | Busy) => Busy,
            (Sync, Ready | Busy) => WaitReady,
            (
                Terminate | Password | Close | Flush | CancelRequest | SslRequest
                | SaslInitialResponse | SaslResponse,
                state,
            ) => state,
            (kind, state) => {
                return Err(Error::InvalidState(format!(
                    "cannot send {:?} while {:?}",
                    kind, state
                )));
            }
        };

        self.state = next;
        Ok(())
    }

    /// Classify a received message.
    ///
    /// Unknown message kinds, and ReadyForQuery or ErrorResponse outside of
    /// an outstanding request, break the connection.
    pub fn on_message(&mut self, msg: BackendMessage) -> Result<Step> {
        self.check_broken()?;

        match msg {
            BackendMessage::ReadyForQuery(_) if self.state == ProtocolState::WaitReady => {
                self.state = ProtocolState::Ready;
                Ok(Step::Ready)
            }
            BackendMessage::ErrorResponse(err) if self.state != ProtocolState::Ready => {
                self.state = ProtocolState::WaitReady;
                Ok(Step::Error(err.fields))
            }
            BackendMessage::ReadyForQuery(_) | BackendMessage::ErrorResponse(_) => {
                self.broken = true;
                Err(Error::Protocol(format!(
                    "unexpected {} while {:?}",
                    msg.name(),
                    self.state
                )))
            }
            BackendMessage::Unknown(type_byte) => {
                self.broken = true;
                Err(Error::Protocol(format!(
                    "unknown message type '{}'",
                    type_byte as char
                )))
            }
            msg => Ok(Step::Yield(msg)),
        }
    }

    /// Decide what a remembered server error means for the connection.
    ///
    /// `FATAL` and `PANIC` break the connection and come back as
    /// [`Error::FatalConnection`]. Anything else comes back as
    /// [`Error::Server`] and the caller must drain with
    /// [`on_drain_message`](Self::on_drain_message) before surfacing it.
    pub fn on_error(&mut self, fields: ErrorFields) -> Error {
        if fields.is_fatal() {
            self.broken = true;
            Error::FatalConnection(Box::new(Error::Server(fields)))
        } else {
            Error::Server(fields)
        }
    }

    /// Consume one message while draining to the next ReadyForQuery.
    ///
    /// Returns `true` once the connection is back to [`ProtocolState::Ready`].
    pub fn on_drain_message(&mut self, msg: &BackendMessage) -> Result<bool> {
        self.check_broken()?;

        match msg {
            BackendMessage::ReadyForQuery(_) => {
                self.state = ProtocolState::Ready;
                Ok(true)
            }
            BackendMessage::Unknown(type_byte) => {
                self.broken = true;
                Err(Error::Protocol(format!(
                    "unknown message type '{}'",
                    *type_byte as char
                )))
            }
            _ => Ok(false),
        }
    }
}
