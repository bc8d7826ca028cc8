//! Asynchronous PostgreSQL connection.

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{BackendMessage, RawMessage};
use crate::protocol::frontend::FrontendMessage;
use crate::state::connection::{ConnectionStateMachine, ProtocolState, Step};

use super::stream::Stream;

/// Largest backend payload accepted, in bytes.
///
/// A longer length field breaks the connection instead of sizing the read
/// buffer from it.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// A protocol connection: one stream driven by the connection state machine.
///
/// Every write is checked against the current [`ProtocolState`] before any
/// byte is sent. [`Conn::recv`] is the read-until-ready primitive: call it
/// until it returns `Ok(None)`.
#[derive(Debug)]
pub struct Conn {
    stream: BufReader<Stream>,
    buffer_set: BufferSet,
    state: ConnectionStateMachine,
}

impl Conn {
    /// Wrap an already negotiated stream.
    pub fn new(stream: Stream) -> Self {
        Self {
            stream: BufReader::new(stream),
            buffer_set: BufferSet::new(),
            state: ConnectionStateMachine::new(),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state.state()
    }

    pub fn is_broken(&self) -> bool {
        self.state.is_broken()
    }

    /// Send one message.
    ///
    /// A message carrying a string with an interior NUL is rejected with
    /// [`Error::InvalidUsage`] before anything is sent.
    pub async fn write(&mut self, msg: FrontendMessage<'_>) -> Result<()> {
        self.state.check_broken()?;
        msg.validate()?;
        self.state.on_write(msg.kind())?;

        self.buffer_set.write_buffer.clear();
        msg.encode(&mut self.buffer_set.write_buffer);
        tracing::trace!(kind = ?msg.kind(), len = self.buffer_set.write_buffer.len(), "send");

        let stream = self.stream.get_mut();
        let written = match stream.write_all(&self.buffer_set.write_buffer).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            self.state.mark_broken();
            Error::Io(e)
        })
    }

    /// Next message of the current response.
    ///
    /// Returns `Ok(None)` once ReadyForQuery has been consumed, or right away
    /// when nothing is outstanding. A non-fatal ErrorResponse is returned as
    /// [`Error::Server`] after the connection has drained back to ready.
    pub async fn recv(&mut self) -> Result<Option<BackendMessage>> {
        self.state.check_broken()?;
        if self.state.state() == ProtocolState::Ready {
            return Ok(None);
        }

        loop {
            let msg = self.read_message().await?;
            match self.state.on_message(msg)? {
                Step::Yield(BackendMessage::NoticeResponse(notice)) => {
                    tracing::warn!(notice = %notice.fields, "server notice");
                }
                Step::Yield(BackendMessage::NotificationResponse(n)) => {
                    tracing::debug!(channel = %n.channel, pid = n.pid, "notification");
                }
                Step::Yield(msg) => return Ok(Some(msg)),
                Step::Ready => return Ok(None),
                Step::Error(fields) => {
                    let err = self.state.on_error(fields);
                    if matches!(err, Error::Server(_)) {
                        self.drain().await?;
                        tracing::debug!(error = %err, "recovered from server error");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Discard messages until ReadyForQuery.
    ///
    /// Only valid after Sync (or a simple query) has been sent.
    pub async fn drain(&mut self) -> Result<()> {
        self.state.check_broken()?;
        if self.state.state() == ProtocolState::Busy {
            return Err(Error::InvalidState("cannot drain before Sync".into()));
        }

        while self.state.state() != ProtocolState::Ready {
            let msg = self.read_message().await?;
            if !self.state.on_drain_message(&msg)? {
                tracing::trace!(message = msg.name(), "discarded");
            }
        }
        Ok(())
    }

    /// Send Terminate and shut the stream down.
    ///
    /// Failures are logged; the stream is released either way.
    pub async fn close(mut self) {
        if !self.state.is_broken() {
            if let Err(e) = self.write(FrontendMessage::Terminate).await {
                tracing::debug!(error = %e, "failed to send Terminate");
            }
        }
        if let Err(e) = self.stream.get_mut().shutdown().await {
            tracing::debug!(error = %e, "failed to shut down stream");
        }
    }

    async fn read_message(&mut self) -> Result<BackendMessage> {
        let msg = match self.read_raw().await {
            Ok(()) => {
                RawMessage::new(self.buffer_set.type_byte, &self.buffer_set.read_buffer).decode()
            }
            Err(e) => Err(e),
        };

        match msg {
            Ok(msg) => {
                tracing::trace!(message = msg.name(), "recv");
                Ok(msg)
            }
            Err(e) => {
                self.state.mark_broken();
                Err(e)
            }
        }
    }

    /// Read one frame into the buffer set.
    async fn read_raw(&mut self) -> Result<()> {
        self.buffer_set.type_byte = self.stream.read_u8().await?;
        let len = self.stream.read_i32().await?;
        let payload_len = usize::try_from(len)
            .ok()
            .and_then(|len| len.checked_sub(4))
            .ok_or_else(|| Error::Protocol(format!("invalid message length {}", len)))?;
        if payload_len > MAX_MESSAGE_LEN {
            return Err(Error::Protocol(format!(
                "message '{}' of {} bytes exceeds the {} byte limit",
                self.buffer_set.type_byte as char, payload_len, MAX_MESSAGE_LEN
            )));
        }

        self.buffer_set.read_buffer.clear();
        self.buffer_set.read_buffer.resize(payload_len, 0);
        self.stream
            .read_exact(&mut self.buffer_set.read_buffer)
            .await?;
        Ok(())
    }
}
