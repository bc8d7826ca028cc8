//! PostgreSQL backend (server → client) messages.

pub mod auth;
pub mod copy;
pub mod error;
pub mod extended;
pub mod query;

pub use auth::{
    AuthenticationMessage, BackendKeyData, NotificationResponse, ParameterStatus, ReadyForQuery,
};
pub use copy::CopyResponse;
pub use error::{ErrorResponse, NoticeResponse};
pub use extended::ParameterDescription;
pub use query::{CommandComplete, DataRow, FieldDescription, RowDescription};

use crate::error::Result;

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// CloseComplete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// ParameterDescription
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// NoData
    pub const NO_DATA: u8 = b'n';
    /// PortalSuspended
    pub const PORTAL_SUSPENDED: u8 = b's';
    /// CopyInResponse
    pub const COPY_IN_RESPONSE: u8 = b'G';
    /// CopyOutResponse
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    /// CopyBothResponse
    pub const COPY_BOTH_RESPONSE: u8 = b'W';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
}

/// Raw message from the PostgreSQL server.
///
/// This is a thin wrapper around the message type byte and payload,
/// borrowed from the connection's read buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage<'a> {
    /// Message type byte
    pub type_byte: u8,
    /// Message payload (after length field)
    pub payload: &'a [u8],
}

impl<'a> RawMessage<'a> {
    /// Create a new RawMessage.
    pub fn new(type_byte: u8, payload: &'a [u8]) -> Self {
        Self { type_byte, payload }
    }

    /// Decode the payload into a typed message.
    pub fn decode(&self) -> Result<BackendMessage> {
        BackendMessage::parse(self.type_byte, self.payload)
    }
}

/// A decoded backend message.
///
/// Every message kind this client understands has its own variant; anything
/// else lands in [`BackendMessage::Unknown`], which the connection state
/// machine rejects as a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    Authentication(AuthenticationMessage),
    BackendKeyData(BackendKeyData),
    ParameterStatus(ParameterStatus),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
    DataRow(DataRow),
    CommandComplete(CommandComplete),
    EmptyQueryResponse,
    ErrorResponse(ErrorResponse),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParseComplete,
    BindComplete,
    CloseComplete,
    ParameterDescription(ParameterDescription),
    NoData,
    PortalSuspended,
    CopyInResponse(CopyResponse),
    CopyOutResponse(CopyResponse),
    CopyBothResponse(CopyResponse),
    CopyData(Vec<u8>),
    CopyDone,
    /// A message type byte this client does not recognize.
    Unknown(u8),
}

impl BackendMessage {
    /// Parse a message from its type byte and payload.
    pub fn parse(type_byte: u8, payload: &[u8]) -> Result<Self> {
        let msg = match type_byte {
            msg_type::AUTHENTICATION => {
                BackendMessage::Authentication(AuthenticationMessage::parse(payload)?)
            }
            msg_type::BACKEND_KEY_DATA => {
                BackendMessage::BackendKeyData(BackendKeyData::parse(payload)?)
            }
            msg_type::PARAMETER_STATUS => {
                BackendMessage::ParameterStatus(ParameterStatus::parse(payload)?)
            }
            msg_type::READY_FOR_QUERY => {
                BackendMessage::ReadyForQuery(ReadyForQuery::parse(payload)?)
            }
            msg_type::ROW_DESCRIPTION => {
                BackendMessage::RowDescription(RowDescription::parse(payload)?)
            }
            msg_type::DATA_ROW => BackendMessage::DataRow(DataRow::parse(payload)?),
            msg_type::COMMAND_COMPLETE => {
                BackendMessage::CommandComplete(CommandComplete::parse(payload)?)
            }
            msg_type::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
            msg_type::ERROR_RESPONSE => BackendMessage::ErrorResponse(ErrorResponse::parse(payload)?),
            msg_type::NOTICE_RESPONSE => {
                BackendMessage::NoticeResponse(NoticeResponse::parse(payload)?)
            }
            msg_type::NOTIFICATION_RESPONSE => {
                BackendMessage::NotificationResponse(NotificationResponse::parse(payload)?)
            }
            msg_type::PARSE_COMPLETE => BackendMessage::ParseComplete,
            msg_type::BIND_COMPLETE => BackendMessage::BindComplete,
            msg_type::CLOSE_COMPLETE => BackendMessage::CloseComplete,
            msg_type::PARAMETER_DESCRIPTION => {
                BackendMessage::ParameterDescription(ParameterDescription::parse(payload)?)
            }
            msg_type::NO_DATA => BackendMessage::NoData,
            msg_type::PORTAL_SUSPENDED => BackendMessage::PortalSuspended,
            msg_type::COPY_IN_RESPONSE => BackendMessage::CopyInResponse(CopyResponse::parse(payload)?),
            msg_type::COPY_OUT_RESPONSE => {
                BackendMessage::CopyOutResponse(CopyResponse::parse(payload)?)
            }
            msg_type::COPY_BOTH_RESPONSE => {
                BackendMessage::CopyBothResponse(CopyResponse::parse(payload)?)
            }
            msg_type::COPY_DATA => BackendMessage::CopyData(payload.to_vec()),
            msg_type::COPY_DONE => BackendMessage::CopyDone,
            other => BackendMessage::Unknown(other),
        };
        Ok(msg)
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::Authentication(auth) => auth.name(),
            BackendMessage::BackendKeyData(_) => "BackendKeyData",
            BackendMessage::ParameterStatus(_) => "ParameterStatus",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::NotificationResponse(_) => "NotificationResponse",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CloseComplete => "CloseComplete",
            BackendMessage::ParameterDescription(_) => "ParameterDescription",
            BackendMessage::NoData => "NoData",
            BackendMessage::PortalSuspended => "PortalSuspended",
            BackendMessage::CopyInResponse(_) => "CopyInResponse",
            BackendMessage::CopyOutResponse(_) => "CopyOutResponse",
            BackendMessage::CopyBothResponse(_) => "CopyBothResponse",
            BackendMessage::CopyData(_) => "CopyData",
            BackendMessage::CopyDone => "CopyDone",
            BackendMessage::Unknown(_) => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_byte_is_not_a_parse_error() {
        let msg = RawMessage::new(b'v', &[0, 0, 0, 0]).decode().unwrap();
        assert_eq!(msg, BackendMessage::Unknown(b'v'));
    }

    #[test]
    fn empty_payload_messages() {
        assert_eq!(
            BackendMessage::parse(msg_type::PARSE_COMPLETE, &[]).unwrap(),
            BackendMessage::ParseComplete
        );
        assert_eq!(
            BackendMessage::parse(msg_type::NO_DATA, &[]).unwrap(),
            BackendMessage::NoData
        );
    }

    #[test]
    fn malformed_payload_is_protocol_error() {
        assert!(BackendMessage::parse(msg_type::READY_FOR_QUERY, &[]).is_err());
        assert!(BackendMessage::parse(msg_type::PARAMETER_DESCRIPTION, &[0, 1]).is_err());
    }
}
