//! PostgreSQL frontend (client → server) messages.

pub mod auth;
pub mod extended;
pub mod simple;
pub mod startup;

pub use auth::{ScramClient, md5_password};
pub use extended::Target;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};

/// Frontend message type bytes.
pub mod msg_type {
    /// Password/SASL response (all auth response types use 'p')
    pub const PASSWORD: u8 = b'p';
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    /// Parse (extended query protocol)
    pub const PARSE: u8 = b'P';
    /// Bind (extended query protocol)
    pub const BIND: u8 = b'B';
    /// Execute (extended query protocol)
    pub const EXECUTE: u8 = b'E';
    /// Describe (extended query protocol)
    pub const DESCRIBE: u8 = b'D';
    /// Close (extended query protocol)
    pub const CLOSE: u8 = b'C';
    /// Sync (extended query protocol)
    pub const SYNC: u8 = b'S';
    /// Flush (extended query protocol)
    pub const FLUSH: u8 = b'H';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// CopyFail
    pub const COPY_FAIL: u8 = b'f';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Kind of a frontend message, as seen by the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendKind {
    Startup,
    Query,
    CopyData,
    CopyDone,
    CopyFail,
    Parse,
    Describe,
    Bind,
    Execute,
    Sync,
    Terminate,
    Password,
    Close,
    Flush,
    CancelRequest,
    SslRequest,
    SaslInitialResponse,
    SaslResponse,
}

/// A message the client can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage<'a> {
    Startup {
        params: &'a [(&'a str, &'a str)],
    },
    Query(&'a str),
    CopyData(&'a [u8]),
    CopyDone,
    CopyFail(&'a str),
    Parse {
        name: &'a str,
        query: &'a str,
        param_oids: &'a [Oid],
    },
    Describe {
        target: Target,
        name: &'a str,
    },
    Bind {
        portal: &'a str,
        statement: &'a str,
        params: &'a [Option<&'a [u8]>],
        result_formats: &'a [FormatCode],
    },
    Execute {
        portal: &'a str,
        max_rows: u32,
    },
    Sync,
    Terminate,
    /// Cleartext or MD5-hashed password.
    Password(&'a str),
    Close {
        target: Target,
        name: &'a str,
    },
    Flush,
    CancelRequest {
        pid: u32,
        secret_key: u32,
    },
    SslRequest,
    SaslInitialResponse {
        mechanism: &'a str,
        data: &'a [u8],
    },
    SaslResponse(&'a [u8]),
}

impl FrontendMessage<'_> {
    pub fn kind(&self) -> FrontendKind {
        match self {
            FrontendMessage::Startup { .. } => FrontendKind::Startup,
            FrontendMessage::Query(_) => FrontendKind::Query,
            FrontendMessage::CopyData(_) => FrontendKind::CopyData,
            FrontendMessage::CopyDone => FrontendKind::CopyDone,
            FrontendMessage::CopyFail(_) => FrontendKind::CopyFail,
            FrontendMessage::Parse { .. } => FrontendKind::Parse,
            FrontendMessage::Describe { .. } => FrontendKind::Describe,
            FrontendMessage::Bind { .. } => FrontendKind::Bind,
            FrontendMessage::Execute { .. } => FrontendKind::Execute,
            FrontendMessage::Sync => FrontendKind::Sync,
            FrontendMessage::Terminate => FrontendKind::Terminate,
            FrontendMessage::Password(_) => FrontendKind::Password,
            FrontendMessage::Close { .. } => FrontendKind::Close,
            FrontendMessage::Flush => FrontendKind::Flush,
            FrontendMessage::CancelRequest { .. } => FrontendKind::CancelRequest,
            FrontendMessage::SslRequest => FrontendKind::SslRequest,
            FrontendMessage::SaslInitialResponse { .. } => FrontendKind::SaslInitialResponse,
            FrontendMessage::SaslResponse(_) => FrontendKind::SaslResponse,
        }
    }

    /// Check that every string field can be sent as a NUL-terminated string.
    pub fn validate(&self) -> Result<()> {
        match *self {
            FrontendMessage::Startup { params } => params
                .iter()
                .try_for_each(|&(name, value)| {
                    no_nul("startup parameter name", name)?;
                    no_nul(name, value)
                }),
            FrontendMessage::Query(sql) => no_nul("query", sql),
            FrontendMessage::CopyFail(reason) => no_nul("copy failure reason", reason),
            FrontendMessage::Parse { name, query, .. } => {
                no_nul("statement name", name)?;
                no_nul("query", query)
            }
            FrontendMessage::Describe { name, .. } | FrontendMessage::Close { name, .. } => {
                no_nul("object name", name)
            }
            FrontendMessage::Bind {
                portal, statement, ..
            } => {
                no_nul("portal name", portal)?;
                no_nul("statement name", statement)
            }
            FrontendMessage::Execute { portal, .. } => no_nul("portal name", portal),
            FrontendMessage::Password(password) => no_nul("password", password),
            FrontendMessage::SaslInitialResponse { mechanism, .. } => {
                no_nul("SASL mechanism", mechanism)
            }
            FrontendMessage::CopyData(_)
            | FrontendMessage::CopyDone
            | FrontendMessage::Sync
            | FrontendMessage::Terminate
            | FrontendMessage::Flush
            | FrontendMessage::CancelRequest { .. }
            | FrontendMessage::SslRequest
            | FrontendMessage::SaslResponse(_) => Ok(()),
        }
    }

    /// Append the wire encoding of this message to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match *self {
            FrontendMessage::Startup { params } => startup::write_startup(buf, params),
            FrontendMessage::Query(sql) => simple::write_query(buf, sql),
            FrontendMessage::CopyData(data) => simple::write_copy_data(buf, data),
            FrontendMessage::CopyDone => simple::write_copy_done(buf),
            FrontendMessage::CopyFail(reason) => simple::write_copy_fail(buf, reason),
            FrontendMessage::Parse {
                name,
                query,
                param_oids,
            } => extended::write_parse(buf, name, query, param_oids),
            FrontendMessage::Describe { target, name } => {
                extended::write_describe(buf, target, name)
            }
            FrontendMessage::Bind {
                portal,
                statement,
                params,
                result_formats,
            } => extended::write_bind(buf, portal, statement, params, result_formats),
            FrontendMessage::Execute { portal, max_rows } => {
                extended::write_execute(buf, portal, max_rows)
            }
            FrontendMessage::Sync => extended::write_sync(buf),
            FrontendMessage::Terminate => startup::write_terminate(buf),
            FrontendMessage::Password(password) => auth::write_password(buf, password),
            FrontendMessage::Close { target, name } => extended::write_close(buf, target, name),
            FrontendMessage::Flush => extended::write_flush(buf),
            FrontendMessage::CancelRequest { pid, secret_key } => {
                startup::write_cancel_request(buf, pid, secret_key)
            }
            FrontendMessage::SslRequest => startup::write_ssl_request(buf),
            FrontendMessage::SaslInitialResponse { mechanism, data } => {
                auth::write_sasl_initial_response(buf, mechanism, data)
            }
            FrontendMessage::SaslResponse(data) => auth::write_sasl_response(buf, data),
        }
    }
}

fn no_nul(field: &str, value: &str) -> Result<()> {
    match memchr::memchr(0, value.as_bytes()) {
        Some(pos) => Err(Error::InvalidUsage(format!(
            "{} contains a NUL byte at offset {}",
            field, pos
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_nul_is_rejected() {
        let rejected = [
            FrontendMessage::Query("SELECT 1\0\0"),
            FrontendMessage::Parse {
                name: "",
                query: "SELECT 1\0; DROP TABLE t",
                param_oids: &[],
            },
            FrontendMessage::Password("sec\0ret"),
            FrontendMessage::Startup {
                params: &[("user", "u\0")],
            },
        ];
        for msg in rejected {
            assert!(
                matches!(msg.validate(), Err(Error::InvalidUsage(_))),
                "{:?}",
                msg
            );
        }

        assert!(FrontendMessage::Query("SELECT '\\0'").validate().is_ok());
        assert!(FrontendMessage::CopyData(b"\0\0").validate().is_ok());
        assert!(FrontendMessage::SaslResponse(b"\0").validate().is_ok());
    }

    #[test]
    fn encode_appends() {
        let mut buf = Vec::new();
        FrontendMessage::Parse {
            name: "",
            query: "SELECT 1",
            param_oids: &[],
        }
        .encode(&mut buf);
        FrontendMessage::Describe {
            target: Target::Statement,
            name: "",
        }
        .encode(&mut buf);
        FrontendMessage::Sync.encode(&mut buf);

        let tags: Vec<u8> = {
            let mut tags = Vec::new();
            let mut rest = &buf[..];
            while !rest.is_empty() {
                tags.push(rest[0]);
                let len = i32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
                rest = &rest[1 + len..];
            }
            tags
        };
        assert_eq!(tags, b"PDS");
    }

    #[test]
    fn kinds() {
        assert_eq!(FrontendMessage::SslRequest.kind(), FrontendKind::SslRequest);
        assert_eq!(
            FrontendMessage::SaslResponse(b"x").kind(),
            FrontendKind::SaslResponse
        );
        assert_eq!(
            FrontendMessage::Startup { params: &[] }.kind(),
            FrontendKind::Startup
        );
    }
}
