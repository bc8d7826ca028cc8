//! Authentication and session-startup backend messages.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_cstr, read_i32, read_u8, read_u32};
use crate::protocol::types::TransactionStatus;

/// Authentication method constants.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const GSS: i32 = 7;
    pub const GSS_CONTINUE: i32 = 8;
    pub const SSPI: i32 = 9;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Authentication message from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication successful
    Ok,
    /// Kerberos V5 authentication required
    KerberosV5,
    /// Cleartext password required
    CleartextPassword,
    /// MD5 password required (with 4-byte salt)
    Md5Password { salt: [u8; 4] },
    /// GSS authentication
    Gss,
    /// GSS continue (with additional data)
    GssContinue { data: Vec<u8> },
    /// SSPI authentication
    Sspi,
    /// SASL authentication required (with list of mechanisms)
    Sasl { mechanisms: Vec<String> },
    /// SASL continue (with server-first-message)
    SaslContinue { data: Vec<u8> },
    /// SASL final (with server-final-message)
    SaslFinal { data: Vec<u8> },
}

impl AuthenticationMessage {
    /// Parse an Authentication message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (auth_type, rest) = read_i32(payload)?;

        match auth_type {
            auth_type::OK => Ok(AuthenticationMessage::Ok),
            auth_type::KERBEROS_V5 => Ok(AuthenticationMessage::KerberosV5),
            auth_type::CLEARTEXT_PASSWORD => Ok(AuthenticationMessage::CleartextPassword),
            auth_type::MD5_PASSWORD => {
                let (salt_bytes, _) = read_bytes(rest, 4)
                    .map_err(|_| Error::Protocol("MD5Password: missing salt".into()))?;
                let mut salt = [0u8; 4];
                salt.copy_from_slice(salt_bytes);
                Ok(AuthenticationMessage::Md5Password { salt })
            }
            auth_type::GSS => Ok(AuthenticationMessage::Gss),
            auth_type::GSS_CONTINUE => Ok(AuthenticationMessage::GssContinue {
                data: rest.to_vec(),
            }),
            auth_type::SSPI => Ok(AuthenticationMessage::Sspi),
            auth_type::SASL => {
                let mut mechanisms = Vec::new();
                let mut data = rest;
                while data.first().is_some_and(|&b| b != 0) {
                    let (mechanism, remaining) = read_cstr(data)?;
                    mechanisms.push(mechanism.to_string());
                    data = remaining;
                }
                Ok(AuthenticationMessage::Sasl { mechanisms })
            }
            auth_type::SASL_CONTINUE => Ok(AuthenticationMessage::SaslContinue {
                data: rest.to_vec(),
            }),
            auth_type::SASL_FINAL => Ok(AuthenticationMessage::SaslFinal {
                data: rest.to_vec(),
            }),
            _ => Err(Error::Unsupported(format!(
                "authentication type {}",
                auth_type
            ))),
        }
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            AuthenticationMessage::Ok => "AuthenticationOk",
            AuthenticationMessage::KerberosV5 => "AuthenticationKerberosV5",
            AuthenticationMessage::CleartextPassword => "AuthenticationCleartextPassword",
            AuthenticationMessage::Md5Password { .. } => "AuthenticationMD5Password",
            AuthenticationMessage::Gss => "AuthenticationGSS",
            AuthenticationMessage::GssContinue { .. } => "AuthenticationGSSContinue",
            AuthenticationMessage::Sspi => "AuthenticationSSPI",
            AuthenticationMessage::Sasl { .. } => "AuthenticationSASL",
            AuthenticationMessage::SaslContinue { .. } => "AuthenticationSASLContinue",
            AuthenticationMessage::SaslFinal { .. } => "AuthenticationSASLFinal",
        }
    }
}

/// BackendKeyData message - contains process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// Process ID of the backend
    pub process_id: u32,
    /// Secret key for cancellation
    pub secret_key: u32,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (process_id, rest) = read_u32(payload)?;
        let (secret_key, _) = read_u32(rest)?;
        Ok(Self {
            process_id,
            secret_key,
        })
    }
}

/// ParameterStatus message - server parameter name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStatus {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

impl ParameterStatus {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (name, rest) = read_cstr(payload)?;
        let (value, _) = read_cstr(rest)?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// ReadyForQuery message - indicates server is ready for a new query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyForQuery {
    /// Transaction status
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (status, _) = read_u8(payload)?;
        let status = TransactionStatus::from_byte(status).ok_or_else(|| {
            Error::Protocol(format!("ReadyForQuery: invalid status '{}'", status as char))
        })?;
        Ok(Self { status })
    }
}

/// NotificationResponse message - asynchronous notification from LISTEN/NOTIFY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    /// PID of the notifying backend
    pub pid: u32,
    /// Channel name
    pub channel: String,
    /// Notification payload
    pub payload: String,
}

impl NotificationResponse {
    /// Parse a NotificationResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (pid, rest) = read_u32(payload)?;
        let (channel, rest) = read_cstr(rest)?;
        let (payload_str, _) = read_cstr(rest)?;
        Ok(Self {
            pid,
            channel: channel.to_string(),
            payload: payload_str.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sasl_mechanisms() {
        let mut payload = 10_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"SCRAM-SHA-256-PLUS\0SCRAM-SHA-256\0\0");

        let msg = AuthenticationMessage::parse(&payload).unwrap();
        assert_eq!(
            msg,
            AuthenticationMessage::Sasl {
                mechanisms: vec!["SCRAM-SHA-256-PLUS".into(), "SCRAM-SHA-256".into()],
            }
        );
    }

    #[test]
    fn parse_md5_salt() {
        let mut payload = 5_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[1, 2, 3, 4]);
        let msg = AuthenticationMessage::parse(&payload).unwrap();
        assert_eq!(msg, AuthenticationMessage::Md5Password { salt: [1, 2, 3, 4] });

        let short = [0, 0, 0, 5, 1, 2];
        assert!(AuthenticationMessage::parse(&short).is_err());
    }

    #[test]
    fn unknown_auth_type() {
        assert!(matches!(
            AuthenticationMessage::parse(&99_i32.to_be_bytes()),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn parse_ready_for_query() {
        assert_eq!(
            ReadyForQuery::parse(b"T").unwrap().status,
            TransactionStatus::InTransaction
        );
        assert!(ReadyForQuery::parse(b"X").is_err());
    }
}
