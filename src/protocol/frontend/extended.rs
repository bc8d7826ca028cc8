//! Extended query protocol messages.

use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};

/// Object addressed by Describe and Close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A prepared statement ('S')
    Statement,
    /// A portal ('P')
    Portal,
}

impl Target {
    fn byte(self) -> u8 {
        match self {
            Target::Statement => b'S',
            Target::Portal => b'P',
        }
    }
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for unnamed statement)
/// - `query`: SQL query with $1, $2, ... placeholders
/// - `param_oids`: Parameter type OIDs (0 = let server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_i32(oid as i32);
    }
    msg.finish();
}

/// Write a Bind message with text-format parameter values.
///
/// `None` parameters are sent as SQL NULL.
pub fn write_bind(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    params: &[Option<&[u8]>],
    result_formats: &[FormatCode],
) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);
    msg.write_cstr(portal);
    msg.write_cstr(statement);

    // Zero parameter format codes: all parameters use text.
    msg.write_i16(0);

    msg.write_i16(params.len() as i16);
    for param in params {
        match param {
            Some(value) => {
                msg.write_i32(value.len() as i32);
                msg.write_bytes(value);
            }
            None => msg.write_i32(-1),
        }
    }

    msg.write_i16(result_formats.len() as i16);
    for &fmt in result_formats {
        msg.write_i16(fmt as i16);
    }
    msg.finish();
}

/// Write an Execute message to run a portal (`max_rows` 0 = unlimited).
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_i32(max_rows as i32);
    msg.finish();
}

/// Write a Describe message for a statement or portal.
pub fn write_describe(buf: &mut Vec<u8>, target: Target, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(target.byte());
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Close message to release a statement or portal.
pub fn write_close(buf: &mut Vec<u8>, target: Target, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CLOSE);
    msg.write_u8(target.byte());
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Sync message.
///
/// Ends an extended query sequence; the server answers with ReadyForQuery,
/// after skipping to it if an earlier message in the sequence failed.
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::SYNC);
    msg.finish();
}

/// Write a Flush message.
pub fn write_flush(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::FLUSH);
    msg.finish();
}
