//! Simple query and COPY messages.

use crate::protocol::codec::MessageBuilder;

/// Write a Query message.
///
/// The query string may contain multiple SQL statements separated by semicolons.
pub fn write_query(buf: &mut Vec<u8>, query: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::QUERY);
    msg.write_cstr(query);
    msg.finish();
}

/// Write a CopyData message.
pub fn write_copy_data(buf: &mut Vec<u8>, data: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::COPY_DATA);
    msg.write_bytes(data);
    msg.finish();
}

/// Write a CopyDone message.
pub fn write_copy_done(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::COPY_DONE);
    msg.finish();
}

/// Write a CopyFail message.
pub fn write_copy_fail(buf: &mut Vec<u8>, reason: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::COPY_FAIL);
    msg.write_cstr(reason);
    msg.finish();
}
