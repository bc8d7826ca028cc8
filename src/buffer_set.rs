//! Reusable buffers owned by one connection.

/// Read and write buffers for one connection.
#[derive(Debug)]
pub struct BufferSet {
    /// Payload of the last message read (after the length field)
    pub read_buffer: Vec<u8>,
    /// Encoded outgoing messages not yet written
    pub write_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(1024),
            type_byte: 0,
        }
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
