//! COPY protocol backend messages.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_i16, read_u8};
use crate::protocol::types::FormatCode;

/// CopyInResponse / CopyOutResponse / CopyBothResponse payload.
///
/// All three share one layout: an overall format byte followed by
/// per-column format codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResponse {
    /// Overall format (0=text, 1=binary)
    pub format: FormatCode,
    /// Per-column format codes
    pub column_formats: Vec<FormatCode>,
}

impl CopyResponse {
    /// Parse a Copy*Response message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (format_byte, rest) = read_u8(payload)?;
        let format = format_code(format_byte as i16)?;

        let (num_columns, mut rest) = read_i16(rest)?;
        let mut column_formats = Vec::with_capacity(num_columns.max(0) as usize);

        for _ in 0..num_columns {
            let (fmt, remaining) = read_i16(rest)?;
            column_formats.push(format_code(fmt)?);
            rest = remaining;
        }

        Ok(Self {
            format,
            column_formats,
        })
    }
}

fn format_code(raw: i16) -> Result<FormatCode> {
    u16::try_from(raw)
        .ok()
        .and_then(FormatCode::from_u16)
        .ok_or_else(|| Error::Protocol(format!("CopyResponse: invalid format code {raw}")))
}
