//! Query-related backend messages.

use std::mem::size_of;

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_cstr, read_i32, read_u16};
use crate::protocol::types::{FormatCode, Oid};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct FieldDescriptionTail {
    table_oid: U32BE,
    column_id: I16BE,
    type_oid: U32BE,
    type_size: I16BE,
    type_modifier: I32BE,
    format: U16BE,
}

const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

/// Field description within a RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code
    pub format: FormatCode,
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription {
    fields: Vec<FieldDescription>,
}

impl RowDescription {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_fields, mut data) = read_u16(payload)?;
        let mut fields = Vec::with_capacity(num_fields as usize);

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (tail, rest) = read_bytes(rest, TAIL_SIZE)?;
            let tail = FieldDescriptionTail::ref_from_bytes(tail)?;

            let format = FormatCode::from_u16(tail.format.get()).ok_or_else(|| {
                Error::Protocol(format!(
                    "FieldDescription: invalid format code {}",
                    tail.format.get()
                ))
            })?;

            fields.push(FieldDescription {
                name: name.to_string(),
                table_oid: tail.table_oid.get(),
                column_id: tail.column_id.get(),
                type_oid: tail.type_oid.get(),
                type_size: tail.type_size.get(),
                type_modifier: tail.type_modifier.get(),
                format,
            });

            data = rest;
        }

        Ok(Self { fields })
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get field descriptions.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    /// Column values; `None` represents NULL.
    columns: Vec<Option<Vec<u8>>>,
}

impl DataRow {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_columns, mut data) = read_u16(payload)?;
        let mut columns = Vec::with_capacity(num_columns as usize);

        for _ in 0..num_columns {
            let (len, rest) = read_i32(data)?;
            if len == -1 {
                columns.push(None);
                data = rest;
                continue;
            }

            let len = usize::try_from(len)
                .map_err(|_| Error::Protocol(format!("DataRow: invalid column length {len}")))?;
            let (value, rest) = read_bytes(rest, len)?;
            columns.push(Some(value.to_vec()));
            data = rest;
        }

        Ok(Self { columns })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get a column value by index.
    ///
    /// Returns `None` if out of range, `Some(None)` if the column is NULL.
    pub fn get(&self, index: usize) -> Option<Option<&[u8]>> {
        self.columns.get(index).map(|c| c.as_deref())
    }

    /// Get a non-NULL text column as `&str`.
    pub fn text(&self, index: usize) -> Result<&str> {
        let bytes = self
            .get(index)
            .ok_or_else(|| Error::Protocol(format!("DataRow: no column {index}")))?
            .ok_or_else(|| Error::Protocol(format!("DataRow: column {index} is NULL")))?;
        simdutf8::compat::from_utf8(bytes)
            .map_err(|e| Error::Protocol(format!("DataRow: column {index}: {e}")))
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: String,
}

impl CommandComplete {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self {
            tag: tag.to_string(),
        })
    }
}
