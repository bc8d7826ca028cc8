//! Extended query protocol backend messages.

use crate::error::Result;
use crate::protocol::codec::{read_u16, read_u32};
use crate::protocol::types::Oid;

/// ParameterDescription message - describes parameters for a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    /// Parameter type OIDs
    param_oids: Vec<Oid>,
}

impl ParameterDescription {
    /// Parse a ParameterDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_params, mut data) = read_u16(payload)?;
        let mut param_oids = Vec::with_capacity(num_params as usize);

        for _ in 0..num_params {
            let (oid, rest) = read_u32(data)?;
            param_oids.push(oid);
            data = rest;
        }

        Ok(Self { param_oids })
    }

    /// Get the number of parameters.
    pub fn len(&self) -> usize {
        self.param_oids.len()
    }

    /// Check if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.param_oids.is_empty()
    }

    /// Get parameter type OIDs.
    pub fn oids(&self) -> &[Oid] {
        &self.param_oids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_parameter_oids() {
        let payload = [0, 2, 0, 0, 0, 25, 0, 0, 0, 23];
        let desc = ParameterDescription::parse(&payload).unwrap();
        assert_eq!(desc.oids(), &[25, 23]);
    }

    #[test]
    fn truncated_payload() {
        assert!(ParameterDescription::parse(&[0]).is_err());
        assert!(ParameterDescription::parse(&[0, 1, 0, 0]).is_err());
    }
}
