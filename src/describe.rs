//! Statement metadata from a Parse/Describe/Sync exchange.

use serde::Serialize;

use crate::catalog::{TypeCatalog, TypeDescriptor};
use crate::error::{Error, Result};
use crate::protocol::backend::{BackendMessage, ParameterDescription, RowDescription};
use crate::protocol::frontend::{FrontendMessage, Target};
use crate::protocol::types::{FormatCode, Oid};

/// A type resolved against the catalog, or the bare OID when the catalog
/// snapshot does not know it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TypeRef {
    Known(TypeDescriptor),
    Unknown { oid: Oid },
}

impl TypeRef {
    pub fn resolve(catalog: &TypeCatalog, oid: Oid) -> Self {
        match catalog.get(oid) {
            Some(ty) => TypeRef::Known(ty.clone()),
            None => TypeRef::Unknown { oid },
        }
    }

    pub fn oid(&self) -> Oid {
        match self {
            TypeRef::Known(ty) => ty.oid,
            TypeRef::Unknown { oid } => *oid,
        }
    }
}

/// A bind parameter (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescribeParameter {
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

/// A result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescribeColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub format: FormatCode,
}

/// Parameters and result columns of one statement.
///
/// `rows` is `None` for statements that return no result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DescribeResult {
    pub parameters: Vec<DescribeParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<DescribeColumn>>,
}

/// The messages that describe `sql` as an unnamed statement.
pub fn request(sql: &str) -> [FrontendMessage<'_>; 3] {
    [
        FrontendMessage::Parse {
            name: "",
            query: sql,
            param_oids: &[],
        },
        FrontendMessage::Describe {
            target: Target::Statement,
            name: "",
        },
        FrontendMessage::Sync,
    ]
}

/// Builds a [`DescribeResult`] from the messages yielded before ReadyForQuery.
#[derive(Debug)]
pub struct DescribeCollector<'a> {
    catalog: &'a TypeCatalog,
    result: DescribeResult,
}

impl<'a> DescribeCollector<'a> {
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self {
            catalog,
            result: DescribeResult::default(),
        }
    }

    pub fn on_message(&mut self, msg: BackendMessage) -> Result<()> {
        match msg {
            BackendMessage::ParseComplete | BackendMessage::NoData => Ok(()),
            BackendMessage::ParameterDescription(desc) => {
                self.on_parameters(&desc);
                Ok(())
            }
            BackendMessage::RowDescription(desc) => {
                self.on_rows(desc);
                Ok(())
            }
            other => Err(Error::Unsupported(format!(
                "{} in describe response",
                other.name()
            ))),
        }
    }

    fn on_parameters(&mut self, desc: &ParameterDescription) {
        self.result.parameters = desc
            .oids()
            .iter()
            .map(|&oid| DescribeParameter {
                ty: TypeRef::resolve(self.catalog, oid),
            })
            .collect();
    }

    fn on_rows(&mut self, desc: RowDescription) {
        let columns = desc
            .fields()
            .iter()
            .map(|field| DescribeColumn {
                name: field.name.clone(),
                ty: TypeRef::resolve(self.catalog, field.type_oid),
                format: field.format,
            })
            .collect();
        self.result.rows = Some(columns);
    }

    pub fn finish(self) -> DescribeResult {
        self.result
    }
}
