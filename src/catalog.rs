//! Type catalog snapshot loaded once per connection.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::protocol::backend::{BackendMessage, DataRow};
use crate::protocol::types::Oid;

/// Selects every row of `pg_type` with its schema and SQL spelling.
pub const BOOTSTRAP_SQL: &str = "SELECT t.oid, n.nspname, t.typname, format_type(t.oid, NULL) AS sql_type FROM pg_type t JOIN pg_namespace n ON n.oid = t.typnamespace ORDER BY t.oid";

/// One row of the type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub oid: Oid,
    /// Namespace, e.g. `pg_catalog`
    pub schema: String,
    /// Internal name, e.g. `int4`
    pub name: String,
    /// SQL spelling from `format_type`, e.g. `integer`
    pub sql_type: String,
}

impl TypeDescriptor {
    /// Decode one text-format row of [`BOOTSTRAP_SQL`].
    pub fn from_row(row: &DataRow) -> Result<Self> {
        if row.len() != 4 {
            return Err(Error::Protocol(format!(
                "type catalog row has {} columns, expected 4",
                row.len()
            )));
        }

        let oid = row.text(0)?;
        let oid = oid
            .parse()
            .map_err(|_| Error::Protocol(format!("type catalog: invalid oid '{}'", oid)))?;

        Ok(Self {
            oid,
            schema: row.text(1)?.to_string(),
            name: row.text(2)?.to_string(),
            sql_type: row.text(3)?.to_string(),
        })
    }
}

/// OID → [`TypeDescriptor`] lookup. Never changes after it is built.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: BTreeMap<Oid, TypeDescriptor>,
}

impl TypeCatalog {
    pub fn get(&self, oid: Oid) -> Option<&TypeDescriptor> {
        self.types.get(&oid)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate in OID order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }
}

impl FromIterator<TypeDescriptor> for TypeCatalog {
    fn from_iter<I: IntoIterator<Item = TypeDescriptor>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().map(|t| (t.oid, t)).collect(),
        }
    }
}

/// Collects the response to [`BOOTSTRAP_SQL`].
#[derive(Debug, Default)]
pub struct CatalogLoader {
    types: Vec<TypeDescriptor>,
}

impl CatalogLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(&mut self, msg: BackendMessage) -> Result<()> {
        match msg {
            BackendMessage::RowDescription(_) | BackendMessage::CommandComplete(_) => Ok(()),
            BackendMessage::DataRow(row) => {
                self.types.push(TypeDescriptor::from_row(&row)?);
                Ok(())
            }
            other => Err(Error::Unsupported(format!(
                "{} in type catalog response",
                other.name()
            ))),
        }
    }

    pub fn finish(self) -> TypeCatalog {
        tracing::debug!(types = self.types.len(), "type catalog loaded");
        self.types.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::CommandComplete;

    fn data_row(columns: &[Option<&str>]) -> DataRow {
        let mut payload = (columns.len() as u16).to_be_bytes().to_vec();
        for column in columns {
            match column {
                Some(value) => {
                    payload.extend_from_slice(&(value.len() as i32).to_be_bytes());
                    payload.extend_from_slice(value.as_bytes());
                }
                None => payload.extend_from_slice(&(-1_i32).to_be_bytes()),
            }
        }
        DataRow::parse(&payload).unwrap()
    }

    #[test]
    fn loads_rows() {
        let mut loader = CatalogLoader::new();
        loader
            .on_message(BackendMessage::DataRow(data_row(&[
                Some("23"),
                Some("pg_catalog"),
                Some("int4"),
                Some("integer"),
            ])))
            .unwrap();
        loader
            .on_message(BackendMessage::DataRow(data_row(&[
                Some("16"),
                Some("pg_catalog"),
                Some("bool"),
                Some("boolean"),
            ])))
            .unwrap();
        loader
            .on_message(BackendMessage::CommandComplete(CommandComplete {
                tag: "SELECT 2".into(),
            }))
            .unwrap();

        let catalog = loader.finish();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get(23),
            Some(&TypeDescriptor {
                oid: 23,
                schema: "pg_catalog".into(),
                name: "int4".into(),
                sql_type: "integer".into(),
            })
        );
        assert_eq!(catalog.get(25), None);
        let oids: Vec<Oid> = catalog.iter().map(|t| t.oid).collect();
        assert_eq!(oids, [16, 23]);
    }

    #[test]
    fn rejects_bad_rows() {
        let short = data_row(&[Some("23"), Some("pg_catalog"), Some("int4")]);
        assert!(TypeDescriptor::from_row(&short).is_err());

        let null = data_row(&[Some("23"), None, Some("int4"), Some("integer")]);
        assert!(TypeDescriptor::from_row(&null).is_err());

        let oid = data_row(&[Some("x"), Some("a"), Some("b"), Some("c")]);
        assert!(TypeDescriptor::from_row(&oid).is_err());
    }

    #[test]
    fn unexpected_message() {
        let mut loader = CatalogLoader::new();
        assert!(matches!(
            loader.on_message(BackendMessage::NoData),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn serializes_camel_case() {
        let ty = TypeDescriptor {
            oid: 26,
            schema: "pg_catalog".into(),
            name: "oid".into(),
            sql_type: "oid".into(),
        };
        assert_eq!(
            serde_json::to_string(&ty).unwrap(),
            r#"{"oid":26,"schema":"pg_catalog","name":"oid","sqlType":"oid"}"#
        );
    }
}
