//! Canonical view-menu names for database, schema and dataset grants.
//!
//! The formats are bracket-delimited and do not escape names: a database,
//! schema or dataset name containing `[`, `]` or `.` yields a string that
//! cannot be unpacked reliably.

use crate::{DatabaseId, DatasetId};

/// Returns the view-menu name guarding a whole database.
///
/// Format: `[{database_name}].(id:{database_id})`.
#[must_use]
pub fn database_perm(database_id: DatabaseId, database_name: &str) -> String {
    format!("[{database_name}].(id:{database_id})")
}

/// Returns the view-menu name guarding one schema of a database.
///
/// Format: `[{database_name}].[{schema}]`. Returns `None` when there is no
/// schema, which callers must read as "no schema grant applies".
#[must_use]
pub fn schema_perm(database_name: &str, schema: Option<&str>) -> Option<String> {
    match schema {
        Some(schema) if !schema.is_empty() => Some(format!("[{database_name}].[{schema}]")),
        _ => None,
    }
}

/// Returns the view-menu name guarding one dataset.
///
/// Format: `[{database_name}].[{dataset_name}](id:{dataset_id})`.
#[must_use]
pub fn dataset_perm(dataset_id: DatasetId, dataset_name: &str, database_name: &str) -> String {
    format!("[{database_name}].[{dataset_name}](id:{dataset_id})")
}

/// Splits a schema view-menu name into `(database_name, schema_name)`.
#[must_use]
pub fn unpack_schema_perm(schema_permission: &str) -> Option<(String, String)> {
    let rest = schema_permission.strip_prefix('[')?;
    let (database_name, rest) = rest.split_once(']')?;
    let rest = rest.strip_prefix(".[")?;
    let (schema_name, _) = rest.split_once(']')?;

    Some((database_name.to_owned(), schema_name.to_owned()))
}

/// Prefix shared by every schema view-menu name of a database.
#[must_use]
pub fn schema_perm_prefix(database_name: &str) -> String {
    format!("[{database_name}].[")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{database_perm, dataset_perm, schema_perm, schema_perm_prefix, unpack_schema_perm};
    use crate::{DatabaseId, DatasetId};

    #[test]
    fn database_perm_embeds_name_and_id() {
        assert_eq!(database_perm(DatabaseId::new(7), "sales"), "[sales].(id:7)");
    }

    #[test]
    fn dataset_perm_embeds_parent_name() {
        assert_eq!(
            dataset_perm(DatasetId::new(42), "orders", "sales"),
            "[sales].[orders](id:42)"
        );
    }

    #[test]
    fn schema_perm_is_absent_without_schema() {
        assert_eq!(schema_perm("sales", None), None);
        assert_eq!(schema_perm("sales", Some("")), None);
        assert_eq!(
            schema_perm("sales", Some("public")).as_deref(),
            Some("[sales].[public]")
        );
    }

    #[test]
    fn schema_prefix_matches_every_schema_of_database() {
        let prefix = schema_perm_prefix("sales");
        let perm = schema_perm("sales", Some("eu")).unwrap_or_default();
        assert!(perm.starts_with(prefix.as_str()));
        assert!(!"[sales_eu].[eu]".starts_with(prefix.as_str()));
    }

    #[test]
    fn unpack_rejects_malformed_values() {
        assert_eq!(unpack_schema_perm("sales.public"), None);
        assert_eq!(unpack_schema_perm("[sales].(id:1)"), None);
        assert_eq!(unpack_schema_perm("[sales]"), None);
    }

    proptest! {
        #[test]
        fn unpack_is_left_inverse_of_schema_perm(
            database in "[A-Za-z0-9_ -]{1,24}",
            schema in "[A-Za-z0-9_ -]{1,24}",
        ) {
            let packed = schema_perm(database.as_str(), Some(schema.as_str()));
            prop_assert!(packed.is_some());
            let unpacked = packed.as_deref().and_then(unpack_schema_perm);
            prop_assert_eq!(unpacked, Some((database, schema)));
        }
    }
}
