//! Preview engine
//!
//! Runs the row transformer over a bounded prefix of the parsed rows for
//! fast feedback before the real import. Purely informational, no storage
//! access, no state mutation.

use std::collections::BTreeMap;

use super::mapping::ColumnMapping;
use super::parser::RawRow;
use super::schema::SchemaDefinition;
use super::transform::transform;
use crate::types::import::{ImportType, RowErrors, TransformedRow};

pub const PREVIEW_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub rows: Vec<TransformedRow>,
    /// Row index (0-based, file order) -> field errors. Valid rows are absent.
    pub errors: BTreeMap<usize, RowErrors>,
}

pub fn preview(
    rows: &[RawRow],
    mapping: &ColumnMapping,
    schema: &SchemaDefinition,
    import_type: ImportType,
    limit: usize,
) -> Preview {
    let mut result = Preview::default();

    for (index, row) in rows.iter().take(limit).enumerate() {
        let (transformed, errors) = transform(row, mapping, schema, import_type);
        result.rows.push(transformed);
        if !errors.is_empty() {
            result.errors.insert(index, errors);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::get_schema;
    use crate::services::transform::REQUIRED_MISSING;

    fn client_rows(count: usize) -> Vec<RawRow> {
        (0..count)
            .map(|i| {
                let mut row = RawRow::new();
                row.insert("name".to_string(), format!("Client {}", i));
                row.insert("email".to_string(), format!("c{}@x.com", i));
                row
            })
            .collect()
    }

    #[test]
    fn test_preview_is_bounded() {
        let schema = get_schema(ImportType::Clients);
        let rows = client_rows(25);
        let mapping = ColumnMapping::propose(
            &["name".to_string(), "email".to_string()],
            schema,
        );

        let preview = preview(&rows, &mapping, schema, ImportType::Clients, PREVIEW_ROW_LIMIT);
        assert_eq!(preview.rows.len(), 10);
        assert!(preview.errors.is_empty());
    }

    #[test]
    fn test_preview_flags_invalid_rows_in_place() {
        let schema = get_schema(ImportType::Clients);
        let mut rows = client_rows(3);
        rows[1].insert("email".to_string(), String::new());
        let mapping = ColumnMapping::propose(
            &["name".to_string(), "email".to_string()],
            schema,
        );

        let preview = preview(&rows, &mapping, schema, ImportType::Clients, PREVIEW_ROW_LIMIT);
        assert_eq!(preview.rows.len(), 3);
        assert_eq!(preview.errors.len(), 1);
        assert_eq!(preview.errors[&1]["email"], REQUIRED_MISSING);
    }
}
