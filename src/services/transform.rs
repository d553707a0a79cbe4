//! Row validation and coercion
//!
//! Pure and deterministic: the same (row, mapping, schema, import type)
//! always yields the same transformed row and error set, so preview and the
//! full import run agree on every row they both see.

use chrono::NaiveDate;

use super::mapping::ColumnMapping;
use super::parser::RawRow;
use super::schema::SchemaDefinition;
use crate::types::import::{CellValue, ImportType, RowErrors, TransformedRow};

pub const REQUIRED_MISSING: &str = "Required field is missing";
pub const INVALID_EMAIL: &str = "Invalid email format";
pub const INVALID_DATE: &str = "Invalid date (use YYYY-MM-DD or MM/DD/YYYY)";
pub const INVALID_NUMBER: &str = "Invalid number format";

/// Transform one raw row against the schema. A row is committable iff the
/// returned error map is empty.
pub fn transform(
    row: &RawRow,
    mapping: &ColumnMapping,
    schema: &SchemaDefinition,
    import_type: ImportType,
) -> (TransformedRow, RowErrors) {
    let mut transformed = TransformedRow::default();
    let mut errors = RowErrors::new();

    for field in schema.fields() {
        let raw = mapping.source_value(field, row).map(str::trim);
        let mut field_errors: Vec<&'static str> = Vec::new();

        if schema.is_required(field) && raw.map_or(true, str::is_empty) {
            field_errors.push(REQUIRED_MISSING);
        }

        match raw {
            None => {}
            Some("") => {
                transformed.values.insert(field.to_string(), CellValue::Null);
            }
            Some(value) => {
                let cell = coerce(field, value, import_type, &mut field_errors);
                transformed.values.insert(field.to_string(), cell);
            }
        }

        if !field_errors.is_empty() {
            errors.insert(field.to_string(), field_errors.join("; "));
        }
    }

    (transformed, errors)
}

fn coerce(
    field: &str,
    value: &str,
    import_type: ImportType,
    errors: &mut Vec<&'static str>,
) -> CellValue {
    match (import_type, field) {
        (ImportType::Clients, "email") => {
            if !is_valid_email(value) {
                errors.push(INVALID_EMAIL);
            }
            CellValue::Text(value.to_string())
        }
        (ImportType::Invoices, "issue_date" | "due_date") => match parse_date(value) {
            Some(date) => CellValue::Date(date),
            None => {
                errors.push(INVALID_DATE);
                CellValue::Text(value.to_string())
            }
        },
        (ImportType::Invoices, "subtotal" | "tax" | "discount" | "total") => {
            match parse_number(value) {
                Some(n) => CellValue::Number(n),
                None => {
                    errors.push(INVALID_NUMBER);
                    CellValue::Text(value.to_string())
                }
            }
        }
        _ => CellValue::Text(value.to_string()),
    }
}

/// Accepts ISO dates first, then the US slash form.
fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%m/%d/%Y").ok())
}

/// Strips currency symbols and grouping characters, then parses the rest.
fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_valid_email(value: &str) -> bool {
    let mut parts = value.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };
    if local.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut labels = domain.split('.');
    let has_dot = domain.contains('.');
    has_dot && labels.all(|label| !label.is_empty())
}
