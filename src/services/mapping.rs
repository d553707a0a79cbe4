//! Column mapping between CSV headers and target schema fields
//!
//! The mapping is one-to-one: a target field is held by at most one header.
//! Assigning a field that another header already holds unmaps that header
//! first, so a conflicting assignment can never produce two sources for one
//! field.

use std::collections::BTreeMap;

use thiserror::Error;

use super::parser::RawRow;
use super::schema::SchemaDefinition;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Unknown CSV header '{0}'")]
    UnknownHeader(String),
    #[error("Unknown target field '{0}'")]
    UnknownField(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    by_header: BTreeMap<String, Option<String>>,
}

impl ColumnMapping {
    /// Seed a mapping from the CSV headers by normalized name match.
    ///
    /// Headers are lower-cased with non-alphanumerics stripped; target fields
    /// additionally drop their underscores, so "Contact Person" and
    /// "contact-person" both land on `contact_person`. Each target field is
    /// consumed at most once, first matching header wins.
    pub fn propose(headers: &[String], schema: &SchemaDefinition) -> Self {
        let mut by_header = BTreeMap::new();
        let mut consumed: Vec<&'static str> = Vec::new();

        for header in headers {
            let normalized = normalize(header);
            let matched = schema
                .fields()
                .find(|field| !consumed.contains(field) && normalize(field) == normalized);
            if let Some(field) = matched {
                consumed.push(field);
                by_header.insert(header.clone(), Some(field.to_string()));
            } else {
                by_header.insert(header.clone(), None);
            }
        }

        Self { by_header }
    }

    /// Point `header` at `field`, or clear it with `None`.
    ///
    /// If another header currently holds `field`, that header is unmapped.
    pub fn assign(
        &mut self,
        header: &str,
        field: Option<&str>,
        schema: &SchemaDefinition,
    ) -> Result<(), MappingError> {
        if !self.by_header.contains_key(header) {
            return Err(MappingError::UnknownHeader(header.to_string()));
        }

        let field = match field {
            Some(f) if !schema.contains(f) => {
                return Err(MappingError::UnknownField(f.to_string()));
            }
            Some(f) => Some(f.to_string()),
            None => None,
        };

        if let Some(new_field) = &field {
            for target in self.by_header.values_mut() {
                if target.as_deref() == Some(new_field.as_str()) {
                    *target = None;
                }
            }
        }

        self.by_header.insert(header.to_string(), field);
        Ok(())
    }

    /// True iff every required field has a source header.
    pub fn is_complete(&self, schema: &SchemaDefinition) -> bool {
        self.missing_required(schema).is_empty()
    }

    /// Required fields without a source header, in schema order.
    pub fn missing_required(&self, schema: &SchemaDefinition) -> Vec<&'static str> {
        schema
            .required
            .iter()
            .filter(|field| {
                !self
                    .by_header
                    .values()
                    .any(|target| target.as_deref() == Some(**field))
            })
            .copied()
            .collect()
    }

    /// The header mapped to `field`, if any.
    pub fn header_for(&self, field: &str) -> Option<&str> {
        self.by_header
            .iter()
            .find(|(_, target)| target.as_deref() == Some(field))
            .map(|(header, _)| header.as_str())
    }

    /// Resolve the raw source value for `field` in `row`.
    pub fn source_value<'a>(&self, field: &str, row: &'a RawRow) -> Option<&'a str> {
        let header = self.header_for(field)?;
        row.get(header).map(String::as_str)
    }

    /// Wire view: header -> target field (null when unmapped).
    pub fn view(&self) -> BTreeMap<String, Option<String>> {
        self.by_header.clone()
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::get_schema;
    use crate::types::import::ImportType;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_propose_matches_normalized_headers() {
        let schema = get_schema(ImportType::Clients);
        let mapping = ColumnMapping::propose(
            &headers(&["Name", "E-Mail", "Contact Person", "Internal Code"]),
            schema,
        );
        assert_eq!(mapping.header_for("name"), Some("Name"));
        assert_eq!(mapping.header_for("email"), Some("E-Mail"));
        assert_eq!(mapping.header_for("contact_person"), Some("Contact Person"));
        assert_eq!(mapping.view()["Internal Code"], None);
    }

    #[test]
    fn test_propose_first_matching_header_wins() {
        let schema = get_schema(ImportType::Clients);
        let mapping = ColumnMapping::propose(&headers(&["email", "EMAIL"]), schema);
        assert_eq!(mapping.header_for("email"), Some("email"));
        assert_eq!(mapping.view()["EMAIL"], None);
    }

    #[test]
    fn test_assign_steals_field_from_prior_holder() {
        let schema = get_schema(ImportType::Clients);
        let mut mapping = ColumnMapping::propose(&headers(&["email", "backup_email"]), schema);
        assert_eq!(mapping.header_for("email"), Some("email"));

        mapping.assign("backup_email", Some("email"), schema).unwrap();
        assert_eq!(mapping.header_for("email"), Some("backup_email"));
        assert_eq!(mapping.view()["email"], None);
    }

    #[test]
    fn test_assign_rejects_unknown_header_and_field() {
        let schema = get_schema(ImportType::Clients);
        let mut mapping = ColumnMapping::propose(&headers(&["name"]), schema);
        assert!(matches!(
            mapping.assign("nope", Some("name"), schema),
            Err(MappingError::UnknownHeader(_))
        ));
        assert!(matches!(
            mapping.assign("name", Some("invoice_number"), schema),
            Err(MappingError::UnknownField(_))
        ));
    }

    #[test]
    fn test_is_complete_requires_all_required_fields() {
        let schema = get_schema(ImportType::Clients);
        let mut mapping = ColumnMapping::propose(&headers(&["Full Name", "Email"]), schema);
        assert!(!mapping.is_complete(schema));
        assert_eq!(mapping.missing_required(schema), vec!["name"]);

        mapping.assign("Full Name", Some("name"), schema).unwrap();
        assert!(mapping.is_complete(schema));
    }

    #[test]
    fn test_extra_optional_mappings_do_not_affect_completeness() {
        let schema = get_schema(ImportType::Clients);
        let mut mapping =
            ColumnMapping::propose(&headers(&["name", "email", "phone", "address"]), schema);
        assert!(mapping.is_complete(schema));
        mapping.assign("phone", None, schema).unwrap();
        mapping.assign("address", Some("contact_person"), schema).unwrap();
        assert!(mapping.is_complete(schema));
    }

    #[test]
    fn test_source_value_resolves_through_header() {
        let schema = get_schema(ImportType::Clients);
        let mapping = ColumnMapping::propose(&headers(&["Name", "Email"]), schema);
        let mut row = RawRow::new();
        row.insert("Name".to_string(), "Acme".to_string());
        row.insert("Email".to_string(), "a@x.com".to_string());

        assert_eq!(mapping.source_value("name", &row), Some("Acme"));
        assert_eq!(mapping.source_value("phone", &row), None);
    }
}
