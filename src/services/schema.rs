//! Target schema registry
//!
//! Field names are the canonical storage column names. Required and optional
//! sets are disjoint.

use crate::types::import::ImportType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDefinition {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl SchemaDefinition {
    /// All target fields, required first, in display order.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.contains(&field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.required.contains(&field) || self.optional.contains(&field)
    }
}

const CLIENTS: SchemaDefinition = SchemaDefinition {
    required: &["name", "email"],
    optional: &["phone", "address", "contact_person"],
};

const INVOICES: SchemaDefinition = SchemaDefinition {
    required: &[
        "invoice_number",
        "client_email",
        "issue_date",
        "due_date",
        "subtotal",
        "total",
    ],
    optional: &["tax", "discount", "status", "notes", "payment_terms"],
};

pub fn get_schema(import_type: ImportType) -> &'static SchemaDefinition {
    match import_type {
        ImportType::Clients => &CLIENTS,
        ImportType::Invoices => &INVOICES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_and_optional_are_disjoint() {
        for import_type in [ImportType::Clients, ImportType::Invoices] {
            let schema = get_schema(import_type);
            for field in schema.required {
                assert!(
                    !schema.optional.contains(field),
                    "{} is both required and optional",
                    field
                );
            }
        }
    }

    #[test]
    fn test_clients_schema_fields() {
        let schema = get_schema(ImportType::Clients);
        assert!(schema.is_required("email"));
        assert!(!schema.is_required("phone"));
        assert!(schema.contains("contact_person"));
        assert!(!schema.contains("invoice_number"));
    }

    #[test]
    fn test_invoices_schema_fields() {
        let schema = get_schema(ImportType::Invoices);
        assert!(schema.is_required("client_email"));
        assert!(schema.is_required("total"));
        assert!(!schema.is_required("tax"));
    }
}
