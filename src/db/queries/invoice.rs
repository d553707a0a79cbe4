//! Invoice table queries

use anyhow::Result;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::types::import::InvoiceUpsertRow;

/// Bulk upsert invoices for one owner, keyed on (user_id, invoice_number).
///
/// Rows arrive with their client email already resolved to a client id.
/// Returns the affected row count.
pub async fn upsert_invoices(
    pool: &PgPool,
    user_id: Uuid,
    rows: &[(InvoiceUpsertRow, Uuid)],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO invoices (id, user_id, client_id, invoice_number, issue_date, due_date, \
         subtotal, tax, discount, total, status, notes, payment_terms) ",
    );
    builder.push_values(rows, |mut b, (row, client_id)| {
        b.push_bind(Uuid::new_v4())
            .push_bind(user_id)
            .push_bind(client_id)
            .push_bind(&row.invoice_number)
            .push_bind(row.issue_date)
            .push_bind(row.due_date)
            .push_bind(row.subtotal)
            .push_bind(row.tax)
            .push_bind(row.discount)
            .push_bind(row.total)
            .push_bind(&row.status)
            .push_bind(&row.notes)
            .push_bind(&row.payment_terms);
    });
    builder.push(
        " ON CONFLICT (user_id, invoice_number) DO UPDATE SET \
         client_id = EXCLUDED.client_id, \
         issue_date = EXCLUDED.issue_date, \
         due_date = EXCLUDED.due_date, \
         subtotal = EXCLUDED.subtotal, \
         tax = EXCLUDED.tax, \
         discount = EXCLUDED.discount, \
         total = EXCLUDED.total, \
         status = EXCLUDED.status, \
         notes = EXCLUDED.notes, \
         payment_terms = EXCLUDED.payment_terms, \
         updated_at = NOW()",
    );

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}
