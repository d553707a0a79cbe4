//! Client table queries

use std::collections::HashMap;

use anyhow::Result;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::types::import::ClientUpsertRow;

/// Bulk upsert clients for one owner, keyed on (user_id, email).
///
/// All-or-nothing: a single multi-row INSERT, so either every row lands or
/// the whole call fails. Returns the affected row count.
pub async fn upsert_clients(
    pool: &PgPool,
    user_id: Uuid,
    rows: &[ClientUpsertRow],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO clients (id, user_id, name, email, phone, address, contact_person) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(Uuid::new_v4())
            .push_bind(user_id)
            .push_bind(&row.name)
            .push_bind(&row.email)
            .push_bind(&row.phone)
            .push_bind(&row.address)
            .push_bind(&row.contact_person);
    });
    builder.push(
        " ON CONFLICT (user_id, email) DO UPDATE SET \
         name = EXCLUDED.name, \
         phone = EXCLUDED.phone, \
         address = EXCLUDED.address, \
         contact_person = EXCLUDED.contact_person, \
         updated_at = NOW()",
    );

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Snapshot of the owner's clients: lower-cased email -> client id.
///
/// Fetched fresh per commit call; not consistent with concurrent writes.
pub async fn client_email_index(pool: &PgPool, user_id: Uuid) -> Result<HashMap<String, Uuid>> {
    let rows: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, email FROM clients WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(id, email)| (email.to_lowercase(), id))
        .collect())
}
