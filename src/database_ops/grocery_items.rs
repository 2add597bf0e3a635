use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, instrument};

pub const TABLE_NAME: &str = "grocery_items";

/// Bind parameters each row contributes to a bulk insert.
const BINDS_PER_ROW: usize = 5;

/// Largest batch that fits in one statement under Postgres' 65535 bind-parameter cap.
pub const MAX_BATCH_ROWS: usize = u16::MAX as usize / BINDS_PER_ROW;

/// A parsed CSV row ready to append. `id` and `created_at` are assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroceryItem {
    pub title: String,
    pub sub_category: String,
    pub price: BigDecimal,
    pub rating_value: Option<f64>,
    pub rating_count: Option<i32>,
}

/// Create `grocery_items` and its lookup indexes when they do not exist yet.
/// An existing table is left untouched.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS grocery_items (
            id SERIAL PRIMARY KEY,
            title VARCHAR(255) NOT NULL,
            sub_category VARCHAR(120) NOT NULL,
            price NUMERIC(10, 2) NOT NULL,
            rating_value DOUBLE PRECISION NULL,
            rating_count INTEGER NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS ix_grocery_items_title ON grocery_items (title);
        CREATE INDEX IF NOT EXISTS ix_grocery_items_sub_category ON grocery_items (sub_category);",
    )
    .execute(pool)
    .await?;
    info!(table = TABLE_NAME, "schema ensured");
    Ok(())
}

/// Append-only sink for parsed rows. One `insert_batch` call is one bulk insert;
/// nothing is durable until `commit`.
#[async_trait]
pub trait GroceryStore: Send {
    async fn insert_batch(&mut self, rows: &[NewGroceryItem]) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;
}

/// Postgres store holding one open transaction for the whole run.
/// Dropping it before `commit` rolls every batch back.
pub struct PgGroceryStore {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgGroceryStore {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl GroceryStore for PgGroceryStore {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert_batch(&mut self, rows: &[NewGroceryItem]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        ensure!(
            rows.len() <= MAX_BATCH_ROWS,
            "batch of {} rows exceeds the {MAX_BATCH_ROWS}-row statement limit",
            rows.len()
        );
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| anyhow!("grocery_items transaction already committed"))?;

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO grocery_items (title, sub_category, price, rating_value, rating_count) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(&r.title)
                .push_bind(&r.sub_category)
                .push_bind(&r.price)
                .push_bind(r.rating_value)
                .push_bind(r.rating_count);
        });
        let result = qb.build().persistent(false).execute(&mut **tx).await?;
        debug!(affected = result.rows_affected(), "inserted grocery_items batch");
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| anyhow!("grocery_items transaction already committed"))?;
        tx.commit().await?;
        info!(table = TABLE_NAME, "load transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::Db;
    use chrono::{DateTime, Utc};
    use std::str::FromStr;

    #[test]
    fn batch_limit_respects_bind_cap() {
        assert_eq!(MAX_BATCH_ROWS, 13_107);
        assert!(MAX_BATCH_ROWS * BINDS_PER_ROW <= u16::MAX as usize);
    }

    fn item(title: &str) -> NewGroceryItem {
        NewGroceryItem {
            title: title.to_string(),
            sub_category: "Bakery & Desserts".to_string(),
            price: BigDecimal::from_str("3.49").unwrap(),
            rating_value: Some(4.5),
            rating_count: None,
        }
    }

    // Requires a disposable Postgres: TEST_DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn round_trips_through_postgres() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL required");
        let db = Db::connect(&url, 2).await.unwrap();
        ensure_schema(&db.pool).await.unwrap();
        // second call must be a no-op
        ensure_schema(&db.pool).await.unwrap();

        let marker = format!("round-trip-{}", std::process::id());
        let mut store = db.begin_grocery_store().await.unwrap();
        let inserted = store
            .insert_batch(&[item(&marker), item(&marker)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        store.commit().await.unwrap();
        assert!(store.commit().await.is_err());

        let (count, price): (i64, BigDecimal) = sqlx::query_as(
            "SELECT COUNT(*), MIN(price) FROM grocery_items WHERE title = $1",
        )
        .bind(&marker)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(price, BigDecimal::from_str("3.49").unwrap());

        // identity and timestamp come from the database, not the batch
        let assigned: Vec<(i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, created_at FROM grocery_items WHERE title = $1 ORDER BY id",
        )
        .bind(&marker)
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(assigned.len(), 2);
        assert!(assigned[0].0 < assigned[1].0);
        assert!(assigned.iter().all(|(_, at)| *at <= Utc::now()));

        // uncommitted batches disappear with the dropped transaction
        let rolled_back = format!("{marker}-rollback");
        {
            let mut store = db.begin_grocery_store().await.unwrap();
            store.insert_batch(&[item(&rolled_back)]).await.unwrap();
        }
        let (remaining,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM grocery_items WHERE title = $1")
                .bind(&rolled_back)
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0);

        sqlx::query("DELETE FROM grocery_items WHERE title = $1")
            .bind(&marker)
            .execute(&db.pool)
            .await
            .unwrap();
        db.close().await;
    }
}
