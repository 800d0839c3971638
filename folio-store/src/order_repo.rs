use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::StoreError;
use folio_order::{Delivery, DeliveryOutcome, Order, OrderRepository};
use folio_shared::{Customer, LineItem};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Postgres-backed order store. Line items, customer and deliveries are JSONB.
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    line_items: Json<Vec<LineItem>>,
    customer: Json<Customer>,
    deliveries: Json<Vec<Delivery>>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            order_id: row.id,
            line_items: row.line_items.0,
            customer: row.customer.0,
            deliveries: row.deliveries.0,
            created_at: row.created_at,
        }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, line_items, customer, deliveries, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.order_id)
        .bind(Json(&order.line_items))
        .bind(Json(&order.customer))
        .bind(Json(&order.deliveries))
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        debug!("Inserted order {}", order.order_id);
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, line_items, customer, deliveries, created_at FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Order::from))
    }

    async fn record_delivery(
        &self,
        order_id: Uuid,
        delivery: &Delivery,
    ) -> Result<DeliveryOutcome, StoreError> {
        // Conditional single-row update; never read-modify-write.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET deliveries = $2
            WHERE id = $1 AND jsonb_array_length(deliveries) = 0
            "#,
        )
        .bind(order_id)
        .bind(Json(vec![delivery]))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 1 {
            return Ok(DeliveryOutcome::Recorded);
        }

        let existing: Option<(Json<Vec<Delivery>>,)> =
            sqlx::query_as("SELECT deliveries FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        match existing {
            None => Err(StoreError::NotFound(format!("order {}", order_id))),
            Some((Json(deliveries),)) => deliveries
                .into_iter()
                .next()
                .map(|d| DeliveryOutcome::AlreadyRecorded(d.tracking_number))
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("order {} rejected a delivery but has none", order_id))
                }),
        }
    }
}
