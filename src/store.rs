//! Transactional persistence for the order aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::Order;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Transactional write of the order header plus its line items. Two
    /// concurrent `save` calls for the same id race; the loser observes
    /// `StoreError::Duplicate`.
    async fn save(&self, order: Order) -> Result<(), StoreError>;

    /// Identical write path to `save`, but reserved for backfilling from the
    /// legacy side. Callers MUST NOT publish an `order.created` event off
    /// the back of this call — doing so would create a publish feedback
    /// loop between the two systems.
    async fn save_historical(&self, order: Order) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Order, StoreError>;

    /// All orders, most recently created first.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;
}

#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<Mutex<HashMap<String, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: Order) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn save_historical(&self, order: Order) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Order, StoreError> {
        self.orders.lock().await.get(id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.orders.lock().await.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

/// sqlx-backed Postgres implementation. Schema:
/// `orders(id PK, customer_id, total_amount, delivery_date, status, created_at)`,
/// `order_items(order_id FK cascade-delete, product_id, quantity, unit_price, specifications JSONB)`.
#[cfg(feature = "postgres")]
pub mod postgres {
    use async_trait::async_trait;
    use sqlx::{PgPool, Row};

    use super::OrderStore;
    use crate::error::StoreError;
    use crate::models::{Order, OrderItem, OrderStatus};

    #[derive(Clone)]
    pub struct PostgresOrderStore {
        pool: PgPool,
    }

    impl PostgresOrderStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        async fn save_inner(&self, order: Order) -> Result<(), StoreError> {
            let mut tx = self.pool.begin().await.map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

            sqlx::query(
                "INSERT INTO orders (id, customer_id, total_amount, delivery_date, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&order.id)
            .bind(&order.customer_id)
            .bind(order.total_amount)
            .bind(order.delivery_date)
            .bind(status_str(order.status))
            .bind(order.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if e.to_string().contains("duplicate key") {
                    StoreError::Duplicate(order.id.clone())
                } else {
                    StoreError::TransactionFailed(e.to_string())
                }
            })?;

            for item in &order.items {
                let specs = serde_json::to_value(&item.specifications).unwrap_or_default();
                sqlx::query(
                    "INSERT INTO order_items (order_id, product_id, quantity, unit_price, specifications) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&order.id)
                .bind(&item.product_id)
                .bind(item.quantity as i32)
                .bind(item.unit_price)
                .bind(specs)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;
            }

            tx.commit().await.map_err(|e| StoreError::TransactionFailed(e.to_string()))?;
            Ok(())
        }
    }

    #[async_trait]
    impl OrderStore for PostgresOrderStore {
        async fn save(&self, order: Order) -> Result<(), StoreError> {
            self.save_inner(order).await
        }

        async fn save_historical(&self, order: Order) -> Result<(), StoreError> {
            self.save_inner(order).await
        }

        async fn get(&self, id: &str) -> Result<Order, StoreError> {
            let header = sqlx::query(
                "SELECT id, customer_id, total_amount, delivery_date, status, created_at FROM orders WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            let items = sqlx::query(
                "SELECT product_id, quantity, unit_price, specifications FROM order_items WHERE order_id = $1",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .into_iter()
            .map(|row| OrderItem {
                product_id: row.get("product_id"),
                quantity: row.get::<i32, _>("quantity") as u32,
                unit_price: row.get("unit_price"),
                specifications: serde_json::from_value(row.get("specifications")).unwrap_or_default(),
            })
            .collect();

            Ok(Order {
                id: header.get("id"),
                customer_id: header.get("customer_id"),
                items,
                total_amount: header.get("total_amount"),
                delivery_date: header.get("delivery_date"),
                status: parse_status(header.get("status")),
                created_at: header.get("created_at"),
            })
        }

        async fn list(&self) -> Result<Vec<Order>, StoreError> {
            let rows = sqlx::query("SELECT id FROM orders ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut orders = Vec::with_capacity(rows.len());
            for row in rows {
                let id: String = row.get("id");
                orders.push(self.get(&id).await?);
            }
            Ok(orders)
        }
    }

    fn status_str(status: OrderStatus) -> &'static str {
        match status {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    fn parse_status(s: String) -> OrderStatus {
        match s.as_str() {
            "confirmed" => OrderStatus::Confirmed,
            "processing" => OrderStatus::Processing,
            "shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }
}
