//! Order aggregate, line items, and the event published at intake.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub specifications: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub delivery_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied shape for order creation. `id`, `status`, and `created_at`
/// are optional and defaulted by `into_order` — this is the intake
/// coordinator's validate-and-default step.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub id: Option<String>,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub delivery_date: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    pub fn into_order(self) -> Order {
        Order {
            id: self
                .id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            customer_id: self.customer_id,
            items: self.items,
            total_amount: self.total_amount,
            delivery_date: self.delivery_date,
            status: self.status.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// The event published to the main topic once an order is durably written.
/// Carries only the summary fields the legacy side needs to upsert its own
/// record — not the full line-item list (see DESIGN.md open question on
/// event payload shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: String,
    pub customer_id: String,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
}

impl OrderCreatedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            total_amount: order.total_amount,
            created_at: order.created_at,
            event_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> OrderItem {
        OrderItem { product_id: "sku-1".to_string(), quantity: 2, unit_price: 9.99, specifications: HashMap::new() }
    }

    #[test]
    fn into_order_synthesizes_missing_id() {
        let draft = NewOrder {
            id: None,
            customer_id: "c1".to_string(),
            items: vec![item()],
            total_amount: 19.98,
            delivery_date: Utc::now(),
            status: None,
            created_at: None,
        };
        let order = draft.into_order();
        assert!(!order.id.is_empty());
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn into_order_preserves_caller_supplied_id() {
        let draft = NewOrder {
            id: Some("order-42".to_string()),
            customer_id: "c1".to_string(),
            items: vec![item()],
            total_amount: 19.98,
            delivery_date: Utc::now(),
            status: Some(OrderStatus::Confirmed),
            created_at: None,
        };
        let order = draft.into_order();
        assert_eq!(order.id, "order-42");
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn blank_id_is_treated_as_missing() {
        let draft = NewOrder {
            id: Some("   ".to_string()),
            customer_id: "c1".to_string(),
            items: vec![item()],
            total_amount: 9.99,
            delivery_date: Utc::now(),
            status: None,
            created_at: None,
        };
        assert_ne!(draft.into_order().id, "   ");
    }

    #[test]
    fn event_carries_order_summary() {
        let order = NewOrder {
            id: Some("order-1".to_string()),
            customer_id: "c7".to_string(),
            items: vec![item()],
            total_amount: 19.98,
            delivery_date: Utc::now(),
            status: None,
            created_at: None,
        }
        .into_order();
        let event = OrderCreatedEvent::from_order(&order);
        assert_eq!(event.order_id, "order-1");
        assert_eq!(event.customer_id, "c7");
        assert_eq!(event.total_amount, 19.98);
    }
}
