use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::OrderKind;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// One line's share of a recorded fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilledLine {
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Facts published after an order change has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FulfillmentRecorded {
        kind: OrderKind,
        order_id: Uuid,
        lines: Vec<FulfilledLine>,
        fulfilled_on: Option<NaiveDate>,
    },
    OrderStatusChanged {
        kind: OrderKind,
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        kind: OrderKind,
        order_id: Uuid,
        released_quantity: i64,
    },
    LineItemsAdded {
        order_id: Uuid,
        line_item_ids: Vec<Uuid>,
    },
    LineItemRemoved {
        order_id: Uuid,
        line_item_id: Uuid,
    },
}

impl Event {
    pub fn order_id(&self) -> Uuid {
        match self {
            Event::FulfillmentRecorded { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::OrderCancelled { order_id, .. }
            | Event::LineItemsAdded { order_id, .. }
            | Event::LineItemRemoved { order_id, .. } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::FulfillmentRecorded { .. } => "fulfillment_recorded",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::LineItemsAdded { .. } => "line_items_added",
            Event::LineItemRemoved { .. } => "line_item_removed",
        }
    }
}

// Handlers implementing this trait process events off the request path.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Writes every event to the log.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        match event {
            Event::FulfillmentRecorded {
                kind,
                order_id,
                lines,
                ..
            } => {
                let total: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
                info!(%kind, %order_id, lines = lines.len(), total, "Fulfillment recorded");
            }
            Event::OrderStatusChanged {
                kind,
                order_id,
                old_status,
                new_status,
            } => {
                info!(%kind, %order_id, %old_status, %new_status, "Order status changed");
            }
            Event::OrderCancelled {
                kind,
                order_id,
                released_quantity,
            } => {
                info!(%kind, %order_id, released_quantity, "Order cancelled");
            }
            Event::LineItemsAdded {
                order_id,
                line_item_ids,
            } => {
                info!(%order_id, count = line_item_ids.len(), "Line items added");
            }
            Event::LineItemRemoved {
                order_id,
                line_item_id,
            } => {
                info!(%order_id, %line_item_id, "Line item removed");
            }
        }
        Ok(())
    }
}

/// Drains the channel, handing each event to the logging handler.
pub async fn process_events(rx: mpsc::Receiver<Event>) {
    process_events_with(rx, vec![Arc::new(LoggingEventHandler)]).await
}

/// Drains the channel, handing each event to every handler in order.
pub async fn process_events_with(
    mut rx: mpsc::Receiver<Event>,
    handlers: Vec<Arc<dyn EventHandler>>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(
                    event = event.name(),
                    order_id = %event.order_id(),
                    "Failed to handle event: {}",
                    e
                );
            }
        }
    }

    warn!("Event processing loop has ended");
}
