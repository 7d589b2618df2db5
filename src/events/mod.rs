use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::{purchase_order::PurchaseOrderStatus, purchase_order_item::ItemStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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

    /// Sends an event for an operation that has already committed.
    /// A closed channel is logged, never surfaced to the caller.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(error) = self.send(event).await {
            warn!(%error, "domain event dropped");
        }
    }
}

/// Domain events emitted after a successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderStatusChanged {
        purchase_order_id: i64,
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
        user_id: i64,
    },
    PurchaseOrderUpdated {
        purchase_order_id: i64,
        user_id: i64,
    },
    PurchaseOrderDeleted {
        purchase_order_id: i64,
        items: u64,
        user_id: i64,
    },
    ItemStatusChanged {
        item_id: i64,
        from: ItemStatus,
        to: ItemStatus,
        user_id: i64,
    },
    ProgressRecorded {
        item_id: i64,
        warehouse_id: i64,
        qty_completed: i32,
        total_completed: i64,
        status: ItemStatus,
        user_id: i64,
    },
    ProductionTransferred {
        item_id: i64,
        from_warehouse_id: i64,
        to_warehouse_id: i64,
        qty: i64,
        user_id: i64,
    },
    DeliveryNoteCreated {
        delivery_note_id: i64,
        purchase_order_id: i64,
        note_number: String,
        total_qty_shipped: i64,
    },
    DocumentationUploaded {
        delivery_note_id: i64,
        files: usize,
        user_id: i64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PurchaseOrderStatusChanged { .. } => "purchase_order.status_changed",
            Event::PurchaseOrderUpdated { .. } => "purchase_order.updated",
            Event::PurchaseOrderDeleted { .. } => "purchase_order.deleted",
            Event::ItemStatusChanged { .. } => "purchase_order_item.status_changed",
            Event::ProgressRecorded { .. } => "production.progress_recorded",
            Event::ProductionTransferred { .. } => "production.transferred",
            Event::DeliveryNoteCreated { .. } => "delivery_note.created",
            Event::DocumentationUploaded { .. } => "delivery_note.documentation_uploaded",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), %payload, "domain event"),
            Err(error) => warn!(event = event.name(), %error, "failed to serialize event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_the_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let event = Event::ProductionTransferred {
            item_id: 1,
            from_warehouse_id: 2,
            to_warehouse_id: 3,
            qty: 20,
            user_id: 9,
        };
        sender.send(event.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn closed_channel_does_not_fail_the_caller() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::DocumentationUploaded {
                delivery_note_id: 1,
                files: 1,
                user_id: 1,
                at: Utc::now(),
            })
            .await
            .is_err());
        sender
            .send_or_log(Event::DeliveryNoteCreated {
                delivery_note_id: 1,
                purchase_order_id: 1,
                note_number: "01/1/01/I/SJ-LR/2025".into(),
                total_qty_shipped: 5,
            })
            .await;
    }

    #[tokio::test]
    async fn processor_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        tx.send(Event::PurchaseOrderStatusChanged {
            purchase_order_id: 1,
            from: PurchaseOrderStatus::Draft,
            to: PurchaseOrderStatus::Approved,
            user_id: 1,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
