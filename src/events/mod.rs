use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends without waiting for channel capacity; a full or closed channel is logged, not
    /// returned, so a committed operation never fails on delivery.
    pub fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(event) => {
                    warn!(event = event.name(), "event channel full; dropping event")
                }
                mpsc::error::TrySendError::Closed(event) => {
                    error!(event = event.name(), "event channel closed; dropping event")
                }
            }
        }
    }
}

/// Helper for services holding an optional sender.
pub fn emit(sender: &Option<EventSender>, event: Event) {
    if let Some(sender) = sender {
        sender.send_or_log(event);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    WorkOrderCreated {
        work_order_id: Uuid,
        item_code: String,
        quantity: i32,
        is_rework: bool,
    },
    WorkOrderUpdated(Uuid),
    WorkOrderCancelled(Uuid),
    WorkOrderDeleted(Uuid),
    UnitCompleted {
        work_order_id: Uuid,
        completed_quantity: i32,
        quantity: i32,
    },
    WorkOrderCompleted(Uuid),
    AssemblyOpened {
        assembly_id: Uuid,
        work_order_id: Uuid,
        serial_number: String,
    },
    PartScanned {
        assembly_id: Uuid,
        part_code: String,
        sensor_id: Option<i32>,
    },
    PartReplaced {
        assembly_id: Uuid,
        old_part_code: String,
        new_part_code: String,
    },
    AssemblyCompleted {
        assembly_id: Uuid,
        archive_id: Uuid,
        serial_number: String,
        next_unit: Option<Uuid>,
    },
    AssemblyRejected {
        assembly_id: Uuid,
        reason: String,
    },
    ComponentBarcodeUpdated {
        archive_id: Uuid,
        old_barcode: String,
        new_barcode: String,
    },
    ReworkOrderCreated {
        rework_order_id: Uuid,
        original_work_order_id: Option<Uuid>,
        source_assembly_id: Option<Uuid>,
    },
    PcbTypesInitialized(Vec<String>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::WorkOrderCreated { .. } => "work_order.created",
            Event::WorkOrderUpdated(_) => "work_order.updated",
            Event::WorkOrderCancelled(_) => "work_order.cancelled",
            Event::WorkOrderDeleted(_) => "work_order.deleted",
            Event::UnitCompleted { .. } => "work_order.unit_completed",
            Event::WorkOrderCompleted(_) => "work_order.completed",
            Event::AssemblyOpened { .. } => "assembly.opened",
            Event::PartScanned { .. } => "assembly.part_scanned",
            Event::PartReplaced { .. } => "assembly.part_replaced",
            Event::AssemblyCompleted { .. } => "assembly.completed",
            Event::AssemblyRejected { .. } => "assembly.rejected",
            Event::ComponentBarcodeUpdated { .. } => "archive.component_barcode_updated",
            Event::ReworkOrderCreated { .. } => "rework.created",
            Event::PcbTypesInitialized(_) => "pcb_types.initialized",
        }
    }
}

/// Drains the event channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::WorkOrderCompleted(id) => {
                info!(work_order_id = %id, "work order fully completed")
            }
            Event::AssemblyRejected {
                assembly_id,
                reason,
            } => warn!(%assembly_id, %reason, "assembly rejected"),
            Event::ReworkOrderCreated {
                rework_order_id,
                original_work_order_id,
                source_assembly_id,
            } => info!(
                %rework_order_id,
                ?original_work_order_id,
                ?source_assembly_id,
                "rework order created"
            ),
            other => info!(event = other.name(), payload = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}
