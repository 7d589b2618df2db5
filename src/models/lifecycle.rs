//! Purchase order state machine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;

use crate::{entities::purchase_order::PurchaseOrderStatus, errors::ServiceError};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseOrderAction {
    Approve,
    StartProduction,
    CompleteProduction,
    Cancel,
    Reactivate,
    Close,
}

impl PurchaseOrderAction {
    /// States the action may be taken from.
    pub fn sources(self) -> &'static [PurchaseOrderStatus] {
        use PurchaseOrderStatus::*;
        match self {
            Self::Approve => &[Draft],
            Self::StartProduction => &[Approved],
            Self::CompleteProduction => &[InProduction],
            Self::Cancel => &[Draft, Approved, InProduction],
            Self::Reactivate => &[Cancelled],
            Self::Close => &[InProduction, Completed],
        }
    }

    pub fn target(self) -> PurchaseOrderStatus {
        match self {
            Self::Approve => PurchaseOrderStatus::Approved,
            Self::StartProduction => PurchaseOrderStatus::InProduction,
            Self::CompleteProduction => PurchaseOrderStatus::Completed,
            Self::Cancel => PurchaseOrderStatus::Cancelled,
            Self::Reactivate => PurchaseOrderStatus::Draft,
            Self::Close => PurchaseOrderStatus::Closed,
        }
    }

    pub fn allowed_from(self, status: PurchaseOrderStatus) -> bool {
        self.sources().contains(&status)
    }

    /// Error naming the state(s) the action requires.
    pub fn invalid_from(self, status: PurchaseOrderStatus) -> ServiceError {
        let required = self
            .sources()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        ServiceError::InvalidTransition(format!(
            "cannot {} a purchase order in status {}; status must be {}",
            self, status, required
        ))
    }
}

/// Returns the target state when `action` is legal from `current`.
pub fn check_transition(
    current: PurchaseOrderStatus,
    action: PurchaseOrderAction,
) -> Result<PurchaseOrderStatus, ServiceError> {
    if action.allowed_from(current) {
        Ok(action.target())
    } else {
        Err(action.invalid_from(current))
    }
}

/// Actions offered for a purchase order in `status`.
///
/// Completion is only offered once no item is pending or in progress.
pub fn available_actions(status: PurchaseOrderStatus, can_complete: bool) -> Vec<PurchaseOrderAction> {
    PurchaseOrderAction::iter()
        .filter(|action| action.allowed_from(status))
        .filter(|action| *action != PurchaseOrderAction::CompleteProduction || can_complete)
        .collect()
}
