use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Which side of the business an order belongs to.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderKind {
    Purchase,
    Sales,
}

impl OrderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderKind::Purchase => "purchase",
            OrderKind::Sales => "sales",
        }
    }
}

/// Status model shared by both order instantiations.
///
/// The engine only ever asks a status type for its well-known states, so the
/// purchase and sales flows run through the same reconciliation code.
pub trait FulfillmentStatus:
    Copy
    + Eq
    + fmt::Debug
    + fmt::Display
    + FromStr
    + AsRef<str>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: OrderKind;
    /// Status a freshly created order starts in.
    const OPEN: Self;
    const PARTIALLY_FULFILLED: Self;
    const FULFILLED: Self;
    const CANCELLED: Self;
    /// Set by external systems only; never produced by the engine.
    const FAILED: Self;

    fn terminal_statuses() -> &'static [Self];

    fn is_terminal(&self) -> bool {
        Self::terminal_statuses().contains(self)
    }

    /// Lenient parse: accepts `partially_received`, `PARTIALLY-RECEIVED`, etc.
    fn parse(value: &str) -> Result<Self, ServiceError> {
        let normalized = value.trim().replace('-', "_").to_ascii_uppercase();
        normalized.parse::<Self>().map_err(|_| {
            ServiceError::ValidationError(format!(
                "Unknown {} order status: {}",
                Self::KIND,
                value
            ))
        })
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    AwaitingApproval,
    Pending,
    PartiallyReceived,
    Received,
    Cancelled,
    Failed,
}

impl FulfillmentStatus for PurchaseOrderStatus {
    const KIND: OrderKind = OrderKind::Purchase;
    const OPEN: Self = Self::AwaitingApproval;
    const PARTIALLY_FULFILLED: Self = Self::PartiallyReceived;
    const FULFILLED: Self = Self::Received;
    const CANCELLED: Self = Self::Cancelled;
    const FAILED: Self = Self::Failed;

    fn terminal_statuses() -> &'static [Self] {
        &[Self::Received, Self::Cancelled, Self::Failed]
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesOrderStatus {
    Pending,
    AwaitingApproval,
    PartiallyApproved,
    Completed,
    Cancelled,
    Failed,
}

impl FulfillmentStatus for SalesOrderStatus {
    const KIND: OrderKind = OrderKind::Sales;
    const OPEN: Self = Self::Pending;
    const PARTIALLY_FULFILLED: Self = Self::PartiallyApproved;
    const FULFILLED: Self = Self::Completed;
    const CANCELLED: Self = Self::Cancelled;
    const FAILED: Self = Self::Failed;

    fn terminal_statuses() -> &'static [Self] {
        &[Self::Completed, Self::Cancelled, Self::Failed]
    }
}
