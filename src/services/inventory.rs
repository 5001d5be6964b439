use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, EntityTrait,
    QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{inventory_adjustment, inventory_level},
    errors::ServiceError,
    models::OrderKind,
};

/// What an adjustment does to a product's stock counters.
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
pub enum AdjustmentDirection {
    /// Quantity physically moved (received or shipped).
    Consume,
    /// Outstanding expectation dropped (cancel, line removal).
    Release,
    /// New expectation recorded (line added).
    Reserve,
}

/// Instruction handed to the inventory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub order_kind: OrderKind,
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    /// Always positive.
    pub quantity: i32,
    pub direction: AdjustmentDirection,
}

impl InventoryAdjustment {
    pub fn consume(order_kind: OrderKind, line_item_id: Uuid, product_id: Uuid, quantity: i32) -> Self {
        Self {
            order_kind,
            line_item_id,
            product_id,
            quantity,
            direction: AdjustmentDirection::Consume,
        }
    }

    pub fn release(order_kind: OrderKind, line_item_id: Uuid, product_id: Uuid, quantity: i32) -> Self {
        Self {
            order_kind,
            line_item_id,
            product_id,
            quantity,
            direction: AdjustmentDirection::Release,
        }
    }

    pub fn reserve(order_kind: OrderKind, line_item_id: Uuid, product_id: Uuid, quantity: i32) -> Self {
        Self {
            order_kind,
            line_item_id,
            product_id,
            quantity,
            direction: AdjustmentDirection::Reserve,
        }
    }
}

/// Downstream system that keeps stock counts in line with order progress.
///
/// A batch is applied completely or not at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryCollaborator: Send + Sync {
    async fn apply_adjustments(
        &self,
        order_id: Uuid,
        adjustments: &[InventoryAdjustment],
    ) -> Result<(), ServiceError>;
}

/// Per-product stock counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockLevel {
    pub on_hand: i32,
    pub reserved: i32,
    pub incoming: i32,
}

impl StockLevel {
    /// Counters after `adjustment`, or why it cannot be applied.
    pub fn apply(self, adjustment: &InventoryAdjustment) -> Result<StockLevel, String> {
        let quantity = adjustment.quantity;
        if quantity <= 0 {
            return Err(format!(
                "Adjustment for product {} must have a positive quantity",
                adjustment.product_id
            ));
        }

        let mut next = self;
        match (adjustment.order_kind, adjustment.direction) {
            (OrderKind::Purchase, AdjustmentDirection::Consume) => {
                next.incoming = (next.incoming - quantity).max(0);
                next.on_hand = raise(next.on_hand, quantity, "on hand", adjustment)?;
            }
            (OrderKind::Purchase, AdjustmentDirection::Release) => {
                next.incoming = (next.incoming - quantity).max(0);
            }
            (OrderKind::Purchase, AdjustmentDirection::Reserve) => {
                next.incoming = raise(next.incoming, quantity, "incoming", adjustment)?;
            }
            (OrderKind::Sales, AdjustmentDirection::Reserve) => {
                next.reserved = raise(next.reserved, quantity, "reserved", adjustment)?;
            }
            (OrderKind::Sales, AdjustmentDirection::Consume) => {
                if next.on_hand < quantity {
                    return Err(format!(
                        "Insufficient stock for product {}: on hand {}, requested {}",
                        adjustment.product_id, next.on_hand, quantity
                    ));
                }
                next.on_hand -= quantity;
                next.reserved = (next.reserved - quantity).max(0);
            }
            (OrderKind::Sales, AdjustmentDirection::Release) => {
                next.reserved = (next.reserved - quantity).max(0);
            }
        }
        Ok(next)
    }
}

fn raise(
    counter: i32,
    quantity: i32,
    name: &str,
    adjustment: &InventoryAdjustment,
) -> Result<i32, String> {
    counter.checked_add(quantity).ok_or_else(|| {
        format!(
            "Stock counter {} for product {} would overflow: {} + {}",
            name, adjustment.product_id, counter, quantity
        )
    })
}

/// Applies a whole batch to a snapshot of the affected levels.
fn apply_batch(
    mut levels: HashMap<Uuid, StockLevel>,
    adjustments: &[InventoryAdjustment],
) -> Result<HashMap<Uuid, StockLevel>, String> {
    for adjustment in adjustments {
        let current = levels.get(&adjustment.product_id).copied().unwrap_or_default();
        let next = current.apply(adjustment)?;
        levels.insert(adjustment.product_id, next);
    }
    Ok(levels)
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub order_id: Uuid,
    pub adjustment: InventoryAdjustment,
}

#[derive(Default)]
struct LedgerState {
    levels: HashMap<Uuid, StockLevel>,
    journal: Vec<JournalEntry>,
}

/// Process-local ledger.
#[derive(Default, Clone)]
pub struct InMemoryInventoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, product_id: Uuid, level: StockLevel) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        state.levels.insert(product_id, level);
        Ok(())
    }

    pub fn level(&self, product_id: Uuid) -> Result<StockLevel, ServiceError> {
        let state = self.lock()?;
        Ok(state.levels.get(&product_id).copied().unwrap_or_default())
    }

    pub fn journal(&self) -> Result<Vec<JournalEntry>, ServiceError> {
        Ok(self.lock()?.journal.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, ServiceError> {
        self.state
            .lock()
            .map_err(|_| ServiceError::InternalError("inventory ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl InventoryCollaborator for InMemoryInventoryLedger {
    async fn apply_adjustments(
        &self,
        order_id: Uuid,
        adjustments: &[InventoryAdjustment],
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;

        let snapshot: HashMap<Uuid, StockLevel> = adjustments
            .iter()
            .map(|a| {
                (
                    a.product_id,
                    state.levels.get(&a.product_id).copied().unwrap_or_default(),
                )
            })
            .collect();

        let updated = apply_batch(snapshot, adjustments).map_err(ServiceError::CollaboratorFailure)?;

        state.levels.extend(updated);
        state.journal.extend(adjustments.iter().cloned().map(|adjustment| JournalEntry {
            order_id,
            adjustment,
        }));
        debug!(%order_id, count = adjustments.len(), "Applied inventory adjustments");
        Ok(())
    }
}

/// Ledger persisted in `inventory_levels` and `inventory_adjustments`.
#[derive(Clone)]
pub struct DbInventoryLedger {
    db: Arc<DatabaseConnection>,
}

impl DbInventoryLedger {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn level(&self, product_id: Uuid) -> Result<StockLevel, ServiceError> {
        let row = inventory_level::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(row
            .map(|r| StockLevel {
                on_hand: r.on_hand,
                reserved: r.reserved,
                incoming: r.incoming,
            })
            .unwrap_or_default())
    }

    pub async fn set_level(&self, product_id: Uuid, level: StockLevel) -> Result<(), ServiceError> {
        let db = &*self.db;
        let existing = inventory_level::Entity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;
        let model = inventory_level::ActiveModel {
            product_id: Set(product_id),
            on_hand: Set(level.on_hand),
            reserved: Set(level.reserved),
            incoming: Set(level.incoming),
            updated_at: Set(Utc::now()),
        };
        if existing.is_some() {
            model.update(db).await.map_err(ServiceError::db_error)?;
        } else {
            model.insert(db).await.map_err(ServiceError::db_error)?;
        }
        Ok(())
    }

    async fn apply_in_transaction(
        &self,
        order_id: Uuid,
        adjustments: &[InventoryAdjustment],
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        write_adjustments(&txn, order_id, adjustments).await?;
        txn.commit().await.map_err(ServiceError::db_error)
    }
}

/// Applies `adjustments` to the ledger tables on `conn`, which should be an
/// open transaction.
///
/// Each affected level row is read with `SELECT ... FOR UPDATE`, in product
/// order, so concurrent batches on the same product serialize instead of
/// overwriting each other. A batch the counters cannot absorb fails with
/// `CollaboratorFailure` before anything is written.
pub(crate) async fn write_adjustments<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    adjustments: &[InventoryAdjustment],
) -> Result<(), ServiceError> {
    let products: BTreeSet<Uuid> = adjustments.iter().map(|a| a.product_id).collect();

    let mut snapshot = HashMap::new();
    let mut existing = HashSet::new();
    for product_id in products {
        let row = inventory_level::Entity::find_by_id(product_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let level = row
            .as_ref()
            .map(|r| StockLevel {
                on_hand: r.on_hand,
                reserved: r.reserved,
                incoming: r.incoming,
            })
            .unwrap_or_default();
        if row.is_some() {
            existing.insert(product_id);
        }
        snapshot.insert(product_id, level);
    }

    let updated = apply_batch(snapshot, adjustments).map_err(ServiceError::CollaboratorFailure)?;

    let now = Utc::now();
    for (product_id, level) in updated {
        let model = inventory_level::ActiveModel {
            product_id: Set(product_id),
            on_hand: Set(level.on_hand),
            reserved: Set(level.reserved),
            incoming: Set(level.incoming),
            updated_at: Set(now),
        };
        if existing.contains(&product_id) {
            model.update(conn).await.map_err(ServiceError::db_error)?;
        } else {
            model.insert(conn).await.map_err(ServiceError::db_error)?;
        }
    }

    for adjustment in adjustments {
        inventory_adjustment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            order_kind: Set(adjustment.order_kind.to_string()),
            line_item_id: Set(adjustment.line_item_id),
            product_id: Set(adjustment.product_id),
            direction: Set(adjustment.direction.to_string()),
            quantity: Set(adjustment.quantity),
            created_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
    }

    debug!(%order_id, count = adjustments.len(), "Wrote inventory adjustments");
    Ok(())
}

#[async_trait]
impl InventoryCollaborator for DbInventoryLedger {
    #[instrument(skip(self, adjustments), fields(count = adjustments.len()))]
    async fn apply_adjustments(
        &self,
        order_id: Uuid,
        adjustments: &[InventoryAdjustment],
    ) -> Result<(), ServiceError> {
        match self.apply_in_transaction(order_id, adjustments).await {
            Ok(()) => {
                info!(%order_id, "Inventory adjustments committed");
                Ok(())
            }
            Err(ServiceError::DatabaseError(e)) => {
                error!(%order_id, error = %e, "Inventory ledger write failed");
                Err(ServiceError::CollaboratorFailure(format!(
                    "inventory ledger write failed: {}",
                    e
                )))
            }
            Err(e) => Err(e),
        }
    }
}
