use async_trait::async_trait;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, Query},
    ActiveValue::Set,
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Select, TransactionTrait,
};
use std::{collections::HashMap, marker::PhantomData, sync::Arc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{row_offset, OrderRepository, Page};
use crate::{
    entities::{
        fulfillment_order::{self, Entity as OrderEntity},
        order_line_item::{self, Entity as LineItemEntity},
    },
    errors::ServiceError,
    models::{FulfillmentStatus, LineItem, Order, OrderParts},
    queries::OrderListQuery,
    services::{inventory::write_adjustments, InventoryAdjustment},
};

/// `LIKE` pattern matching `text` anywhere, with `%` and `_` taken literally.
fn contains_pattern(text: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape('\\')
}

/// Orders and their line items in `fulfillment_orders` / `order_line_items`.
pub struct SeaOrmOrderRepository<S> {
    db: Arc<DatabaseConnection>,
    owns_ledger: bool,
    _status: PhantomData<fn() -> S>,
}

impl<S> Clone for SeaOrmOrderRepository<S> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            owns_ledger: self.owns_ledger,
            _status: PhantomData,
        }
    }
}

impl<S: FulfillmentStatus> SeaOrmOrderRepository<S> {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            owns_ledger: false,
            _status: PhantomData,
        }
    }

    /// Writes inventory adjustments to the ledger tables in the same
    /// database, inside the order's save transaction.
    ///
    /// Only use this when the service's collaborator is the
    /// [`DbInventoryLedger`](crate::services::DbInventoryLedger) over the same
    /// connection; the collaborator is bypassed for these saves.
    pub fn with_inventory_ledger(mut self) -> Self {
        self.owns_ledger = true;
        self
    }

    fn kind() -> &'static str {
        S::KIND.as_str()
    }

    fn scoped() -> Select<OrderEntity> {
        OrderEntity::find().filter(fulfillment_order::Column::Kind.eq(Self::kind()))
    }

    fn terminal_names() -> Vec<String> {
        S::terminal_statuses()
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect()
    }

    fn apply_query(select: Select<OrderEntity>, query: &OrderListQuery) -> Select<OrderEntity> {
        use fulfillment_order::Column;

        match query {
            OrderListQuery::All => select,
            OrderListQuery::Search(text) => {
                let pattern = contains_pattern(&text.to_lowercase());
                select.filter(
                    Condition::any()
                        .add(
                            Expr::expr(Func::lower(Expr::col(Column::Reference)))
                                .like(pattern.clone()),
                        )
                        .add(
                            Expr::expr(Func::lower(Expr::col(Column::Counterparty)))
                                .like(pattern),
                        ),
                )
            }
            OrderListQuery::Status(status) => select.filter(Column::Status.eq(status.as_str())),
            OrderListQuery::Counterparty(name) => select.filter(
                Expr::expr(Func::lower(Expr::col(Column::Counterparty))).eq(name.to_lowercase()),
            ),
            OrderListQuery::Product(product_id) => select.filter(
                Column::Id.in_subquery(
                    Query::select()
                        .column(order_line_item::Column::OrderId)
                        .from(LineItemEntity)
                        .and_where(order_line_item::Column::ProductId.eq(*product_id))
                        .to_owned(),
                ),
            ),
            OrderListQuery::Overdue { today } => select
                .filter(Column::DueDate.lt(*today))
                .filter(Column::Status.is_not_in(Self::terminal_names())),
            OrderListQuery::Urgent { today, window_days } => select
                .filter(Column::DueDate.between(
                    *today,
                    OrderListQuery::urgent_until(*today, *window_days),
                ))
                .filter(Column::Status.is_not_in(Self::terminal_names())),
        }
    }

    fn to_domain(
        model: fulfillment_order::Model,
        items: Vec<order_line_item::Model>,
    ) -> Result<Order<S>, ServiceError> {
        let status = S::parse(&model.status).map_err(|_| {
            ServiceError::InternalError(format!(
                "Order {} has unknown stored status {}",
                model.id, model.status
            ))
        })?;

        let mut items = items;
        items.sort_by_key(|item| item.position);
        let line_items = items
            .into_iter()
            .map(|item| LineItem {
                id: item.id,
                product_id: item.product_id,
                ordered_quantity: item.ordered_quantity,
                fulfilled_quantity: item.fulfilled_quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Order::restore(OrderParts {
            id: model.id,
            reference: model.reference,
            counterparty: model.counterparty,
            status,
            order_date: model.order_date,
            due_date: model.due_date,
            last_fulfilled_on: model.last_fulfilled_on,
            cancelled_at: model.cancelled_at,
            line_items,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    fn header_model(order: &Order<S>, version: i32) -> fulfillment_order::ActiveModel {
        fulfillment_order::ActiveModel {
            id: Set(order.id),
            kind: Set(Self::kind().to_string()),
            reference: Set(order.reference.clone()),
            counterparty: Set(order.counterparty.clone()),
            status: Set(order.status().as_ref().to_string()),
            order_date: Set(order.order_date),
            due_date: Set(order.due_date),
            last_fulfilled_on: Set(order.last_fulfilled_on),
            cancelled_at: Set(order.cancelled_at()),
            version: Set(version),
            created_at: Set(order.created_at),
            updated_at: Set(order.updated_at),
        }
    }

    async fn write_line_items<C: ConnectionTrait>(
        conn: &C,
        order: &Order<S>,
    ) -> Result<(), ServiceError> {
        let models: Vec<order_line_item::ActiveModel> = order
            .line_items()
            .iter()
            .enumerate()
            .map(|(position, item)| order_line_item::ActiveModel {
                id: Set(item.id),
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                ordered_quantity: Set(item.ordered_quantity),
                fulfilled_quantity: Set(item.fulfilled_quantity),
                unit_price: Set(item.unit_price),
                position: Set(position as i32),
                created_at: Set(order.created_at),
            })
            .collect();

        if models.is_empty() {
            return Ok(());
        }
        LineItemEntity::insert_many(models)
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Version-guarded header update plus line item rewrite on `conn`.
    ///
    /// On a conflict nothing has been written; dropping the surrounding
    /// transaction rolls it back.
    async fn save_in<C: ConnectionTrait>(
        conn: &C,
        order: &Order<S>,
        expected_version: i32,
    ) -> Result<Order<S>, ServiceError> {
        use fulfillment_order::Column;

        let next_version = expected_version + 1;
        let result = OrderEntity::update_many()
            .set(Self::header_model(order, next_version))
            .filter(Column::Id.eq(order.id))
            .filter(Column::Kind.eq(Self::kind()))
            .filter(Column::Version.eq(expected_version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            let exists = Self::scoped()
                .filter(Column::Id.eq(order.id))
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?
                .is_some();
            return Err(if exists {
                debug!(order_id = %order.id, expected_version, "Version conflict on save");
                ServiceError::ConcurrentModification(order.id)
            } else {
                ServiceError::order_not_found(order.id)
            });
        }

        LineItemEntity::delete_many()
            .filter(order_line_item::Column::OrderId.eq(order.id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Self::write_line_items(conn, order).await?;

        let mut saved = order.clone();
        saved.set_version(next_version);
        Ok(saved)
    }

    async fn load_line_items(
        &self,
        order_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<order_line_item::Model>>, ServiceError> {
        let mut grouped: HashMap<Uuid, Vec<order_line_item::Model>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }
        let rows = LineItemEntity::find()
            .filter(order_line_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        for row in rows {
            grouped.entry(row.order_id).or_default().push(row);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl<S: FulfillmentStatus> OrderRepository<S> for SeaOrmOrderRepository<S> {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order<S>>, ServiceError> {
        let Some(model) = Self::scoped()
            .filter(fulfillment_order::Column::Id.eq(id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };

        let mut items = self.load_line_items(vec![id]).await?;
        let order = Self::to_domain(model, items.remove(&id).unwrap_or_default())?;
        Ok(Some(order))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert(&self, order: &Order<S>) -> Result<Order<S>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        OrderEntity::insert(Self::header_model(order, order.version()))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        Self::write_line_items(&txn, order).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(order.clone())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn save(
        &self,
        order: &Order<S>,
        expected_version: i32,
    ) -> Result<Order<S>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let saved = Self::save_in(&txn, order, expected_version).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(saved)
    }

    #[instrument(skip(self, order, adjustments), fields(order_id = %order.id, count = adjustments.len()))]
    async fn save_with_adjustments(
        &self,
        order: &Order<S>,
        expected_version: i32,
        adjustments: &[InventoryAdjustment],
    ) -> Result<Option<Order<S>>, ServiceError> {
        if !self.owns_ledger {
            return Ok(None);
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let saved = Self::save_in(&txn, order, expected_version).await?;
        if let Err(e) = write_adjustments(&txn, order.id, adjustments).await {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            warn!(order_id = %order.id, error = %e, "Inventory rejected adjustments; order save rolled back");
            return Err(match e {
                ServiceError::DatabaseError(e) => {
                    ServiceError::CollaboratorFailure(format!("inventory ledger write failed: {}", e))
                }
                other => other,
            });
        }
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(Some(saved))
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        query: &OrderListQuery,
        page: u64,
        per_page: u64,
    ) -> Result<Page<Order<S>>, ServiceError> {
        use fulfillment_order::Column;

        let mut select = Self::apply_query(Self::scoped(), query);
        select = if query.orders_by_due_date() {
            select.order_by_asc(Column::DueDate).order_by_asc(Column::Id)
        } else {
            select
                .order_by_desc(Column::OrderDate)
                .order_by_desc(Column::CreatedAt)
                .order_by_asc(Column::Id)
        };

        let per_page = per_page.max(1);
        row_offset(page, per_page)?;
        let paginator = select.paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let headers = paginator
            .fetch_page(page)
            .await
            .map_err(ServiceError::db_error)?;

        let mut items = self
            .load_line_items(headers.iter().map(|h| h.id).collect())
            .await?;
        let orders = headers
            .into_iter()
            .map(|header| {
                let lines = items.remove(&header.id).unwrap_or_default();
                Self::to_domain(header, lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items: orders,
            total,
            page,
            per_page,
        })
    }
}
