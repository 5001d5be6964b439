use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{FulfillmentStatus, Order},
};

/// Due-date based list views.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ViewMode {
    #[default]
    All,
    Overdue,
    Urgent,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FilterType {
    Status,
    /// Supplier or customer name.
    Counterparty,
    Product,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    pub filter_type: FilterType,
    pub value: String,
}

impl ListFilter {
    pub fn new(filter_type: FilterType, value: impl Into<String>) -> Self {
        Self {
            filter_type,
            value: value.into(),
        }
    }
}

/// Everything the order list screen can be asked to show.
///
/// Only one criterion is ever sent to the store: see [`ListQueryState::resolve`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQueryState {
    search_text: Option<String>,
    active_filter: Option<ListFilter>,
    view_mode: ViewMode,
    page: u64,
}

impl ListQueryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from already-decoded request parameters.
    pub fn from_parts(
        search_text: Option<String>,
        active_filter: Option<ListFilter>,
        view_mode: ViewMode,
        page: u64,
    ) -> Self {
        Self {
            search_text: search_text.filter(|text| !text.trim().is_empty()),
            active_filter,
            view_mode,
            page,
        }
    }

    pub fn search_text(&self) -> Option<&str> {
        self.search_text.as_deref()
    }

    pub fn active_filter(&self) -> Option<&ListFilter> {
        self.active_filter.as_ref()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    /// Blank text clears the search.
    pub fn submit_search(&mut self, text: &str) {
        let trimmed = text.trim();
        self.search_text = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.active_filter = None;
        self.view_mode = ViewMode::All;
        self.page = 0;
    }

    pub fn select_filter(&mut self, filter: ListFilter) {
        self.active_filter = Some(filter);
        self.search_text = None;
        self.page = 0;
    }

    pub fn clear_filter(&mut self) {
        self.active_filter = None;
        self.page = 0;
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        self.page = 0;
    }

    pub fn set_page(&mut self, page: u64) {
        self.page = page;
    }

    /// Search beats filter, filter beats a due-date view.
    pub fn resolve(&self) -> ListRequest {
        let page = self.page;
        if let Some(text) = &self.search_text {
            return ListRequest::Search {
                text: text.clone(),
                page,
            };
        }
        if let Some(filter) = &self.active_filter {
            return ListRequest::Filter {
                filter: filter.clone(),
                page,
            };
        }
        match self.view_mode {
            ViewMode::All => ListRequest::Default { page },
            mode => ListRequest::View { mode, page },
        }
    }
}

/// The single list request a state resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListRequest {
    Search { text: String, page: u64 },
    Filter { filter: ListFilter, page: u64 },
    View { mode: ViewMode, page: u64 },
    Default { page: u64 },
}

impl ListRequest {
    pub fn page(&self) -> u64 {
        match self {
            ListRequest::Search { page, .. }
            | ListRequest::Filter { page, .. }
            | ListRequest::View { page, .. }
            | ListRequest::Default { page } => *page,
        }
    }

    /// Turns the request into a store query for orders of status type `S`.
    ///
    /// Filter values are checked here: status names must belong to `S`,
    /// product filters must be UUIDs.
    pub fn to_query<S: FulfillmentStatus>(
        &self,
        today: NaiveDate,
        urgent_window_days: i64,
    ) -> Result<OrderListQuery, ServiceError> {
        Ok(match self {
            ListRequest::Default { .. } | ListRequest::View { mode: ViewMode::All, .. } => {
                OrderListQuery::All
            }
            ListRequest::Search { text, .. } => OrderListQuery::Search(text.trim().to_string()),
            ListRequest::Filter { filter, .. } => match filter.filter_type {
                FilterType::Status => {
                    let status = S::parse(&filter.value)?;
                    OrderListQuery::Status(status.as_ref().to_string())
                }
                FilterType::Counterparty => {
                    OrderListQuery::Counterparty(filter.value.trim().to_string())
                }
                FilterType::Product => {
                    let product_id = Uuid::parse_str(filter.value.trim()).map_err(|_| {
                        ServiceError::ValidationError(format!(
                            "Product filter must be a UUID: {}",
                            filter.value
                        ))
                    })?;
                    OrderListQuery::Product(product_id)
                }
            },
            ListRequest::View {
                mode: ViewMode::Overdue,
                ..
            } => OrderListQuery::Overdue { today },
            ListRequest::View {
                mode: ViewMode::Urgent,
                ..
            } => OrderListQuery::Urgent {
                today,
                window_days: urgent_window_days,
            },
        })
    }
}

/// Store-level list criterion. Exactly one applies per list call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderListQuery {
    All,
    /// Case-insensitive substring of reference or counterparty.
    Search(String),
    /// Canonical status name.
    Status(String),
    /// Case-insensitive counterparty name.
    Counterparty(String),
    Product(Uuid),
    Overdue { today: NaiveDate },
    Urgent { today: NaiveDate, window_days: i64 },
}

impl OrderListQuery {
    /// Due-date views list the most pressing orders first.
    pub fn orders_by_due_date(&self) -> bool {
        matches!(self, OrderListQuery::Overdue { .. } | OrderListQuery::Urgent { .. })
    }

    /// Last due date still counted as urgent.
    pub fn urgent_until(today: NaiveDate, window_days: i64) -> NaiveDate {
        today + Duration::days(window_days)
    }

    pub fn matches<S: FulfillmentStatus>(&self, order: &Order<S>) -> bool {
        match self {
            OrderListQuery::All => true,
            OrderListQuery::Search(text) => {
                let needle = text.to_lowercase();
                order.reference.to_lowercase().contains(&needle)
                    || order
                        .counterparty
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(&needle))
            }
            OrderListQuery::Status(status) => order.status().as_ref() == status,
            OrderListQuery::Counterparty(name) => order
                .counterparty
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(name)),
            OrderListQuery::Product(product_id) => order
                .line_items()
                .iter()
                .any(|item| item.product_id == *product_id),
            OrderListQuery::Overdue { today } => order.is_overdue(*today),
            OrderListQuery::Urgent { today, window_days } => order.is_urgent(*today, *window_days),
        }
    }
}
