//! ERP order lifecycle model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an ERP order, ordered by forward progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    TransferError,
    Placed,
    OrderOpen,
    UnderModification,
    SentToHub,
    Transferred,
    Shipped,
    Delivered,
    Invoiced,
    PaymentOverdue,
    Paid,
}

impl OrderState {
    pub const ALL: [Self; 11] = [
        Self::TransferError,
        Self::Placed,
        Self::OrderOpen,
        Self::UnderModification,
        Self::SentToHub,
        Self::Transferred,
        Self::Shipped,
        Self::Delivered,
        Self::Invoiced,
        Self::PaymentOverdue,
        Self::Paid,
    ];

    /// Forward-progress priority. `TransferError` sits below every real state.
    pub const fn priority(self) -> i8 {
        match self {
            Self::TransferError => -1,
            Self::Placed => 0,
            Self::OrderOpen => 1,
            Self::UnderModification => 2,
            Self::SentToHub => 3,
            Self::Transferred => 4,
            Self::Shipped => 5,
            Self::Delivered => 6,
            Self::Invoiced => 7,
            Self::PaymentOverdue => 8,
            Self::Paid => 9,
        }
    }

    /// Settled orders are never polled again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransferError => "transfer_error",
            Self::Placed => "placed",
            Self::OrderOpen => "order_open",
            Self::UnderModification => "under_modification",
            Self::SentToHub => "sent_to_hub",
            Self::Transferred => "transferred",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Invoiced => "invoiced",
            Self::PaymentOverdue => "payment_overdue",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown order state: {needle}"))
    }
}

/// Transport document and courier references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogisticsRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier: Option<String>,
}

/// Invoice and settlement references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_amount: Option<String>,
}

/// Lifecycle snapshot for one remote order, as returned by the batched lookup.
///
/// `state` stays a raw string here; see [`LifecycleSnapshot::order_state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSnapshot {
    pub state: String,
    #[serde(default)]
    pub erp_status: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub logistics: Option<LogisticsRefs>,
    #[serde(default)]
    pub billing: Option<BillingRefs>,
}

impl LifecycleSnapshot {
    /// Parsed state, or `None` for labels this build does not know.
    pub fn order_state(&self) -> Option<OrderState> {
        self.state.parse().ok()
    }

    /// Fields copied onto a record when this snapshot wins.
    pub fn details(&self) -> LifecycleDetails {
        LifecycleDetails {
            erp_status: self.erp_status.clone(),
            logistics: self.logistics.clone(),
            billing: self.billing.clone(),
        }
    }
}

/// Derived lifecycle fields stored on a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logistics: Option<LogisticsRefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingRefs>,
}
