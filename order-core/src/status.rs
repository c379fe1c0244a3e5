use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LabOrder, OrderAction, OrderId};

/// Lifecycle status reported for a lab order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Completed,
    Revoked,
    Unknown,
}

/// The four facts the status depends on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderFacts {
    pub activated: bool,
    pub past_stop_date: bool,
    pub past_auto_expire_date: bool,
    pub is_discontinue_action: bool,
}

impl OrderFacts {
    /// Facts of `order` as seen at `now`. Dates must be strictly before `now`
    /// to count as passed.
    pub fn at(order: &LabOrder, now: DateTime<Utc>) -> Self {
        Self {
            activated: order.date_activated.is_some_and(|activated| activated <= now),
            past_stop_date: order.date_stopped.is_some_and(|stopped| now > stopped),
            past_auto_expire_date: order.auto_expire_date.is_some_and(|expiry| now > expiry),
            is_discontinue_action: order.action == OrderAction::Discontinue,
        }
    }

    pub fn resolve(self) -> OrderStatus {
        let completed = self.activated && (self.past_stop_date || self.past_auto_expire_date);
        let discontinued = self.activated && self.is_discontinue_action;

        match (completed, discontinued) {
            (true, true) => OrderStatus::Unknown,
            (false, true) => OrderStatus::Revoked,
            (true, false) => OrderStatus::Completed,
            (false, false) => OrderStatus::Active,
        }
    }
}

/// Relation between an order and the one it follows up on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "relation", content = "order", rename_all = "snake_case")]
pub enum Lineage {
    None,
    Replaces(OrderId),
    BasedOn(OrderId),
}

impl Lineage {
    pub fn of(order: &LabOrder) -> Self {
        let Some(previous) = order.previous_order.clone() else {
            return Self::None;
        };
        match order.action {
            OrderAction::Discontinue | OrderAction::Revise => Self::Replaces(previous),
            OrderAction::Renew => Self::BasedOn(previous),
            OrderAction::New => Self::None,
        }
    }
}
