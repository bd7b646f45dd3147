use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db;

pub use crate::db::ticket::{Category, Id, Priority, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<db::Ticket> for Ticket {
    fn from(ticket: db::Ticket) -> Self {
        Self {
            id: ticket.id,
            title: ticket.title,
            description: ticket.description,
            category: ticket.category,
            priority: ticket.priority,
            status: ticket.status,
            created_at: ticket.created_at,
        }
    }
}

/// Aggregates over the whole ticket collection.
///
/// The breakdowns only carry values that actually occur; an absent key
/// means a count of zero.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Stats {
    pub total_tickets: u64,
    pub open_tickets: u64,
    pub avg_tickets_per_day: f64,
    pub priority_breakdown: BTreeMap<String, u64>,
    pub category_breakdown: BTreeMap<String, u64>,
}

/// Average ticket volume over the days the collection spans, rounded to
/// one decimal place. An empty collection averages to zero.
pub fn avg_tickets_per_day(
    total: u64,
    earliest: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> f64 {
    let Some(earliest) = earliest else {
        return 0.0;
    };
    let days = (now - earliest).whole_days() + 1;
    let avg = total as f64 / days as f64;
    (avg * 10.0).round() / 10.0
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Suggestion {
    pub suggested_category: String,
    pub suggested_priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
