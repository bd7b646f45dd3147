use std::{error::Error as StdError, str};

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};

use super::Client;

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    pub created_at: OffsetDateTime,
}

/// Ticket fields supplied by the caller; the store assigns the `id`.
#[derive(Clone, Debug)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    pub created_at: OffsetDateTime,
}

/// Store-assigned sequential identifier, never reused.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq,
    Serialize,
)]
pub struct Id(i64);

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

/// Returned when a textual filter value names no known enum member.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownValue;

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    Billing = 1,
    Technical = 2,
    Account = 3,
    General = 4,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Technical => "technical",
            Self::Account => "account",
            Self::General => "general",
        }
    }
}

impl str::FromStr for Category {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "billing" => Ok(Self::Billing),
            "technical" => Ok(Self::Technical),
            "account" => Ok(Self::Account),
            "general" => Ok(Self::General),
            _ => Err(UnknownValue),
        }
    }
}

impl FromSql<'_> for Category {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let category =
            Self::try_from(repr).map_err(|_| "invalid category")?;
        Ok(category)
    }
}

impl ToSql for Category {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl str::FromStr for Priority {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(UnknownValue),
        }
    }
}

impl FromSql<'_> for Priority {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let priority =
            Self::try_from(repr).map_err(|_| "invalid priority")?;
        Ok(priority)
    }
}

impl ToSql for Priority {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    /// Every ticket starts out open.
    Open = 1,

    /// An agent has picked the ticket up.
    InProgress = 2,

    /// The underlying issue is fixed.
    Resolved = 3,

    /// No further action will be taken.
    Closed = 4,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl str::FromStr for Status {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(UnknownValue),
        }
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Optional constraints on a ticket listing.
///
/// Each present field contributes one exact-match condition; `search`
/// contributes a case-insensitive substring match over `title` or
/// `description`. All conditions combine with `AND`. An empty filter
/// matches every ticket.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub search: Option<String>,
}

fn list_sql(filter: &Filter) -> String {
    let mut placeholder = 0;
    let mut next = || {
        placeholder += 1;
        placeholder
    };

    let mut conditions = Vec::new();
    if filter.category.is_some() {
        conditions.push(format!("category = ${}", next()));
    }
    if filter.priority.is_some() {
        conditions.push(format!("priority = ${}", next()));
    }
    if filter.status.is_some() {
        conditions.push(format!("status = ${}", next()));
    }
    if filter.search.is_some() {
        let n = next();
        conditions
            .push(format!("(title ILIKE ${n} OR description ILIKE ${n})"));
    }

    let mut sql = String::from(
        "SELECT id, title, description, category, priority, status, \
         created_at FROM tickets",
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    // Newest first; equal timestamps fall back to insertion order.
    sql.push_str(" ORDER BY created_at DESC, id ASC");
    sql
}

fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Client {
    pub async fn get_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, title, description, category, priority, status, \
                   created_at \
            FROM tickets \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(|row| Ticket {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            category: row.get("category"),
            priority: row.get("priority"),
            status: row.get("status"),
            created_at: row.get("created_at"),
        }))
    }

    pub async fn insert_ticket(
        &self,
        ticket: NewTicket,
    ) -> Result<Ticket, Error> {
        const SQL: &str = "\
            INSERT INTO tickets (title, description, category, priority, \
                                 status, created_at) \
            VALUES ($1, $2, $3, $4, $5, $6) \
            RETURNING id";
        let row = self
            .0
            .query_one(
                SQL,
                &[
                    &ticket.title,
                    &ticket.description,
                    &ticket.category,
                    &ticket.priority,
                    &ticket.status,
                    &ticket.created_at,
                ],
            )
            .await?;
        Ok(Ticket {
            id: row.get("id"),
            title: ticket.title,
            description: ticket.description,
            category: ticket.category,
            priority: ticket.priority,
            status: ticket.status,
            created_at: ticket.created_at,
        })
    }

    pub async fn update_ticket(&self, ticket: &Ticket) -> Result<(), Error> {
        // `created_at` is immutable after insertion.
        const SQL: &str = "\
            UPDATE tickets \
            SET title = $2, \
                description = $3, \
                category = $4, \
                priority = $5, \
                status = $6 \
            WHERE id = $1";
        self.0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.title,
                    &ticket.description,
                    &ticket.category,
                    &ticket.priority,
                    &ticket.status,
                ],
            )
            .await
            .map(drop)
    }

    pub async fn get_tickets(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Ticket>, Error> {
        let pattern = filter.search.as_deref().map(like_pattern);

        // Bound in the field order `list_sql` assigns placeholders.
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(category) = &filter.category {
            params.push(category);
        }
        if let Some(priority) = &filter.priority {
            params.push(priority);
        }
        if let Some(status) = &filter.status {
            params.push(status);
        }
        if let Some(pattern) = &pattern {
            params.push(pattern);
        }

        let sql = list_sql(filter);
        Ok(self
            .0
            .query(sql.as_str(), &params)
            .await?
            .into_iter()
            .map(|row| Ticket {
                id: row.get("id"),
                title: row.get("title"),
                description: row.get("description"),
                category: row.get("category"),
                priority: row.get("priority"),
                status: row.get("status"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn get_tickets_count(&self) -> Result<u64, Error> {
        const SQL: &str = "SELECT COUNT(*) FROM tickets";
        Ok(self
            .0
            .query_one(SQL, &[])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap())
    }

    pub async fn get_tickets_count_with_status(
        &self,
        status: Status,
    ) -> Result<u64, Error> {
        const SQL: &str = "SELECT COUNT(*) FROM tickets WHERE status = $1";
        Ok(self
            .0
            .query_one(SQL, &[&status])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap())
    }

    pub async fn get_earliest_created_at(
        &self,
    ) -> Result<Option<OffsetDateTime>, Error> {
        const SQL: &str = "SELECT MIN(created_at) FROM tickets";
        Ok(self.0.query_one(SQL, &[]).await?.get(0))
    }

    pub async fn get_priority_counts(
        &self,
    ) -> Result<Vec<(Priority, u64)>, Error> {
        const SQL: &str = "\
            SELECT priority, COUNT(*) \
            FROM tickets \
            GROUP BY priority";
        Ok(self
            .0
            .query(SQL, &[])
            .await?
            .into_iter()
            .map(|row| {
                (row.get(0), row.get::<_, i64>(1).try_into().unwrap())
            })
            .collect())
    }

    pub async fn get_category_counts(
        &self,
    ) -> Result<Vec<(Category, u64)>, Error> {
        const SQL: &str = "\
            SELECT category, COUNT(*) \
            FROM tickets \
            GROUP BY category";
        Ok(self
            .0
            .query(SQL, &[])
            .await?
            .into_iter()
            .map(|row| {
                (row.get(0), row.get::<_, i64>(1).try_into().unwrap())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_selects_everything() {
        assert_eq!(
            list_sql(&Filter::default()),
            "SELECT id, title, description, category, priority, status, \
             created_at FROM tickets \
             ORDER BY created_at DESC, id ASC",
        );
    }

    #[test]
    fn single_filter_becomes_single_condition() {
        let filter = Filter {
            status: Some(Status::Open),
            ..Filter::default()
        };
        assert_eq!(
            list_sql(&filter),
            "SELECT id, title, description, category, priority, status, \
             created_at FROM tickets \
             WHERE status = $1 \
             ORDER BY created_at DESC, id ASC",
        );
    }

    #[test]
    fn search_matches_title_or_description() {
        let filter = Filter {
            search: Some("printer".to_string()),
            ..Filter::default()
        };
        assert_eq!(
            list_sql(&filter),
            "SELECT id, title, description, category, priority, status, \
             created_at FROM tickets \
             WHERE (title ILIKE $1 OR description ILIKE $1) \
             ORDER BY created_at DESC, id ASC",
        );
    }

    #[test]
    fn all_filters_combine_with_and() {
        let filter = Filter {
            category: Some(Category::Billing),
            priority: Some(Priority::High),
            status: Some(Status::InProgress),
            search: Some("refund".to_string()),
        };
        assert_eq!(
            list_sql(&filter),
            "SELECT id, title, description, category, priority, status, \
             created_at FROM tickets \
             WHERE category = $1 \
             AND priority = $2 \
             AND status = $3 \
             AND (title ILIKE $4 OR description ILIKE $4) \
             ORDER BY created_at DESC, id ASC",
        );
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("refund"), "%refund%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn parses_known_filter_values() {
        assert_eq!("billing".parse(), Ok(Category::Billing));
        assert_eq!("critical".parse(), Ok(Priority::Critical));
        assert_eq!("in_progress".parse(), Ok(Status::InProgress));
    }

    #[test]
    fn rejects_unknown_filter_values() {
        assert_eq!("urgent".parse::<Priority>(), Err(UnknownValue));
        assert_eq!("OPEN".parse::<Status>(), Err(UnknownValue));
        assert_eq!("".parse::<Category>(), Err(UnknownValue));
    }
}
