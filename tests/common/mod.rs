use std::time::{SystemTime, UNIX_EPOCH};

use constcat::concat;
use reqwest::StatusCode;
use serde_json::json;
use ticket_desk::api;

const BASE_URL: &str = "http://localhost:3000";

/// Produces a token unique enough to tag this test run's tickets, so
/// tests can find their own records in a shared database.
pub fn marker(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_nanos();
    format!("{tag}-{nanos}")
}

pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    pub async fn add_ticket(
        &self,
        title: &str,
        description: &str,
        category: &str,
        priority: &str,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/tickets/");

        Ok(self
            .inner
            .post(URL)
            .json(&json!({
                "title": title,
                "description": description,
                "category": category,
                "priority": priority,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Ticket>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn list_tickets(
        &self,
        query: &[(&str, &str)],
    ) -> Result<Vec<api::Ticket>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/tickets/");

        Ok(self
            .inner
            .get(URL)
            .query(query)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<Vec<api::Ticket>>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn edit_ticket(
        &self,
        id: api::ticket::Id,
        patch: &serde_json::Value,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/tickets");

        Ok(self
            .inner
            .patch(format!("{URL}/{id}/"))
            .json(patch)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Ticket>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn stats(&self) -> Result<api::ticket::Stats, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/tickets/stats/");

        Ok(self
            .inner
            .get(URL)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::Stats>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn classify(
        &self,
        description: &str,
    ) -> Result<api::ticket::Suggestion, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/api/tickets/classify/");

        Ok(self
            .inner
            .post(URL)
            .json(&json!({
                "description": description,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::Suggestion>()
            .await
            .expect("failed to get a response"))
    }
}
