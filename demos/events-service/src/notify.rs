//! Outbound notifications to an external system.

use reqwest::Client;
use serde_json::json;

use crate::model::Event;

/// Base URL of the notification system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationEndpoint(pub String);

/// Posts a notification for every created event.
#[derive(Clone, Debug)]
pub struct NotificationGateway {
    http: Client,
    url: String,
}

impl NotificationGateway {
    /// Gateway posting to `<endpoint>/notifications`.
    ///
    /// # Errors
    ///
    /// Returns the client construction error.
    pub fn new(endpoint: &NotificationEndpoint) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().build()?,
            url: format!("{}/notifications", endpoint.0.trim_end_matches('/')),
        })
    }

    /// Announce `event`, created under `tenant`.
    ///
    /// # Errors
    ///
    /// Returns the transport error or a non-success status.
    pub async fn event_created(&self, tenant: &str, event: &Event) -> Result<(), reqwest::Error> {
        self.http
            .post(&self.url)
            .json(&json!({
                "kind": "event_created",
                "tenant": tenant,
                "event_id": event.id,
                "name": event.name,
                "date": event.date,
            }))
            .send()
            .await?
            .error_for_status()
            .map(drop)
    }
}
