//! HTTP surface.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{ApiError, StoreError};
use crate::model::{Event, NewEvent, NewUser, User};
use crate::notify::NotificationGateway;
use crate::store::EventStore;

/// Header naming the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-scenic-tenant";

/// Tenant used when a request carries no tenant header.
pub const DEFAULT_TENANT: &str = "public";

/// The events service with its collaborators.
#[derive(Clone)]
pub struct EventsService {
    store: EventStore,
    clock: Arc<dyn Clock>,
    notifier: Option<NotificationGateway>,
}

impl EventsService {
    /// Wire the service.
    #[must_use]
    pub fn new(
        store: EventStore,
        clock: Arc<dyn Clock>,
        notifier: Option<NotificationGateway>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
        }
    }

    /// Routes of the service.
    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/users", axum::routing::post(create_user))
            .route("/events", get(list_events).post(create_event))
            .route("/events/:id", get(get_event))
            .with_state(self)
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns the listener's I/O error.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> io::Result<()> {
        if let Ok(address) = listener.local_addr() {
            info!(%address, "events service listening");
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    async fn with_store<T, F>(&self, operation: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&EventStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || operation(&store))
            .await
            .map_err(|error| ApiError::Internal(error.to_string()))?
            .map_err(ApiError::from)
    }
}

impl std::fmt::Debug for EventsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsService")
            .field("store", &self.store)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

fn tenant(headers: &HeaderMap) -> String {
    headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_TENANT)
        .to_owned()
}

async fn health(State(service): State<EventsService>) -> Result<StatusCode, ApiError> {
    service.with_store(EventStore::ping).await?;
    Ok(StatusCode::OK)
}

async fn create_user(
    State(service): State<EventsService>,
    headers: HeaderMap,
    Json(request): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let name = request.name.trim().to_owned();
    if name.is_empty() {
        return Err(ApiError::UserNameRequired);
    }
    let tenant = tenant(&headers);
    let now = service.clock.now();
    let user = service
        .with_store(move |store| store.create_user(&tenant, &name, now))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_event(
    State(service): State<EventsService>,
    headers: HeaderMap,
    Json(request): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let name = request.name.trim().to_owned();
    if name.is_empty() {
        return Err(ApiError::EventNameRequired);
    }
    let date = NaiveDate::parse_from_str(request.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::EventDateInvalid(request.date.clone()))?;
    let now = service.clock.now();
    if date < now.date_naive() {
        return Err(ApiError::EventDateInPast(date));
    }

    let tenant = tenant(&headers);
    let created_by = request.created_by;
    let owner = tenant.clone();
    let creator = service
        .with_store(move |store| store.find_user(&owner, created_by))
        .await?;
    if creator.is_none() {
        return Err(ApiError::UserNotFound(created_by));
    }

    let owner = tenant.clone();
    let event_name = name.clone();
    let inserted = service
        .with_store(move |store| {
            match store.insert_event(&owner, &event_name, date, created_by, now) {
                Err(StoreError::Duplicate) => Ok(None),
                other => other.map(Some),
            }
        })
        .await?;
    let Some(event) = inserted else {
        return Err(ApiError::EventNameAlreadyExists(name));
    };
    info!(tenant = %tenant, event_id = event.id, "event created");

    if let Some(notifier) = &service.notifier {
        if let Err(error) = notifier.event_created(&tenant, &event).await {
            warn!(%error, event_id = event.id, "event notification failed");
        }
    }
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Debug, Deserialize)]
struct EventFilter {
    name: Option<String>,
}

async fn list_events(
    State(service): State<EventsService>,
    headers: HeaderMap,
    Query(filter): Query<EventFilter>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let tenant = tenant(&headers);
    let events = service
        .with_store(move |store| store.list_events(&tenant, filter.name.as_deref()))
        .await?;
    Ok(Json(events))
}

async fn get_event(
    State(service): State<EventsService>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    let tenant = tenant(&headers);
    service
        .with_store(move |store| store.get_event(&tenant, id))
        .await?
        .map(Json)
        .ok_or(ApiError::EventNotFound(id))
}
