use std::{env, error::Error, str, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use derive_more::From;
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use ticket_desk::{api, db, llm, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let mut config = toml::from_str::<Config>(&config)?;
    if config.llm.api_key.is_none() {
        config.llm.api_key = env::var("OPENAI_API_KEY").ok();
    }

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    let classifier = llm::Classifier::new(config.llm)?;

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = Router::new()
        .route("/api/tickets/", get(list_tickets).post(add_ticket))
        .route("/api/tickets/:id/", patch(edit_ticket))
        .route("/api/tickets/stats/", get(ticket_stats))
        .route("/api/tickets/classify/", post(classify_ticket))
        .layer(cors)
        .with_state(Arc::new(AppState {
            db_client,
            classifier,
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn validation_error(reason: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })))
        .into_response()
}

#[derive(Deserialize)]
struct AddTicketInput {
    title: String,
    description: String,
    category: api::ticket::Category,
    priority: api::ticket::Priority,
}

async fn add_ticket(
    State(state): State<SharedAppState>,
    Json(AddTicketInput {
        title,
        description,
        category,
        priority,
    }): Json<AddTicketInput>,
) -> Result<(StatusCode, Json<api::Ticket>), AddTicketError> {
    use AddTicketError as E;

    if title.trim().is_empty() {
        return Err(E::EmptyTitle);
    }
    if description.trim().is_empty() {
        return Err(E::EmptyDescription);
    }

    let ticket = state
        .db_client
        .insert_ticket(db::ticket::NewTicket {
            title,
            description,
            category,
            priority,
            status: db::ticket::Status::Open,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ticket.into())))
}

#[derive(Debug, From)]
pub enum AddTicketError {
    #[from]
    DbError(db::Error),
    EmptyTitle,
    EmptyDescription,
}

impl IntoResponse for AddTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::EmptyTitle => validation_error("Title cannot be empty."),
            Self::EmptyDescription => {
                validation_error("Description cannot be empty.")
            }
        }
    }
}

#[derive(Deserialize)]
struct ListTicketsInput {
    category: Option<String>,
    priority: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

impl ListTicketsInput {
    /// `None` means some supplied value names no known enum member, so
    /// the listing cannot match anything.
    fn into_filter(self) -> Option<db::ticket::Filter> {
        fn parse<T: str::FromStr>(
            param: Option<String>,
        ) -> Result<Option<T>, T::Err> {
            param
                .filter(|p| !p.is_empty())
                .map(|p| p.parse())
                .transpose()
        }

        Some(db::ticket::Filter {
            category: parse(self.category).ok()?,
            priority: parse(self.priority).ok()?,
            status: parse(self.status).ok()?,
            search: self.search.filter(|s| !s.is_empty()),
        })
    }
}

async fn list_tickets(
    State(state): State<SharedAppState>,
    Query(input): Query<ListTicketsInput>,
) -> Result<Json<Vec<api::Ticket>>, ListTicketsError> {
    let Some(filter) = input.into_filter() else {
        // An unrecognized filter value matches nothing, not an error.
        return Ok(Json(Vec::new()));
    };

    let tickets = state.db_client.get_tickets(&filter).await?;
    Ok(Json(tickets.into_iter().map(api::Ticket::from).collect()))
}

#[derive(Debug, From)]
pub enum ListTicketsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for ListTicketsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
struct EditTicketInput {
    title: Option<String>,
    description: Option<String>,
    category: Option<api::ticket::Category>,
    priority: Option<api::ticket::Priority>,
    status: Option<api::ticket::Status>,
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    Path(id): Path<api::ticket::Id>,
    Json(input): Json<EditTicketInput>,
) -> Result<Json<api::Ticket>, EditTicketError> {
    use EditTicketError as E;

    let mut ticket = state
        .db_client
        .get_ticket_by_id(id)
        .await?
        .ok_or(E::TicketNotFound)?;

    if let Some(title) = input.title {
        if title.trim().is_empty() {
            return Err(E::EmptyTitle);
        }
        ticket.title = title;
    }
    if let Some(description) = input.description {
        if description.trim().is_empty() {
            return Err(E::EmptyDescription);
        }
        ticket.description = description;
    }
    if let Some(category) = input.category {
        ticket.category = category;
    }
    if let Some(priority) = input.priority {
        ticket.priority = priority;
    }
    if let Some(status) = input.status {
        ticket.status = status;
    }

    state.db_client.update_ticket(&ticket).await?;

    Ok(Json(ticket.into()))
}

#[derive(Debug, From)]
pub enum EditTicketError {
    #[from]
    DbError(db::Error),
    EmptyTitle,
    EmptyDescription,
    TicketNotFound,
}

impl IntoResponse for EditTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::EmptyTitle => validation_error("Title cannot be empty."),
            Self::EmptyDescription => {
                validation_error("Description cannot be empty.")
            }
            Self::TicketNotFound => StatusCode::NOT_FOUND.into_response(),
        }
    }
}

async fn ticket_stats(
    State(state): State<SharedAppState>,
) -> Result<Json<api::ticket::Stats>, TicketStatsError> {
    let total_fut = state.db_client.get_tickets_count();
    let open_fut = state
        .db_client
        .get_tickets_count_with_status(db::ticket::Status::Open);
    let earliest_fut = state.db_client.get_earliest_created_at();
    let priorities_fut = state.db_client.get_priority_counts();
    let categories_fut = state.db_client.get_category_counts();
    let (total, open, earliest, priorities, categories) = tokio::try_join!(
        total_fut,
        open_fut,
        earliest_fut,
        priorities_fut,
        categories_fut,
    )?;

    Ok(Json(api::ticket::Stats {
        total_tickets: total,
        open_tickets: open,
        avg_tickets_per_day: api::ticket::avg_tickets_per_day(
            total,
            earliest,
            OffsetDateTime::now_utc(),
        ),
        priority_breakdown: priorities
            .into_iter()
            .map(|(priority, count)| (priority.as_str().to_string(), count))
            .collect(),
        category_breakdown: categories
            .into_iter()
            .map(|(category, count)| (category.as_str().to_string(), count))
            .collect(),
    }))
}

#[derive(Debug, From)]
pub enum TicketStatsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for TicketStatsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
struct ClassifyTicketInput {
    description: String,
}

async fn classify_ticket(
    State(state): State<SharedAppState>,
    Json(ClassifyTicketInput { description }): Json<ClassifyTicketInput>,
) -> Result<Json<api::ticket::Suggestion>, ClassifyTicketError> {
    use ClassifyTicketError as E;

    if description.trim().is_empty() {
        return Err(E::EmptyDescription);
    }

    let suggestion = match state.classifier.classify(&description).await {
        llm::Outcome::Suggestion { category, priority } => {
            api::ticket::Suggestion {
                suggested_category: category,
                suggested_priority: priority,
                note: None,
            }
        }
        llm::Outcome::Unavailable => api::ticket::Suggestion {
            suggested_category: "general".to_string(),
            suggested_priority: "medium".to_string(),
            note: Some("Using default values (LLM unavailable)".to_string()),
        },
    };

    Ok(Json(suggestion))
}

#[derive(Debug)]
pub enum ClassifyTicketError {
    EmptyDescription,
}

impl IntoResponse for ClassifyTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::EmptyDescription => {
                validation_error("Description is required")
            }
        }
    }
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_client: db::Client,

    classifier: llm::Classifier,
}
