use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::error::GtfsError;
use crate::gtfs::{parse_gtfs_time, Departure, GtfsFeed, RouteStopsResponse, RouteSummary};
use crate::route::{RoutePath, StopRecord};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (status, Json(ErrorResponse { error: error.to_string() }))
}

impl From<GtfsError> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: GtfsError) -> Self {
        let status = match e {
            GtfsError::RouteNotFound(_)
            | GtfsError::NoTripForDirection { .. }
            | GtfsError::NoStopTimes(_)
            | GtfsError::StopNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Feed query failed: {}", e);
        }
        api_error(status, e)
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectionQuery {
    #[serde(default)]
    direction: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeparturesQuery {
    date: Option<String>,
    after: Option<String>,
    limit: Option<usize>,
}

pub fn router(feed: Arc<GtfsFeed>) -> Router {
    let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

    Router::new()
    .route("/routes", get(list_routes))
    .route("/route/{route_id}/stops", get(get_route_stops))
    .route("/route/{route_id}/path", get(get_route_path))
    .route("/stops/search", get(search_stops))
    .route("/stop/{stop_id}/departures", get(get_departures))
    .layer(cors)
    .with_state(feed)
}

async fn list_routes(State(feed): State<Arc<GtfsFeed>>) -> Json<Vec<RouteSummary>> {
    Json(feed.routes())
}

// Axum handler for /route/{route_id}/stops
async fn get_route_stops(
    State(feed): State<Arc<GtfsFeed>>,
    Path(route_id): Path<String>,
    Query(query): Query<DirectionQuery>,
) -> Result<Json<RouteStopsResponse>, ApiError> {
    debug!(%route_id, direction = query.direction, "get_route_stops");
    Ok(Json(feed.route_stops(&route_id, query.direction)?))
}

async fn get_route_path(
    State(feed): State<Arc<GtfsFeed>>,
    Path(route_id): Path<String>,
    Query(query): Query<DirectionQuery>,
) -> Result<Json<RoutePath>, ApiError> {
    debug!(%route_id, direction = query.direction, "get_route_path");
    Ok(Json(feed.route_path(&route_id, query.direction)?))
}

async fn search_stops(State(feed): State<Arc<GtfsFeed>>, Query(query): Query<SearchQuery>) -> Json<Vec<StopRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Json(feed.search_stops(&query.q, limit))
}

async fn get_departures(
    State(feed): State<Arc<GtfsFeed>>,
    Path(stop_id): Path<String>,
    Query(query): Query<DeparturesQuery>,
) -> Result<Json<Vec<Departure>>, ApiError> {
    let date = match query.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, format!("Invalid date {:?}, expected YYYY-MM-DD", raw)))?,
        None => Local::now().date_naive(),
    };
    let after = match query.after.as_deref() {
        Some(raw) => parse_gtfs_time(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?,
        None => 0,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    debug!(%stop_id, %date, after, "get_departures");
    Ok(Json(feed.departures(&stop_id, date, after, limit)?))
}
