use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{GtfsError, ProviderError};
use crate::gtfs::GtfsFeed;
use crate::route::RoutePath;

/// Where the animator's polyline and stop list come from.
pub trait RouteDataProvider {
    fn route_path(
        &self,
        route_id: &str,
        direction: u32,
    ) -> impl Future<Output = Result<RoutePath, ProviderError>> + Send;
}

/// Serves paths straight out of a loaded feed.
#[derive(Clone)]
pub struct FeedProvider {
    feed: Arc<GtfsFeed>,
}

impl FeedProvider {
    pub fn new(feed: Arc<GtfsFeed>) -> Self {
        Self { feed }
    }
}

impl RouteDataProvider for FeedProvider {
    async fn route_path(&self, route_id: &str, direction: u32) -> Result<RoutePath, ProviderError> {
        self.feed.route_path(route_id, direction).map_err(|e| match e {
            GtfsError::RouteNotFound(_) | GtfsError::NoTripForDirection { .. } | GtfsError::NoStopTimes(_) => {
                ProviderError::NotFound {
                    route_id: route_id.to_string(),
                    direction,
                }
            }
            other => ProviderError::Unavailable(other.to_string()),
        })
    }
}

/// Fetches paths from a running API server's `/route/{id}/path` endpoint.
#[derive(Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn path_url(&self, route_id: &str, direction: u32) -> String {
        format!("{}/route/{}/path?direction={}", self.base_url, route_id, direction)
    }
}

impl RouteDataProvider for HttpProvider {
    async fn route_path(&self, route_id: &str, direction: u32) -> Result<RoutePath, ProviderError> {
        let url = self.path_url(route_id, direction);
        debug!(%url, "Fetching route path");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound {
                route_id: route_id.to_string(),
                direction,
            }),
            status if !status.is_success() => Err(ProviderError::Unavailable(format!("{} returned {}", url, status))),
            _ => response
                .json::<RoutePath>()
                .await
                .map_err(|e| ProviderError::Unavailable(e.to_string())),
        }
    }
}
