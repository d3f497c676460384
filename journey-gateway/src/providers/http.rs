//! JSON-over-HTTP connectors.
//!
//! Each backend exposes one POST endpoint per operation, taking and returning
//! the request/response values of this module's parent as JSON. A semaphore
//! bounds the number of in-flight requests per backend.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::{Coord, FeedPublisher, Place, PlannerResponse};

use super::{
    CrowFlyRequest, DirectPathRequest, FareBackend, FareRequest, FareResponse, MatrixRequest,
    ProviderError, ProximityCandidate, PtJourneysRequest, PtPlanner, RoutingMatrix,
    StreetNetworkProvider,
};

/// Default maximum concurrent requests per backend.
const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Connection settings for one HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub base_url: String,
    /// Sent as `Authorization` when set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_timeout_secs() -> u64 {
    10
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// A rate-limited JSON client for one backend.
#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    http: reqwest::Client,
    base_url: String,
    semaphore: Arc<Semaphore>,
}

impl JsonHttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| ProviderError::Api {
                status: 0,
                message: "Invalid API key format".to_string(),
            })?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and decode the JSON answer.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::Unavailable("Semaphore closed".to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let response = self.http.post(&url).json(body).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(ProviderError::Unavailable(format!("{url} answered {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Json {
            message: format!("{e} in {}", body.chars().take(200).collect::<String>()),
        })
    }
}

#[derive(Serialize)]
struct UriQuery<'a> {
    uri: &'a str,
    request_id: &'a str,
}

#[derive(Serialize)]
struct CoordQuery<'a> {
    coord: Coord,
    request_id: &'a str,
}

#[derive(Deserialize)]
struct PlaceAnswer {
    place: Option<Place>,
}

#[derive(Deserialize)]
struct PlacesAnswer {
    places: Vec<Place>,
}

#[derive(Deserialize)]
struct CandidatesAnswer {
    candidates: Vec<ProximityCandidate>,
}

/// Public transport planner reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPtPlanner {
    client: JsonHttpClient,
}

impl HttpPtPlanner {
    pub fn new(client: JsonHttpClient) -> Self {
        Self { client }
    }
}

impl PtPlanner for HttpPtPlanner {
    fn place_by_uri<'a>(
        &'a self,
        uri: &'a str,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Place>, ProviderError>> {
        async move {
            let answer: PlaceAnswer = self
                .client
                .post("/place", &UriQuery { uri, request_id })
                .await?;
            Ok(answer.place)
        }
        .boxed()
    }

    fn stop_points_of<'a>(
        &'a self,
        uri: &'a str,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>> {
        async move {
            let answer: PlacesAnswer = self
                .client
                .post("/stop_points", &UriQuery { uri, request_id })
                .await?;
            Ok(answer.places)
        }
        .boxed()
    }

    fn odt_stop_points<'a>(
        &'a self,
        coord: Coord,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>> {
        async move {
            let answer: PlacesAnswer = self
                .client
                .post("/odt_stop_points", &CoordQuery { coord, request_id })
                .await?;
            Ok(answer.places)
        }
        .boxed()
    }

    fn crow_fly(
        &self,
        request: CrowFlyRequest,
    ) -> BoxFuture<'_, Result<Vec<ProximityCandidate>, ProviderError>> {
        async move {
            let answer: CandidatesAnswer = self.client.post("/crow_fly", &request).await?;
            Ok(answer.candidates)
        }
        .boxed()
    }

    fn journeys(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        async move { self.client.post("/journeys", &request).await }.boxed()
    }

    fn graphical_isochrones(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        async move { self.client.post("/graphical_isochrones", &request).await }.boxed()
    }
}

/// Street-network router reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStreetNetwork {
    id: String,
    client: JsonHttpClient,
    feed_publisher: Option<FeedPublisher>,
}

impl HttpStreetNetwork {
    pub fn new(id: impl Into<String>, client: JsonHttpClient) -> Self {
        Self {
            id: id.into(),
            client,
            feed_publisher: None,
        }
    }

    pub fn with_feed_publisher(mut self, fp: FeedPublisher) -> Self {
        self.feed_publisher = Some(fp);
        self
    }
}

impl StreetNetworkProvider for HttpStreetNetwork {
    fn id(&self) -> &str {
        &self.id
    }

    fn routing_matrix(
        &self,
        request: MatrixRequest,
    ) -> BoxFuture<'_, Result<RoutingMatrix, ProviderError>> {
        async move { self.client.post("/matrix", &request).await }.boxed()
    }

    fn direct_path(
        &self,
        request: DirectPathRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        async move {
            let mut response: PlannerResponse = self.client.post("/direct_path", &request).await?;
            if let Some(fp) = &self.feed_publisher {
                response.add_feed_publisher(fp.clone());
            }
            Ok(response)
        }
        .boxed()
    }

    fn feed_publisher(&self) -> Option<FeedPublisher> {
        self.feed_publisher.clone()
    }
}

/// Fare service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFareBackend {
    client: JsonHttpClient,
}

impl HttpFareBackend {
    pub fn new(client: JsonHttpClient) -> Self {
        Self { client }
    }
}

impl FareBackend for HttpFareBackend {
    fn journey_fares(&self, request: FareRequest) -> BoxFuture<'_, Result<FareResponse, ProviderError>> {
        async move { self.client.post("/fares", &request).await }.boxed()
    }
}
