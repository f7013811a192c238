use crate::error::ApiError;
use crate::responses::{
    AlgoNameRequest, AlgorithmCodeResponse, AlgorithmListResponse, EmptyRequest, HashResponse,
    NewSessionResponse, RunRequest, SubmitRequest, VerifyRequest, parse_run_endpoint,
};
use async_trait::async_trait;
use configuration::ServerConfig;
use core_types::{ChannelEndpoint, RunMode, SessionId};
use serde::{Serialize, de::DeserializeOwned};

pub mod channel;
pub mod error;
mod integrity;
pub mod responses;
// --- Public API ---
pub use channel::{ChannelEvent, ChannelState, StreamChannel};
pub use error::ChannelError;
pub use integrity::ContentHash;

/// The generic, abstract interface for the backtest server's session endpoints.
/// This trait is the contract the backtest session uses, allowing the
/// underlying implementation (HTTP or mock) to be swapped out.
///
/// Every call is a single round trip. Nothing retries internally.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Asks the server for a fresh session.
    async fn create_session(&self) -> Result<SessionId, ApiError>;

    /// Names of the algorithms stored on the server, in server order.
    async fn list_algorithms(&self) -> Result<Vec<String>, ApiError>;

    /// Source text of a stored algorithm.
    async fn fetch_algorithm_code(&self, name: &str) -> Result<String, ApiError>;

    /// Stores `source` on the server (and runs it when `run` is set).
    /// Returns the server's hash of what it received.
    async fn submit_algorithm_code(&self, source: &str, run: bool) -> Result<ContentHash, ApiError>;

    /// Hashes `source` on the server without storing it.
    async fn verify_submission(&self, source: &str) -> Result<ContentHash, ApiError>;

    /// Submits `source` for a run in `mode` and returns where to stream it from.
    async fn start_run(
        &self,
        source: &str,
        mode: RunMode,
        session_id: &SessionId,
    ) -> Result<ChannelEndpoint, ApiError>;
}

/// A concrete implementation of `SessionApi` that talks JSON over HTTP.
///
/// Cloning is cheap and clones share one connection pool, so one client can
/// serve any number of independent sessions.
#[derive(Clone)]
pub struct HttpSessionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs `body` to `/api/{name}` and returns the raw response text.
    async fn post<B: Serialize + ?Sized>(&self, name: &str, body: &B) -> Result<String, ApiError> {
        let url = format!("{}/api/{}", self.base_url, name);
        tracing::debug!(%url, "Sending session request.");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(text)
        } else {
            tracing::warn!(%url, status = status.as_u16(), "Session request rejected.");
            Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let text = self.post(name, body).await?;
        serde_json::from_str::<T>(&text).map_err(|e| {
            ApiError::Protocol(format!("{} response could not be decoded: {}. Body: {}", name, e, text))
        })
    }
}

#[async_trait]
impl SessionApi for HttpSessionClient {
    async fn create_session(&self) -> Result<SessionId, ApiError> {
        let response: NewSessionResponse = self.post_json("newSession", &EmptyRequest::default()).await?;
        if response.session_id.trim().is_empty() {
            return Err(ApiError::Protocol("newSession returned an empty session id".to_string()));
        }
        Ok(SessionId::new(response.session_id))
    }

    async fn list_algorithms(&self) -> Result<Vec<String>, ApiError> {
        let response: AlgorithmListResponse = self.post_json("getAllAlgo", &EmptyRequest::default()).await?;
        Ok(response.strategy_names)
    }

    async fn fetch_algorithm_code(&self, name: &str) -> Result<String, ApiError> {
        let response: AlgorithmCodeResponse = self
            .post_json("getAlgoCode", &AlgoNameRequest { algo_name: name })
            .await?;
        Ok(response.code)
    }

    async fn submit_algorithm_code(&self, source: &str, run: bool) -> Result<ContentHash, ApiError> {
        let response: HashResponse = self
            .post_json("submitAlgoCode", &SubmitRequest { algo_code: source, run })
            .await?;
        Ok(ContentHash::new(response.hash))
    }

    async fn verify_submission(&self, source: &str) -> Result<ContentHash, ApiError> {
        let response: HashResponse = self
            .post_json("verifySubmit", &VerifyRequest { algo_code: source })
            .await?;
        Ok(ContentHash::new(response.hash))
    }

    async fn start_run(
        &self,
        source: &str,
        mode: RunMode,
        session_id: &SessionId,
    ) -> Result<ChannelEndpoint, ApiError> {
        let request = RunRequest {
            algo_code: source,
            mode: mode.as_wire(),
            session_id: session_id.as_str(),
        };
        let text = self.post("runBacktest", &request).await?;
        let endpoint = parse_run_endpoint(&text)?;
        tracing::info!(session_id = %session_id, %endpoint, "Run accepted.");
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn hash_of_body(body: &Value) -> Json<Value> {
        let source = body["algoCode"].as_str().unwrap_or_default();
        Json(json!({ "hash": ContentHash::of(source).as_str().to_uppercase() }))
    }

    async fn backtest_server() -> String {
        let app = Router::new()
            .route(
                "/api/newSession",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["dummy"], "dummy");
                    Json(json!({ "session_id": "s-42" }))
                }),
            )
            .route(
                "/api/getAllAlgo",
                post(|| async { Json(json!({ "StrategyNames": ["momentum", "pairs"] })) }),
            )
            .route(
                "/api/getAlgoCode",
                post(|Json(body): Json<Value>| async move {
                    let name = body["algoName"].as_str().unwrap_or_default().to_string();
                    Json(json!({ "code": format!("# {}\n", name) }))
                }),
            )
            .route(
                "/api/submitAlgoCode",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["run"], true);
                    hash_of_body(&body)
                }),
            )
            .route(
                "/api/verifySubmit",
                post(|Json(body): Json<Value>| async move { hash_of_body(&body) }),
            )
            .route(
                "/api/runBacktest",
                post(|Json(body): Json<Value>| async move {
                    if body["mode"] == "ZIPLINE_MODE" && body["session_id"] == "s-42" {
                        "8765".to_string()
                    } else {
                        "no".to_string()
                    }
                }),
            );
        serve(app).await
    }

    #[tokio::test]
    async fn round_trips_every_operation() {
        let base = backtest_server().await;
        let client = HttpSessionClient::new(&format!("{}/", base)).unwrap();

        let session = client.create_session().await.unwrap();
        assert_eq!(session.as_str(), "s-42");

        assert_eq!(client.list_algorithms().await.unwrap(), vec!["momentum", "pairs"]);
        assert_eq!(client.fetch_algorithm_code("momentum").await.unwrap(), "# momentum\n");

        let source = "def initialize(context):\n    pass\n";
        let submitted = client.submit_algorithm_code(source, true).await.unwrap();
        assert!(submitted.matches(&ContentHash::of(source)));
        let verified = client.verify_submission(source).await.unwrap();
        assert_eq!(verified, submitted);

        let endpoint = client.start_run(source, RunMode::Zipline, &session).await.unwrap();
        assert_eq!(endpoint, ChannelEndpoint::Port(8765));
    }

    #[tokio::test]
    async fn undecodable_bodies_are_protocol_errors() {
        let base = backtest_server().await;
        let client = HttpSessionClient::new(&base).unwrap();
        let session = SessionId::new("someone-else");

        let err = client.start_run("x", RunMode::Generator, &session).await.unwrap_err();
        assert!(matches!(err, ApiError::Protocol(_)));
        assert!(!err.is_transport());

        let app = Router::new().route(
            "/api/newSession",
            post(|| async { Json(json!({ "session": "missing-field" })) }),
        );
        let client = HttpSessionClient::new(&serve(app).await).unwrap();
        assert!(matches!(client.create_session().await, Err(ApiError::Protocol(_))));
    }

    #[tokio::test]
    async fn http_failures_are_transport_errors() {
        let app = Router::new().route(
            "/api/getAllAlgo",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = HttpSessionClient::new(&serve(app).await).unwrap();
        let err = client.list_algorithms().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert!(err.is_transport());

        // Nothing listens on a port we just released.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpSessionClient::new(&format!("http://{}", addr)).unwrap();
        let err = client.create_session().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
