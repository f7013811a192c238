use crate::error::ApiError;
use core_types::ChannelEndpoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Request Bodies ---
// Field names follow what the server reads, hence the mix of camelCase and
// `session_id`.

/// Body for the endpoints that take no arguments. The server only needs a
/// JSON object to be present.
#[derive(Debug, Serialize)]
pub(crate) struct EmptyRequest {
    pub dummy: &'static str,
}

impl Default for EmptyRequest {
    fn default() -> Self {
        Self { dummy: "dummy" }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AlgoNameRequest<'a> {
    pub algo_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitRequest<'a> {
    pub algo_code: &'a str,
    pub run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyRequest<'a> {
    pub algo_code: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunRequest<'a> {
    #[serde(rename = "algoCode")]
    pub algo_code: &'a str,
    pub mode: &'a str,
    pub session_id: &'a str,
}

// --- Response Bodies ---

/// The response from `POST /api/newSession`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSessionResponse {
    #[serde(alias = "sessionId")]
    pub session_id: String,
}

/// The response from `POST /api/getAllAlgo`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmListResponse {
    #[serde(rename = "StrategyNames")]
    pub strategy_names: Vec<String>,
}

/// The response from `POST /api/getAlgoCode`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmCodeResponse {
    pub code: String,
}

/// The response from `POST /api/submitAlgoCode` and `POST /api/verifySubmit`.
#[derive(Debug, Clone, Deserialize)]
pub struct HashResponse {
    #[serde(alias = "algoHash")]
    pub hash: String,
}

/// Interprets the body of `POST /api/runBacktest`.
///
/// Servers have answered with a bare port (`8765`), a `{"port": 8765}`
/// object, a bare `ws://` URI or a `{"uri": "ws://..."}` object.
pub fn parse_run_endpoint(body: &str) -> Result<ChannelEndpoint, ApiError> {
    let text = body.trim();
    if let Some(endpoint) = endpoint_from_text(text) {
        return Ok(endpoint);
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|_| ApiError::Protocol(format!("runBacktest returned no endpoint: '{}'", text)))?;

    let endpoint = match &value {
        Value::Number(n) => n.as_u64().and_then(port_from_u64),
        Value::String(s) => endpoint_from_text(s.trim()),
        Value::Object(object) => {
            let port = object.get("port").and_then(|p| match p {
                Value::Number(n) => n.as_u64().and_then(port_from_u64),
                Value::String(s) => s.trim().parse::<u64>().ok().and_then(port_from_u64),
                _ => None,
            });
            let uri = ["uri", "url"]
                .iter()
                .filter_map(|key| object.get(*key).and_then(Value::as_str))
                .find_map(|s| endpoint_from_text(s.trim()));
            port.or(uri)
        }
        _ => None,
    };

    endpoint.ok_or_else(|| ApiError::Protocol(format!("runBacktest returned no endpoint: '{}'", text)))
}

fn endpoint_from_text(text: &str) -> Option<ChannelEndpoint> {
    if let Ok(port) = text.parse::<u64>() {
        return port_from_u64(port);
    }
    if text.starts_with("ws://") || text.starts_with("wss://") {
        return Some(ChannelEndpoint::Uri(text.to_string()));
    }
    None
}

fn port_from_u64(port: u64) -> Option<ChannelEndpoint> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .map(ChannelEndpoint::Port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port() {
        assert_eq!(parse_run_endpoint("8765\n").unwrap(), ChannelEndpoint::Port(8765));
    }

    #[test]
    fn port_object() {
        assert_eq!(parse_run_endpoint(r#"{"port": 9001}"#).unwrap(), ChannelEndpoint::Port(9001));
        assert_eq!(parse_run_endpoint(r#"{"port": "9002"}"#).unwrap(), ChannelEndpoint::Port(9002));
    }

    #[test]
    fn uri_forms() {
        assert_eq!(
            parse_run_endpoint("ws://engine.local:9000/run").unwrap(),
            ChannelEndpoint::Uri("ws://engine.local:9000/run".to_string())
        );
        assert_eq!(
            parse_run_endpoint(r#"{"uri": "wss://engine.local/run"}"#).unwrap(),
            ChannelEndpoint::Uri("wss://engine.local/run".to_string())
        );
        assert_eq!(
            parse_run_endpoint(r#""ws://quoted:1""#).unwrap(),
            ChannelEndpoint::Uri("ws://quoted:1".to_string())
        );
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        for body in ["", "0", "70000", "http://not-a-socket", r#"{"status":"ok"}"#, "[8765]"] {
            assert!(
                matches!(parse_run_endpoint(body), Err(ApiError::Protocol(_))),
                "expected protocol error for {:?}",
                body
            );
        }
    }

    #[test]
    fn request_bodies_use_server_field_names() {
        let body = serde_json::to_value(RunRequest {
            algo_code: "print(1)",
            mode: "GENERATOR_MODE",
            session_id: "abc",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"algoCode": "print(1)", "mode": "GENERATOR_MODE", "session_id": "abc"})
        );

        let body = serde_json::to_value(SubmitRequest { algo_code: "x", run: true }).unwrap();
        assert_eq!(body, serde_json::json!({"algoCode": "x", "run": true}));

        let body = serde_json::to_value(AlgoNameRequest { algo_name: "momentum" }).unwrap();
        assert_eq!(body, serde_json::json!({"algoName": "momentum"}));
    }
}
