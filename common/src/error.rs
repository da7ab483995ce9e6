use std::time::Duration;

use thiserror::Error;

/// Failure to bring up the channel to the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("network link unavailable: {0}")]
    Link(String),
}

/// Failure of a single request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("could not (re)establish session: {0}")]
    Connect(#[from] ConnectError),
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("connection reset: {0}")]
    Reset(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Telemetry could not be delivered. A non-2xx answer is not a `ReportError`.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to encode telemetry payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to submit telemetry: {0}")]
    Transport(#[from] TransportError),
}

/// Decision body rejected. Collapsed to "no decision" by the fetcher.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("decision body is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("decision body is not a JSON object")]
    NotAnObject,
    #[error("decision body does not match schema: {0}")]
    Schema(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("endpoint host cannot be empty")]
    EmptyHost,
    #[error("endpoint port must be between 1 and 65535")]
    InvalidPort,
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("cycle interval must be greater than zero")]
    ZeroInterval,
    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),
}
