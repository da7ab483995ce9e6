//! Request/response session to the single remote endpoint.
//!
//! Platform code supplies a [`Connector`] (reqwest on host, the ESP-IDF HTTP
//! client on device). [`Session`] owns the live connection, opens it on first
//! use, and drops it after any failed exchange so the next request reconnects.
//! Nothing here retries; a failed request is reported and the control loop
//! moves on.

use std::{borrow::Cow, time::Duration};

use log::{info, warn};

use crate::{
    config::EndpointConfig,
    error::{ConnectError, TransportError},
    routes::{CONTENT_TYPE_JSON, HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn post_json(path: &str, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            headers: vec![
                (HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string()),
                (HEADER_CONTENT_LENGTH.to_string(), body.len().to_string()),
            ],
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// What the reporter and fetcher talk to.
pub trait Transport {
    fn request(&mut self, request: &Request) -> Result<Response, TransportError>;
}

/// Opens connections to an endpoint.
pub trait Connector {
    type Connection: Exchange;

    fn connect(&mut self, endpoint: &EndpointConfig) -> Result<Self::Connection, ConnectError>;
}

/// One established connection.
pub trait Exchange {
    /// Send `request` and wait for the full response, at most `timeout`.
    fn exchange(&mut self, request: &Request, timeout: Duration)
        -> Result<Response, TransportError>;
}

pub struct Session<C: Connector> {
    endpoint: EndpointConfig,
    connector: C,
    connection: Option<C::Connection>,
    connects: u32,
}

impl<C: Connector> Session<C> {
    pub fn new(endpoint: EndpointConfig, connector: C) -> Self {
        Self {
            endpoint,
            connector,
            connection: None,
            connects: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of connections opened so far, including reconnects.
    pub fn connects(&self) -> u32 {
        self.connects
    }

    pub fn connect(&mut self) -> Result<(), ConnectError> {
        if self.connection.is_none() {
            self.connection = Some(self.open()?);
        }
        Ok(())
    }

    fn open(&mut self) -> Result<C::Connection, ConnectError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConnectError::InvalidEndpoint("empty host".to_string()));
        }

        let connection = self.connector.connect(&self.endpoint)?;
        self.connects = self.connects.saturating_add(1);

        if self.endpoint.use_tls && !self.endpoint.verifies_certificate() {
            warn!(
                "session to {} opened without server certificate verification",
                self.endpoint.base_url()
            );
        } else {
            info!("session to {} opened", self.endpoint.base_url());
        }
        Ok(connection)
    }
}

impl<C: Connector> Transport for Session<C> {
    fn request(&mut self, request: &Request) -> Result<Response, TransportError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.open()?,
        };

        match connection.exchange(request, self.endpoint.timeout()) {
            Ok(response) => {
                self.connection = Some(connection);
                Ok(response)
            }
            Err(err) => {
                warn!(
                    "{} {} failed, session dropped: {err}",
                    request.method.as_str(),
                    request.path
                );
                Err(err)
            }
        }
    }
}
