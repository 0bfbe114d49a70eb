//! One HTTP exchange with one manager endpoint.
//!
//! The client above decides which endpoint to try next; a transport only
//! reports whether the endpoint answered and with what.

use std::future::Future;
use std::path::Path;

use mnagios_core::ManagerConnection;
use serde_json::Value;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub tenant: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The endpoint could not be reached at all.
    Unreachable(String),
    Other(String),
}

pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// reqwest-backed transport: basic auth, the `Tenant` header and the
/// manager's CA certificate.
pub struct HttpTransport {
    client: reqwest::Client,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(connection: &ManagerConnection) -> GatewayResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(path) = &connection.certificate {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }
        Ok(Self {
            client: builder.build()?,
            username: connection.username.clone(),
            password: connection.password.clone(),
        })
    }
}

fn load_certificate(path: &Path) -> GatewayResult<reqwest::Certificate> {
    let pem = std::fs::read(path).map_err(|source| GatewayError::Certificate {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(reqwest::Certificate::from_pem(&pem)?)
}

impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        debug!(method = request.method.as_str(), url = %request.url, tenant = %request.tenant, "manager request");
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self
            .client
            .request(method, &request.url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Tenant", &request.tenant)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TransportError::Unreachable(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}
