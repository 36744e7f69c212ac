//! InfluxDB 1.x HTTP client.
//!
//! Only the three calls the sink needs: list databases, create a database
//! and write a Line Protocol batch.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::InfluxDbConfig;

/// Connect timeout for the HTTP client. Requests themselves are not bounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend cannot be reached or dropped the connection mid-request
    #[error("InfluxDB is not reachable: {0}")]
    Unreachable(String),

    /// Backend answered with a non-success status
    #[error("InfluxDB rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Backend answered with a body we could not understand
    #[error("Unexpected InfluxDB response: {0}")]
    Decode(String),

    /// Any other HTTP failure
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
}

impl StorageError {
    /// Connectivity failures are worth retrying; everything else repeats identically.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StorageError::Unreachable(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        if is_connectivity_error(&e) {
            StorageError::Unreachable(error_chain(&e))
        } else {
            StorageError::Http(e)
        }
    }
}

/// Whether the backend could not be reached or dropped the connection
fn is_connectivity_error(e: &reqwest::Error) -> bool {
    if e.is_connect() || e.is_timeout() {
        return true;
    }
    // No response at all: the peer went away mid-request
    if (e.is_request() || e.is_body()) && e.status().is_none() {
        return true;
    }

    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Error message followed by its causes
fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Operations the sink needs from the time-series backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InfluxApi: Send + Sync {
    /// Names of all databases on the server
    async fn list_databases(&self) -> Result<Vec<String>, StorageError>;

    async fn create_database(&self, name: &str) -> Result<(), StorageError>;

    /// Write a Line Protocol body (second precision) into `database`
    async fn write(&self, database: &str, body: String) -> Result<(), StorageError>;
}

/// Response of the `/query` endpoint
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    fn into_result(self) -> Result<Vec<StatementResult>, StorageError> {
        if let Some(error) = self.error {
            return Err(StorageError::Decode(error));
        }
        if let Some(error) = self.results.iter().find_map(|r| r.error.clone()) {
            return Err(StorageError::Decode(error));
        }
        Ok(self.results)
    }
}

/// Extract database names from a `SHOW DATABASES` response body
fn parse_database_names(body: &str) -> Result<Vec<String>, StorageError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| StorageError::Decode(e.to_string()))?;

    Ok(response
        .into_result()?
        .into_iter()
        .flat_map(|r| r.series)
        .flat_map(|s| s.values)
        .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
        .collect())
}

/// Quote an identifier for InfluxQL
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// InfluxDB 1.x client over HTTP(S)
pub struct InfluxClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for InfluxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl InfluxClient {
    /// Build a client from the `[influxdb]` settings
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized
    pub fn new(config: &InfluxDbConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(StorageError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    /// Send a request and return the body of a successful response
    async fn send(&self, request: RequestBuilder) -> Result<String, StorageError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl InfluxApi for InfluxClient {
    async fn list_databases(&self) -> Result<Vec<String>, StorageError> {
        let body = self
            .send(self.client.get(self.url("query")).query(&[("q", "SHOW DATABASES")]))
            .await?;
        parse_database_names(&body)
    }

    async fn create_database(&self, name: &str) -> Result<(), StorageError> {
        let statement = format!("CREATE DATABASE {}", quote_ident(name));
        let body = self
            .send(self.client.post(self.url("query")).query(&[("q", statement.as_str())]))
            .await?;

        let response: QueryResponse =
            serde_json::from_str(&body).map_err(|e| StorageError::Decode(e.to_string()))?;
        response.into_result()?;
        Ok(())
    }

    async fn write(&self, database: &str, body: String) -> Result<(), StorageError> {
        let len = body.len();
        let request = self
            .client
            .post(self.url("write"))
            .query(&[("db", database), ("precision", "s")])
            .body(body);

        self.send(request).await?;
        debug!("Wrote {} bytes to {}", len, database);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> InfluxDbConfig {
        InfluxDbConfig {
            host: "influx.example.com".to_string(),
            port: 8086,
            path: "influxdb".to_string(),
            ssl: false,
            verify_ssl: true,
            username: "user".to_string(),
            password: "pass".to_string(),
            db: "teleinfo".to_string(),
            retry_delay_ms: 5000,
        }
    }

    #[test]
    fn test_parse_database_names() {
        let body = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["teleinfo"]]}]}]}"#;
        assert_eq!(parse_database_names(body).unwrap(), vec!["_internal", "teleinfo"]);
    }

    #[test]
    fn test_parse_database_names_empty_server() {
        let body = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"]}]}]}"#;
        assert!(parse_database_names(body).unwrap().is_empty());

        let body = r#"{"results":[{"statement_id":0}]}"#;
        assert!(parse_database_names(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_database_names_statement_error() {
        let body = r#"{"results":[{"statement_id":0,"error":"not authorized"}]}"#;
        match parse_database_names(body) {
            Err(StorageError::Decode(msg)) => assert_eq!(msg, "not authorized"),
            other => panic!("Expected Decode error, got: {:?}", other),
        }
    }

    #[test]
    fn test_parse_database_names_invalid_json() {
        assert!(matches!(parse_database_names("<html>"), Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("teleinfo"), "\"teleinfo\"");
        assert_eq!(quote_ident("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_unreachable_is_transient() {
        assert!(StorageError::Unreachable("refused".to_string()).is_unreachable());
        assert!(!StorageError::Rejected { status: 401, body: String::new() }.is_unreachable());
        assert!(!StorageError::Decode(String::new()).is_unreachable());
    }

    #[test]
    fn test_client_urls() {
        let client = InfluxClient::new(&test_config()).unwrap();
        assert_eq!(client.base_url(), "http://influx.example.com:8086/influxdb");
        assert_eq!(client.url("write"), "http://influx.example.com:8086/influxdb/write");
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Port 9 (discard) on localhost is closed on test machines
        let mut config = test_config();
        config.host = "127.0.0.1".to_string();
        config.port = 9;
        config.path = String::new();

        let client = InfluxClient::new(&config).unwrap();
        let err = client.list_databases().await.unwrap_err();
        assert!(err.is_unreachable(), "Expected Unreachable, got: {:?}", err);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let mut config = test_config();
        config.host = "127.0.0.1".to_string();
        config.port = port;
        config.path = String::new();

        let client = InfluxClient::new(&config).unwrap();
        let err = client.list_databases().await.unwrap_err();
        assert!(err.is_unreachable(), "Expected Unreachable, got: {:?}", err);
    }
}
