use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};

use crate::config::DownloaderConfig;
use crate::domain::CatalogEntry;
use crate::error::CatsearchError;

/// Access to the two spectroscopy databases. Every call is a single attempt;
/// retrying is up to the caller.
pub trait CatalogClient: Send + Sync {
    /// Body of the species directory listing.
    fn species_directory(&self) -> Result<String, CatsearchError>;
    /// Text of one `.cat` line list.
    fn entry_file(&self, url: &str) -> Result<String, CatsearchError>;
}

#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    species_url: String,
}

impl HttpCatalogClient {
    pub fn new(config: &DownloaderConfig) -> Result<Self, CatsearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("catsearch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatsearchError::Http {
                    url: config.species_url.clone(),
                    message: err.to_string(),
                })?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if !config.request_timeout.is_zero() {
            builder = builder.timeout(config.request_timeout);
        }
        let client = builder.build().map_err(|err| CatsearchError::Http {
            url: config.species_url.clone(),
            message: err.to_string(),
        })?;
        Ok(Self {
            client,
            species_url: config.species_url.clone(),
        })
    }

    fn handle_status(url: &str, response: Response) -> Result<Response, CatsearchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(CatsearchError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        })
    }

    fn text(url: &str, response: Result<Response, reqwest::Error>) -> Result<String, CatsearchError> {
        let response = response.map_err(|err| map_request_error(url, err))?;
        Self::handle_status(url, response)?
            .text()
            .map_err(|err| map_request_error(url, err))
    }
}

impl CatalogClient for HttpCatalogClient {
    fn species_directory(&self) -> Result<String, CatsearchError> {
        tracing::debug!("POST {}", self.species_url);
        let response = self
            .client
            .post(&self.species_url)
            .form(&[("database", "-1")])
            .send();
        Self::text(&self.species_url, response)
    }

    fn entry_file(&self, url: &str) -> Result<String, CatsearchError> {
        tracing::debug!("GET {url}");
        Self::text(url, self.client.get(url).send())
    }
}

fn map_request_error(url: &str, err: reqwest::Error) -> CatsearchError {
    if is_retryable_error(&err) {
        CatsearchError::Connection {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        CatsearchError::Http {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Species listed in a directory response `{"species": [...]}`.
///
/// Fields that are `null`, empty or `"None"` are dropped and strings are
/// trimmed before an entry is read. Unreadable entries are skipped.
pub fn parse_species_directory(body: &str) -> Result<Vec<CatalogEntry>, CatsearchError> {
    let document: Value = serde_json::from_str(body)
        .map_err(|err| CatsearchError::CatalogParse(format!("species directory: {err}")))?;
    let species = document
        .get("species")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            CatsearchError::CatalogParse("species directory has no species list".to_string())
        })?;

    Ok(species
        .iter()
        .filter_map(|item| {
            let Value::Object(fields) = item else {
                tracing::warn!("skipping species record {item}");
                return None;
            };
            match serde_json::from_value::<CatalogEntry>(Value::Object(prune(fields))) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("skipping species record: {err}");
                    None
                }
            }
        })
        .collect())
}

fn prune(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(text) => {
                    let text = text.trim();
                    if text.is_empty() || text == "None" {
                        return None;
                    }
                    Value::String(text.to_string())
                }
                other => other.clone(),
            };
            Some((key.clone(), value))
        })
        .collect()
}
