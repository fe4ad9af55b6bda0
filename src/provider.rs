//! Search provider abstraction and the iTunes Search implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::ProviderOptions;
use crate::error::ProviderError;
use crate::model::ContentToken;

/// One raw result as returned by a provider, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: Option<String>,
    pub artwork_url: Option<String>,
    pub content: ContentToken,
}

/// Port for querying a remote search service.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<RawRecord>, ProviderError>;
}

/// Collapse runs of whitespace; `None` when nothing is left.
pub fn normalize_query(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

pub struct ItunesProvider {
    client: reqwest::Client,
    options: ProviderOptions,
}

impl ItunesProvider {
    pub fn new(options: ProviderOptions) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, options })
    }
}

#[async_trait]
impl SearchProvider for ItunesProvider {
    async fn search(&self, query: &str) -> Result<Vec<RawRecord>, ProviderError> {
        let limit = self.options.result_limit.to_string();
        debug!(query, url = %self.options.search_url, "searching");
        let response = self
            .client
            .get(&self.options.search_url)
            .query(&[("term", query), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        let body = response.bytes().await?;
        parse_search_response(&body, &self.options.artwork_field)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultCount", default)]
    result_count: usize,
    results: Vec<JsonValue>,
}

const ID_FIELDS: [&str; 3] = ["trackId", "collectionId", "artistId"];

/// Decode an iTunes-style `{ resultCount, results: [...] }` payload.
pub fn parse_search_response(
    body: &[u8],
    artwork_field: &str,
) -> Result<Vec<RawRecord>, ProviderError> {
    let response: SearchResponse = serde_json::from_slice(body)?;
    debug!(
        result_count = response.result_count,
        received = response.results.len(),
        "search response decoded"
    );

    response
        .results
        .into_iter()
        .map(|item| {
            if !item.is_object() {
                return Err(ProviderError::Parse(format!(
                    "expected result object, found {item}"
                )));
            }
            let artwork_url = item
                .get(artwork_field)
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned);
            let id = ID_FIELDS
                .iter()
                .find_map(|field| item.get(*field).and_then(scalar_to_string))
                .or_else(|| artwork_url.clone());
            Ok(RawRecord {
                id,
                artwork_url,
                content: ContentToken::new(item.to_string()),
            })
        })
        .collect()
}

fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
