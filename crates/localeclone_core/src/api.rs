use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CloneConfig;
use crate::document::Document;

#[derive(Debug, Clone)]
pub struct SearchPage {
    pub page: usize,
    pub total_pages: usize,
    pub results: Vec<Document>,
}

/// Outcome of a create call. A rejection is returned rather than raised so the
/// caller can attach document context to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// `id` may be empty when the API answered ok without one.
    Created { id: String },
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub status: u16,
    pub accepted: bool,
    pub body: String,
}

/// Read side: the published content of the source repository.
pub trait ContentReadApi {
    fn master_ref(&mut self) -> Result<String>;
    fn search_documents(
        &mut self,
        reference: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage>;
    fn request_count(&self) -> usize;
}

/// Write side: the migration API of the same repository.
pub trait MigrationWriteApi {
    fn login(&mut self, email: &str, password: &str) -> Result<()>;
    fn create_document(&mut self, document: &Document) -> Result<CreateOutcome>;
    fn update_document(&mut self, document: &Document) -> Result<UpdateOutcome>;
    fn request_count(&self) -> usize;
}

pub struct PrismicContentClient {
    client: Client,
    api_url: String,
    user_agent: String,
    request_count: usize,
}

impl PrismicContentClient {
    pub fn new(config: &CloneConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config, "content")?,
            api_url: config.content_api_url.clone(),
            user_agent: config.user_agent.clone(),
            request_count: 0,
        })
    }

    fn request_json<T: for<'de> Deserialize<'de>>(
        &mut self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<T> {
        self.request_count += 1;
        debug!(url = %url, "content API request");
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent.clone())
            .query(params)
            .send()
            .context("failed to call content API")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("content API request failed with HTTP {status}: {body}");
        }
        response
            .json()
            .context("failed to decode content API JSON response")
    }

    fn endpoint(&self, suffix: &str) -> Result<Url> {
        let raw = format!("{}{suffix}", self.api_url);
        Url::parse(&raw).with_context(|| format!("invalid content API URL: {raw}"))
    }
}

impl ContentReadApi for PrismicContentClient {
    fn master_ref(&mut self) -> Result<String> {
        let url = self.endpoint("")?;
        let payload: ApiRootResponse = self.request_json(url, &[])?;
        payload
            .refs
            .into_iter()
            .find(|item| item.is_master_ref)
            .map(|item| item.reference)
            .ok_or_else(|| anyhow::anyhow!("content API returned no master ref"))
    }

    fn search_documents(
        &mut self,
        reference: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage> {
        let url = self.endpoint("/documents/search")?;
        let payload: SearchResponse = self.request_json(
            url,
            &[
                ("ref", reference.to_string()),
                ("pageSize", page_size.to_string()),
                ("page", page.to_string()),
            ],
        )?;
        Ok(SearchPage {
            page: payload.page,
            total_pages: payload.total_pages,
            results: payload.results,
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub struct MigrationClient {
    client: Client,
    auth_url: String,
    migration_url: String,
    api_key: String,
    repository: String,
    user_agent: String,
    token: Option<String>,
    request_count: usize,
}

impl MigrationClient {
    pub fn new(config: &CloneConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config, "migration")?,
            auth_url: config.auth_url.clone(),
            migration_url: config.migration_url.clone(),
            api_key: config.api_key.clone(),
            repository: config.source_repository.clone(),
            user_agent: config.user_agent.clone(),
            token: None,
            request_count: 0,
        })
    }

    fn authorized(&mut self, request: RequestBuilder) -> Result<RequestBuilder> {
        let Some(token) = &self.token else {
            bail!("migration API call attempted before login");
        };
        self.request_count += 1;
        Ok(request
            .bearer_auth(token)
            .header("x-api-key", self.api_key.clone())
            .header("repository", self.repository.clone())
            .header("User-Agent", self.user_agent.clone()))
    }
}

impl MigrationWriteApi for MigrationClient {
    fn login(&mut self, email: &str, password: &str) -> Result<()> {
        self.request_count += 1;
        let response = self
            .client
            .post(&self.auth_url)
            .header("User-Agent", self.user_agent.clone())
            .json(&LoginRequest { email, password })
            .send()
            .context("failed to call auth API")?;
        let status = response.status();
        let body = response
            .text()
            .context("failed to read auth API response")?;
        if !status.is_success() {
            bail!("authentication failed with HTTP {status}");
        }
        let token = body.trim();
        if token.is_empty() {
            bail!("auth API returned an empty token");
        }
        self.token = Some(token.to_string());
        Ok(())
    }

    fn create_document(&mut self, document: &Document) -> Result<CreateOutcome> {
        let request = self.client.post(&self.migration_url);
        let response = self
            .authorized(request)?
            .json(document)
            .send()
            .context("failed to call migration API")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Ok(CreateOutcome::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let created: CreatedDocument = response
            .json()
            .context("failed to decode migration API create response")?;
        Ok(CreateOutcome::Created { id: created.id })
    }

    fn update_document(&mut self, document: &Document) -> Result<UpdateOutcome> {
        let request = self
            .client
            .put(format!("{}/{}", self.migration_url, document.id));
        let response = self
            .authorized(request)?
            .json(document)
            .send()
            .context("failed to call migration API")?;
        let status = response.status();
        let body = if status.is_success() {
            String::new()
        } else {
            response.text().unwrap_or_default()
        };
        Ok(UpdateOutcome {
            status: status.as_u16(),
            accepted: status.is_success(),
            body,
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn build_http_client(config: &CloneConfig, label: &str) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout_ms) = config.http_timeout_ms {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }
    builder
        .build()
        .with_context(|| format!("failed to build {label} HTTP client"))
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize, Default)]
struct CreatedDocument {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize, Default)]
struct ApiRootResponse {
    #[serde(default)]
    refs: Vec<ApiRef>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "isMasterRef", default)]
    is_master_ref: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default = "first_page")]
    page: usize,
    #[serde(default)]
    total_pages: usize,
    #[serde(default)]
    results: Vec<Document>,
}

fn first_page() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ApiRootResponse, CreatedDocument, SearchResponse};

    #[test]
    fn api_root_exposes_master_ref() {
        let payload: ApiRootResponse = serde_json::from_value(json!({
            "refs": [
                {"id": "preview", "ref": "preview-ref", "label": "Release", "isMasterRef": false},
                {"id": "master", "ref": "master-ref", "label": "Master", "isMasterRef": true},
            ],
            "languages": [{"id": "en-us", "name": "English"}],
        }))
        .expect("parse root");
        let master = payload
            .refs
            .into_iter()
            .find(|item| item.is_master_ref)
            .expect("master ref");
        assert_eq!(master.reference, "master-ref");
    }

    #[test]
    fn search_response_carries_documents_and_paging() {
        let payload: SearchResponse = serde_json::from_value(json!({
            "page": 2,
            "results_per_page": 100,
            "total_pages": 3,
            "next_page": "https://acme.cdn.prismic.io/api/v2/documents/search?page=3",
            "results": [{
                "id": "A1", "uid": "home", "type": "page", "lang": "en-us",
                "tags": [], "data": {"title": "Hello"},
            }],
        }))
        .expect("parse search");
        assert_eq!(payload.page, 2);
        assert_eq!(payload.total_pages, 3);
        assert_eq!(payload.results.len(), 1);
        assert_eq!(payload.results[0].id, "A1");
    }

    #[test]
    fn created_document_tolerates_missing_id() {
        let created: CreatedDocument =
            serde_json::from_value(json!({"type": "page", "lang": "fr-fr"})).expect("parse");
        assert!(created.id.is_empty());
    }
}
