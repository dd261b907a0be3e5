//! Direct queries against the CMS delivery API, used when no replica is
//! configured.

use crate::config::FallbackConfig;
use crate::metrics_defs::{FALLBACK_ERRORS, FALLBACK_REQUESTS};
use crate::types::{ResponsePayload, Source};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use shared::counter;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum FallbackError {
    #[error("CMS request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("CMS responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("invalid CMS URL: {0}")]
    InvalidUrl(String),
}

#[derive(Deserialize)]
struct CmsErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct FallbackClient {
    client: reqwest::Client,
    entries_url: Url,
    access_token: String,
}

impl FallbackClient {
    /// Returns `None` when the space or access token is not configured.
    pub fn new(config: &FallbackConfig) -> Result<Option<Self>, FallbackError> {
        if !config.is_enabled() {
            return Ok(None);
        }

        let mut entries_url =
            Url::parse(&config.base_url).map_err(|e| FallbackError::InvalidUrl(e.to_string()))?;
        entries_url
            .path_segments_mut()
            .map_err(|_| FallbackError::InvalidUrl(config.base_url.clone()))?
            .pop_if_empty()
            .extend([
                "spaces",
                config.space.as_str(),
                "environments",
                config.environment.as_str(),
                "entries",
            ]);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(FallbackClient {
            client,
            entries_url,
            access_token: config.access_token.clone(),
        }))
    }

    pub fn entries_url(&self) -> &Url {
        &self.entries_url
    }

    pub async fn entries_by_id(
        &self,
        content_id: &str,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, FallbackError> {
        self.query(include, content_type, Some(("sys.id", content_id)))
            .await
    }

    pub async fn entries_by_author(
        &self,
        author_id: &str,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, FallbackError> {
        self.query(include, content_type, Some(("fields.authorId", author_id)))
            .await
    }

    pub async fn entries_by_content_type(
        &self,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, FallbackError> {
        self.query(include, content_type, None).await
    }

    async fn query(
        &self,
        include: i64,
        content_type: &str,
        filter: Option<(&str, &str)>,
    ) -> Result<ResponsePayload, FallbackError> {
        counter!(FALLBACK_REQUESTS).increment(1);

        let mut params = vec![("include", include.to_string())];
        if let Some((name, value)) = filter {
            params.push((name, value.to_string()));
        }
        if !content_type.is_empty() {
            params.push(("content_type", content_type.to_string()));
        }

        let result = self.send(&params).await;
        if let Err(err) = &result {
            counter!(FALLBACK_ERRORS).increment(1);
            tracing::error!(error = %err, "Got an error when retrieving from the CMS");
        }
        result
    }

    async fn send(&self, params: &[(&str, String)]) -> Result<ResponsePayload, FallbackError> {
        let response = self
            .client
            .get(self.entries_url.clone())
            .bearer_auth(&self.access_token)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<CmsErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(FallbackError::Status { status, message });
        }

        let mut payload = response.json::<ResponsePayload>().await?;
        payload.source = Source::Fallback;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENTRIES_PATH: &str = "/spaces/space1/environments/master/entries";

    fn config(base_url: &str) -> FallbackConfig {
        FallbackConfig {
            space: "space1".into(),
            access_token: "token1".into(),
            environment: "master".into(),
            base_url: base_url.into(),
            timeout_secs: 5,
        }
    }

    fn cms_reply() -> serde_json::Value {
        json!({
            "sys": {"type": "Array"},
            "total": 1,
            "skip": 0,
            "limit": 100,
            "items": [{"sys": {"type": "Entry", "id": "abc"}, "fields": {"title": "T"}}],
            "includes": {"Entry": [{"sys": {"type": "Entry", "id": "def"}, "fields": {}}]}
        })
    }

    #[test]
    fn test_disabled_without_credentials() {
        let mut cfg = config("https://cdn.example.com");
        cfg.access_token = String::new();
        assert!(FallbackClient::new(&cfg).unwrap().is_none());
    }

    #[test]
    fn test_entries_url() {
        let client = FallbackClient::new(&config("https://cdn.example.com/"))
            .unwrap()
            .unwrap();
        assert_eq!(
            client.entries_url().as_str(),
            "https://cdn.example.com/spaces/space1/environments/master/entries"
        );

        assert!(matches!(
            FallbackClient::new(&config("not a url")),
            Err(FallbackError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_entries_by_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ENTRIES_PATH))
            .and(header("authorization", "Bearer token1"))
            .and(query_param("include", "2"))
            .and(query_param("sys.id", "abc"))
            .and(query_param("content_type", "article"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cms_reply()))
            .mount(&mock_server)
            .await;

        let client = FallbackClient::new(&config(&mock_server.uri()))
            .unwrap()
            .unwrap();
        let payload = client.entries_by_id("abc", "article", 2).await.unwrap();

        assert_eq!(payload.source, Source::Fallback);
        assert_eq!(payload.total, 1);
        assert_eq!(payload.items[0]["fields"]["title"], "T");
        assert_eq!(payload.includes.entries.len(), 1);
        assert!(payload.includes.assets.is_empty());
    }

    #[tokio::test]
    async fn test_entries_by_author() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ENTRIES_PATH))
            .and(query_param("fields.authorId", "author42"))
            .and(query_param("content_type", "author"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cms_reply()))
            .mount(&mock_server)
            .await;

        let client = FallbackClient::new(&config(&mock_server.uri()))
            .unwrap()
            .unwrap();
        let payload = client
            .entries_by_author("author42", "author", 1)
            .await
            .unwrap();
        assert_eq!(payload.items.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_content_type_is_omitted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ENTRIES_PATH))
            .and(query_param("include", "0"))
            .and(query_param_is_missing("content_type"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cms_reply()))
            .mount(&mock_server)
            .await;

        let client = FallbackClient::new(&config(&mock_server.uri()))
            .unwrap()
            .unwrap();
        assert!(client.entries_by_content_type("", 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ENTRIES_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "sys": {"type": "Error", "id": "AccessTokenInvalid"},
                "message": "The access token you sent could not be found or is invalid."
            })))
            .mount(&mock_server)
            .await;

        let client = FallbackClient::new(&config(&mock_server.uri()))
            .unwrap()
            .unwrap();

        match client.entries_by_content_type("article", 1).await {
            Err(FallbackError::Status { status, message }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(
                    message,
                    "The access token you sent could not be found or is invalid."
                );
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_without_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ENTRIES_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = FallbackClient::new(&config(&mock_server.uri()))
            .unwrap()
            .unwrap();

        match client.entries_by_content_type("article", 1).await {
            Err(FallbackError::Status { status, message }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "Service Unavailable");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }
}
