//! Microsoft Graph OneNote client.
//!
//! A thin, typed wrapper over the REST surface the export needs:
//! notebook/section/page listings, raw page HTML, and image bytes.
//!
//! ## Retry Strategy
//!
//! Every API call funnels through one retry helper. Graph is slow-shared
//! infrastructure: 504s and connection resets under load are routine and
//! transient, so those retry with exponential backoff (default 3 attempts,
//! 2 s initial delay, doubling). A 401 means the token expired mid-batch;
//! the helper asks the [`TokenSource`] for a replacement and retries
//! immediately — the token source serialises concurrent refreshes so five
//! workers hitting 401 together trigger one sign-in, not five. Any other
//! non-success status is not retryable and surfaces at once.

use crate::auth::TokenSource;
use crate::error::ExportError;
use crate::tree::RawPage;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Production API root.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// A notebook as returned by the notebooks listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub display_name: String,
}

/// A section within a notebook.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub display_name: String,
}

/// Graph collection envelope: `value` plus the optional `$count` hint.
#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.count")]
    count: Option<usize>,
}

/// Authenticated Graph client shared by all workers.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    max_retries: u32,
    initial_backoff: Duration,
    page_batch: usize,
}

impl GraphClient {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        max_retries: u32,
        retry_backoff_ms: u64,
        page_batch: usize,
    ) -> Result<Self, ExportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ExportError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: GRAPH_BASE_URL.to_string(),
            tokens,
            max_retries: max_retries.max(1),
            initial_backoff: Duration::from_millis(retry_backoff_ms),
            page_batch: page_batch.max(1),
        })
    }

    /// Point the client at a different API root (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    // ── Listings ─────────────────────────────────────────────────────────

    pub async fn list_notebooks(&self) -> Result<Vec<Notebook>, ExportError> {
        let listing: Listing<Notebook> = self.get_json("me/onenote/notebooks", &[], &[]).await?;
        Ok(listing.value)
    }

    pub async fn list_sections(&self, notebook_id: &str) -> Result<Vec<Section>, ExportError> {
        let path = format!("me/onenote/notebooks/{notebook_id}/sections");
        let listing: Listing<Section> = self.get_json(&path, &[], &[]).await?;
        Ok(listing.value)
    }

    /// Fetch the flat pages listing of a section, following `$skip`/`$top`
    /// pagination until an empty batch arrives or the running total
    /// reaches the advertised `@odata.count`.
    pub async fn list_pages(&self, section_id: &str) -> Result<Vec<RawPage>, ExportError> {
        let path = format!("me/onenote/sections/{section_id}/pages");
        // ConsistencyLevel is required for $count to be honoured.
        let headers = [("ConsistencyLevel", "eventual")];

        let mut pages: Vec<RawPage> = Vec::new();
        let mut skip = 0usize;
        loop {
            let top = self.page_batch.to_string();
            let skip_str = skip.to_string();
            let query = [
                ("pagelevel", "true"),
                ("$select", "id,title,level,order"),
                ("$count", "true"),
                ("$top", top.as_str()),
                ("$skip", skip_str.as_str()),
            ];

            debug!(skip, batch = self.page_batch, "fetching pages batch");
            let listing: Listing<RawPage> = self.get_json(&path, &query, &headers).await?;
            if listing.value.is_empty() {
                break;
            }
            pages.extend(listing.value);

            if let Some(total) = listing.count {
                debug!(retrieved = pages.len(), total, "pages progress");
                if pages.len() >= total {
                    break;
                }
            }
            skip += self.page_batch;
        }

        Ok(pages)
    }

    /// Raw HTML body of a page.
    pub async fn page_content(&self, page_id: &str) -> Result<String, ExportError> {
        let path = format!("me/onenote/pages/{page_id}/content");
        let url = self.absolute(&path);
        let response = self.get_with_retry(&url, &[], &[]).await?;
        response.text().await.map_err(|e| ExportError::ApiResponse {
            url,
            detail: e.to_string(),
        })
    }

    // ── Image support ────────────────────────────────────────────────────

    /// Download a resource body, optionally with the bearer credential.
    ///
    /// Single-attempt by design: image fetches are best-effort and the
    /// caller's failure policy is warn-and-skip, not fail-the-page.
    pub async fn fetch_bytes(&self, url: &str, with_auth: bool) -> Result<Vec<u8>, ExportError> {
        let mut request = self.http.get(url);
        if with_auth {
            request = request.bearer_auth(self.tokens.access_token().await?);
        }
        let response = request.send().await.map_err(|e| ExportError::ApiTransport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(ExportError::ApiStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| ExportError::ApiTransport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// HEAD probe for the `Content-Type` of a resource. Best-effort: any
    /// failure is reported as `None` and the caller falls back to a
    /// default extension.
    pub async fn probe_content_type(&self, url: &str, with_auth: bool) -> Option<String> {
        let mut request = self.http.head(url);
        if with_auth {
            request = request.bearer_auth(self.tokens.access_token().await.ok()?);
        }
        let response = request.send().await.ok()?;
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)?
            .to_str()
            .ok()
            .map(str::to_string)
    }

    // ── Request plumbing ─────────────────────────────────────────────────

    fn absolute(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: &[(&'static str, &str)],
    ) -> Result<T, ExportError> {
        let url = self.absolute(path);
        let response = self.get_with_retry(&url, query, headers).await?;
        response.json().await.map_err(|e| ExportError::ApiResponse {
            url,
            detail: e.to_string(),
        })
    }

    /// GET with bounded retries: backoff on 5xx/transport errors, token
    /// refresh on 401, immediate surfacing of anything else.
    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&'static str, &str)],
    ) -> Result<reqwest::Response, ExportError> {
        let mut backoff = self.initial_backoff;
        let mut last_detail = String::new();

        for attempt in 1..=self.max_retries {
            let token = self.tokens.access_token().await?;
            let mut request = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == reqwest::StatusCode::UNAUTHORIZED && attempt < self.max_retries {
                        warn!("token rejected (401); refreshing and retrying");
                        self.tokens.refresh(&token).await?;
                        continue;
                    }
                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            "HTTP {status} from '{url}', retrying in {:?} (attempt {attempt}/{})",
                            backoff, self.max_retries
                        );
                        last_detail = format!("HTTP {status}");
                        sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }
                    if status.is_server_error() {
                        last_detail = format!("HTTP {status}");
                        break;
                    }
                    return Err(ExportError::ApiStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        "request to '{url}' failed: {e}, retrying in {:?} (attempt {attempt}/{})",
                        backoff, self.max_retries
                    );
                    last_detail = e.to_string();
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    last_detail = e.to_string();
                    break;
                }
            }
        }

        Err(ExportError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_retries,
            detail: last_detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn client(server_url: &str, max_retries: u32) -> GraphClient {
        GraphClient::new(Arc::new(StaticToken::new("test-token")), max_retries, 1, 100)
            .expect("client")
            .with_base_url(server_url)
    }

    #[tokio::test]
    async fn lists_notebooks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me/onenote/notebooks")
            .match_header("authorization", "Bearer test-token")
            .with_body(r#"{"value":[{"id":"nb1","displayName":"Work"}]}"#)
            .create_async()
            .await;

        let notebooks = client(&server.url(), 3)
            .list_notebooks()
            .await
            .expect("notebooks");
        assert_eq!(notebooks.len(), 1);
        assert_eq!(notebooks[0].display_name, "Work");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_the_budget_runs_out() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/me/onenote/notebooks")
            .with_status(504)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server.url(), 3)
            .list_notebooks()
            .await
            .expect_err("must fail after the third attempt");
        match err {
            ExportError::RetriesExhausted {
                attempts, detail, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(detail.contains("504"), "got: {detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Exactly three HTTP hits: the initial attempt plus two retries.
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn non_retryable_status_fails_fast() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me/onenote/notebooks")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server.url(), 3)
            .list_notebooks()
            .await
            .expect_err("must fail");
        match err {
            ExportError::ApiStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn paginates_until_count_reached() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/me/onenote/sections/s1/pages")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("$skip".into(), "0".into()),
                mockito::Matcher::UrlEncoded("$top".into(), "2".into()),
            ]))
            .with_body(
                r#"{"@odata.count":3,"value":[{"id":"p1","title":"a","level":0,"order":0},{"id":"p2","title":"b","level":0,"order":1}]}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/me/onenote/sections/s1/pages")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("$skip".into(), "2".into()),
                mockito::Matcher::UrlEncoded("$top".into(), "2".into()),
            ]))
            .with_body(r#"{"@odata.count":3,"value":[{"id":"p3","title":"c","level":0,"order":2}]}"#)
            .create_async()
            .await;

        let client = GraphClient::new(Arc::new(StaticToken::new("t")), 3, 1, 2)
            .expect("client")
            .with_base_url(server.url());
        let pages = client.list_pages("s1").await.expect("pages");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].id, "p3");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn pagination_stops_on_empty_batch_without_count() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/onenote/sections/s1/pages")
            .match_query(mockito::Matcher::UrlEncoded("$skip".into(), "0".into()))
            .with_body(r#"{"value":[{"id":"p1","title":"a","level":0,"order":0}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/me/onenote/sections/s1/pages")
            .match_query(mockito::Matcher::UrlEncoded("$skip".into(), "100".into()))
            .with_body(r#"{"value":[]}"#)
            .create_async()
            .await;

        let pages = client(&server.url(), 3).list_pages("s1").await.expect("pages");
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn refreshes_token_on_401() {
        use crate::auth::TokenSource;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Hands out "stale" first, then "fresh" after one refresh.
        struct Rotating {
            refreshes: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl TokenSource for Rotating {
            async fn access_token(&self) -> Result<String, ExportError> {
                Ok(if self.refreshes.load(Ordering::SeqCst) == 0 {
                    "stale".to_string()
                } else {
                    "fresh".to_string()
                })
            }

            async fn refresh(&self, _stale: &str) -> Result<String, ExportError> {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            }
        }

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/onenote/notebooks")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", "/me/onenote/notebooks")
            .match_header("authorization", "Bearer fresh")
            .with_body(r#"{"value":[]}"#)
            .create_async()
            .await;

        let tokens = Arc::new(Rotating {
            refreshes: AtomicUsize::new(0),
        });
        let client = GraphClient::new(tokens.clone(), 3, 1, 100)
            .expect("client")
            .with_base_url(server.url());

        client.list_notebooks().await.expect("succeeds after refresh");
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }
}
