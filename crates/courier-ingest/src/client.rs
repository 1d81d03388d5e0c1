//! Paginated remote API client
//!
//! [`RemoteClient`] sends one logical GET at a time through a
//! [`Transport`], retrying timeouts and dropped connections according to its
//! [`RetryPolicy`]. Whatever finally fails is reported as a
//! [`RemoteApiError`].
//!
//! List endpoints answer with an envelope:
//!
//! ```json
//! { "meta": { "limit": 1, "next": "/api/v2/file/?offset=1", "offset": 0,
//!             "previous": null, "total_count": 3 },
//!   "objects": [ ... ] }
//! ```
//!
//! [`Pages`] follows `meta.next` until it is null or empty.

use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::{RemoteApiError, TransportError, PAGINATION_LOOP};
use crate::transport::{RetryPolicy, Transport};

/// Pagination metadata of a list response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageMeta {
    pub limit: Option<u64>,
    pub next: Option<String>,
    pub offset: Option<u64>,
    pub previous: Option<String>,
    pub total_count: Option<u64>,
}

/// One page of a list response
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub meta: PageMeta,
    pub objects: Vec<T>,
}

/// Append an API prefix to a base URL, keeping any path the base already has.
///
/// `("http://host:8000", "/api/v2")` gives `http://host:8000/api/v2/` and
/// `("https://host/archivematica", "/api/v2/")` gives
/// `https://host/archivematica/api/v2/`. The trailing slash makes relative
/// resource paths land under the prefix.
pub fn api_base(base_url: &str, api_prefix: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
    }

    let mut path = url.path().trim_end_matches('/').to_string();
    let prefix = api_prefix.trim_matches('/');
    if !prefix.is_empty() {
        path.push('/');
        path.push_str(prefix);
    }
    path.push('/');
    url.set_path(&path);
    Ok(url)
}

pub struct RemoteClient {
    system: String,
    base_url: Url,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

// Manual impl: the transport holds credentials.
impl fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("system", &self.system)
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    pub fn new(
        system: impl Into<String>,
        base_url: Url,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            system: system.into(),
            base_url,
            transport,
            retry,
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn error(&self, err: &TransportError) -> RemoteApiError {
        RemoteApiError::from_transport(&self.system, err)
    }

    /// URL of a resource below the base URL, with query parameters appended
    pub fn resource_url(
        &self,
        resource_path: &str,
        query: &[(&str, String)],
    ) -> Result<Url, RemoteApiError> {
        let mut url = self
            .base_url
            .join(resource_path)
            .map_err(|e| self.error(&e.into()))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Resolve a `next` cursor. Absolute URLs are kept; paths replace the
    /// base URL's path and query.
    fn resolve_cursor(&self, cursor: &str) -> Result<Url, RemoteApiError> {
        self.base_url.join(cursor).map_err(|e| self.error(&e.into()))
    }

    fn decode<T: DeserializeOwned>(&self, body: Value) -> Result<T, RemoteApiError> {
        serde_json::from_value(body).map_err(|e| self.error(&TransportError::Decode(e.to_string())))
    }

    async fn send(&self, url: Url) -> Result<Value, RemoteApiError> {
        let max_attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            match self.transport.get(url.clone()).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        system = %self.system,
                        %url,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => {
                    let error = self.error(&err);
                    warn!(system = %self.system, %url, attempt, error = %err, "Request failed");
                    return Err(error);
                },
            }
        }
    }

    /// Single request with query parameters, decoded into `T`
    pub async fn get<T: DeserializeOwned>(
        &self,
        resource_path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteApiError> {
        let url = self.resource_url(resource_path, query)?;
        let body = self.send(url).await?;
        self.decode(body)
    }

    /// Single request returning the raw JSON body
    pub async fn fetch_one(&self, resource_path: &str) -> Result<Value, RemoteApiError> {
        self.get(resource_path, &[]).await
    }

    /// Start paging through a list endpoint. Nothing is requested until
    /// [`Pages::next_page`] is called.
    pub fn pages<T: DeserializeOwned>(
        &self,
        resource_path: &str,
        query: &[(&str, String)],
    ) -> Result<Pages<'_, T>, RemoteApiError> {
        Ok(Pages {
            client: self,
            next: Some(self.resource_url(resource_path, query)?),
            visited: HashSet::new(),
            fetched: 0,
            _records: PhantomData,
        })
    }

    /// Every record of every page, in page order
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        resource_path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteApiError> {
        let mut pages = self.pages(resource_path, query)?;
        let mut records = Vec::new();
        while let Some(objects) = pages.next_page().await? {
            records.extend(objects);
        }
        debug!(
            system = %self.system,
            resource_path,
            pages = pages.fetched(),
            records = records.len(),
            "Fetched all pages"
        );
        Ok(records)
    }
}

/// Cursor over the pages of a list endpoint.
///
/// Pages are fetched one at a time, each only after the previous page
/// supplied its cursor. Once exhausted, or after an error, it yields nothing
/// more. A cursor pointing at a page already fetched fails with cause
/// `PaginationLoop`.
pub struct Pages<'a, T> {
    client: &'a RemoteClient,
    next: Option<Url>,
    visited: HashSet<Url>,
    fetched: usize,
    _records: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> Pages<'a, T> {
    /// Number of pages fetched so far
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }

    /// Fetch the next page's records, `None` once the cursor runs out
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, RemoteApiError> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        debug!(system = %self.client.system, %url, page = self.fetched + 1, "Fetching page");
        self.visited.insert(url.clone());
        let body = self.client.send(url).await?;
        let page: Page<T> = self.client.decode(body)?;
        self.fetched += 1;

        self.next = match page.meta.next.as_deref().filter(|next| !next.is_empty()) {
            Some(cursor) => {
                let url = self.client.resolve_cursor(cursor)?;
                if self.visited.contains(&url) {
                    warn!(system = %self.client.system, %url, "Cursor repeats a fetched page");
                    return Err(RemoteApiError::new(&self.client.system, PAGINATION_LOOP));
                }
                Some(url)
            },
            None => None,
        };

        Ok(Some(page.objects))
    }

    /// Pages as a stream of record batches
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>, RemoteApiError>> + 'a
    where
        T: 'a,
    {
        futures::stream::try_unfold(self, |mut pages| async move {
            let batch = pages.next_page().await?;
            Ok::<_, RemoteApiError>(batch.map(|objects| (objects, pages)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plays back canned results; times out once the script runs dry
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, TransportError>>>,
        requested: Mutex<Vec<Url>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requested.lock().unwrap().len()
        }

        fn requested(&self) -> Vec<String> {
            self.requested
                .lock()
                .unwrap()
                .iter()
                .map(Url::to_string)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: Url) -> Result<Value, TransportError> {
            self.requested.lock().unwrap().push(url);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Timeout("scripted timeout".to_string())))
        }
    }

    fn timeout() -> Result<Value, TransportError> {
        Err(TransportError::Timeout("scripted timeout".to_string()))
    }

    fn client(transport: Arc<ScriptedTransport>) -> RemoteClient {
        RemoteClient::new(
            "Archivematica",
            api_base("http://archivematica.example.org:8000", "/api/v2/").unwrap(),
            transport,
            RetryPolicy::immediate(3),
        )
    }

    fn page(id: u32, next: Option<&str>) -> Result<Value, TransportError> {
        Ok(json!({
            "meta": { "limit": 1, "next": next, "offset": id, "previous": null, "total_count": 3 },
            "objects": [ { "id": id } ]
        }))
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Record {
        id: u32,
    }

    #[test]
    fn api_base_keeps_path_of_base_url() {
        let base = api_base("https://host/archivematica/", "/api/v2/").unwrap();
        assert_eq!(base.as_str(), "https://host/archivematica/api/v2/");
        assert_eq!(
            base.join("file/").unwrap().as_str(),
            "https://host/archivematica/api/v2/file/"
        );
        assert_eq!(
            api_base("https://host/archivematica", "api/v2").unwrap().as_str(),
            "https://host/archivematica/api/v2/"
        );
    }

    #[test]
    fn api_base_adds_trailing_slash() {
        let base = api_base("http://host:8000", "/api/v2").unwrap();
        assert_eq!(base.as_str(), "http://host:8000/api/v2/");
        assert_eq!(
            base.join("file/").unwrap().as_str(),
            "http://host:8000/api/v2/file/"
        );
    }

    #[test]
    fn debug_output_names_system_only() {
        let transport = ScriptedTransport::new(vec![]);
        let debug = format!("{:?}", client(transport));
        assert!(debug.contains("Archivematica"));
        assert!(debug.contains("/api/v2/"));
    }

    #[tokio::test]
    async fn fetch_one_succeeds_after_one_timeout() {
        let transport = ScriptedTransport::new(vec![timeout(), Ok(json!({}))]);
        let client = client(transport.clone());

        let body = client.fetch_one("file/").await.unwrap();

        assert_eq!(body, json!({}));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn fetch_one_gives_up_after_max_attempts() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone());

        let err = client.fetch_one("file/").await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert_eq!(
            err.to_string(),
            "Error occurred while interacting with Archivematica API. \
             Error type: TimeoutError; status code: none; body: none"
        );
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Status {
            status: 401,
            body: "Unauthorized".to_string(),
        })]);
        let client = client(transport.clone());

        let err = client.fetch_one("file/").await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert_eq!(err.cause, "UnauthorizedError");
        assert_eq!(err.status, Some(401));
        assert_eq!(err.body.as_deref(), Some("Unauthorized"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_exponentially() {
        let transport = ScriptedTransport::new(vec![timeout(), timeout(), Ok(json!({}))]);
        let client = RemoteClient::new(
            "Archivematica",
            api_base("http://archivematica.example.org:8000", "/api/v2/").unwrap(),
            transport.clone(),
            RetryPolicy {
                max_attempts: 3,
                interval: Duration::from_millis(500),
                backoff_factor: 2,
            },
        );

        let started = tokio::time::Instant::now();
        client.fetch_one("file/").await.unwrap();

        assert_eq!(transport.calls(), 3);
        // 500ms after the first failure, 1000ms after the second
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert!(started.elapsed() < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn fetch_all_follows_cursors_in_order() {
        let cursor = "/api/v2/file/?current_location=loc&limit=1";
        let transport = ScriptedTransport::new(vec![
            page(0, Some(&format!("{cursor}&offset=1"))),
            page(1, Some(&format!("{cursor}&offset=2"))),
            page(2, None),
        ]);
        let client = client(transport.clone());

        let records: Vec<Record> = client
            .fetch_all("file/", &[("current_location", "loc".to_string())])
            .await
            .unwrap();

        assert_eq!(records, vec![Record { id: 0 }, Record { id: 1 }, Record { id: 2 }]);
        assert_eq!(
            transport.requested(),
            vec![
                "http://archivematica.example.org:8000/api/v2/file/?current_location=loc",
                "http://archivematica.example.org:8000/api/v2/file/?current_location=loc&limit=1&offset=1",
                "http://archivematica.example.org:8000/api/v2/file/?current_location=loc&limit=1&offset=2",
            ]
        );
    }

    #[tokio::test]
    async fn page_retry_does_not_duplicate_records() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("/api/v2/file/?offset=1")),
            timeout(),
            page(1, Some("")),
        ]);
        let client = client(transport.clone());

        let records: Vec<Record> = client.fetch_all("file/", &[]).await.unwrap();

        assert_eq!(records, vec![Record { id: 0 }, Record { id: 1 }]);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn absolute_cursor_is_used_as_is() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("https://mirror.example.org/api/v2/file/?offset=1")),
            page(1, None),
        ]);
        let client = client(transport.clone());

        let _: Vec<Record> = client.fetch_all("file/", &[]).await.unwrap();

        assert_eq!(
            transport.requested()[1],
            "https://mirror.example.org/api/v2/file/?offset=1"
        );
    }

    #[tokio::test]
    async fn pages_stop_after_error() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("/api/v2/file/?offset=1")),
            Err(TransportError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let client = client(transport.clone());
        let mut pages = client.pages::<Record>("file/", &[]).unwrap();

        assert_eq!(pages.next_page().await.unwrap(), Some(vec![Record { id: 0 }]));
        let err = pages.next_page().await.unwrap_err();
        assert_eq!(err.cause, "ServerError");
        assert!(pages.is_exhausted());
        assert_eq!(pages.next_page().await.unwrap(), None);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn cursor_pointing_at_itself_ends_paging() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("/api/v2/file/?offset=0")),
            page(0, Some("/api/v2/file/?offset=0")),
        ]);
        let client = client(transport.clone());

        let err = client
            .fetch_all::<Record>("file/", &[("offset", "0".to_string())])
            .await
            .unwrap_err();

        assert_eq!(err.cause, PAGINATION_LOOP);
        assert_eq!(err.status, None);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn cursor_returning_to_an_earlier_page_ends_paging() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("/api/v2/file/?offset=1")),
            page(1, Some("/api/v2/file/")),
        ]);
        let client = client(transport.clone());
        let mut pages = client.pages::<Record>("file/", &[]).unwrap();

        assert_eq!(pages.next_page().await.unwrap(), Some(vec![Record { id: 0 }]));
        let err = pages.next_page().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error occurred while interacting with Archivematica API. \
             Error type: PaginationLoop; status code: none; body: none"
        );
        assert!(pages.is_exhausted());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn pages_stream_yields_each_batch() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("/api/v2/file/?offset=1")),
            page(1, None),
        ]);
        let client = client(transport);

        let batches: Vec<Vec<Record>> = client
            .pages::<Record>("file/", &[])
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(batches, vec![vec![Record { id: 0 }], vec![Record { id: 1 }]]);
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_parsing_error() {
        let transport = ScriptedTransport::new(vec![Ok(json!({ "meta": {} }))]);
        let client = client(transport);

        let err = client.fetch_all::<Record>("file/", &[]).await.unwrap_err();

        assert_eq!(err.cause, "ParsingError");
        assert_eq!(err.status, None);
    }
}
