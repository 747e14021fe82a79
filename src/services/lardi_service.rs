use crate::config::LardiConfig;
use crate::errors::ApiError;
use crate::model::{FilterSpecification, Offer, SearchEnvelope};
use crate::services::session_service::{LoginFlow, SessionManager};
use anyhow::Result;
use log::{debug, info, warn};
use rand::random;
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
];

const SITE_ORIGIN: &str = "https://lardi-trans.com";
const SEARCH_REFERER: &str = "https://lardi-trans.com/log/search/gruz/";

/// One retry after a session refresh, never more.
const MAX_AUTH_RETRIES: usize = 1;

/// POST body of the search endpoint. Field names are the wire contract.
#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
    pub page: usize,
    pub size: usize,
    #[serde(rename = "sortByCountryFirst")]
    pub sort_by_country_first: bool,
    pub filter: &'a FilterSpecification,
}

/// One parsed page: the well-formed offers plus the raw record count, which
/// drives pagination termination (a short page is the last page).
#[derive(Debug)]
pub struct ResultPage {
    pub offers: Vec<Offer>,
    pub total_records: usize,
}

/// Transport seam for the Lardi web API. The HTTP implementation lives
/// below; tests substitute a scripted fake.
#[allow(async_fn_in_trait)]
pub trait SearchTransport: Send + Sync {
    async fn search_page(
        &self,
        token: &str,
        request: &SearchRequest<'_>,
    ) -> Result<SearchEnvelope, ApiError>;

    async fn offer_details(&self, token: &str, offer_id: i64)
    -> Result<serde_json::Value, ApiError>;
}

pub struct HttpTransport {
    client: Client,
    search_url: String,
    offer_url: String,
}

impl HttpTransport {
    pub fn new(config: &LardiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(HttpTransport {
            client,
            search_url: config.search_url.clone(),
            offer_url: config.offer_url.clone(),
        })
    }

    fn browser_headers(builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        let user_agent = USER_AGENTS[random::<usize>() % USER_AGENTS.len()];
        builder
            .header("accept", "application/json, text/plain, */*")
            .header("content-type", "application/json")
            .header("origin", SITE_ORIGIN)
            .header("referer", SEARCH_REFERER)
            .header("user-agent", user_agent)
            .header("cookie", token)
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, ApiError> {
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::AuthExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }
}

impl SearchTransport for HttpTransport {
    async fn search_page(
        &self,
        token: &str,
        request: &SearchRequest<'_>,
    ) -> Result<SearchEnvelope, ApiError> {
        let response = Self::browser_headers(self.client.post(&self.search_url), token)
            .json(request)
            .send()
            .await?;
        let json = Self::read_json(response).await?;
        serde_json::from_value(json).map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    async fn offer_details(
        &self,
        token: &str,
        offer_id: i64,
    ) -> Result<serde_json::Value, ApiError> {
        let url = format!(
            "{}{}/awaiting/?currentId={}",
            self.offer_url, offer_id, offer_id
        );
        let response = Self::browser_headers(self.client.get(url), token)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

/// Search and detail client for the Lardi web API. All requests go through
/// one auth-retry strategy: a rejected session triggers exactly one cookie
/// refresh and one retry before the failure is surfaced.
pub struct LardiClient<T: SearchTransport, L: LoginFlow> {
    transport: T,
    session: Arc<SessionManager<L>>,
    page_size: usize,
    max_pages: usize,
}

impl<T: SearchTransport, L: LoginFlow> LardiClient<T, L> {
    pub fn new(transport: T, session: Arc<SessionManager<L>>, config: &LardiConfig) -> Self {
        LardiClient {
            transport,
            session,
            page_size: config.page_size,
            max_pages: config.max_pages,
        }
    }

    async fn with_auth_retry<R, F, Fut>(&self, op: F) -> Result<R, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        let mut refreshes = 0;
        loop {
            let token = self.session.current_token().await;
            match op(token).await {
                Err(ApiError::AuthExpired) if refreshes < MAX_AUTH_RETRIES => {
                    refreshes += 1;
                    warn!("Lardi session rejected, refreshing cookies and retrying once");
                    if !self.session.refresh().await {
                        return Err(ApiError::AuthFailure);
                    }
                }
                Err(ApiError::AuthExpired) => return Err(ApiError::AuthFailure),
                other => return other,
            }
        }
    }

    /// One page of search results. Individual malformed records are dropped
    /// and logged; a page without a proposals list fails as malformed.
    pub async fn search(
        &self,
        filter: &FilterSpecification,
        page: usize,
    ) -> Result<ResultPage, ApiError> {
        let envelope = self
            .with_auth_retry(|token| {
                let request = SearchRequest {
                    page,
                    size: self.page_size,
                    sort_by_country_first: false,
                    filter,
                };
                async move { self.transport.search_page(&token, &request).await }
            })
            .await?;

        let proposals = envelope
            .result
            .and_then(|r| r.proposals)
            .ok_or_else(|| ApiError::MalformedResponse("no proposals list in page".into()))?;

        let total_records = proposals.len();
        let mut offers = Vec::with_capacity(total_records);
        for entry in proposals {
            match serde_json::from_value::<Offer>(entry) {
                Ok(offer) => offers.push(offer),
                Err(e) => warn!("Dropping malformed offer record: {}", e),
            }
        }

        debug!("Search page {}: {} records", page, total_records);
        Ok(ResultPage {
            offers,
            total_records,
        })
    }

    /// Aggregates all pages for a filter, starting at page 1 and stopping at
    /// the first short page or at the hard page cap.
    pub async fn search_all(&self, filter: &FilterSpecification) -> Result<Vec<Offer>, ApiError> {
        let mut all = Vec::new();
        for page in 1..=self.max_pages {
            let result = self.search(filter, page).await?;
            let records = result.total_records;
            all.extend(result.offers);
            if records < self.page_size {
                break;
            }
            if page == self.max_pages {
                warn!(
                    "Search hit the {}-page cap, result set truncated",
                    self.max_pages
                );
            }
        }
        info!("Search finished: {} offers", all.len());
        Ok(all)
    }

    /// Raw detail envelope for one offer, for the details page.
    pub async fn get_offer(&self, offer_id: i64) -> Result<serde_json::Value, ApiError> {
        self.with_auth_retry(|token| async move {
            self.transport.offer_details(&token, offer_id).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LardiConfig;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> LardiConfig {
        LardiConfig {
            search_url: "https://lardi.test/search".into(),
            offer_url: "https://lardi.test/offer/".into(),
            webapp_details_url: "https://lardi.test/details".into(),
            page_size: 20,
            max_pages: 100,
            request_timeout_secs: 30,
        }
    }

    #[derive(Clone)]
    struct CountingLogin {
        calls: Arc<AtomicUsize>,
        succeed: bool,
    }

    impl LoginFlow for CountingLogin {
        fn login(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok("sid=fresh".into())
            } else {
                anyhow::bail!("browser automation timed out")
            }
        }
    }

    fn session(succeed: bool) -> (Arc<SessionManager<CountingLogin>>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let login = CountingLogin {
            calls: calls.clone(),
            succeed,
        };
        let dir = std::env::temp_dir().join(format!("lardi-test-{}", random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        (
            Arc::new(SessionManager::new(login, dir.join("cookies.txt"))),
            calls,
        )
    }

    fn page_of(ids: std::ops::Range<i64>) -> serde_json::Value {
        let proposals: Vec<serde_json::Value> = ids
            .map(|id| json!({"id": id, "dateCreate": "2024-06-24T10:30:00+03:00"}))
            .collect();
        json!({"result": {"proposals": proposals}})
    }

    /// Scripted transport: one canned response body per request, in order.
    struct FakeTransport {
        script: Mutex<Vec<Result<serde_json::Value, ApiError>>>,
        pages_requested: Mutex<Vec<usize>>,
    }

    impl FakeTransport {
        fn new(script: Vec<Result<serde_json::Value, ApiError>>) -> Self {
            FakeTransport {
                script: Mutex::new(script),
                pages_requested: Mutex::new(Vec::new()),
            }
        }

        fn next(&self) -> Result<serde_json::Value, ApiError> {
            self.script.lock().unwrap().remove(0)
        }
    }

    impl SearchTransport for FakeTransport {
        async fn search_page(
            &self,
            _token: &str,
            request: &SearchRequest<'_>,
        ) -> Result<SearchEnvelope, ApiError> {
            self.pages_requested.lock().unwrap().push(request.page);
            let body = self.next()?;
            serde_json::from_value(body).map_err(|e| ApiError::MalformedResponse(e.to_string()))
        }

        async fn offer_details(
            &self,
            _token: &str,
            _offer_id: i64,
        ) -> Result<serde_json::Value, ApiError> {
            self.next()
        }
    }

    #[tokio::test]
    async fn auth_rejection_refreshes_once_and_retries() {
        let transport = FakeTransport::new(vec![
            Err(ApiError::AuthExpired),
            Ok(page_of(0..3)),
        ]);
        let (session, refreshes) = session(true);
        let client = LardiClient::new(transport, session, &test_config());

        let offers = client
            .search_all(&FilterSpecification::default())
            .await
            .unwrap();
        assert_eq!(offers.len(), 3);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_auth_rejection_fails_after_one_refresh() {
        let transport = FakeTransport::new(vec![
            Err(ApiError::AuthExpired),
            Err(ApiError::AuthExpired),
        ]);
        let (session, refreshes) = session(true);
        let client = LardiClient::new(transport, session, &test_config());

        let err = client
            .search_all(&FilterSpecification::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthFailure));
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_auth_failure_without_second_request() {
        let transport = FakeTransport::new(vec![Err(ApiError::AuthExpired)]);
        let (session, refreshes) = session(false);
        let client = LardiClient::new(transport, session, &test_config());

        let err = client
            .search(&FilterSpecification::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthFailure));
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pagination_stops_at_the_first_short_page() {
        let transport = FakeTransport::new(vec![
            Ok(page_of(0..20)),
            Ok(page_of(20..40)),
            Ok(page_of(40..60)),
            Ok(page_of(60..65)),
            // page 5 would panic the script if requested
        ]);
        let (session, _) = session(true);
        let client = LardiClient::new(transport, session, &test_config());

        let offers = client
            .search_all(&FilterSpecification::default())
            .await
            .unwrap();
        assert_eq!(offers.len(), 65);
        assert_eq!(
            *client.transport.pages_requested.lock().unwrap(),
            vec![1, 2, 3, 4]
        );
    }

    #[tokio::test]
    async fn pagination_respects_the_hard_page_cap() {
        let mut config = test_config();
        config.max_pages = 3;
        let transport = FakeTransport::new(vec![
            Ok(page_of(0..20)),
            Ok(page_of(20..40)),
            Ok(page_of(40..60)),
        ]);
        let (session, _) = session(true);
        let client = LardiClient::new(transport, session, &config);

        let offers = client
            .search_all(&FilterSpecification::default())
            .await
            .unwrap();
        assert_eq!(offers.len(), 60);
    }

    #[tokio::test]
    async fn malformed_records_are_dropped_not_fatal() {
        let transport = FakeTransport::new(vec![Ok(json!({"result": {"proposals": [
            {"id": 1, "dateCreate": "2024-06-24T10:30:00"},
            "not a record",
            {"noId": true},
            {"id": 2},
        ]}}))]);
        let (session, _) = session(true);
        let client = LardiClient::new(transport, session, &test_config());

        let page = client
            .search(&FilterSpecification::default(), 1)
            .await
            .unwrap();
        assert_eq!(page.total_records, 4);
        let ids: Vec<i64> = page.offers.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn page_without_proposals_list_is_malformed() {
        let transport = FakeTransport::new(vec![Ok(json!({"unexpected": true}))]);
        let (session, _) = session(true);
        let client = LardiClient::new(transport, session, &test_config());

        let err = client
            .search(&FilterSpecification::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn detail_requests_share_the_auth_retry_strategy() {
        let transport = FakeTransport::new(vec![
            Err(ApiError::AuthExpired),
            Ok(json!({"id": 42})),
        ]);
        let (session, refreshes) = session(true);
        let client = LardiClient::new(transport, session, &test_config());

        let details = client.get_offer(42).await.unwrap();
        assert_eq!(details["id"], 42);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }
}
