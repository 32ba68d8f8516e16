use async_trait::async_trait;
use schedule_scraper::error::{Result as ScraperResult, ScraperError};
use schedule_scraper::http::{HttpClient, HttpResponse, ReqwestHttp};
use schedule_scraper::resolver::VenueAddressResolver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const REMOTE_PAGE: &str = r#"
    <html><body>
        <h2 class="venue-heading">Ice Dome <span class="address">12 Rink Way, Lakeside</span></h2>
    </body></html>"#;

fn fast_resolver(http: Arc<dyn HttpClient>) -> VenueAddressResolver {
    VenueAddressResolver::new(http).with_backoff_base(Duration::from_millis(5))
}

/// Replays a fixed sequence of responses and counts every request.
struct ScriptedHttp {
    responses: Mutex<VecDeque<HttpResponse>>,
    hits: AtomicUsize,
}

impl ScriptedHttp {
    fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            hits: AtomicUsize::new(0),
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, _url: &str) -> ScraperResult<HttpResponse> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let resp = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted responses exhausted");
        Ok(resp)
    }
}

fn ok(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: body.to_string(),
    }
}

fn server_error() -> HttpResponse {
    HttpResponse {
        status: 500,
        body: String::new(),
    }
}

#[tokio::test]
async fn concurrent_fetches_for_one_key_hit_the_network_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/venues/1")
        .with_status(200)
        .with_body(REMOTE_PAGE)
        .expect(1)
        .create_async()
        .await;

    let resolver = Arc::new(fast_resolver(Arc::new(ReqwestHttp::new())));
    let url = format!("{}/venues/1", server.url());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let resolver = Arc::clone(&resolver);
        let url = url.clone();
        handles.push(tokio::spawn(
            async move { resolver.fetch(&url, "remote").await },
        ));
    }

    for handle in handles {
        let address = handle.await.unwrap().unwrap();
        assert_eq!(address, "12 Rink Way, Lakeside");
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn completed_fetch_is_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/venues/2")
        .with_status(200)
        .with_body(REMOTE_PAGE)
        .expect(1)
        .create_async()
        .await;

    let resolver = fast_resolver(Arc::new(ReqwestHttp::new()));
    let url = format!("{}/venues/2", server.url());

    let first = resolver.fetch(&url, "remote").await.unwrap();
    let second = resolver.fetch(&url, "remote").await.unwrap();
    assert_eq!(first, second);
    mock.assert_async().await;
}

#[tokio::test]
async fn transient_errors_are_retried_up_to_the_bound() {
    let http = Arc::new(ScriptedHttp::new(vec![
        server_error(),
        server_error(),
        ok(REMOTE_PAGE),
    ]));
    let resolver = fast_resolver(http.clone());

    let address = resolver
        .fetch("http://venues.test/v/3", "remote")
        .await
        .unwrap();
    assert_eq!(address, "12 Rink Way, Lakeside");
    assert_eq!(http.hits(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_and_the_failure_is_cached() {
    let http = Arc::new(ScriptedHttp::new(vec![
        server_error(),
        server_error(),
        server_error(),
    ]));
    let resolver = fast_resolver(http.clone());
    let url = "http://venues.test/v/4";

    let err = resolver.fetch(url, "remote").await.unwrap_err();
    assert!(matches!(err, ScraperError::Fetch(_)));
    assert_eq!(http.hits(), 3);

    // A further call returns the cached failure with no new request.
    let err = resolver.fetch(url, "remote").await.unwrap_err();
    assert!(matches!(err, ScraperError::Fetch(_)));
    assert_eq!(http.hits(), 3);
}

#[tokio::test]
async fn unsupported_class_fails_without_network_activity() {
    let http = Arc::new(ScriptedHttp::new(vec![]));
    let resolver = fast_resolver(http.clone());

    let err = resolver
        .fetch("http://venues.test/v/5", "sideways")
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::UnsupportedClass(_)));
    assert_eq!(http.hits(), 0);

    // Cached as a negative result as well.
    let err = resolver
        .fetch("http://venues.test/v/5", "sideways")
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::UnsupportedClass(_)));
    assert_eq!(http.hits(), 0);
}

#[tokio::test]
async fn missing_element_is_terminal_and_not_retried() {
    let http = Arc::new(ScriptedHttp::new(vec![ok("<html><body></body></html>")]));
    let resolver = fast_resolver(http.clone());
    let url = "http://venues.test/v/6";

    let err = resolver.fetch(url, "remote").await.unwrap_err();
    assert!(matches!(err, ScraperError::ElementNotFound(_)));
    assert_eq!(http.hits(), 1);

    let err = resolver.fetch(url, "remote").await.unwrap_err();
    assert!(matches!(err, ScraperError::ElementNotFound(_)));
    assert_eq!(http.hits(), 1);
}

#[tokio::test]
async fn fetch_multiple_separates_successes_from_failures() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/venues/good")
        .with_status(200)
        .with_body(REMOTE_PAGE)
        .create_async()
        .await;
    server
        .mock("GET", "/venues/bad")
        .with_status(404)
        .expect(3)
        .create_async()
        .await;

    let resolver = Arc::new(fast_resolver(Arc::new(ReqwestHttp::new())));
    let good = format!("{}/venues/good", server.url());
    let bad = format!("{}/venues/bad", server.url());
    let requests = vec![
        (good.clone(), "remote".to_string()),
        (bad.clone(), "remote".to_string()),
    ];

    let (addresses, failures) = resolver.fetch_multiple(&requests).await;
    assert_eq!(addresses.get(&good).unwrap(), "12 Rink Way, Lakeside");
    assert!(!addresses.contains_key(&bad));
    assert!(failures.contains_key(&bad));
}
