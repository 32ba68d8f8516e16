use crate::error::{Result, ScraperError};
use crate::http::HttpClient;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

pub const VENUE_CLASS_REMOTE: &str = "remote";
pub const VENUE_CLASS_LOCAL: &str = "local";

/// Retries after the initial attempt, so a key sees at most three requests.
const MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
/// Cap on concurrent venue detail fetches across one batch of lookups.
const DEFAULT_FANOUT_LIMIT: usize = 8;

/// Remote association pages carry the address in the venue heading.
const REMOTE_ADDRESS_SELECTOR: &str = "h2.venue-heading span.address";
/// Local league pages put it in the calendar detail block.
const LOCAL_ADDRESS_SELECTOR: &str = "div.calendar-details div.venue-address";

/// Terminal failure for one venue lookup. Cloneable so the cached value can
/// be handed to every waiter.
#[derive(Debug, Clone)]
pub enum ResolveFailure {
    Fetch(String),
    ElementNotFound(String),
    UnsupportedClass(String),
}

impl From<ResolveFailure> for ScraperError {
    fn from(failure: ResolveFailure) -> Self {
        match failure {
            ResolveFailure::Fetch(msg) => ScraperError::Fetch(msg),
            ResolveFailure::ElementNotFound(msg) => ScraperError::ElementNotFound(msg),
            ResolveFailure::UnsupportedClass(msg) => ScraperError::UnsupportedClass(msg),
        }
    }
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveFailure::Fetch(msg) => write!(f, "fetch failed: {}", msg),
            ResolveFailure::ElementNotFound(msg) => write!(f, "element not found: {}", msg),
            ResolveFailure::UnsupportedClass(msg) => write!(f, "unsupported class: {}", msg),
        }
    }
}

type VenueResult = std::result::Result<String, ResolveFailure>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VenueKey {
    url: String,
    class_hint: String,
}

enum CacheSlot {
    /// A fetch is underway; waiters subscribe to the completion signal.
    InFlight(watch::Receiver<Option<VenueResult>>),
    /// Terminal for the process lifetime, success or failure.
    Done(VenueResult),
}

enum Role {
    Leader(watch::Sender<Option<VenueResult>>),
    Follower(watch::Receiver<Option<VenueResult>>),
    Hit(VenueResult),
}

/// Resolves a venue's address from its detail page, coalescing duplicate
/// concurrent requests and caching every terminal outcome. Owned explicitly
/// by the dispatch layer and shared via `Arc`; the guarded section only
/// inspects and updates the cache map, never spans I/O.
pub struct VenueAddressResolver {
    http: Arc<dyn HttpClient>,
    cache: Mutex<HashMap<VenueKey, CacheSlot>>,
    fanout: Arc<Semaphore>,
    backoff_base: Duration,
}

impl VenueAddressResolver {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            cache: Mutex::new(HashMap::new()),
            fanout: Arc::new(Semaphore::new(DEFAULT_FANOUT_LIMIT)),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Shrink the retry backoff; used by tests to keep runs fast.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_fanout_limit(mut self, limit: usize) -> Self {
        self.fanout = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Resolve the address for `(url, class_hint)`. The first caller for a
    /// key performs the fetch; concurrent callers for the same key await its
    /// completion signal and receive the identical result. Later callers get
    /// the cached result with no network activity.
    pub async fn fetch(&self, url: &str, class_hint: &str) -> Result<String> {
        let key = VenueKey {
            url: url.to_string(),
            class_hint: class_hint.to_string(),
        };

        let role = {
            let mut cache = self.cache.lock().unwrap();
            match cache.get(&key) {
                Some(CacheSlot::Done(result)) => Role::Hit(result.clone()),
                Some(CacheSlot::InFlight(rx)) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    cache.insert(key.clone(), CacheSlot::InFlight(rx));
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Hit(result) => {
                debug!(url, class_hint, "venue cache hit");
                result.map_err(Into::into)
            }
            Role::Follower(mut rx) => {
                let result: VenueResult = rx
                    .wait_for(|value| value.is_some())
                    .await
                    .map(|guard| (*guard).clone())
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| {
                        Err(ResolveFailure::Fetch(format!(
                            "in-flight fetch for {} was abandoned",
                            url
                        )))
                    });
                result.map_err(Into::into)
            }
            Role::Leader(tx) => {
                let result = self.resolve(url, class_hint).await;
                {
                    let mut cache = self.cache.lock().unwrap();
                    cache.insert(key, CacheSlot::Done(result.clone()));
                }
                // Publish after the cache holds the terminal value, so a
                // waiter that wakes up and retries still sees it.
                let _ = tx.send(Some(result.clone()));
                result.map_err(Into::into)
            }
        }
    }

    /// Fan out `fetch` for a batch. Successes land in the first map,
    /// failures in the second, so callers can tell "failed" apart from
    /// "not requested". Concurrency is bounded by the fan-out semaphore.
    pub async fn fetch_multiple(
        self: Arc<Self>,
        requests: &[(String, String)],
    ) -> (HashMap<String, String>, HashMap<String, String>) {
        let mut handles = Vec::with_capacity(requests.len());
        for (url, class_hint) in requests {
            let resolver = Arc::clone(&self);
            let fanout = Arc::clone(&self.fanout);
            let url = url.clone();
            let class_hint = class_hint.clone();
            handles.push(tokio::spawn(async move {
                let _permit = fanout
                    .acquire_owned()
                    .await
                    .expect("venue fan-out semaphore closed");
                let result = resolver.fetch(&url, &class_hint).await;
                (url, result)
            }));
        }

        let mut addresses = HashMap::new();
        let mut failures = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok((url, Ok(address))) => {
                    addresses.insert(url, address);
                }
                Ok((url, Err(e))) => {
                    warn!(url = %url, "venue address lookup failed: {}", e);
                    failures.insert(url, e.to_string());
                }
                Err(e) => {
                    warn!("venue lookup task failed to join: {}", e);
                }
            }
        }
        (addresses, failures)
    }

    async fn resolve(&self, url: &str, class_hint: &str) -> VenueResult {
        if class_hint != VENUE_CLASS_REMOTE && class_hint != VENUE_CLASS_LOCAL {
            // Not a transport problem, so no retry; cached as a negative.
            return Err(ResolveFailure::UnsupportedClass(format!(
                "'{}' for {}",
                class_hint, url
            )));
        }
        let body = self.fetch_page_with_retry(url).await?;
        extract_address(&body, url, class_hint)
    }

    async fn fetch_page_with_retry(&self, url: &str) -> std::result::Result<String, ResolveFailure> {
        let mut attempt = 0u32;
        loop {
            let failure = match self.http.get(url).await {
                Ok(resp) if resp.is_success() => return Ok(resp.body),
                Ok(resp) => format!("{} returned status {}", url, resp.status),
                Err(e) => format!("{}: {}", url, e),
            };
            if attempt >= MAX_RETRIES {
                warn!(url, attempts = attempt + 1, "venue fetch exhausted retries");
                return Err(ResolveFailure::Fetch(failure));
            }
            let delay = self.backoff_base * 2u32.pow(attempt);
            warn!(
                url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "venue fetch failed, retrying after backoff: {}",
                failure
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn extract_address(body: &str, url: &str, class_hint: &str) -> VenueResult {
    let selector_str = if class_hint == VENUE_CLASS_REMOTE {
        REMOTE_ADDRESS_SELECTOR
    } else {
        LOCAL_ADDRESS_SELECTOR
    };
    let selector = Selector::parse(selector_str).unwrap();
    let document = Html::parse_document(body);
    match document.select(&selector).next() {
        Some(element) => {
            let address = element.text().collect::<String>().trim().to_string();
            if address.is_empty() {
                Err(ResolveFailure::ElementNotFound(format!(
                    "empty address element on {}",
                    url
                )))
            } else {
                Ok(address)
            }
        }
        None => Err(ResolveFailure::ElementNotFound(format!(
            "no address element on {} for class '{}'",
            url, class_hint
        ))),
    }
}
