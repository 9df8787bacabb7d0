use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::{models::cache::CacheEntry, services::ProviderError, utils::rate_limiter::RateLimiter};

/// Upstream JSON responses keyed by URL, held in memory and mirrored into
/// the cache directory.
pub struct HttpCache {
    dir: PathBuf,
    ttl_secs: i64,
    memory: DashMap<String, CacheEntry<Value>>,
}

impl HttpCache {
    pub fn new(dir: PathBuf, ttl_secs: i64) -> Self {
        HttpCache {
            dir,
            ttl_secs,
            memory: DashMap::new(),
        }
    }

    pub fn get(&self, url: &str) -> Option<Value> {
        if let Some(entry) = self.memory.get(url) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
        }

        let raw = std::fs::read_to_string(self.path_for(url)).ok()?;
        let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring unreadable cache file for {}: {}", url, e);
                return None;
            }
        };
        if entry.is_expired() {
            return None;
        }

        let value = entry.value.clone();
        self.memory.insert(url.to_string(), entry);
        Some(value)
    }

    pub fn put(&self, url: &str, value: Value) {
        let entry = CacheEntry::new(value, self.ttl_secs);
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(self.path_for(url), raw) {
                    warn!("Could not write cache file for {}: {}", url, e);
                }
            }
            Err(e) => warn!("Could not serialize cache entry for {}: {}", url, e),
        }
        self.memory.insert(url.to_string(), entry);
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let name: String = url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

/// Blocking JSON GETs with caching and throttling. The async client is driven
/// through the runtime handle, so callers must be on a blocking thread
/// (`spawn_blocking`), never on the executor itself.
pub struct JsonFetcher {
    client: Client,
    cache: Arc<HttpCache>,
    limiter: RateLimiter,
    runtime: Handle,
}

impl JsonFetcher {
    pub fn new(client: Client, cache: Arc<HttpCache>, limiter: RateLimiter, runtime: Handle) -> Self {
        JsonFetcher {
            client,
            cache,
            limiter,
            runtime,
        }
    }

    /// Returns `Value::Null` when the upstream answers 404. Only answers
    /// with data are cached: a 404 or an empty list may fill in later.
    pub fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        if let Some(value) = self.cache.get(url) {
            debug!("Cache hit for {}", url);
            return Ok(value);
        }

        let value = self.runtime.block_on(self.fetch(url))?;
        if has_data(&value) {
            self.cache.put(url, value.clone());
        } else {
            debug!("Not caching empty answer for {}", url);
        }
        Ok(value)
    }

    /// A JSON array endpoint decoded into `T`s. Not-found is an empty list.
    pub fn get_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, ProviderError> {
        match self.get_json(url)? {
            Value::Null => Ok(Vec::new()),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Value, ProviderError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .ok_or_else(|| ProviderError::Unavailable("request limiter closed".to_string()))?;

        debug!(
            "GET {} ({} upstream slots free)",
            url,
            self.limiter.available_permits()
        );
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }
        let value = response.error_for_status()?.json::<Value>().await?;
        Ok(value)
    }
}

/// Empty answers are a 404, an empty OpenF1 list or an Ergast table with
/// `total` of zero.
fn has_data(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => value["MRData"]["total"] != "0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves `bodies` in order, repeating the last one, and counts hits.
    async fn serve_in_order(bodies: &'static [&'static str]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let hit = counter.fetch_add(1, Ordering::SeqCst);
                let body = bodies[hit.min(bodies.len() - 1)];
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), hits)
    }

    #[test]
    fn entries_survive_a_fresh_cache_instance() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://api.openf1.org/v1/drivers?session_key=9158";

        let cache = HttpCache::new(dir.path().to_path_buf(), 60);
        assert!(cache.get(url).is_none());
        cache.put(url, json!([{"driver_number": 1}]));

        let reopened = HttpCache::new(dir.path().to_path_buf(), 60);
        assert_eq!(reopened.get(url), Some(json!([{"driver_number": 1}])));
    }

    #[test]
    fn expired_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://api.jolpi.ca/ergast/f1/2024/races/?format=json";

        let cache = HttpCache::new(dir.path().to_path_buf(), -1);
        cache.put(url, json!({"MRData": {}}));
        assert!(cache.get(url).is_none());
    }

    #[test]
    fn cache_file_names_are_path_safe() {
        let cache = HttpCache::new(PathBuf::from("/tmp/cache"), 60);
        let path = cache.path_for("https://api.openf1.org/v1/sessions?meeting_key=1229");
        assert_eq!(
            path,
            PathBuf::from("/tmp/cache/https___api_openf1_org_v1_sessions_meeting_key_1229.json")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_answers_are_fetched_again() {
        let (base, hits) = serve_in_order(&["[]", r#"[{"driver_number":1}]"#]).await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = JsonFetcher::new(
            Client::new(),
            Arc::new(HttpCache::new(dir.path().to_path_buf(), 86_400)),
            RateLimiter::new(1, 0),
            Handle::current(),
        );
        let url = format!("{base}/v1/session_result?session_key=9662");

        let (first, second, third) = tokio::task::spawn_blocking(move || {
            let first: Vec<Value> = fetcher.get_list(&url).unwrap();
            let second: Vec<Value> = fetcher.get_list(&url).unwrap();
            let third: Vec<Value> = fetcher.get_list(&url).unwrap();
            (first, second, third)
        })
        .await
        .unwrap();

        assert!(first.is_empty());
        assert_eq!(second, vec![json!({"driver_number": 1})]);
        assert_eq!(third, second);
        // The answer with data is served from the cache.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn only_answers_with_data_are_cacheable() {
        assert!(!has_data(&Value::Null));
        assert!(!has_data(&json!([])));
        assert!(has_data(&json!([{"session_key": 9662}])));
        assert!(has_data(&json!({"MRData": {"total": "24"}})));
        assert!(!has_data(&json!({"MRData": {"total": "0", "StandingsTable": {"StandingsLists": []}}})));
    }
}
