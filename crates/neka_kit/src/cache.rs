//! On-disk blob cache and remote fetching.
//!
//! Blobs are immutable, so the cache is keyed by blob id alone and never invalidated:
//! `{cache_dir}/{blob}.png` either exists and is complete (it is renamed into place after
//! a full write) or it does not exist.
//!
//! Concurrent requests for the same blob are collapsed: the first caller fetches while the
//! others wait on a per-blob lock and then find the file in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::FetchError;
use crate::utils::persist_bytes;

/// Name of the cache directory under the cache root.
pub const CACHE_DIR_NAME: &str = "cache_blobs";

/// Somewhere blobs can be fetched from.
pub trait BlobSource: Send + Sync {
    /// Fetch the raw bytes of one blob. A single attempt; retries are the caller's job.
    fn fetch(&self, blob: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches `https://{host}/{blob}` with a blocking client.
pub struct HttpBlobSource {
    client: reqwest::blocking::Client,
    host: String,
}

impl HttpBlobSource {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("neka-kit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }

    pub fn url(&self, blob: &str) -> String {
        format!("https://{}/{}", self.host, blob)
    }
}

impl BlobSource for HttpBlobSource {
    fn fetch(&self, blob: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(self.url(blob)).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                blob: blob.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Retry policy for [`BlobCache`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Reject ids that could escape the cache directory or are not valid file names.
pub fn validate_blob_id(blob: &str) -> Result<(), FetchError> {
    let invalid = blob.is_empty()
        || blob.contains(['/', '\\'])
        || blob.contains("..")
        || blob.chars().any(char::is_control);
    if invalid {
        return Err(FetchError::InvalidBlobId(blob.to_string()));
    }
    Ok(())
}

pub struct BlobCache {
    dir: Utf8PathBuf,
    source: Arc<dyn BlobSource>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    fetched: AtomicUsize,
    hits: AtomicUsize,
}

impl BlobCache {
    /// Cache under `{cache_root}/cache_blobs`.
    pub fn new(cache_root: &Utf8Path, source: Arc<dyn BlobSource>, retry: RetryPolicy) -> Self {
        Self {
            dir: cache_root.join(CACHE_DIR_NAME),
            source,
            retry,
            in_flight: Mutex::new(HashMap::new()),
            fetched: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn path_for(&self, blob: &str) -> Utf8PathBuf {
        self.dir.join(format!("{blob}.png"))
    }

    /// Number of blobs downloaded by this cache instance.
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::Relaxed)
    }

    /// Number of requests served from disk.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Local path of `blob`, fetching it first if it is not cached.
    pub fn get(&self, blob: &str) -> Result<Utf8PathBuf, FetchError> {
        validate_blob_id(blob)?;
        let path = self.path_for(blob);
        if path.as_std_path().is_file() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(path);
        }

        let lock = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(in_flight.entry(blob.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.fetch_locked(blob, &path)
        };
        self.release(blob, &lock);
        result.map(|()| path)
    }

    /// Fetch `blob` into `path` while holding its in-flight lock.
    fn fetch_locked(&self, blob: &str, path: &Utf8Path) -> Result<(), FetchError> {
        // Another worker may have finished the download while we waited.
        if path.as_std_path().is_file() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let bytes = self.fetch_with_retry(blob)?;
        persist_bytes(path, &bytes).map_err(|source| FetchError::CacheWrite {
            blob: blob.to_string(),
            source,
        })?;
        self.fetched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Cached blob {} ({} bytes)", blob, bytes.len());
        Ok(())
    }

    /// Drop the in-flight entry of `blob` unless another caller still holds it.
    fn release(&self, blob: &str, lock: &Arc<Mutex<()>>) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference lives in the map, the other is ours.
        if Arc::strong_count(lock) <= 2 {
            in_flight.remove(blob);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Cached bytes of `blob`.
    pub fn read(&self, blob: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.get(blob)?;
        std::fs::read(path.as_std_path()).map_err(|source| FetchError::CacheWrite {
            blob: blob.to_string(),
            source,
        })
    }

    fn fetch_with_retry(&self, blob: &str) -> Result<Vec<u8>, FetchError> {
        let attempts = self.retry.max_retries + 1;
        let mut delay = self.retry.backoff;
        let mut attempt = 1;
        loop {
            match self.source.fetch(blob) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    return Err(FetchError::Exhausted {
                        blob: blob.to_string(),
                        attempts,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    tracing::debug!(
                        "Fetch of {} failed (attempt {}/{}): {}, retrying in {:?}",
                        blob,
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

/// In-memory [`BlobSource`] for tests.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MemorySource {
        blobs: HashMap<String, Vec<u8>>,
        /// Transient failures to return before succeeding, per blob.
        flaky: Mutex<HashMap<String, u32>>,
        calls: AtomicUsize,
    }

    impl MemorySource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_blob(mut self, blob: &str, bytes: Vec<u8>) -> Self {
            self.blobs.insert(blob.to_string(), bytes);
            self
        }

        pub fn with_failures(self, blob: &str, failures: u32) -> Self {
            self.flaky
                .lock()
                .unwrap()
                .insert(blob.to_string(), failures);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BlobSource for MemorySource {
        fn fetch(&self, blob: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(left) = self.flaky.lock().unwrap().get_mut(blob) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FetchError::Status {
                        blob: blob.to_string(),
                        status: 503,
                    });
                }
            }
            self.blobs.get(blob).cloned().ok_or(FetchError::Status {
                blob: blob.to_string(),
                status: 404,
            })
        }
    }
}
