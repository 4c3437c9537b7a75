use crate::interface::fetch::{FetchError, FetchRequest, FetchedPayload, HttpFetch};

use thiserror::Error;

use std::option::Option;
use std::result::Result;
use std::string::String;
use std::thread;
use std::time::Duration;


pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_USER_AGENT: &str = concat!("ogc_tile_server/", env!("CARGO_PKG_VERSION"));

/// Descriptor of a remote source a layer cascades GetFeatureInfo to.
/// Immutable once configured; one instance per remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct WebService {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub retries: u32,
    pub interval: Duration,
    pub user_agent: String,
    pub referer: Option<String>,
}

#[derive(Debug, Error)]
pub enum WebServiceError {
    #[error("Remote source {url} still unreachable after {attempts} attempts")]
    AttemptsExhausted {
        url: String,
        attempts: u32,
        #[source]
        last_error: FetchError,
    },
    #[error("Remote source {0} is configured with zero attempts")]
    NoAttemptConfigured(String),
}

impl WebService {
    pub fn new(url: String) -> WebService {
        WebService {
            url,
            user: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            interval: DEFAULT_INTERVAL,
            user_agent: String::from(DEFAULT_USER_AGENT),
            referer: None,
        }
    }

    fn fetch_request(&self, query: &str) -> FetchRequest {
        let url = if query.is_empty() {
            self.url.clone()
        } else if self.url.contains('?') {
            format!("{}&{}", self.url, query)
        } else {
            format!("{}?{}", self.url, query)
        };
        FetchRequest {
            url,
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
            referer: self.referer.clone(),
            credentials: match (&self.user, &self.password) {
                (Some(user), Some(password)) => Some((user.clone(), password.clone())),
                _ => None,
            },
        }
    }

    /// Issues the call, blocking the calling worker. Performs exactly
    /// `retries` attempts, each bounded by the configured timeout, sleeping
    /// the configured interval between attempts but not after the last one.
    pub fn perform_request(
        &self,
        fetcher: &dyn HttpFetch,
        query: &str,
    ) -> Result<FetchedPayload, WebServiceError> {
        if self.retries == 0 {
            return Err(WebServiceError::NoAttemptConfigured(self.url.clone()));
        }
        let request = self.fetch_request(query);
        let mut last_error = FetchError::Timeout;
        for attempt in 1..=self.retries {
            debug!(
                "WebService::perform_request - attempt {}/{} on {}",
                attempt, self.retries, request.url
            );
            match fetcher.fetch(&request) {
                Ok(payload) => return Ok(payload),
                Err(error) => {
                    warn!(
                        "WebService::perform_request - attempt {}/{} on {} failed: {}",
                        attempt, self.retries, request.url, error
                    );
                    last_error = error;
                },
            }
            if attempt < self.retries && !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }
        return Err(WebServiceError::AttemptsExhausted {
            url: self.url.clone(),
            attempts: self.retries,
            last_error,
        });
    }
}
