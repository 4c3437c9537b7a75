#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use std::option::Option;
use std::result::Result;
use std::string::String;
use std::time::Duration;
use std::vec::Vec;


/// One outbound HTTP GET, fully described so implementations stay stateless.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub referer: Option<String>,
    pub credentials: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPayload {
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("The remote source did not answer within the attempt timeout")]
    Timeout,
    #[error("Transport failure while calling the remote source: {0}")]
    Transport(String),
    #[error("The remote source answered with status {0}")]
    Status(u16),
}

/// Boundary to the actual HTTP client, kept as a trait so retry behaviour
/// can be tested without a network.
#[cfg_attr(test, automock)]
pub trait HttpFetch: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedPayload, FetchError>;
}

/// The production client. Each attempt gets its own bounded client so the
/// per-attempt timeout is a hard deadline.
pub struct ReqwestFetch;

impl HttpFetch for ReqwestFetch {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedPayload, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request.timeout)
            .user_agent(request.user_agent.clone())
            .build()
            .map_err(|error| FetchError::Transport(error.to_string()))?;
        let mut builder = client.get(&request.url);
        if let Some(referer) = &request.referer {
            builder = builder.header(reqwest::header::REFERER, referer.clone());
        }
        if let Some((user, password)) = &request.credentials {
            builder = builder.basic_auth(user, Some(password));
        }
        let response = builder.send().map_err(|error| {
            if error.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(error.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .map_err(|error| FetchError::Transport(error.to_string()))?;
        return Ok(FetchedPayload {
            content_type,
            body: body.to_vec(),
        });
    }
}
