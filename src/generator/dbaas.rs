//! Decides whether a database service is provisioned by a DBaaS operator or runs as a single
//! instance in the namespace. The operator is only consulted through the `DbaasProvider` trait,
//! so tests can substitute their own answers.
use crate::generator::service_types::DbaasFamily;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use http::StatusCode;
use hyper::client::HttpConnector;

use std::fmt::{self, Display};
use std::time::Duration;

pub const DEFAULT_DBAAS_ENDPOINT: &str = "http://dbaas.lagoon.svc:5000";

/// The answer to a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// The provider answered, and it's definitely not usable
    Unavailable,
    /// The provider could not be reached or returned a server error. Worth retrying.
    Indeterminate,
}

#[derive(Debug)]
pub struct DbaasError(pub String);

impl Display for DbaasError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DBaaS provider error: {}", self.0)
    }
}

impl std::error::Error for DbaasError {}

#[async_trait]
pub trait DbaasProvider: Send + Sync {
    async fn health(&self) -> Availability;

    /// Returns whether the provider has a database environment with the given name for the family
    async fn environment_exists(
        &self,
        family: DbaasFamily,
        environment: &str,
    ) -> Result<bool, DbaasError>;
}

/// What to do when a service can't be provisioned by the DBaaS operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbaasFallback {
    /// Fall back to a single instance in the namespace
    Single,
    /// Fail the build
    Fail,
}

impl Default for DbaasFallback {
    fn default() -> Self {
        DbaasFallback::Single
    }
}

/// Bounds the retries of an indeterminate health check
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.min_backoff,
            max_interval: self.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

/// Checks the health of the provider, retrying while the answer is indeterminate. Once the
/// attempts are exhausted, the provider is treated as unavailable.
pub async fn check_health(provider: &dyn DbaasProvider, policy: &RetryPolicy) -> Availability {
    let mut backoff = policy.backoff();
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match provider.health().await {
            Availability::Indeterminate if attempt < attempts => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                log::debug!(
                    "DBaaS health check attempt {} of {} was indeterminate, retrying in {:?}",
                    attempt,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Availability::Indeterminate => {
                log::warn!("DBaaS health check still indeterminate after {} attempts", attempts);
                return Availability::Unavailable;
            }
            other => return other,
        }
    }
    Availability::Unavailable
}

/// Talks to the DBaaS operator's http api
#[derive(Debug, Clone)]
pub struct HttpDbaasProvider {
    endpoint: String,
    client: hyper::Client<HttpConnector>,
}

impl HttpDbaasProvider {
    pub fn new(endpoint: impl Into<String>) -> HttpDbaasProvider {
        HttpDbaasProvider {
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            client: hyper::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, bytes::Bytes), DbaasError> {
        let uri: http::Uri = format!("{}{}", self.endpoint, path)
            .parse()
            .map_err(|e| DbaasError(format!("invalid DBaaS endpoint: {}", e)))?;
        let response = self
            .client
            .get(uri)
            .await
            .map_err(|e| DbaasError(e.to_string()))?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| DbaasError(e.to_string()))?;
        Ok((status, body))
    }
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    result: ExistsResult,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    found: bool,
}

#[async_trait]
impl DbaasProvider for HttpDbaasProvider {
    async fn health(&self) -> Availability {
        match self.get("/healthz").await {
            Ok((status, _)) if status.is_success() => Availability::Available,
            Ok((status, _)) if status.is_server_error() => Availability::Indeterminate,
            Ok((status, _)) => {
                log::debug!("DBaaS health check returned status: {}", status);
                Availability::Unavailable
            }
            Err(err) => {
                log::debug!("DBaaS health check failed: {}", err);
                Availability::Indeterminate
            }
        }
    }

    async fn environment_exists(
        &self,
        family: DbaasFamily,
        environment: &str,
    ) -> Result<bool, DbaasError> {
        let path = format!("/{}/{}", family.provider(), environment);
        let (status, body) = self.get(&path).await?;
        if !status.is_success() {
            return Err(DbaasError(format!(
                "request to {} returned status {}",
                path, status
            )));
        }
        let parsed: ExistsResponse = serde_json::from_slice(body.as_ref())
            .map_err(|e| DbaasError(format!("invalid response from {}: {}", path, e)))?;
        Ok(parsed.result.found)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Availability>>);

    #[async_trait]
    impl DbaasProvider for Scripted {
        async fn health(&self) -> Availability {
            let mut answers = self.0.lock().unwrap();
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers[0]
            }
        }
        async fn environment_exists(&self, _: DbaasFamily, _: &str) -> Result<bool, DbaasError> {
            Ok(true)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn run<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn indeterminate_health_is_retried() {
        let provider = Scripted(Mutex::new(vec![
            Availability::Indeterminate,
            Availability::Indeterminate,
            Availability::Available,
        ]));
        assert_eq!(
            Availability::Available,
            run(check_health(&provider, &fast_policy(3)))
        );
    }

    #[test]
    fn exhausted_retries_mean_unavailable() {
        let provider = Scripted(Mutex::new(vec![Availability::Indeterminate]));
        assert_eq!(
            Availability::Unavailable,
            run(check_health(&provider, &fast_policy(2)))
        );
    }

    #[test]
    fn unreachable_provider_is_indeterminate() {
        // nothing listens on port 1 of localhost
        let provider = HttpDbaasProvider::new("http://127.0.0.1:1/");
        assert_eq!(Availability::Indeterminate, run(provider.health()));
    }
}
