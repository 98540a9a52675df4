// Blocking HTTP plumbing shared by the Ollama and Bedrock clients

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, error, warn};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Server errors, throttling and transport failures are worth another attempt
fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500 || *status == 429,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

/// Run `request_fn` up to `attempts` times with exponential backoff between
/// retryable failures. `service` names the remote end in log lines.
pub(crate) fn with_retry<F>(service: &str, attempts: u32, mut request_fn: F) -> Result<String>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        debug!("{} request attempt {}/{}", service, attempt, attempts);

        let failure = match request_fn() {
            Ok(body) => return Ok(body),
            Err(failure) => failure,
        };

        if !is_retryable(&failure) {
            warn!("{} request failed without retry: {}", service, failure);
            return Err(match failure {
                ureq::Error::StatusCode(status) => anyhow!("Client error: HTTP {}", status),
                other => anyhow!("Non-retryable error: {}", other),
            });
        }

        warn!(
            "{} request error: {}, attempt {}/{}",
            service, failure, attempt, attempts
        );
        last_error = Some(anyhow!("Request error: {}", failure));

        if attempt < attempts {
            let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
    }

    error!("All {} attempts to {} failed", attempts, service);
    Err(last_error.unwrap_or_else(|| anyhow!("Request failed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retried() {
        let mut calls = 0;
        let result = with_retry("test", 3, || {
            calls += 1;
            Err(ureq::Error::StatusCode(404))
        });

        assert_eq!(calls, 1);
        let message = result.expect_err("404 should fail").to_string();
        assert_eq!(message, "Client error: HTTP 404");
    }

    #[test]
    fn server_errors_are_retryable() {
        let mut calls = 0;
        let result = with_retry("test", 1, || {
            calls += 1;
            Err(ureq::Error::StatusCode(503))
        });

        assert_eq!(calls, 1);
        assert!(result.is_err());
        assert!(is_retryable(&ureq::Error::StatusCode(429)));
        assert!(is_retryable(&ureq::Error::ConnectionFailed));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let body = with_retry("test", 0, || {
            calls += 1;
            Ok("ok".to_string())
        })
        .expect("should succeed");

        assert_eq!(body, "ok");
        assert_eq!(calls, 1);
    }
}
