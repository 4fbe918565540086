use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client, StatusCode};
use tracing::{debug, warn};

use super::{Page, Transport};
use crate::config::Settings;
use crate::error::{Error, Result};

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// reqwest-backed transport. Rate-limit and 5xx answers are retried with exponential
/// backoff; any other failure is returned straight away.
pub struct HttpTransport {
    client: Client,
    max_retries: u32,
    base_backoff: Duration,
}

impl HttpTransport {
    pub fn new(
        settings: &Settings,
        headers: &[(&'static str, &'static str)],
        follow_redirects: bool,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for &(name, value) in headers {
            default_headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        let policy = if follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(default_headers)
            .redirect(policy)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::transport("<client>", e))?;

        Ok(HttpTransport {
            client,
            max_retries: settings.max_retries,
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<(StatusCode, Page)> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| Error::transport(url, e))?;
        debug!(
            "GET {} -> {} ({} bytes, {} ms)",
            url,
            status,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok((
            status,
            Page {
                url: final_url,
                body,
            },
        ))
    }
}

/// `base * 2^attempt`, capped at `MAX_BACKOFF`.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Page> {
        let mut attempt = 0;
        loop {
            let (status, page) = self.fetch_once(url).await?;
            if status.is_success() {
                return Ok(page);
            }
            if !should_retry(status) || attempt == self.max_retries {
                return Err(Error::transport(url, format!("HTTP {}", status)));
            }

            let delay = backoff(self.base_backoff, attempt);
            warn!(
                "{} from {} (attempt {}/{}), backing off {:.1}s",
                status,
                url,
                attempt + 1,
                self.max_retries,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
