use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::warn;

use crate::error::FetchError;
use crate::settings::Settings;

const SERVICE_UNAVAILABLE: u16 = 503;

pub struct Response {
    pub status: u16,
    pub body: String,
}

/// One HTTP GET, no retries.
pub trait Transport {
    fn get(&self, url: &str) -> Result<Response, FetchError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent).context("Invalid user_agent header")?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&settings.accept_language)
                .context("Invalid accept_language header")?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Response, FetchError> {
        let transport_err = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let resp = self.client.get(url).send().map_err(transport_err)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(transport_err)?;
        Ok(Response { status, body })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            initial_backoff: settings.initial_backoff(),
        }
    }

    /// Wait before retrying after the zero-based `attempt` got a 503.
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.initial_backoff.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    fn on_response(
        &self,
        url: &str,
        attempt: u32,
        result: Result<Response, FetchError>,
    ) -> RetryState {
        let resp = match result {
            Ok(r) => r,
            Err(e) => return RetryState::Failed(e),
        };
        match resp.status {
            SERVICE_UNAVAILABLE if attempt < self.max_retries => RetryState::BackingOff {
                attempt,
                wait: self.backoff(attempt),
            },
            SERVICE_UNAVAILABLE => RetryState::Failed(FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts: attempt + 1,
            }),
            s if (200..300).contains(&s) => RetryState::Succeeded(resp.body),
            s => RetryState::Failed(FetchError::Status {
                url: url.to_string(),
                status: s,
            }),
        }
    }
}

enum RetryState {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, wait: Duration },
    Succeeded(String),
    Failed(FetchError),
}

/// Fetches pages from the source site, backing off on 503s.
pub struct Fetcher {
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
    base_url: String,
    sleep: Box<dyn Fn(Duration)>,
}

impl Fetcher {
    pub fn new(transport: Box<dyn Transport>, policy: RetryPolicy, base_url: &str) -> Self {
        Fetcher {
            transport,
            policy,
            base_url: base_url.trim_end_matches('/').to_string(),
            sleep: Box::new(thread::sleep),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transport = HttpTransport::new(settings)?;
        Ok(Fetcher::new(
            Box::new(transport),
            RetryPolicy::from_settings(settings),
            settings.base_url(),
        ))
    }

    /// Replace the sleep used for backoff and pacing.
    #[cfg(test)]
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a site path such as `/release/rl123/`.
    pub fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut state = RetryState::Attempting { attempt: 0 };
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    self.policy
                        .on_response(url, attempt, self.transport.get(url))
                }
                RetryState::BackingOff { attempt, wait } => {
                    warn!(
                        "503 from {}, retrying in {:.1}s (attempt {}/{})",
                        url,
                        wait.as_secs_f64(),
                        attempt + 1,
                        self.policy.max_retries
                    );
                    (self.sleep)(wait);
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Succeeded(body) => return Ok(body),
                RetryState::Failed(e) => return Err(e),
            };
        }
    }

    /// Caller-level pause between distinct requests.
    pub fn pace(&self, delay: Duration) {
        if !delay.is_zero() {
            (self.sleep)(delay);
        }
    }
}


#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::testing::*;
    use super::*;

    #[test]
    fn returns_body_on_success() {
        let t = FakeTransport::default().page("https://mojo.test/a", "<html>ok</html>");
        let (f, sleeps) = fetcher(t);
        assert_eq!(f.fetch("https://mojo.test/a").unwrap(), "<html>ok</html>");
        assert!(sleeps.borrow().is_empty());
    }

    #[test]
    fn gives_up_after_max_retries_plus_one() {
        let t = FakeTransport::default().statuses(&[503, 503, 503, 503, 503]);
        let requests = t.requests.clone();
        let (f, sleeps) = fetcher(t);

        let err = f.fetch("https://mojo.test/a").unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(requests.borrow().len(), 4);
        assert_eq!(
            *sleeps.borrow(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn recovers_after_transient_overload() {
        let t = FakeTransport::default()
            .statuses(&[503])
            .page("https://mojo.test/a", "body");
        let (f, sleeps) = fetcher(t);
        assert_eq!(f.fetch("https://mojo.test/a").unwrap(), "body");
        assert_eq!(*sleeps.borrow(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn other_errors_fail_without_retry() {
        let t = FakeTransport::default().statuses(&[500]);
        let requests = t.requests.clone();
        let (f, sleeps) = fetcher(t);

        let err = f.fetch("https://mojo.test/a").unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert_eq!(requests.borrow().len(), 1);
        assert!(sleeps.borrow().is_empty());
    }

    #[test]
    fn connection_errors_fail_without_retry() {
        let t = FakeTransport::default().unreachable("connection refused");
        let requests = t.requests.clone();
        let (f, sleeps) = fetcher(t);

        let err = f.fetch("https://mojo.test/a").unwrap_err();
        assert!(matches!(err, FetchError::Transport { ref message, .. } if message == "connection refused"));
        assert_eq!(requests.borrow().len(), 1);
        assert!(sleeps.borrow().is_empty());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn warns_once_per_retry() {
        let t = FakeTransport::default()
            .statuses(&[503, 503])
            .page("https://mojo.test/a", "body");
        let (f, _) = fetcher(t);
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let body = tracing::subscriber::with_default(subscriber, || f.fetch("https://mojo.test/a"));
        assert_eq!(body.unwrap(), "body");

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let retries: Vec<&str> = text.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(retries.len(), 2);
        assert!(retries[0].contains("503 from https://mojo.test/a, retrying in 2.0s (attempt 1/3)"));
        assert!(retries[1].contains("retrying in 4.0s (attempt 2/3)"));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let p = RetryPolicy {
            max_retries: 40,
            initial_backoff: Duration::from_secs(3600),
        };
        assert_eq!(p.backoff(40), Duration::MAX);
        assert_eq!(p.backoff(32), Duration::MAX);
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        };
        assert_eq!(p.backoff(0), Duration::from_millis(500));
        assert_eq!(p.backoff(3), Duration::from_millis(4000));
    }

    #[test]
    fn pace_skips_zero_delay() {
        let (f, sleeps) = fetcher(FakeTransport::default());
        f.pace(Duration::ZERO);
        f.pace(Duration::from_millis(250));
        assert_eq!(*sleeps.borrow(), vec![Duration::from_millis(250)]);
    }
}
