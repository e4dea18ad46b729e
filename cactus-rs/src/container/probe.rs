use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::SERVER;
use reqwest::redirect::Policy;
use tracing::trace;
use url::Url;

use crate::config::Configuration;
use crate::directive::{ServiceName, SERVICE_NAME_PARAM};
use crate::error::Result;

/// Upper bound for one readiness request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one readiness probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    /// HTTP status code, or [`ProbeResult::UNREACHABLE`].
    pub code: i32,
    /// `Server` header of the answer.
    pub server: Option<String>,
}

impl ProbeResult {
    pub const UNREACHABLE: i32 = -1;

    pub fn unreachable() -> Self {
        Self {
            code: Self::UNREACHABLE,
            server: None,
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            code: i32::from(code),
            server: None,
        }
    }

    /// Any answer below 300 means the application is up.
    pub fn is_available(&self) -> bool {
        (0..300).contains(&self.code)
    }
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

/// Probes a URL with a GET request. Redirects are not followed, so a
/// redirect to a login page does not count as ready.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    url: Url,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: Url) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { url, client })
    }

    /// Probes the `RUN_TEST` service of the configured redirector.
    pub fn for_redirector(config: &Configuration) -> Result<Self> {
        let mut url = config.redirector_url(None)?;
        url.query_pairs_mut()
            .append_pair(SERVICE_NAME_PARAM, ServiceName::RunTest.as_str());
        Self::new(url)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self) -> ProbeResult {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) => ProbeResult {
                code: i32::from(response.status().as_u16()),
                server: response
                    .headers()
                    .get(SERVER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string),
            },
            Err(err) => {
                trace!(url = %self.url, %err, "probe failed");
                ProbeResult::unreachable()
            }
        }
    }
}
