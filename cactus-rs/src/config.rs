//! Client-side configuration, read from the environment.
//!
//! - `CACTUS_CONTEXT_URL`: base URL of the web application under test
//!   (required).
//! - `CACTUS_REDIRECTOR_NAME`: path of the redirector below the context URL.
//!   Default `ServletRedirector`.
//! - `CACTUS_TEST_PATTERN`: optional `suite/test` filter.
//!
//! Container lifecycle timing, all in milliseconds:
//!
//! - `CACTUS_TIMEOUT_MS`: how long to wait for the container to come up or
//!   go down. Default 180000.
//! - `CACTUS_CHECK_INTERVAL_MS`: delay between readiness probes. Default 500.
//! - `CACTUS_SHUTDOWN_WAIT_MS`: extra wait once the container stopped
//!   answering. Default 2000.
//! - `CACTUS_STARTUP_SETTLE_MS`: extra wait once the container answered.
//!   Default 0.

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{CactusError, Result};
use crate::testmatch::TestMatcher;

pub const CONTEXT_URL_ENV: &str = "CACTUS_CONTEXT_URL";
pub const REDIRECTOR_NAME_ENV: &str = "CACTUS_REDIRECTOR_NAME";
pub const TEST_PATTERN_ENV: &str = "CACTUS_TEST_PATTERN";

pub const TIMEOUT_ENV: &str = "CACTUS_TIMEOUT_MS";
pub const CHECK_INTERVAL_ENV: &str = "CACTUS_CHECK_INTERVAL_MS";
pub const SHUTDOWN_WAIT_ENV: &str = "CACTUS_SHUTDOWN_WAIT_MS";
pub const STARTUP_SETTLE_ENV: &str = "CACTUS_STARTUP_SETTLE_MS";

pub const DEFAULT_REDIRECTOR_NAME: &str = "ServletRedirector";

#[derive(Clone, Debug)]
pub struct Configuration {
    context_url: Url,
    redirector_name: String,
    test_matcher: Option<TestMatcher>,
}

impl Configuration {
    pub fn new(context_url: &str) -> Result<Self> {
        let context_url = Url::parse(context_url)?;
        check_scheme(&context_url)?;
        Ok(Self {
            context_url,
            redirector_name: DEFAULT_REDIRECTOR_NAME.to_string(),
            test_matcher: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        let context_url = env::var(CONTEXT_URL_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CactusError::Config(format!("{CONTEXT_URL_ENV} is not set")))?;
        let mut config = Self::new(&context_url)?;

        if let Some(name) = env::var(REDIRECTOR_NAME_ENV).ok().filter(|value| !value.is_empty()) {
            config.redirector_name = name;
        }
        if let Some(pattern) = env::var(TEST_PATTERN_ENV).ok().filter(|value| !value.is_empty()) {
            config.test_matcher = Some(TestMatcher::new(&pattern)?);
        }
        Ok(config)
    }

    pub fn with_redirector_name(mut self, name: impl Into<String>) -> Self {
        self.redirector_name = name.into();
        self
    }

    pub fn with_test_matcher(mut self, matcher: TestMatcher) -> Self {
        self.test_matcher = Some(matcher);
        self
    }

    pub fn context_url(&self) -> &Url {
        &self.context_url
    }

    pub fn redirector_name(&self) -> &str {
        &self.redirector_name
    }

    pub fn test_matcher(&self) -> Option<&TestMatcher> {
        self.test_matcher.as_ref()
    }

    /// URL of the named redirector, or of the default one.
    pub fn redirector_url(&self, name: Option<&str>) -> Result<Url> {
        let name = name.unwrap_or(&self.redirector_name);
        let url = Url::parse(&format!(
            "{}/{}",
            self.context_url.as_str().trim_end_matches('/'),
            name.trim_start_matches('/')
        ))?;
        check_scheme(&url)?;
        Ok(url)
    }
}

/// Timing of the container lifecycle runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerSettings {
    pub timeout: Duration,
    pub check_interval: Duration,
    pub shutdown_wait: Duration,
    pub startup_settle: Duration,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(180_000),
            check_interval: Duration::from_millis(500),
            shutdown_wait: Duration::from_millis(2_000),
            startup_settle: Duration::ZERO,
        }
    }
}

impl ContainerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`; unset or empty values keep their
    /// default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| -> Result<Duration> {
            match lookup(name).filter(|value| !value.is_empty()) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(|_| {
                        CactusError::Config(format!(
                            "{name} must be a number of milliseconds, got `{value}`"
                        ))
                    }),
            }
        };
        let settings = Self {
            timeout: millis(TIMEOUT_ENV, defaults.timeout)?,
            check_interval: millis(CHECK_INTERVAL_ENV, defaults.check_interval)?,
            shutdown_wait: millis(SHUTDOWN_WAIT_ENV, defaults.shutdown_wait)?,
            startup_settle: millis(STARTUP_SETTLE_ENV, defaults.startup_settle)?,
        };
        if settings.check_interval.is_zero() {
            return Err(CactusError::Config(format!("{CHECK_INTERVAL_ENV} must not be 0")));
        }
        Ok(settings)
    }
}

pub(crate) fn check_scheme(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(CactusError::UnsupportedScheme(other.to_string())),
    }
}
