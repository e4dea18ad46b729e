//! Error types for Cactus

use std::time::Duration;

use thiserror::Error;

use crate::directive::COMMAND_PREFIX;
use crate::failure::TestFailure;
use crate::testcase::TestCaseImplementError;

/// Result type alias using the Cactus error
pub type Result<T> = std::result::Result<T, CactusError>;

/// Everything that can go wrong while running a test through the redirector.
///
/// `Test` is the odd one out: it carries a failure reported by the test code
/// itself, while every other variant means the framework could not do its
/// job. Use [`CactusError::is_test_failure`] to tell the two apart.
#[derive(Error, Debug)]
pub enum CactusError {
    #[error("missing directive parameter {field}")]
    MissingDirective { field: String },

    #[error("directive key `{key}` must start with `{prefix}`", prefix = COMMAND_PREFIX)]
    IllegalDirective { key: String },

    #[error("invalid value `{value}` for directive parameter {field}")]
    InvalidDirective { field: String, value: String },

    #[error("test class {0} not found")]
    ClassNotFound(String),

    #[error("cannot instantiate test class {class}: {reason}")]
    Instantiation { class: String, reason: String },

    #[error(transparent)]
    TestCaseImplement(#[from] TestCaseImplementError),

    #[error("malformed result envelope: {0}")]
    ProtocolDecoding(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unsupported URL scheme `{0}`, only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("container failed to start after {elapsed:?} (last response code {last_code})")]
    ContainerStartupTimeout { last_code: i32, elapsed: Duration },

    #[error("container still responding {elapsed:?} after shutdown was requested")]
    ContainerShutdownTimeout { elapsed: Duration },

    #[error("container error: {0}")]
    Container(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Test(TestFailure),
}

impl CactusError {
    /// True when the error is a failure of the test rather than a framework
    /// fault. Badly shaped test methods count as test failures.
    pub fn is_test_failure(&self) -> bool {
        matches!(self, CactusError::Test(_) | CactusError::TestCaseImplement(_))
    }

    pub fn into_test_failure(self) -> Option<TestFailure> {
        match self {
            CactusError::Test(failure) => Some(failure),
            CactusError::TestCaseImplement(err) => Some(err.into()),
            _ => None,
        }
    }
}

impl From<TestFailure> for CactusError {
    fn from(failure: TestFailure) -> Self {
        CactusError::Test(failure)
    }
}
