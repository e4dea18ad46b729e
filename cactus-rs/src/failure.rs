use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::{panic_message, take_panic_trace};

/// Kind reported for assertion failures. The JUnit name is kept so that
/// JUnit-style reporters classify it as a failure rather than an error.
pub const ASSERTION_FAILED_ERROR: &str = "junit.framework.AssertionFailedError";
pub const TEST_CASE_IMPLEMENT_ERROR: &str = "cactus::TestCaseImplementError";
pub const CLASS_NOT_FOUND_ERROR: &str = "cactus::ClassNotFoundError";
pub const INSTANTIATION_ERROR: &str = "cactus::InstantiationError";

/// A failure raised by test code, as it travels between client and server.
///
/// The original error value never crosses the wire: only its kind (the
/// "class name"), its message and a textual trace captured where it was
/// raised. The kind may name a type that does not exist on the receiving
/// side at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub class_name: String,
    pub message: Option<String>,
    pub stack_trace: String,
}

impl TestFailure {
    /// Creates a failure of the given kind, capturing the current backtrace.
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: Some(message.into()),
            stack_trace: Backtrace::force_capture().to_string(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ASSERTION_FAILED_ERROR, message)
    }

    /// Unwinds the current test with this failure as the panic payload, so
    /// the dispatcher reports it under its own kind.
    pub fn throw(self) -> ! {
        std::panic::panic_any(self)
    }

    /// Assertion-style failures, as opposed to errors.
    pub fn is_assertion(&self) -> bool {
        self.class_name == ASSERTION_FAILED_ERROR || self.class_name == TEST_CASE_IMPLEMENT_ERROR
    }

    /// Converts a caught panic payload. A `TestFailure` payload is kept as is,
    /// anything else becomes an assertion failure carrying the panic message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let trace = take_panic_trace();
        match payload.downcast::<TestFailure>() {
            Ok(failure) => *failure,
            Err(payload) => Self {
                class_name: ASSERTION_FAILED_ERROR.to_string(),
                message: Some(panic_message(payload.as_ref())),
                stack_trace: trace.unwrap_or_default(),
            },
        }
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message),
            None => f.write_str(&self.class_name),
        }
    }
}

impl std::error::Error for TestFailure {}
