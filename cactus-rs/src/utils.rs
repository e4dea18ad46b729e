use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic;
use std::sync::Once;

use tokio::task::JoinError;

use crate::error::CactusError;
use crate::types::TestResult;

thread_local! {
    static LAST_PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_TRACE_HOOK: Once = Once::new();

/// Chains a panic hook that records where the panic happened, so the trace
/// reported for a failed test points at the failing assertion and not at the
/// place the unwind was caught. The previous hook still runs.
pub(crate) fn install_panic_trace_hook() {
    PANIC_TRACE_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|location| location.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            let trace = format!("panicked at {location}\n{}", Backtrace::force_capture());
            LAST_PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Takes the trace recorded by the last panic on this thread, if any.
pub(crate) fn take_panic_trace() -> Option<String> {
    LAST_PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        format!("?{:?}", payload)
    }
}

/// Ensures that the display name of a test mentions the class it belongs to.
pub fn client_test_name(method_name: &str, class_name: &str) -> String {
    if method_name.is_empty() {
        return class_name.to_string();
    }
    format!("{} ({})", method_name, class_name)
}

pub fn extract_test_results(
    join_handle: Result<Result<(), CactusError>, JoinError>,
) -> TestResult {
    match join_handle {
        Ok(Ok(())) => TestResult {
            pass: true,
            details: "".to_string(),
            framework_error: false,
        },
        Ok(Err(CactusError::Test(failure))) => TestResult {
            pass: false,
            details: format!("{failure}\n{}", failure.stack_trace),
            framework_error: false,
        },
        Ok(Err(CactusError::TestCaseImplement(err))) => TestResult {
            pass: false,
            details: err.to_string(),
            framework_error: false,
        },
        Ok(Err(err)) => TestResult {
            pass: false,
            details: err.to_string(),
            framework_error: true,
        },
        Err(err) => {
            if err.is_cancelled() {
                return TestResult {
                    pass: false,
                    details: "test task was cancelled".to_string(),
                    framework_error: true,
                };
            }
            let err = err.into_panic();
            let details = match err.downcast_ref::<crate::failure::TestFailure>() {
                Some(failure) => failure.to_string(),
                None => panic_message(err.as_ref()),
            };

            TestResult {
                pass: false,
                details,
                framework_error: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::TestFailure;

    #[test]
    fn test_client_test_name() {
        assert_eq!(client_test_name("testBar", "Foo"), "testBar (Foo)");
        assert_eq!(client_test_name("", "Foo"), "Foo");
    }

    #[tokio::test]
    async fn test_extract_test_results() {
        let passed = extract_test_results(tokio::spawn(async { Ok(()) }).await);
        assert!(passed.pass);

        let panicked = extract_test_results(
            tokio::spawn(async {
                if true {
                    panic!("end hook saw the wrong body");
                }
                Ok(())
            })
            .await,
        );
        assert!(!panicked.pass);
        assert!(!panicked.framework_error);
        assert_eq!(panicked.details, "end hook saw the wrong body");

        let remote = extract_test_results(
            tokio::spawn(async {
                Err(CactusError::Test(TestFailure::assertion("expected 1, got 2")))
            })
            .await,
        );
        assert!(!remote.pass);
        assert!(!remote.framework_error);
        assert!(remote.details.contains("expected 1, got 2"));

        let framework = extract_test_results(
            tokio::spawn(async { Err(CactusError::Protocol("no result".to_string())) }).await,
        );
        assert!(framework.framework_error);
    }
}
