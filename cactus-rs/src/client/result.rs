use super::response::RawResponse;
use crate::envelope::ResultEnvelope;
use crate::error::{CactusError, Result};
use crate::failure::TestFailure;

/// Turns the answer to a `GET_RESULTS` request into a test outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResultFactory;

impl ResultFactory {
    /// Decodes the envelope carried by `response`.
    ///
    /// Anything but a 200 response, or a body that is not an envelope, is a
    /// protocol error and never a test failure.
    pub fn build_result(&self, response: &RawResponse) -> Result<ResultEnvelope> {
        if response.status() != 200 {
            let body = String::from_utf8_lossy(response.body());
            return Err(CactusError::Protocol(format!(
                "failed to get the test results, redirector answered {}: {}",
                response.status(),
                body.trim()
            )));
        }
        let text = std::str::from_utf8(response.body())
            .map_err(|err| CactusError::ProtocolDecoding(err.to_string()))?;
        ResultEnvelope::decode(text)
    }

    /// Like [`ResultFactory::build_result`], but reports a failed test as
    /// [`CactusError::Test`], keeping the kind, message and trace text it
    /// had on the server.
    pub fn check_result(&self, response: &RawResponse) -> Result<()> {
        self.build_result(response)?
            .into_result()
            .map_err(|failure: TestFailure| CactusError::Test(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::ASSERTION_FAILED_ERROR;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse::new(status, Vec::new(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_success_and_failure() {
        let factory = ResultFactory;
        assert!(factory.check_result(&response(200, "<webresult></webresult>")).is_ok());

        let failure = TestFailure {
            class_name: ASSERTION_FAILED_ERROR.to_string(),
            message: Some("expected 1, got 2".to_string()),
            stack_trace: "at foo.rs:1".to_string(),
        };
        let envelope = ResultEnvelope::failure(failure.clone()).encode();
        match factory.check_result(&response(200, &envelope)) {
            Err(CactusError::Test(received)) => assert_eq!(received, failure),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_protocol_errors_are_not_test_failures() {
        let factory = ResultFactory;
        let err = factory
            .check_result(&response(404, "no result for test abc"))
            .unwrap_err();
        assert!(matches!(err, CactusError::Protocol(_)));
        assert!(!err.is_test_failure());

        let err = factory.check_result(&response(200, "<html>")).unwrap_err();
        assert!(matches!(err, CactusError::ProtocolDecoding(_)));
    }
}
