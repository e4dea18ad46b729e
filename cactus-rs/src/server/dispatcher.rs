use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use super::context::ServerContext;
use crate::directive::TestDirective;
use crate::envelope::ResultEnvelope;
use crate::failure::{TestFailure, CLASS_NOT_FOUND_ERROR, INSTANTIATION_ERROR};
use crate::testcase::{
    validate, ClassLoader, ImplementDefect, Invocation, MethodRole, TestCaseImplementError,
};
use crate::utils::install_panic_trace_hook;

/// Progress of one test invocation on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationState {
    Received,
    /// The test class was found.
    Resolved,
    Instantiated,
    /// The test method passed validation and was entered. Begin hooks have
    /// already run on the client by the time a request arrives.
    BeginInvoked,
    /// The test method returned or unwound.
    TestInvoked,
    ResultReady,
    /// The test could not be run at all.
    Faulted,
}

struct StateTracker<'a> {
    test_id: &'a str,
    state: InvocationState,
}

impl<'a> StateTracker<'a> {
    fn new(test_id: &'a str) -> Self {
        debug!(test_id, state = ?InvocationState::Received, "invocation state");
        Self {
            test_id,
            state: InvocationState::Received,
        }
    }

    fn enter(&mut self, state: InvocationState) {
        debug!(test_id = self.test_id, from = ?self.state, to = ?state, "invocation state");
        self.state = state;
    }

    fn fault(&mut self, failure: &TestFailure) {
        warn!(
            test_id = self.test_id,
            from = ?self.state,
            kind = %failure.class_name,
            message = failure.message.as_deref().unwrap_or_default(),
            "invocation faulted"
        );
        self.state = InvocationState::Faulted;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestOutcome {
    pub envelope: ResultEnvelope,
    pub state: InvocationState,
}

/// Runs test methods named by a directive.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    loader: ClassLoader,
}

impl Dispatcher {
    pub fn new(loader: ClassLoader) -> Self {
        Self { loader }
    }

    /// Runs the test method `directive` names against `context`.
    ///
    /// Whatever goes wrong from here on, including a missing class, is
    /// reported in the envelope: failures travel as data, never as
    /// transport errors.
    pub async fn run_test(&self, directive: &TestDirective, context: &mut ServerContext) -> TestOutcome {
        let mut tracker = StateTracker::new(&directive.test_id);
        match self.execute(directive, context, &mut tracker).await {
            Ok(outcome) => {
                tracker.enter(InvocationState::ResultReady);
                TestOutcome {
                    envelope: ResultEnvelope::from(outcome),
                    state: tracker.state,
                }
            }
            Err(failure) => {
                tracker.fault(&failure);
                TestOutcome {
                    envelope: ResultEnvelope::failure(failure),
                    state: tracker.state,
                }
            }
        }
    }

    async fn execute(
        &self,
        directive: &TestDirective,
        context: &mut ServerContext,
        tracker: &mut StateTracker<'_>,
    ) -> Result<Result<(), TestFailure>, TestFailure> {
        let class = self
            .loader
            .load(directive.target_class_name())
            .map_err(|err| TestFailure::new(CLASS_NOT_FOUND_ERROR, err.to_string()))?;
        tracker.enter(InvocationState::Resolved);

        let method_name = directive.method_name.as_str();
        let mut instance = class
            .instantiate(method_name)
            .map_err(|err| TestFailure::new(INSTANTIATION_ERROR, err.to_string()))?;
        tracker.enter(InvocationState::Instantiated);

        let method = class.find_method(method_name).ok_or_else(|| {
            TestCaseImplementError::new(class.name(), method_name, ImplementDefect::Missing)
        })?;
        validate(class.name(), method.signature(), MethodRole::Test)?;
        let test = method.invoke(&mut instance, Invocation::Test(context))?;
        tracker.enter(InvocationState::BeginInvoked);

        install_panic_trace_hook();
        let outcome = AssertUnwindSafe(test)
            .catch_unwind()
            .await
            .map_err(TestFailure::from_panic);
        tracker.enter(InvocationState::TestInvoked);
        Ok(outcome)
    }
}
