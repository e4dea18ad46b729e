use serde::{Deserialize, Serialize};

/// Describes the outcome of a test as seen by the suite runner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub pass: bool,
    pub details: String,
    /// Set when the framework itself failed (transport, protocol, missing
    /// class...) as opposed to the test reporting a failure.
    pub framework_error: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestReport {
    pub name: String,
    pub result: TestResult,
}

/// Results of every test of a suite that was selected to run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub description: String,
    pub tests: Vec<TestReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.tests.iter().all(|test| test.result.pass)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestReport> {
        self.tests.iter().filter(|test| !test.result.pass)
    }
}
