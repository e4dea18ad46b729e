use async_trait::async_trait;
use core::fmt::Debug;
use dyn_clone::DynClone;
use tracing::{info, warn};

use crate::client::ClientTestCaseCaller;
use crate::testcase::{ServerTestSuite, TestClass, WrappedTest};
use crate::types::{SuiteReport, TestReport, TestResult};
use crate::utils::{client_test_name, extract_test_results};

#[async_trait]
pub trait Testable: DynClone + Send + Sync {
    fn name(&self) -> String;

    /// Runs even when its name does not match the test pattern.
    fn always_run(&self) -> bool {
        false
    }

    async fn run_test(&self, caller: ClientTestCaseCaller) -> TestResult;
}

impl Debug for dyn Testable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Testable({})", self.name())
    }
}

dyn_clone::clone_trait_object!(Testable);
/// Description of a test suite
#[derive(Clone, Debug)]
pub struct Suite {
    pub name: String,
    pub description: String,
    pub tests: Vec<Box<dyn Testable>>,
}

impl Suite {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tests: Vec::new(),
        }
    }

    pub fn add<T: Testable + 'static>(&mut self, test: T) {
        self.tests.push(Box::new(test))
    }

    /// A suite running every test method of `class` with its begin and end
    /// hooks. Plain test classes without hooks can use [`Suite::wrapped`]
    /// instead.
    pub fn from_class(class: &TestClass, description: impl Into<String>) -> Self {
        let mut suite = Suite::new(class.name(), description);
        for signature in class.test_methods() {
            if signature.is_public() {
                suite.add(TestSpec::for_method(class.name(), &signature.name));
            } else {
                suite.add(WrappedTest::Warning {
                    message: format!("Test method isn't public: {}", signature.name),
                });
            }
        }
        if suite.tests.is_empty() {
            suite.add(WrappedTest::Warning {
                message: format!("No tests found in {}", class.name()),
            });
        }
        suite
    }

    /// A suite running the test methods of a plain test class through the
    /// server-side wrapper.
    pub fn wrapped(class: &TestClass, description: impl Into<String>) -> Self {
        ServerTestSuite::wrap(class).into_suite(description)
    }
}

#[derive(Clone, Debug)]
pub struct TestSpec {
    // These fields are displayed in the report. Be sure to add
    // a meaningful description here.
    pub name: String,
    pub description: String,
    pub class_name: String,
    pub method_name: String,
    // If AlwaysRun is true, the test will run even if Name does not match the test
    // pattern.
    pub always_run: bool,
}

impl TestSpec {
    pub fn for_method(class_name: &str, method_name: &str) -> Self {
        Self {
            name: client_test_name(method_name, class_name),
            description: String::new(),
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            always_run: false,
        }
    }
}

#[async_trait]
impl Testable for TestSpec {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn always_run(&self) -> bool {
        self.always_run
    }

    async fn run_test(&self, caller: ClientTestCaseCaller) -> TestResult {
        let class_name = self.class_name.clone();
        let method_name = self.method_name.clone();
        extract_test_results(
            tokio::spawn(async move { caller.run_test(&class_name, &method_name).await }).await,
        )
    }
}

/// Runs the suites one test at a time, skipping what the configured test
/// pattern does not select.
pub async fn run_suite(caller: ClientTestCaseCaller, suites: Vec<Suite>) -> Vec<SuiteReport> {
    let test_match = caller.config().test_matcher().cloned();
    let mut reports = Vec::new();

    for suite in suites {
        if let Some(test_match) = &test_match {
            if !test_match.match_test(&suite.name, "") {
                continue;
            }
        }
        info!(suite = %suite.name, tests = suite.tests.len(), "running suite");

        let mut report = SuiteReport {
            name: suite.name.clone(),
            description: suite.description.clone(),
            tests: Vec::new(),
        };
        for test in &suite.tests {
            let name = test.name();
            if let Some(test_match) = &test_match {
                if !test.always_run() && !test_match.match_test(&suite.name, &name) {
                    continue;
                }
            }

            let result = test.run_test(caller.clone()).await;
            if result.pass {
                info!(test = %name, "passed");
            } else {
                warn!(test = %name, framework_error = result.framework_error, details = %result.details, "failed");
            }
            report.tests.push(TestReport { name, result });
        }
        reports.push(report);
    }
    reports
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Configuration;
    use crate::testcase::{ClassLoader, MethodSignature, TestClassBuilder, TestRegistry, Visibility};
    use crate::testmatch::TestMatcher;

    #[derive(Clone)]
    struct Fixed {
        name: &'static str,
        pass: bool,
    }

    #[async_trait]
    impl Testable for Fixed {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn always_run(&self) -> bool {
            self.name == "setup"
        }

        async fn run_test(&self, _caller: ClientTestCaseCaller) -> TestResult {
            TestResult {
                pass: self.pass,
                details: String::new(),
                framework_error: false,
            }
        }
    }

    fn caller(pattern: Option<&str>) -> ClientTestCaseCaller {
        let mut config = Configuration::new("http://127.0.0.1:9/unused").unwrap();
        if let Some(pattern) = pattern {
            config = config.with_test_matcher(TestMatcher::new(pattern).unwrap());
        }
        ClientTestCaseCaller::new(config, ClassLoader::new(Arc::new(TestRegistry::new()))).unwrap()
    }

    fn suites() -> Vec<Suite> {
        let mut first = Suite::new("sessions", "session handling");
        first.add(Fixed { name: "setup", pass: true });
        first.add(Fixed { name: "create", pass: true });
        first.add(Fixed { name: "expire", pass: false });
        let mut second = Suite::new("cookies", "cookie matching");
        second.add(Fixed { name: "domain", pass: true });
        vec![first, second]
    }

    #[tokio::test]
    async fn test_run_suite_reports_every_test() {
        let reports = run_suite(caller(None), suites()).await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].passed());
        assert_eq!(
            reports[0].failures().map(|test| test.name.as_str()).collect::<Vec<_>>(),
            ["expire"]
        );
        assert!(reports[1].passed());
    }

    #[tokio::test]
    async fn test_run_suite_applies_pattern() {
        let reports = run_suite(caller(Some("sessions/create")), suites()).await;
        assert_eq!(reports.len(), 1);
        let names: Vec<&str> = reports[0].tests.iter().map(|test| test.name.as_str()).collect();
        assert_eq!(names, ["setup", "create"]);
    }

    #[test]
    fn test_suite_from_class() {
        #[derive(Default)]
        struct Case;

        let class = TestClassBuilder::<Case>::new("Case")
            .constructor(Case::default)
            .declare(MethodSignature::public("testOne"))
            .declare(MethodSignature::public("testHidden").with_visibility(Visibility::Private))
            .build();
        let suite = Suite::from_class(&class, "direct");
        let names: Vec<String> = suite.tests.iter().map(|test| test.name()).collect();
        assert_eq!(names, ["testOne (Case)", "warning"]);

        let plain = TestClassBuilder::<Case>::new("Plain")
            .constructor(Case::default)
            .declare(MethodSignature::public("testOne"))
            .build();
        let suite = Suite::wrapped(&plain, "wrapped");
        assert_eq!(suite.name, "Plain");
        assert_eq!(suite.description, "wrapped");
        assert_eq!(suite.tests.len(), 1);

        let empty = TestClassBuilder::<Case>::new("Empty")
            .constructor(Case::default)
            .build();
        let suite = Suite::from_class(&empty, "nothing");
        let names: Vec<String> = suite.tests.iter().map(|test| test.name()).collect();
        assert_eq!(names, ["warning"]);
    }
}
