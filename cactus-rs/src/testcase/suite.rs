use async_trait::async_trait;

use super::class::TestClass;
use crate::client::ClientTestCaseCaller;
use crate::testapi::{Suite, Testable};
use crate::types::TestResult;
use crate::utils::{client_test_name, extract_test_results};

/// Class name sent for wrapped tests; the class actually run travels as the
/// wrapped class name.
pub const WRAPPER_CLASS_NAME: &str = "cactus::ServerTestCaseWrapper";

/// One entry of a wrapped suite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WrappedTest {
    /// A plain test method run inside the container.
    Method {
        class_name: String,
        method_name: String,
    },
    /// Stands in for a class that could not be wrapped; always fails.
    Warning { message: String },
}

impl WrappedTest {
    fn warning(message: String) -> Self {
        WrappedTest::Warning { message }
    }
}

#[async_trait]
impl Testable for WrappedTest {
    fn name(&self) -> String {
        match self {
            WrappedTest::Method {
                class_name,
                method_name,
            } => client_test_name(method_name, class_name),
            WrappedTest::Warning { .. } => "warning".to_string(),
        }
    }

    async fn run_test(&self, caller: ClientTestCaseCaller) -> TestResult {
        match self {
            WrappedTest::Method {
                class_name,
                method_name,
            } => {
                let class_name = class_name.clone();
                let method_name = method_name.clone();
                extract_test_results(
                    tokio::spawn(async move {
                        caller.run_wrapped_test(&class_name, &method_name).await
                    })
                    .await,
                )
            }
            WrappedTest::Warning { message } => TestResult {
                pass: false,
                details: message.clone(),
                framework_error: false,
            },
        }
    }
}

/// Runs the tests of a plain test class inside the container, without
/// rewriting them.
///
/// Classes that cannot be run (not public, no usable constructor, no test
/// methods) still yield a suite, holding a single failing warning, so the
/// problem shows up in the run instead of the class silently vanishing.
#[derive(Clone, Debug)]
pub struct ServerTestSuite {
    name: String,
    tests: Vec<WrappedTest>,
}

impl ServerTestSuite {
    pub fn wrap(class: &TestClass) -> Self {
        let name = class.name().to_string();
        let single = |message: String| Self {
            name: name.clone(),
            tests: vec![WrappedTest::warning(message)],
        };

        if !class.has_public_constructor() {
            return single(format!(
                "Class {name} has no public constructor taking a name or no argument"
            ));
        }
        if !class.is_public() {
            return single(format!("Class {name} is not public"));
        }

        let mut tests = Vec::new();
        for signature in class.test_methods() {
            if signature.is_public() {
                tests.push(WrappedTest::Method {
                    class_name: name.clone(),
                    method_name: signature.name,
                });
            } else {
                tests.push(WrappedTest::warning(format!(
                    "Test method isn't public: {}",
                    signature.name
                )));
            }
        }
        if tests.is_empty() {
            return single(format!("No tests found in {name}"));
        }
        Self { name, tests }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tests(&self) -> &[WrappedTest] {
        &self.tests
    }

    pub fn count_test_cases(&self) -> usize {
        self.tests.len()
    }

    pub fn into_suite(self, description: impl Into<String>) -> Suite {
        let mut suite = Suite::new(self.name, description);
        for test in self.tests {
            suite.add(test);
        }
        suite
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Configuration;
    use crate::testcase::class::TestClassBuilder;
    use crate::testcase::registry::{ClassLoader, TestRegistry};
    use crate::testcase::signature::{MethodSignature, TypeRef, Visibility};

    #[derive(Default)]
    struct Plain;

    #[derive(Default)]
    struct Derived {
        base: Plain,
    }

    fn base_of(derived: &mut Derived) -> &mut Plain {
        &mut derived.base
    }

    fn warning(suite: &ServerTestSuite) -> &str {
        match suite.tests() {
            [WrappedTest::Warning { message }] => message,
            other => panic!("expected a single warning, got {other:?}"),
        }
    }

    #[test]
    fn test_unusable_classes_yield_one_warning() {
        let hidden_constructor = TestClassBuilder::<Plain>::new("NoConstructor")
            .declared_constructor(Visibility::Private, Plain::default)
            .declare(MethodSignature::public("testA"))
            .build();
        let suite = ServerTestSuite::wrap(&hidden_constructor);
        assert!(warning(&suite).contains("has no public constructor"));

        let not_public = TestClassBuilder::<Plain>::new("NotPublic")
            .visibility(Visibility::Crate)
            .constructor(Plain::default)
            .declare(MethodSignature::public("testA"))
            .build();
        assert_eq!(
            warning(&ServerTestSuite::wrap(&not_public)),
            "Class NotPublic is not public"
        );

        let empty = TestClassBuilder::<Plain>::new("Empty")
            .constructor(Plain::default)
            .declare(MethodSignature::public("helper"))
            .declare(MethodSignature::public("testWithArgument").with_parameter(TypeRef::STRING))
            .declare(MethodSignature::public("testReturning").returning(TypeRef::BOOL))
            .build();
        assert_eq!(
            warning(&ServerTestSuite::wrap(&empty)),
            "No tests found in Empty"
        );
    }

    #[test]
    fn test_overridden_methods_are_wrapped_once() {
        let base = Arc::new(
            TestClassBuilder::<Plain>::new("Base")
                .constructor(Plain::default)
                .declare(MethodSignature::public("testInherited"))
                .declare(MethodSignature::public("testOverridden"))
                .build(),
        );
        let derived = TestClassBuilder::<Derived>::new("Derived")
            .constructor(Derived::default)
            .extends(base, base_of)
            .declare(MethodSignature::public("testOverridden"))
            .declare(MethodSignature::public("testOwn"))
            .build();

        let suite = ServerTestSuite::wrap(&derived);
        assert_eq!(suite.name(), "Derived");
        assert_eq!(suite.count_test_cases(), 3);
        assert!(suite.tests().iter().all(|test| matches!(
            test,
            WrappedTest::Method { class_name, .. } if class_name == "Derived"
        )));

        let suite = suite.into_suite("wrapped");
        let names: Vec<String> = suite.tests.iter().map(|test| test.name()).collect();
        assert_eq!(
            names,
            [
                "testOverridden (Derived)",
                "testOwn (Derived)",
                "testInherited (Derived)"
            ]
        );
    }

    #[test]
    fn test_non_public_test_method_becomes_warning() {
        let class = TestClassBuilder::<Plain>::new("Mixed")
            .constructor(Plain::default)
            .declare(MethodSignature::public("testA"))
            .declare(MethodSignature::public("testHidden").with_visibility(Visibility::Private))
            .build();
        let suite = ServerTestSuite::wrap(&class);
        assert_eq!(suite.count_test_cases(), 2);
        assert_eq!(
            suite.tests()[1],
            WrappedTest::Warning {
                message: "Test method isn't public: testHidden".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_warning_fails_without_contacting_the_server() {
        let config = Configuration::new("http://127.0.0.1:9/unused").unwrap();
        let loader = ClassLoader::new(Arc::new(TestRegistry::new()));
        let caller = ClientTestCaseCaller::new(config, loader).unwrap();
        let result = WrappedTest::Warning {
            message: "No tests found in Empty".to_string(),
        }
        .run_test(caller)
        .await;
        assert!(!result.pass);
        assert!(!result.framework_error);
        assert_eq!(result.details, "No tests found in Empty");
    }
}
