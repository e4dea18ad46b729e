//! Declared method signatures and the role checks run on them before a
//! method is invoked as a begin hook, test method or end hook.

use std::fmt;

use thiserror::Error;

use crate::failure::{TestFailure, TEST_CASE_IMPLEMENT_ERROR};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Crate,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Crate => f.write_str("crate-visible"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

/// A declared type: its name and the names of the types it can be used as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeRef {
    name: &'static str,
    ancestors: &'static [&'static str],
}

impl TypeRef {
    pub const VOID: TypeRef = TypeRef::named("()");
    pub const ANY: TypeRef = TypeRef::named("Any");
    pub const STRING: TypeRef = TypeRef::with_ancestors("String", &["Any"]);
    pub const BOOL: TypeRef = TypeRef::with_ancestors("bool", &["Any"]);
    pub const WEB_REQUEST: TypeRef = TypeRef::with_ancestors("WebRequest", &["Any"]);
    pub const WEB_RESPONSE: TypeRef = TypeRef::with_ancestors("WebResponse", &["Any"]);
    pub const RAW_RESPONSE: TypeRef = TypeRef::with_ancestors("RawResponse", &["Any"]);

    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            ancestors: &[],
        }
    }

    pub const fn with_ancestors(name: &'static str, ancestors: &'static [&'static str]) -> Self {
        Self { name, ancestors }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a value of type `other` can be passed where `self` is
    /// declared.
    pub fn is_assignable_from(&self, other: &TypeRef) -> bool {
        self.name == other.name || other.ancestors.contains(&self.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub visibility: Visibility,
    pub return_type: TypeRef,
    pub parameters: Vec<TypeRef>,
}

impl MethodSignature {
    /// A public method returning nothing and taking no parameters.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            return_type: TypeRef::VOID,
            parameters: Vec::new(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn returning(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_parameter(mut self, parameter: TypeRef) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == TypeRef::VOID
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodRole {
    Begin,
    Test,
    End,
}

/// What is wrong with a test method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImplementDefect {
    Missing,
    Visibility {
        actual: Visibility,
    },
    ReturnType {
        actual: TypeRef,
    },
    ParameterCount {
        expected: usize,
        actual: usize,
    },
    ParameterType {
        position: usize,
        expected: TypeRef,
        actual: TypeRef,
    },
    UnsupportedEndParameter {
        actual: TypeRef,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefectCategory {
    Missing,
    Visibility,
    ReturnType,
    ParameterCount,
    ParameterType,
}

impl ImplementDefect {
    pub fn category(&self) -> DefectCategory {
        match self {
            ImplementDefect::Missing => DefectCategory::Missing,
            ImplementDefect::Visibility { .. } => DefectCategory::Visibility,
            ImplementDefect::ReturnType { .. } => DefectCategory::ReturnType,
            ImplementDefect::ParameterCount { .. } => DefectCategory::ParameterCount,
            ImplementDefect::ParameterType { .. }
            | ImplementDefect::UnsupportedEndParameter { .. } => DefectCategory::ParameterType,
        }
    }
}

/// A test class whose methods do not have the shape their role requires.
/// Reported as an assertion-style failure: it is the test author's bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.class_name, .method_name, .defect))]
pub struct TestCaseImplementError {
    pub class_name: String,
    pub method_name: String,
    pub defect: ImplementDefect,
}

impl TestCaseImplementError {
    pub fn new(class_name: &str, method_name: &str, defect: ImplementDefect) -> Self {
        Self {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            defect,
        }
    }

    pub fn category(&self) -> DefectCategory {
        self.defect.category()
    }
}

impl From<TestCaseImplementError> for TestFailure {
    fn from(err: TestCaseImplementError) -> Self {
        TestFailure::new(TEST_CASE_IMPLEMENT_ERROR, err.to_string())
    }
}

fn describe(class_name: &str, method_name: &str, defect: &ImplementDefect) -> String {
    let method = format!("The method [{method_name}] of class [{class_name}]");
    match defect {
        ImplementDefect::Missing => format!("{method} does not exist"),
        ImplementDefect::Visibility { actual } => {
            format!("{method} should be declared public but is {actual}")
        }
        ImplementDefect::ReturnType { actual } => {
            format!("{method} should return () and not [{actual}]")
        }
        ImplementDefect::ParameterCount { expected, actual } => format!(
            "{method} should accept {expected} parameter(s) but [{actual}] parameter(s) were found"
        ),
        ImplementDefect::ParameterType {
            position,
            expected,
            actual,
        } => format!(
            "{method} should accept a parameter assignable from [{expected}] at position {position}, \
             but found a [{actual}] parameter instead"
        ),
        ImplementDefect::UnsupportedEndParameter { actual } => format!(
            "{method} should accept a [{}] or a [{}] parameter but found a [{actual}] parameter instead",
            TypeRef::WEB_RESPONSE,
            TypeRef::RAW_RESPONSE
        ),
    }
}

/// Checks that `signature` may be used in `role`.
///
/// Begin hooks take exactly one parameter assignable from `WebRequest`. End
/// hooks take exactly one parameter of any type; the response family is
/// picked when the hook is invoked. Test methods take none.
pub fn validate(
    class_name: &str,
    signature: &MethodSignature,
    role: MethodRole,
) -> Result<(), TestCaseImplementError> {
    let fail = |defect| Err(TestCaseImplementError::new(class_name, &signature.name, defect));

    if !signature.is_public() {
        return fail(ImplementDefect::Visibility {
            actual: signature.visibility,
        });
    }
    if !signature.returns_void() {
        return fail(ImplementDefect::ReturnType {
            actual: signature.return_type,
        });
    }

    let expected = match role {
        MethodRole::Test => 0,
        MethodRole::Begin | MethodRole::End => 1,
    };
    if signature.parameters.len() != expected {
        return fail(ImplementDefect::ParameterCount {
            expected,
            actual: signature.parameters.len(),
        });
    }

    if role == MethodRole::Begin && !signature.parameters[0].is_assignable_from(&TypeRef::WEB_REQUEST) {
        return fail(ImplementDefect::ParameterType {
            position: 1,
            expected: TypeRef::WEB_REQUEST,
            actual: signature.parameters[0],
        });
    }
    Ok(())
}
