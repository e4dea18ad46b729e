//! Test directives: the reserved request parameters that tell the redirector
//! which test to run and how.

use std::fmt;
use std::str::FromStr;

use crate::error::{CactusError, Result};

/// Every directive key starts with this token so it cannot collide with the
/// parameters a test adds to its own request.
pub const COMMAND_PREFIX: &str = "Cactus_";

pub const UNIQUE_ID_PARAM: &str = "Cactus_UniqueId";
pub const CLASS_NAME_PARAM: &str = "Cactus_TestClass";
pub const WRAPPED_CLASS_NAME_PARAM: &str = "Cactus_WrappedTestClass";
pub const METHOD_NAME_PARAM: &str = "Cactus_TestMethod";
pub const AUTOSESSION_NAME_PARAM: &str = "Cactus_AutomaticSession";
pub const SERVICE_NAME_PARAM: &str = "Cactus_Service";

/// Services answered by the redirector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceName {
    /// Run a test method and answer with whatever it wrote.
    CallTest,
    /// Fetch the result envelope of a previous `CallTest`.
    GetResults,
    /// Create an HTTP session and answer with its cookie.
    CreateSession,
    /// No-op, answers 200. Used as readiness URL.
    RunTest,
    GetVersion,
}

impl ServiceName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceName::CallTest => "CALL_TEST",
            ServiceName::GetResults => "GET_RESULTS",
            ServiceName::CreateSession => "CREATE_SESSION",
            ServiceName::RunTest => "RUN_TEST",
            ServiceName::GetVersion => "GET_VERSION",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = CactusError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "CALL_TEST" => Ok(ServiceName::CallTest),
            "GET_RESULTS" => Ok(ServiceName::GetResults),
            "CREATE_SESSION" => Ok(ServiceName::CreateSession),
            "RUN_TEST" => Ok(ServiceName::RunTest),
            "GET_VERSION" => Ok(ServiceName::GetVersion),
            _ => Err(CactusError::InvalidDirective {
                field: SERVICE_NAME_PARAM.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// An ordered set of directive parameters. Keys are unique; setting a key
/// again replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectiveParameters {
    entries: Vec<(String, String)>,
}

impl DirectiveParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the directive parameters out of a request's parameters,
    /// ignoring everything without the reserved prefix. The first value of
    /// a repeated key wins.
    pub fn from_query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parameters = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            if key.starts_with(COMMAND_PREFIX) && parameters.get(key).is_none() {
                parameters
                    .entries
                    .push((key.to_string(), value.as_ref().to_string()));
            }
        }
        parameters
    }

    /// Sets a directive. Keys lacking [`COMMAND_PREFIX`] are rejected.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if !key.starts_with(COMMAND_PREFIX) {
            return Err(CactusError::IllegalDirective { key });
        }
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| CactusError::MissingDirective {
            field: key.to_string(),
        })
    }

    /// Reads the requested service alone, for services that do not address a
    /// test method.
    pub fn service(&self) -> Result<ServiceName> {
        self.required(SERVICE_NAME_PARAM)?.parse()
    }
}

/// A logical test invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestDirective {
    pub test_id: String,
    pub class_name: String,
    /// Set when `class_name` is an adapter wrapping another test class.
    pub wrapped_class_name: Option<String>,
    pub method_name: String,
    pub service: ServiceName,
    pub auto_session: bool,
}

impl TestDirective {
    pub fn new(
        test_id: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            class_name: class_name.into(),
            wrapped_class_name: None,
            method_name: method_name.into(),
            service: ServiceName::CallTest,
            auto_session: true,
        }
    }

    /// The same invocation asking for another service.
    pub fn for_service(&self, service: ServiceName) -> Self {
        Self {
            service,
            ..self.clone()
        }
    }

    /// Name of the class whose method actually runs.
    pub fn target_class_name(&self) -> &str {
        self.wrapped_class_name
            .as_deref()
            .unwrap_or(&self.class_name)
    }

    pub fn encode(&self) -> Result<DirectiveParameters> {
        let mut parameters = DirectiveParameters::new();
        self.encode_into(&mut parameters)?;
        Ok(parameters)
    }

    pub fn encode_into(&self, parameters: &mut DirectiveParameters) -> Result<()> {
        parameters.set(UNIQUE_ID_PARAM, self.test_id.as_str())?;
        parameters.set(CLASS_NAME_PARAM, self.class_name.as_str())?;
        if let Some(wrapped) = &self.wrapped_class_name {
            parameters.set(WRAPPED_CLASS_NAME_PARAM, wrapped.as_str())?;
        }
        parameters.set(METHOD_NAME_PARAM, self.method_name.as_str())?;
        parameters.set(AUTOSESSION_NAME_PARAM, self.auto_session.to_string())?;
        parameters.set(SERVICE_NAME_PARAM, self.service.as_str())?;
        Ok(())
    }

    pub fn decode(parameters: &DirectiveParameters) -> Result<Self> {
        let service = parameters.service()?;
        let class_name = parameters.required(CLASS_NAME_PARAM)?.to_string();
        let method_name = parameters.required(METHOD_NAME_PARAM)?.to_string();
        let test_id = parameters.required(UNIQUE_ID_PARAM)?.to_string();
        let auto_session = match parameters.get(AUTOSESSION_NAME_PARAM) {
            None => true,
            Some(value) => parse_bool(AUTOSESSION_NAME_PARAM, value)?,
        };

        Ok(Self {
            test_id,
            class_name,
            wrapped_class_name: parameters.get(WRAPPED_CLASS_NAME_PARAM).map(str::to_string),
            method_name,
            service,
            auto_session,
        })
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(CactusError::InvalidDirective {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}
