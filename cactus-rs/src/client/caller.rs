use tracing::{debug, info};

use super::http::HttpClient;
use super::response::{RawResponse, WebResponse};
use crate::config::Configuration;
use crate::directive::TestDirective;
use crate::error::{CactusError, Result};
use crate::request::WebRequest;
use crate::testcase::{
    validate, ClassLoader, EndResponse, ImplementDefect, Invocation, MethodRole, TestCaseImplementError,
    TestClass, TestInstance, TypeRef, WRAPPER_CLASS_NAME,
};
use crate::uniqueid::UniqueIdGenerator;

const GLOBAL_BEGIN: &str = "begin";
const GLOBAL_END: &str = "end";
const TEST_PREFIX: &str = "test";

/// Runs test methods from the client side.
///
/// For a test method `testXxx` the order is: `begin`, `beginXxx`, the
/// request to the redirector (which runs `testXxx` in the container),
/// `endXxx`, `end`. Hooks are optional. End hooks only run when the server
/// side of the test succeeded.
#[derive(Clone, Debug)]
pub struct ClientTestCaseCaller {
    http: HttpClient,
    ids: UniqueIdGenerator,
    loader: ClassLoader,
}

impl ClientTestCaseCaller {
    pub fn new(config: Configuration, loader: ClassLoader) -> Result<Self> {
        Ok(Self::with_http_client(HttpClient::new(config)?, loader))
    }

    pub fn with_http_client(http: HttpClient, loader: ClassLoader) -> Self {
        Self {
            http,
            ids: UniqueIdGenerator::new(),
            loader,
        }
    }

    pub fn with_id_generator(mut self, ids: UniqueIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &Configuration {
        self.http.config()
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub async fn run_test(&self, class_name: &str, method_name: &str) -> Result<()> {
        self.run(class_name, None, method_name).await
    }

    /// Runs a method of a plain test class through the server-side wrapper.
    pub async fn run_wrapped_test(&self, wrapped_class_name: &str, method_name: &str) -> Result<()> {
        self.run(WRAPPER_CLASS_NAME, Some(wrapped_class_name), method_name)
            .await
    }

    async fn run(&self, class_name: &str, wrapped: Option<&str>, method_name: &str) -> Result<()> {
        let class = self.loader.load(wrapped.unwrap_or(class_name))?;
        let mut instance = class.instantiate(method_name)?;

        let mut request = WebRequest::new();
        request.attach_client(self.http.clone());
        call_begin(&class, &mut instance, GLOBAL_BEGIN, &mut request).await?;
        if let Some(name) = hook_name("begin", method_name) {
            call_begin(&class, &mut instance, &name, &mut request).await?;
        }

        let mut directive = TestDirective::new(
            self.ids.generate(instance.object(), method_name),
            class_name,
            method_name,
        );
        directive.wrapped_class_name = wrapped.map(str::to_string);
        directive.auto_session = request.automatic_session();
        info!(
            class = directive.target_class_name(),
            method = method_name,
            id = %directive.test_id,
            "running test in container"
        );
        let response = self.http.do_test(&directive, &request).await?;

        if let Some(name) = hook_name("end", method_name) {
            call_end(&class, &mut instance, &name, &response).await?;
        }
        call_end(&class, &mut instance, GLOBAL_END, &response).await?;
        Ok(())
    }
}

/// `beginXxx` / `endXxx` for `testXxx`. `None` when nothing is left of the
/// name once the `test` prefix is removed.
fn hook_name(prefix: &str, method_name: &str) -> Option<String> {
    let base = method_name.strip_prefix(TEST_PREFIX).unwrap_or(method_name);
    if base.is_empty() {
        None
    } else {
        Some(format!("{prefix}{base}"))
    }
}

fn implement_error(err: TestCaseImplementError) -> CactusError {
    CactusError::TestCaseImplement(err)
}

async fn call_begin(
    class: &TestClass,
    instance: &mut TestInstance,
    name: &str,
    request: &mut WebRequest,
) -> Result<()> {
    let Some(method) = class.find_method(name) else {
        return Ok(());
    };
    validate(class.name(), method.signature(), MethodRole::Begin).map_err(implement_error)?;
    debug!(method = name, "calling begin hook");
    method
        .invoke(instance, Invocation::Begin(request))
        .map_err(implement_error)?
        .await;
    Ok(())
}

/// Calls an end hook with the response family it declares. The declared
/// type must be exactly `WebResponse` or `RawResponse`.
async fn call_end(
    class: &TestClass,
    instance: &mut TestInstance,
    name: &str,
    response: &RawResponse,
) -> Result<()> {
    let Some(method) = class.find_method(name) else {
        return Ok(());
    };
    validate(class.name(), method.signature(), MethodRole::End).map_err(implement_error)?;

    let declared = method.signature().parameters[0];
    let web;
    let argument = if declared == TypeRef::WEB_RESPONSE {
        web = WebResponse::from(response.clone());
        EndResponse::Web(&web)
    } else if declared == TypeRef::RAW_RESPONSE {
        EndResponse::Raw(response)
    } else {
        return Err(implement_error(TestCaseImplementError::new(
            class.name(),
            name,
            ImplementDefect::UnsupportedEndParameter { actual: declared },
        )));
    };

    debug!(method = name, "calling end hook");
    method
        .invoke(instance, Invocation::End(argument))
        .map_err(implement_error)?
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names() {
        assert_eq!(hook_name("begin", "testBar").as_deref(), Some("beginBar"));
        assert_eq!(hook_name("end", "testBar").as_deref(), Some("endBar"));
        assert_eq!(hook_name("begin", "checkBar").as_deref(), Some("begincheckBar"));
        assert_eq!(hook_name("begin", "test"), None);
    }
}
