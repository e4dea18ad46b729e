use super::connection::ConnectionHelper;
use super::response::{RawResponse, WebResponse};
use super::result::ResultFactory;
use crate::config::Configuration;
use crate::cookie::Cookie;
use crate::directive::{ServiceName, TestDirective, SERVICE_NAME_PARAM};
use crate::error::{CactusError, Result};
use crate::request::WebRequest;
use crate::server::SESSION_COOKIE_NAME;

/// Talks to the redirector of one web application.
#[derive(Clone, Debug)]
pub struct HttpClient {
    config: Configuration,
    helper: ConnectionHelper,
    factory: ResultFactory,
}

impl HttpClient {
    pub fn new(config: Configuration) -> Result<Self> {
        Ok(Self::with_helper(config, ConnectionHelper::new()?))
    }

    pub fn with_helper(config: Configuration, helper: ConnectionHelper) -> Self {
        Self {
            config,
            helper,
            factory: ResultFactory,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Runs one test on the server.
    ///
    /// The first request executes the test and returns whatever the test
    /// wrote; the second fetches the outcome stored under the same unique
    /// id. A failed test comes back as [`CactusError::Test`].
    pub async fn do_test(&self, directive: &TestDirective, request: &WebRequest) -> Result<RawResponse> {
        let mut call = request.clone();
        call.set_directive(&directive.for_service(ServiceName::CallTest))?;
        let response = self.helper.connect(&call, &self.config).await?;

        let results = request.service_request(&directive.for_service(ServiceName::GetResults))?;
        let outcome = self.helper.connect(&results, &self.config).await?;
        self.factory.check_result(&outcome)?;
        Ok(response)
    }

    /// Asks the redirector to create an HTTP session and returns the cookie
    /// identifying it.
    pub async fn create_session_cookie(&self, request: &WebRequest) -> Result<Cookie> {
        let response = self.call_service(request, ServiceName::CreateSession).await?;
        WebResponse::from(response)
            .cookie(SESSION_COOKIE_NAME)
            .ok_or_else(|| {
                CactusError::Protocol(format!(
                    "no {SESSION_COOKIE_NAME} cookie in the answer to {}",
                    ServiceName::CreateSession
                ))
            })
    }

    /// Version of the framework running on the server.
    pub async fn server_version(&self) -> Result<String> {
        let response = self
            .call_service(&WebRequest::new(), ServiceName::GetVersion)
            .await?;
        Ok(WebResponse::from(response).text().trim().to_string())
    }

    async fn call_service(&self, request: &WebRequest, service: ServiceName) -> Result<RawResponse> {
        let mut service_request = request.follow_up();
        service_request.add_cactus_command(SERVICE_NAME_PARAM, service.as_str())?;
        let response = self.helper.connect(&service_request, &self.config).await?;
        if response.status() != 200 {
            return Err(CactusError::Protocol(format!(
                "{service} request failed with status {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::envelope::ResultEnvelope;
    use crate::failure::TestFailure;
    use crate::simulated_url::SimulatedUrl;

    async fn client(server: &MockServer) -> HttpClient {
        HttpClient::new(Configuration::new(&format!("{}/test", server.uri())).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_do_test_fetches_results_with_the_same_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Cactus_Service", "CALL_TEST"))
            .and(query_param("Cactus_UniqueId", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("written by the test"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("Cactus_Service", "GET_RESULTS"))
            .and(query_param("Cactus_UniqueId", "abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(ResultEnvelope::success().encode()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let directive = TestDirective::new("abc", "Foo", "testBar");
        let response = client(&server)
            .await
            .do_test(&directive, &WebRequest::new())
            .await
            .unwrap();
        assert_eq!(response.body(), b"written by the test");
    }

    #[tokio::test]
    async fn test_do_test_rethrows_remote_failure() {
        let server = MockServer::start().await;
        Mock::given(query_param("Cactus_Service", "CALL_TEST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let failure = TestFailure {
            class_name: "org.apache.catalina.LifecycleException".to_string(),
            message: Some("context stopped".to_string()),
            stack_trace: "at org.apache.catalina...".to_string(),
        };
        Mock::given(query_param("Cactus_Service", "GET_RESULTS"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(ResultEnvelope::failure(failure.clone()).encode()),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .do_test(&TestDirective::new("abc", "Foo", "testBar"), &WebRequest::new())
            .await
            .unwrap_err();
        assert_eq!(err.into_test_failure(), Some(failure));
    }

    #[tokio::test]
    async fn test_session_cookie_uses_simulated_host() {
        let server = MockServer::start().await;
        Mock::given(query_param("Cactus_Service", "CREATE_SESSION"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Set-Cookie", "JSESSIONID=42; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(query_param("Cactus_Service", "GET_VERSION"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1.2.3\n"))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let mut request = WebRequest::new();
        request.set_url(SimulatedUrl::new("jakarta.apache.org"));
        let cookie = client.create_session_cookie(&request).await.unwrap();
        assert_eq!(cookie.value, "42");
        assert_eq!(cookie.domain, "jakarta.apache.org");

        assert_eq!(client.server_version().await.unwrap(), "1.2.3");
    }
}
