use std::fmt;
use std::sync::Arc;

use crate::auth::Authentication;
use crate::client::HttpClient;
use crate::cookie::Cookie;
use crate::directive::{DirectiveParameters, TestDirective};
use crate::error::{CactusError, Result};
use crate::simulated_url::SimulatedUrl;

/// The request a test sends to the redirector, customised by begin hooks.
///
/// Parameters and headers may repeat; values keep insertion order. GET and
/// POST parameters are separate spaces.
#[derive(Clone)]
pub struct WebRequest {
    get_parameters: Vec<(String, String)>,
    post_parameters: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    body: Option<Vec<u8>>,
    content_type: Option<String>,
    authentication: Option<Arc<dyn Authentication>>,
    url: Option<SimulatedUrl>,
    automatic_session: bool,
    redirector_name: Option<String>,
    directives: DirectiveParameters,
    client: Option<HttpClient>,
}

impl Default for WebRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WebRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRequest")
            .field("get_parameters", &self.get_parameters)
            .field("post_parameters", &self.post_parameters)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("body", &self.body.as_ref().map(Vec::len))
            .field("content_type", &self.content_type)
            .field("authentication", &self.authentication)
            .field("url", &self.url)
            .field("automatic_session", &self.automatic_session)
            .field("directives", &self.directives)
            .finish()
    }
}

impl WebRequest {
    pub fn new() -> Self {
        Self {
            get_parameters: Vec::new(),
            post_parameters: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
            content_type: None,
            authentication: None,
            url: None,
            automatic_session: true,
            redirector_name: None,
            directives: DirectiveParameters::new(),
            client: None,
        }
    }

    /// Adds a query string parameter.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.get_parameters.push((name.into(), value.into()));
    }

    /// Adds a form parameter sent in the request body.
    pub fn add_post_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.post_parameters.push((name.into(), value.into()));
    }

    pub fn get_parameters(&self) -> &[(String, String)] {
        &self.get_parameters
    }

    pub fn post_parameters(&self) -> &[(String, String)] {
        &self.post_parameters
    }

    pub fn get_parameter_values(&self, name: &str) -> Vec<&str> {
        values(&self.get_parameters, name)
    }

    pub fn post_parameter_values(&self, name: &str) -> Vec<&str> {
        values(&self.post_parameters, name)
    }

    /// Adds a header. `Content-Type` is kept apart so it is sent exactly
    /// once.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.into());
        } else {
            self.headers.push((name, value.into()));
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    /// Adds a cookie for `localhost`.
    pub fn add_cookie_named(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.push(Cookie::new("localhost", name, value));
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Raw request body; takes precedence over POST parameters.
    pub fn set_user_data(&mut self, body: impl Into<Vec<u8>>) {
        self.body = Some(body.into());
    }

    pub fn user_data(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn set_authentication(&mut self, authentication: Arc<dyn Authentication>) {
        self.authentication = Some(authentication);
    }

    pub fn authentication(&self) -> Option<Arc<dyn Authentication>> {
        self.authentication.clone()
    }

    pub fn set_url(&mut self, url: SimulatedUrl) {
        self.url = Some(url);
    }

    pub fn url(&self) -> Option<&SimulatedUrl> {
        self.url.as_ref()
    }

    pub fn set_automatic_session(&mut self, automatic_session: bool) {
        self.automatic_session = automatic_session;
    }

    pub fn automatic_session(&self) -> bool {
        self.automatic_session
    }

    /// Sends the request to another redirector of the same web application.
    pub fn set_redirector_name(&mut self, name: impl Into<String>) {
        self.redirector_name = Some(name.into());
    }

    pub fn redirector_name(&self) -> Option<&str> {
        self.redirector_name.as_deref()
    }

    /// Adds a directive parameter; keys must carry the reserved prefix.
    pub fn add_cactus_command(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.directives.set(key, value)
    }

    pub fn set_directive(&mut self, directive: &TestDirective) -> Result<()> {
        directive.encode_into(&mut self.directives)
    }

    /// Directive parameters, including the simulated URL when set.
    pub fn directives(&self) -> Result<DirectiveParameters> {
        let mut directives = self.directives.clone();
        if let Some(url) = &self.url {
            url.save_to(&mut directives)?;
        }
        Ok(directives)
    }

    /// A request carrying only the directives and authentication of this
    /// one, for follow-up service calls of the same test.
    pub fn service_request(&self, directive: &TestDirective) -> Result<WebRequest> {
        let mut request = self.follow_up();
        request.set_directive(directive)?;
        Ok(request)
    }

    /// An empty request to the same redirector, with the same credentials
    /// and simulated URL.
    pub(crate) fn follow_up(&self) -> WebRequest {
        let mut request = WebRequest::new();
        request.authentication = self.authentication.clone();
        request.redirector_name = self.redirector_name.clone();
        request.url = self.url.clone();
        request.client = self.client.clone();
        request
    }

    pub(crate) fn attach_client(&mut self, client: HttpClient) {
        self.client = Some(client);
    }

    /// Creates an HTTP session on the server and returns the cookie that
    /// identifies it, ready to be added to this or another request.
    pub async fn session_cookie(&self) -> Result<Cookie> {
        let client = self.client.as_ref().ok_or_else(|| {
            CactusError::Config("the request is not attached to a redirector client".to_string())
        })?;
        client.create_session_cookie(self).await
    }
}

fn values<'a>(parameters: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    parameters
        .iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{CLASS_NAME_PARAM, SERVICE_NAME_PARAM};
    use crate::error::CactusError;
    use crate::simulated_url::URL_SERVER_PARAM;

    #[test]
    fn test_multi_valued_parameters_keep_order() {
        let mut request = WebRequest::new();
        request.add_parameter("param", "one");
        request.add_post_parameter("param", "post");
        request.add_parameter("param", "two");
        assert_eq!(request.get_parameter_values("param"), ["one", "two"]);
        assert_eq!(request.post_parameter_values("param"), ["post"]);
        assert!(request.get_parameter_values("missing").is_empty());
    }

    #[test]
    fn test_content_type_header_is_collapsed() {
        let mut request = WebRequest::new();
        request.add_header("Content-Type", "text/plain");
        request.add_header("X-Custom", "a");
        request.add_header("x-custom", "b");
        request.add_header("content-type", "application/xml");
        assert_eq!(request.content_type(), Some("application/xml"));
        assert_eq!(request.header_values("X-CUSTOM"), ["a", "b"]);
        assert!(request.header_values("Content-Type").is_empty());
    }

    #[test]
    fn test_directive_commands() {
        let mut request = WebRequest::new();
        assert!(matches!(
            request.add_cactus_command("TestClass", "Foo"),
            Err(CactusError::IllegalDirective { .. })
        ));

        let directive = TestDirective::new("id", "Foo", "testBar");
        request.set_directive(&directive).unwrap();
        request.set_url(SimulatedUrl::new("example.com"));
        let directives = request.directives().unwrap();
        assert_eq!(directives.get(CLASS_NAME_PARAM), Some("Foo"));
        assert_eq!(directives.get(URL_SERVER_PARAM), Some("example.com"));

        request.add_parameter("user", "value");
        let follow_up = request
            .service_request(&directive.for_service(crate::directive::ServiceName::GetResults))
            .unwrap();
        assert!(follow_up.get_parameters().is_empty());
        assert_eq!(
            follow_up.directives().unwrap().get(SERVICE_NAME_PARAM),
            Some("GET_RESULTS")
        );
    }
}
