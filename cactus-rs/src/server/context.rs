//! What a test method sees of the HTTP exchange it runs in.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::directive::COMMAND_PREFIX;
use crate::simulated_url::SimulatedUrl;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE_NAME: &str = "JSESSIONID";

/// Objects available to a test method running in the container.
#[derive(Debug)]
pub struct ServerContext {
    pub request: RequestView,
    pub response: ResponseWriter,
    session: Option<Session>,
    init_parameters: Arc<HashMap<String, String>>,
}

impl ServerContext {
    pub fn new(request: RequestView, init_parameters: Arc<HashMap<String, String>>) -> Self {
        Self {
            request,
            response: ResponseWriter::default(),
            session: None,
            init_parameters,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// The session of the request, if one was created or joined.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Initialisation parameter of the redirector.
    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_parameters.get(name).map(String::as_str)
    }

    pub fn into_response(self) -> ResponseWriter {
        self.response
    }
}

/// The request as received by the redirector. Directive parameters are
/// hidden, and the simulated URL replaces the real one when present.
#[derive(Clone, Debug, Default)]
pub struct RequestView {
    method: String,
    path: String,
    query_string: Option<String>,
    parameters: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Vec<u8>,
    url: Option<SimulatedUrl>,
}

impl RequestView {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query_string(mut self, query_string: Option<String>) -> Self {
        self.query_string = query_string;
        self
    }

    /// Adds request parameters; directive parameters are dropped.
    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = (String, String)>) -> Self {
        self.parameters.extend(
            parameters
                .into_iter()
                .filter(|(name, _)| !name.starts_with(COMMAND_PREFIX)),
        );
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_simulated_url(mut self, url: Option<SimulatedUrl>) -> Self {
        self.url = url;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameter_values(name).into_iter().next()
    }

    pub fn parameter_values(&self, name: &str) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.parameters {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn simulated_url(&self) -> Option<&SimulatedUrl> {
        self.url.as_ref()
    }

    pub fn server_name(&self) -> Option<&str> {
        match &self.url {
            Some(url) => url.host(),
            None => self.header("host").map(|host| host.split(':').next().unwrap_or(host)),
        }
    }

    pub fn context_path(&self) -> Option<&str> {
        self.url.as_ref().and_then(SimulatedUrl::context_path)
    }

    pub fn servlet_path(&self) -> Option<&str> {
        self.url.as_ref().and_then(SimulatedUrl::servlet_path)
    }

    pub fn path_info(&self) -> Option<&str> {
        self.url.as_ref().and_then(SimulatedUrl::path_info)
    }

    pub fn request_uri(&self) -> String {
        match &self.url {
            Some(url) => url.path(),
            None => self.path.clone(),
        }
    }

    /// The simulated query string, or the real one without directive
    /// parameters.
    pub fn query_string(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return url.query_string().map(str::to_string);
        }
        let query = self.query_string.as_deref()?;
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty() && !pair.starts_with(COMMAND_PREFIX))
            .collect();
        if kept.is_empty() {
            None
        } else {
            Some(kept.join("&"))
        }
    }
}

/// The response a test method writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseWriter {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl ResponseWriter {
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
        self.add_header("Content-Type", content_type);
    }

    pub fn add_cookie(&mut self, name: &str, value: &str) {
        self.add_header("Set-Cookie", format!("{name}={value}"));
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn write(&mut self, text: &str) {
        self.body.extend_from_slice(text.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_parts(self) -> (u16, Vec<(String, String)>, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}

/// An HTTP session. Clones share their attributes.
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    attributes: Arc<DashMap<String, String>>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Arc::new(DashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(|value| value.value().clone())
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.attributes.remove(name).map(|(_, value)| value)
    }
}
