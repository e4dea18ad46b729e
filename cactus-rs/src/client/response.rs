use crate::cookie::{Cookie, CookieTarget};

/// The response to a test request, as received.
#[derive(Clone, Debug)]
pub struct RawResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    target: Option<CookieTarget>,
}

impl RawResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            target: None,
        }
    }

    /// Where the request went; received cookies default to it.
    pub fn with_target(mut self, target: CookieTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn target(&self) -> Option<&CookieTarget> {
        self.target.as_ref()
    }
}

/// A response with helpers for the usual assertions on text, lines and
/// cookies.
#[derive(Clone, Debug)]
pub struct WebResponse {
    raw: RawResponse,
    text: String,
}

impl From<RawResponse> for WebResponse {
    fn from(raw: RawResponse) -> Self {
        let text = String::from_utf8_lossy(&raw.body).into_owned();
        Self { raw, text }
    }
}

impl WebResponse {
    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    pub fn status(&self) -> u16 {
        self.raw.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The body split in lines, without line terminators.
    pub fn lines(&self) -> Vec<&str> {
        self.text.lines().collect()
    }

    /// Cookies set by the response. Domain and path default to the target
    /// of the request.
    pub fn cookies(&self) -> Vec<Cookie> {
        let fallback = CookieTarget {
            host: "localhost".to_string(),
            path: "/".to_string(),
            secure: false,
        };
        let target = self.raw.target.as_ref().unwrap_or(&fallback);
        self.raw
            .header_values("set-cookie")
            .filter_map(|header| Cookie::parse_set_cookie(header, target))
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies().into_iter().find(|cookie| cookie.name == name)
    }
}
