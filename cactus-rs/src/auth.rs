//! Authentication strategies applied to a test request before it is sent.

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::config::Configuration;
use crate::cookie::{Cookie, CookieTarget};
use crate::error::{CactusError, Result};
use crate::request::WebRequest;

pub const DEFAULT_SESSION_COOKIE_NAME: &str = "JSESSIONID";
pub const DEFAULT_SECURITY_CHECK_PATH: &str = "j_security_check";

/// Adds credentials to a request. Implementations may be shared between
/// requests and keep state between them.
#[async_trait]
pub trait Authentication: fmt::Debug + Send + Sync {
    async fn configure(&self, request: &mut WebRequest, config: &Configuration) -> Result<()>;
}

/// HTTP Basic authentication.
#[derive(Clone)]
pub struct BasicAuthentication {
    name: String,
    password: String,
}

impl fmt::Debug for BasicAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthentication")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BasicAuthentication {
    /// The user name must be a token and the password printable text.
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let password = password.into();
        if name.is_empty() || !name.chars().all(is_token_char) {
            return Err(CactusError::Authentication(format!(
                "user name `{name}` contains characters not allowed in a token"
            )));
        }
        if !password.chars().all(is_text_char) {
            return Err(CactusError::Authentication(
                "password contains control characters".to_string(),
            ));
        }
        Ok(Self { name, password })
    }

    fn credentials(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.name, self.password))
    }
}

#[async_trait]
impl Authentication for BasicAuthentication {
    async fn configure(&self, request: &mut WebRequest, _config: &Configuration) -> Result<()> {
        request.add_header("Authorization", format!("Basic {}", self.credentials()));
        Ok(())
    }
}

fn is_separator(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?'
            | '=' | '{' | '}' | ' ' | '\t'
    )
}

fn is_token_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && !is_separator(c)
}

fn is_text_char(c: char) -> bool {
    !c.is_control() || matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Form based authentication.
///
/// The first request logs in: a protected page is fetched to obtain a
/// session cookie (the container answers with a redirect to its login
/// page), then the credentials are posted to the security check URL, which
/// answers with another redirect. The session cookie is kept and sent with
/// every later request configured by the same instance.
pub struct FormAuthentication {
    name: String,
    password: String,
    session_cookie_name: String,
    security_check_url: Option<Url>,
    client: reqwest::Client,
    session: Mutex<Option<(String, String)>>,
}

impl fmt::Debug for FormAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormAuthentication")
            .field("name", &self.name)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("security_check_url", &self.security_check_url)
            .finish_non_exhaustive()
    }
}

impl FormAuthentication {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            name: name.into(),
            password: password.into(),
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            security_check_url: None,
            client,
            session: Mutex::new(None),
        })
    }

    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Defaults to `j_security_check` below the context URL.
    pub fn with_security_check_url(mut self, url: &str) -> Result<Self> {
        self.security_check_url = Some(Url::parse(url)?);
        Ok(self)
    }

    fn security_check_url(&self, config: &Configuration) -> Result<Url> {
        match &self.security_check_url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(&format!(
                "{}/{}",
                config.context_url().as_str().trim_end_matches('/'),
                DEFAULT_SECURITY_CHECK_PATH
            ))?),
        }
    }

    async fn log_in(&self, request: &WebRequest, config: &Configuration) -> Result<String> {
        let protected = config.redirector_url(request.redirector_name())?;
        let response = self.client.get(protected.clone()).send().await?;
        if !response.status().is_redirection() {
            return Err(CactusError::Authentication(format!(
                "expected a redirect to the login page from {protected}, got status {}",
                response.status()
            )));
        }

        let target = CookieTarget::from_url(&protected);
        let session = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse_set_cookie(value, &target))
            .find(|cookie| cookie.name == self.session_cookie_name)
            .ok_or_else(|| {
                CactusError::Authentication(format!(
                    "no {} cookie received from {protected}",
                    self.session_cookie_name
                ))
            })?;

        let check = self.security_check_url(config)?;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("j_username", &self.name)
            .append_pair("j_password", &self.password)
            .finish();
        let response = self
            .client
            .post(check.clone())
            .header(COOKIE, format!("{}={}", session.name, session.value))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;
        if !response.status().is_redirection() {
            return Err(CactusError::Authentication(format!(
                "login to {check} failed with status {}",
                response.status()
            )));
        }

        debug!(user = %self.name, "form login succeeded");
        Ok(session.value)
    }
}

#[async_trait]
impl Authentication for FormAuthentication {
    async fn configure(&self, request: &mut WebRequest, config: &Configuration) -> Result<()> {
        let mut session = self.session.lock().await;
        let (name, value) = match session.as_ref() {
            Some(cached) => cached.clone(),
            None => {
                let value = self.log_in(request, config).await?;
                let cached = (self.session_cookie_name.clone(), value);
                *session = Some(cached.clone());
                cached
            }
        };

        let connection = config.redirector_url(request.redirector_name())?;
        let target = CookieTarget::for_request(request.url(), &connection);
        request.add_cookie(Cookie::new(target.host, name, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_basic_authentication_header() {
        let auth = BasicAuthentication::new("Aladdin", "open sesame").unwrap();
        let config = Configuration::new("http://localhost:8080/test").unwrap();
        let mut request = WebRequest::new();
        auth.configure(&mut request, &config).await.unwrap();
        assert_eq!(
            request.header_values("Authorization"),
            ["Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="]
        );
    }

    #[test]
    fn test_basic_authentication_validation() {
        assert!(BasicAuthentication::new("user:name", "secret").is_err());
        assert!(BasicAuthentication::new("user name", "secret").is_err());
        assert!(BasicAuthentication::new("", "secret").is_err());
        assert!(BasicAuthentication::new("user", "bad\u{7}password").is_err());
        assert!(BasicAuthentication::new("user", "with spaces\tand tabs").is_ok());
    }

    #[tokio::test]
    async fn test_form_authentication_logs_in_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/ServletRedirector"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/test/login.html")
                    .insert_header("Set-Cookie", "JSESSIONID=s3ss10n; Path=/test"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/test/j_security_check"))
            .and(header("Cookie", "JSESSIONID=s3ss10n"))
            .and(body_string_contains("j_username=tester"))
            .and(body_string_contains("j_password=p%40ss"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/test/"))
            .expect(1)
            .mount(&server)
            .await;

        let config = Configuration::new(&format!("{}/test", server.uri())).unwrap();
        let auth = FormAuthentication::new("tester", "p@ss").unwrap();
        for _ in 0..2 {
            let mut request = WebRequest::new();
            auth.configure(&mut request, &config).await.unwrap();
            assert_eq!(request.cookies().len(), 1);
            assert_eq!(request.cookies()[0].name, "JSESSIONID");
            assert_eq!(request.cookies()[0].value, "s3ss10n");
            assert_eq!(request.cookies()[0].domain, "127.0.0.1");
        }
    }

    #[tokio::test]
    async fn test_form_authentication_requires_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = Configuration::new(&format!("{}/test", server.uri())).unwrap();
        let auth = FormAuthentication::new("tester", "secret").unwrap();
        let mut request = WebRequest::new();
        assert!(matches!(
            auth.configure(&mut request, &config).await,
            Err(CactusError::Authentication(_))
        ));
    }
}
