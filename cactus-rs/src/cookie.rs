use chrono::{DateTime, Utc};
use url::Url;

use crate::simulated_url::SimulatedUrl;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub domain: String,
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub comment: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub secure: bool,
}

impl Cookie {
    pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            value: value.into(),
            path: None,
            comment: None,
            expiry_date: None,
            secure: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_expiry_date(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= now)
    }

    /// Whether the cookie should be sent to `target`.
    pub fn matches(&self, target: &CookieTarget, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
            && (!self.secure || target.secure)
            && domain_matches(&self.domain, &target.host)
            && path_matches(self.path.as_deref(), &target.path)
    }

    /// Parses one `Set-Cookie` header value. Domain and path default to the
    /// target the response came from.
    pub fn parse_set_cookie(header: &str, target: &CookieTarget) -> Option<Self> {
        let mut attributes = header.split(';');
        let (name, value) = attributes.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(target.host.as_str(), name, value.trim().trim_matches('"'))
            .with_path(default_path(&target.path));
        for attribute in attributes {
            let (key, value) = attribute
                .split_once('=')
                .map_or((attribute.trim(), ""), |(key, value)| (key.trim(), value.trim()));
            match key.to_ascii_lowercase().as_str() {
                "domain" if !value.is_empty() => {
                    cookie.domain = value.trim_start_matches('.').to_string()
                }
                "path" if !value.is_empty() => cookie.path = Some(value.to_string()),
                "comment" => cookie.comment = Some(value.to_string()),
                "secure" => cookie.secure = true,
                "expires" => {
                    if let Ok(expiry) = DateTime::parse_from_rfc2822(value) {
                        cookie.expiry_date = Some(expiry.with_timezone(&Utc));
                    }
                }
                "max-age" => {
                    if let Ok(seconds) = value.parse::<i64>() {
                        cookie.expiry_date = Some(Utc::now() + chrono::Duration::seconds(seconds));
                    }
                }
                _ => {}
            }
        }
        Some(cookie)
    }
}

/// Where a request is (or pretends to be) going, for cookie matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieTarget {
    pub host: String,
    pub path: String,
    pub secure: bool,
}

impl CookieTarget {
    pub fn from_url(url: &Url) -> Self {
        Self {
            host: url.host_str().unwrap_or("localhost").to_string(),
            path: url.path().to_string(),
            secure: url.scheme() == "https",
        }
    }

    /// The simulated URL wins over the real connection target when set.
    pub fn for_request(simulated: Option<&SimulatedUrl>, connection: &Url) -> Self {
        match simulated {
            Some(simulated) => Self {
                host: simulated
                    .host()
                    .or(connection.host_str())
                    .unwrap_or("localhost")
                    .to_string(),
                path: simulated.path(),
                secure: simulated.protocol() == "https",
            },
            None => Self::from_url(connection),
        }
    }
}

/// Builds a `Cookie` header value out of the cookies eligible for `target`.
pub fn cookie_header<'a>(
    cookies: impl IntoIterator<Item = &'a Cookie>,
    target: &CookieTarget,
) -> Option<String> {
    let now = Utc::now();
    let pairs: Vec<String> = cookies
        .into_iter()
        .filter(|cookie| cookie.matches(target, now))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    host.len() > domain.len()
        && host.to_ascii_lowercase().ends_with(&domain.to_ascii_lowercase())
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn path_matches(cookie_path: Option<&str>, request_path: &str) -> bool {
    let Some(cookie_path) = cookie_path else {
        return true;
    };
    if !request_path.starts_with(cookie_path) {
        return false;
    }
    request_path.len() == cookie_path.len()
        || cookie_path.ends_with('/')
        || request_path.as_bytes()[cookie_path.len()] == b'/'
}

/// Directory of the request path, the default path of a received cookie.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => request_path[..index].to_string(),
    }
}
