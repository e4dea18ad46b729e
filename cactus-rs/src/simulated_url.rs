//! A URL the server-side test should believe it was called with, independent
//! of the redirector URL actually used on the wire.

use url::Url;

use crate::directive::DirectiveParameters;
use crate::error::{CactusError, Result};

pub const URL_PROTOCOL_PARAM: &str = "Cactus_URL_Protocol";
pub const URL_SERVER_PARAM: &str = "Cactus_URL_Server";
pub const URL_CONTEXT_PATH_PARAM: &str = "Cactus_URL_ContextPath";
pub const URL_SERVLET_PATH_PARAM: &str = "Cactus_URL_ServletPath";
pub const URL_PATH_INFO_PARAM: &str = "Cactus_URL_PathInfo";
pub const URL_QUERY_STRING_PARAM: &str = "Cactus_URL_QueryString";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatedUrl {
    protocol: String,
    /// `host` or `host:port`.
    server: Option<String>,
    context_path: Option<String>,
    servlet_path: Option<String>,
    path_info: Option<String>,
    query_string: Option<String>,
}

impl SimulatedUrl {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            protocol: "http".to_string(),
            server: Some(server.into()),
            context_path: None,
            servlet_path: None,
            path_info: None,
            query_string: None,
        }
    }

    pub fn with_protocol(mut self, protocol: &str) -> Result<Self> {
        self.protocol = check_protocol(protocol)?;
        Ok(self)
    }

    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = Some(context_path.into());
        self
    }

    pub fn with_servlet_path(mut self, servlet_path: impl Into<String>) -> Self {
        self.servlet_path = Some(servlet_path.into());
        self
    }

    pub fn with_path_info(mut self, path_info: impl Into<String>) -> Self {
        self.path_info = Some(path_info.into());
        self
    }

    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = Some(query_string.into());
        self
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.server
            .as_deref()
            .map(|server| server.rsplit_once(':').map_or(server, |(host, _)| host))
    }

    pub fn port(&self) -> Option<u16> {
        self.server
            .as_deref()
            .and_then(|server| server.rsplit_once(':'))
            .and_then(|(_, port)| port.parse().ok())
    }

    pub fn context_path(&self) -> Option<&str> {
        self.context_path.as_deref()
    }

    pub fn servlet_path(&self) -> Option<&str> {
        self.servlet_path.as_deref()
    }

    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Context path, servlet path and path info joined, `/` when all are
    /// unset.
    pub fn path(&self) -> String {
        let path: String = [&self.context_path, &self.servlet_path, &self.path_info]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    pub fn to_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}://{}{}",
            self.protocol,
            self.server.as_deref().unwrap_or("localhost"),
            self.path()
        ))?;
        url.set_query(self.query_string.as_deref());
        Ok(url)
    }

    pub fn save_to(&self, parameters: &mut DirectiveParameters) -> Result<()> {
        parameters.set(URL_PROTOCOL_PARAM, self.protocol.as_str())?;
        let optional = [
            (URL_SERVER_PARAM, &self.server),
            (URL_CONTEXT_PATH_PARAM, &self.context_path),
            (URL_SERVLET_PATH_PARAM, &self.servlet_path),
            (URL_PATH_INFO_PARAM, &self.path_info),
            (URL_QUERY_STRING_PARAM, &self.query_string),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                parameters.set(key, value.as_str())?;
            }
        }
        Ok(())
    }

    /// Reads a simulated URL back; `None` when the request carries none.
    pub fn load_from(parameters: &DirectiveParameters) -> Result<Option<Self>> {
        let Some(protocol) = parameters.get(URL_PROTOCOL_PARAM) else {
            return Ok(None);
        };
        let owned = |key| parameters.get(key).map(str::to_string);
        Ok(Some(Self {
            protocol: check_protocol(protocol)?,
            server: owned(URL_SERVER_PARAM),
            context_path: owned(URL_CONTEXT_PATH_PARAM),
            servlet_path: owned(URL_SERVLET_PATH_PARAM),
            path_info: owned(URL_PATH_INFO_PARAM),
            query_string: owned(URL_QUERY_STRING_PARAM),
        }))
    }
}

fn check_protocol(protocol: &str) -> Result<String> {
    let protocol = protocol.to_ascii_lowercase();
    match protocol.as_str() {
        "http" | "https" => Ok(protocol),
        _ => Err(CactusError::UnsupportedScheme(protocol)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let url = SimulatedUrl::new("jakarta.apache.org:8080")
            .with_context_path("/mywebapp")
            .with_servlet_path("/test")
            .with_path_info("/info")
            .with_query_string("a=1");
        assert_eq!(url.host(), Some("jakarta.apache.org"));
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "/mywebapp/test/info");
        assert_eq!(
            url.to_url().unwrap().as_str(),
            "http://jakarta.apache.org:8080/mywebapp/test/info?a=1"
        );
        assert_eq!(SimulatedUrl::new("example.com").path(), "/");
    }

    #[test]
    fn test_directive_round_trip() {
        let url = SimulatedUrl::new("example.com")
            .with_protocol("HTTPS")
            .unwrap()
            .with_context_path("/app");
        let mut parameters = DirectiveParameters::new();
        url.save_to(&mut parameters).unwrap();
        assert_eq!(SimulatedUrl::load_from(&parameters).unwrap(), Some(url));
        assert_eq!(SimulatedUrl::load_from(&DirectiveParameters::new()).unwrap(), None);
    }

    #[test]
    fn test_only_http_protocols() {
        assert!(matches!(
            SimulatedUrl::new("example.com").with_protocol("ftp"),
            Err(CactusError::UnsupportedScheme(_))
        ));
    }
}
