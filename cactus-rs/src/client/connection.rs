use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::redirect::Policy;
use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use super::response::RawResponse;
use crate::config::Configuration;
use crate::cookie::{cookie_header, CookieTarget};
use crate::directive::COMMAND_PREFIX;
use crate::error::Result;
use crate::request::WebRequest;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Sends test requests to the redirector.
///
/// Directives come first in the query string, so a user parameter with the
/// reserved prefix cannot shadow them.
///
/// Redirects are never followed, so the response seen by end hooks is the
/// one the test code produced. No timeout is set beyond the transport's own.
#[derive(Clone, Debug)]
pub struct ConnectionHelper {
    client: reqwest::Client,
}

impl ConnectionHelper {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Sends `request` to the redirector it names.
    ///
    /// GET parameters and directives go in the query string, POST
    /// parameters or the raw body in the request body. Cookies are filtered
    /// against the simulated URL when one is set, otherwise against the
    /// redirector URL.
    pub async fn connect(&self, request: &WebRequest, config: &Configuration) -> Result<RawResponse> {
        let mut url = config.redirector_url(request.redirector_name())?;

        let mut configured;
        let request = match request.authentication() {
            Some(authentication) => {
                configured = request.clone();
                authentication.configure(&mut configured, config).await?;
                &configured
            }
            None => request,
        };

        append_query(&mut url, request)?;
        let method = if request.user_data().is_some() || !request.post_parameters().is_empty() {
            Method::POST
        } else {
            Method::GET
        };
        debug!(%method, %url, "connecting to redirector");

        let mut builder = self.client.request(method, url.clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let target = CookieTarget::for_request(request.url(), &url);
        if let Some(cookies) = cookie_header(request.cookies(), &target) {
            builder = builder.header(COOKIE, cookies);
        }

        let mut content_type = request.content_type().map(str::to_string);
        if let Some(body) = request.user_data() {
            builder = builder.body(body.to_vec());
        } else if !request.post_parameters().is_empty() {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.extend_pairs(request.post_parameters());
            builder = builder.body(form.finish());
            content_type.get_or_insert_with(|| FORM_CONTENT_TYPE.to_string());
        }
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        debug!(status, bytes = body.len(), "redirector answered");

        Ok(RawResponse::new(status, headers, body).with_target(target))
    }
}

fn append_query(url: &mut Url, request: &WebRequest) -> Result<()> {
    let directives = request.directives()?;
    if request.get_parameters().is_empty() && directives.is_empty() {
        return Ok(());
    }
    let mut query = url.query_pairs_mut();
    query.extend_pairs(directives.iter());
    for (name, value) in request.get_parameters() {
        if name.starts_with(COMMAND_PREFIX) {
            warn!(parameter = %name, "parameter uses the reserved prefix, the directive wins");
        }
        query.append_pair(name, value);
    }
    Ok(())
}
