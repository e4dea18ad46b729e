use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

use super::context::{RequestView, ResponseWriter, ServerContext, Session, SESSION_COOKIE_NAME};
use super::dispatcher::Dispatcher;
use crate::directive::{DirectiveParameters, ServiceName, TestDirective, UNIQUE_ID_PARAM};
use crate::envelope::{self, ResultEnvelope};
use crate::error::CactusError;
use crate::simulated_url::SimulatedUrl;
use crate::testcase::ClassLoader;

/// Server-side entry point: decodes directives and serves the redirector
/// services.
///
/// Results wait here between the `CALL_TEST` request that produced them and
/// the `GET_RESULTS` request that consumes them. Results nobody fetched
/// within [`DEFAULT_RESULT_TTL`] are dropped on a later `CALL_TEST`.
#[derive(Clone, Debug)]
pub struct Redirector {
    inner: Arc<RedirectorState>,
    result_ttl: Duration,
}

/// How long an unfetched result is kept.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct StoredResult {
    envelope: ResultEnvelope,
    stored_at: Instant,
}

#[derive(Debug)]
struct RedirectorState {
    dispatcher: Dispatcher,
    results: DashMap<String, StoredResult>,
    sessions: DashMap<String, Session>,
    init_parameters: Arc<HashMap<String, String>>,
}

impl Redirector {
    pub fn new(loader: ClassLoader) -> Self {
        Self::with_init_parameters(loader, HashMap::new())
    }

    pub fn with_init_parameters(loader: ClassLoader, init_parameters: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(RedirectorState {
                dispatcher: Dispatcher::new(loader),
                results: DashMap::new(),
                sessions: DashMap::new(),
                init_parameters: Arc::new(init_parameters),
            }),
            result_ttl: DEFAULT_RESULT_TTL,
        }
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Routes every service of the redirector under each of `names`, e.g.
    /// `ServletRedirector`.
    pub fn router(&self, names: &[&str]) -> Router {
        let mut router = Router::new();
        for name in names {
            router = router.route(&format!("/{}", name.trim_start_matches('/')), any(handle));
        }
        router.with_state(self.clone())
    }

    /// Number of results not fetched yet.
    pub fn pending_results(&self) -> usize {
        self.inner.results.len()
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.inner.sessions.get(id).map(|entry| entry.value().clone())
    }

    fn store_result(&self, id: String, envelope: ResultEnvelope) {
        let before = self.inner.results.len();
        self.inner
            .results
            .retain(|_, stored| stored.stored_at.elapsed() < self.result_ttl);
        let dropped = before - self.inner.results.len();
        if dropped > 0 {
            warn!(dropped, "dropped results nobody fetched");
        }
        let stored = StoredResult {
            envelope,
            stored_at: Instant::now(),
        };
        if self.inner.results.insert(id.clone(), stored).is_some() {
            warn!(%id, "replaced a result nobody fetched");
        }
    }

    fn new_session(&self) -> Session {
        let session = Session::new(Uuid::new_v4().simple().to_string());
        self.inner
            .sessions
            .insert(session.id().to_string(), session.clone());
        debug!(id = session.id(), "session created");
        session
    }

    async fn call_test(&self, exchange: Exchange, directives: &DirectiveParameters) -> Response {
        let directive = match TestDirective::decode(directives) {
            Ok(directive) => directive,
            Err(err) => return bad_request(err),
        };
        let url = match SimulatedUrl::load_from(directives) {
            Ok(url) => url,
            Err(err) => return bad_request(err),
        };

        let cookies = exchange.cookies();
        let joined = cookies
            .iter()
            .find(|(name, _)| name == SESSION_COOKIE_NAME)
            .and_then(|(_, id)| self.session(id));
        let mut created = None;
        let session = match joined {
            Some(session) => Some(session),
            None if directive.auto_session => {
                let session = self.new_session();
                created = Some(session.id().to_string());
                Some(session)
            }
            None => None,
        };

        let view = exchange.into_view(cookies, url);
        let mut context = ServerContext::new(view, self.inner.init_parameters.clone());
        if let Some(session) = session {
            context = context.with_session(session);
        }

        info!(
            id = %directive.test_id,
            class = directive.target_class_name(),
            method = %directive.method_name,
            "running test"
        );
        let outcome = self.inner.dispatcher.run_test(&directive, &mut context).await;
        self.store_result(directive.test_id.clone(), outcome.envelope);

        let mut response = into_http_response(context.into_response());
        if let Some(id) = created {
            append_session_cookie(&mut response, &id);
        }
        response
    }

    fn get_results(&self, directives: &DirectiveParameters) -> Response {
        let Some(id) = directives.get(UNIQUE_ID_PARAM) else {
            return bad_request(CactusError::MissingDirective {
                field: UNIQUE_ID_PARAM.to_string(),
            });
        };
        match self.inner.results.remove(id) {
            Some((_, stored)) => {
                ([(header::CONTENT_TYPE, envelope::CONTENT_TYPE)], stored.envelope.encode()).into_response()
            }
            None => {
                warn!(id, "no stored result");
                (StatusCode::NOT_FOUND, format!("no result for test {id}")).into_response()
            }
        }
    }

    fn create_session(&self) -> Response {
        let session = self.new_session();
        let mut response = StatusCode::OK.into_response();
        append_session_cookie(&mut response, session.id());
        response
    }
}

/// The parts of an incoming request the services need.
struct Exchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    query: Vec<(String, String)>,
}

impl Exchange {
    fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect()
    }

    fn is_form(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
    }

    fn into_view(self, cookies: Vec<(String, String)>, url: Option<SimulatedUrl>) -> RequestView {
        let mut parameters = self.query.clone();
        if self.is_form() {
            parameters.extend(form_urlencoded::parse(&self.body).into_owned());
        }
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        RequestView::new(self.method.as_str(), self.uri.path())
            .with_query_string(self.uri.query().map(str::to_string))
            .with_parameters(parameters)
            .with_headers(headers)
            .with_cookies(cookies)
            .with_body(self.body.to_vec())
            .with_simulated_url(url)
    }
}

async fn handle(
    State(redirector): State<Redirector>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query: Vec<(String, String)> = form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
        .into_owned()
        .collect();
    let directives =
        DirectiveParameters::from_query(query.iter().map(|(name, value)| (name.as_str(), value.as_str())));
    let service = match directives.service() {
        Ok(service) => service,
        Err(err) => return bad_request(err),
    };
    debug!(%service, path = uri.path(), "redirector request");

    match service {
        ServiceName::CallTest => {
            let exchange = Exchange {
                method,
                uri,
                headers,
                body,
                query,
            };
            redirector.call_test(exchange, &directives).await
        }
        ServiceName::GetResults => redirector.get_results(&directives),
        ServiceName::CreateSession => redirector.create_session(),
        ServiceName::RunTest => StatusCode::OK.into_response(),
        ServiceName::GetVersion => env!("CARGO_PKG_VERSION").into_response(),
    }
}

fn bad_request(err: CactusError) -> Response {
    warn!(%err, "rejecting redirector request");
    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
}

fn append_session_cookie(response: &mut Response, id: &str) {
    match HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={id}; Path=/")) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => warn!(%err, id, "cannot send session cookie"),
    }
}

fn into_http_response(writer: ResponseWriter) -> Response {
    let (status, headers, body) = writer.into_parts();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "dropping invalid header written by test"),
        }
    }
    response
}
