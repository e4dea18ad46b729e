use std::net::SocketAddr;

use async_trait::async_trait;
use axum::http::{header, HeaderValue};
use axum::middleware::map_response;
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::Container;
use crate::config::DEFAULT_REDIRECTOR_NAME;
use crate::error::{CactusError, Result};
use crate::server::Redirector;

struct Serving {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Serves a [`Redirector`] from the current process.
///
/// The listener is bound on construction so the address, and with it the
/// readiness URL, is known before the container starts.
pub struct EmbeddedContainer {
    redirector: Redirector,
    context_path: String,
    redirector_names: Vec<String>,
    server_name: String,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    serving: Mutex<Option<Serving>>,
}

impl EmbeddedContainer {
    pub async fn bind(addr: SocketAddr, redirector: Redirector) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            redirector,
            context_path: "/".to_string(),
            redirector_names: vec![DEFAULT_REDIRECTOR_NAME.to_string()],
            server_name: format!("cactus-embedded/{}", env!("CARGO_PKG_VERSION")),
            local_addr,
            listener: Mutex::new(Some(listener)),
            serving: Mutex::new(None),
        })
    }

    /// Path the web application is mounted under, e.g. `/test`.
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        let context_path = context_path.into();
        self.context_path = format!("/{}", context_path.trim_matches('/'));
        self
    }

    /// Mounts the redirector under each of `names`.
    pub fn with_redirector_names(mut self, names: &[&str]) -> Self {
        self.redirector_names = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL of the web application, to be used as context URL.
    pub fn context_url(&self) -> String {
        format!(
            "http://{}/{}",
            self.local_addr,
            self.context_path.trim_start_matches('/')
        )
    }

    fn app(&self) -> Result<Router> {
        let names: Vec<&str> = self.redirector_names.iter().map(String::as_str).collect();
        let redirectors = self.redirector.router(&names);
        let app = if self.context_path == "/" {
            redirectors
        } else {
            Router::new().nest(&self.context_path, redirectors)
        };
        let server = HeaderValue::from_str(&self.server_name)
            .map_err(|err| CactusError::Config(format!("invalid server name: {err}")))?;
        Ok(app.layer(map_response(move |mut response: Response| {
            let server = server.clone();
            async move {
                response.headers_mut().insert(header::SERVER, server);
                response
            }
        })))
    }
}

#[async_trait]
impl Container for EmbeddedContainer {
    fn name(&self) -> String {
        self.server_name.clone()
    }

    async fn start_up(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| CactusError::Container("embedded container can only start once".to_string()))?;
        let app = self.app()?;
        let (shutdown, signal) = oneshot::channel();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
        });
        info!(addr = %self.local_addr, context = %self.context_path, "embedded container serving");
        *self.serving.lock().await = Some(Serving { shutdown, task });
        Ok(())
    }

    async fn shut_down(&self) -> Result<()> {
        let Some(serving) = self.serving.lock().await.take() else {
            return Ok(());
        };
        if serving.shutdown.send(()).is_err() {
            warn!("embedded server already gone");
        }
        match serving.task.await {
            Ok(result) => Ok(result?),
            Err(err) => Err(CactusError::Container(format!("embedded server failed: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Configuration;
    use crate::container::{HttpProbe, ReadinessProbe};
    use crate::testcase::{ClassLoader, TestRegistry};

    async fn container(context_path: &str) -> EmbeddedContainer {
        let redirector = Redirector::new(ClassLoader::new(Arc::new(TestRegistry::new())));
        EmbeddedContainer::bind("127.0.0.1:0".parse().unwrap(), redirector)
            .await
            .unwrap()
            .with_context_path(context_path)
            .with_server_name("Embedded/1.0")
    }

    #[tokio::test]
    async fn test_serves_redirector_under_context_path() {
        let container = container("test").await;
        let config = Configuration::new(&container.context_url()).unwrap();
        let probe = HttpProbe::for_redirector(&config).unwrap();
        assert_eq!(probe.url().path(), "/test/ServletRedirector");

        container.start_up().await.unwrap();
        let result = probe.probe().await;
        assert_eq!(result.code, 200);
        assert_eq!(result.server.as_deref(), Some("Embedded/1.0"));

        container.shut_down().await.unwrap();
        assert!(!probe.probe().await.is_available());
        assert!(container.start_up().await.is_err());
    }

    #[tokio::test]
    async fn test_root_context() {
        let container = container("/").await;
        assert_eq!(
            container.context_url(),
            format!("http://{}/", container.local_addr())
        );
        container.start_up().await.unwrap();
        let config = Configuration::new(&container.context_url()).unwrap();
        let probe = HttpProbe::for_redirector(&config).unwrap();
        assert!(probe.probe().await.is_available());
        container.shut_down().await.unwrap();
    }
}
