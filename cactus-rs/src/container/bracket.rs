use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::runner::ContainerRunner;
use crate::error::Result;

/// Builds the deployable archive of the application under test and puts it
/// into the container.
#[async_trait]
pub trait Deployment: Send + Sync {
    /// Builds the archive and returns where it was written.
    async fn build_archive(&self) -> Result<PathBuf>;

    async fn deploy(&self, archive: &Path, context_path: &str) -> Result<()>;

    async fn undeploy(&self, context_path: &str) -> Result<()>;

    /// Removes the archive and any temporary files made while building it.
    async fn clean_archive(&self, archive: &Path) -> Result<()>;
}

/// Prepares a container (archive, deployment, start), runs the tests, and
/// tears down whatever preparation actually did, even after a failure.
pub struct ContainerBracket {
    runner: ContainerRunner,
    deployment: Option<(Arc<dyn Deployment>, String)>,
    archive: Option<PathBuf>,
    deployed: bool,
}

impl ContainerBracket {
    pub fn new(runner: ContainerRunner) -> Self {
        Self {
            runner,
            deployment: None,
            archive: None,
            deployed: false,
        }
    }

    pub fn with_deployment(mut self, deployment: Arc<dyn Deployment>, context_path: impl Into<String>) -> Self {
        self.deployment = Some((deployment, context_path.into()));
        self
    }

    pub fn runner(&self) -> &ContainerRunner {
        &self.runner
    }

    pub fn archive_created(&self) -> bool {
        self.archive.is_some()
    }

    pub fn deployed(&self) -> bool {
        self.deployed
    }

    pub async fn prepare(&mut self) -> Result<()> {
        if let Some((deployment, context_path)) = self.deployment.clone() {
            let archive = deployment.build_archive().await?;
            info!(archive = %archive.display(), "archive built");
            self.archive = Some(archive.clone());

            deployment.deploy(&archive, &context_path).await?;
            info!(context_path, "archive deployed");
            self.deployed = true;
        }
        self.runner.start_up_container().await
    }

    /// Undoes the completed preparation steps, in reverse order. Every step
    /// is attempted; the first error is returned.
    pub async fn teardown(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Err(err) = self.runner.shut_down_container().await {
            warn!(%err, "container shut-down failed");
            first_error.get_or_insert(err);
        }
        if let Some((deployment, context_path)) = self.deployment.clone() {
            if self.deployed {
                self.deployed = false;
                if let Err(err) = deployment.undeploy(&context_path).await {
                    warn!(%err, context_path, "undeploy failed");
                    first_error.get_or_insert(err);
                }
            }
            if let Some(archive) = self.archive.take() {
                if let Err(err) = deployment.clean_archive(&archive).await {
                    warn!(%err, archive = %archive.display(), "archive clean-up failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Runs `tests` inside the bracket. Teardown always runs; its error is
    /// only returned when preparation and tests succeeded.
    pub async fn run<T, F, Fut>(&mut self, tests: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = match self.prepare().await {
            Ok(()) => tests().await,
            Err(err) => Err(err),
        };
        let teardown = self.teardown().await;
        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown_err)) => {
                warn!(%teardown_err, "teardown failed after an earlier error");
                Err(err)
            }
        }
    }
}
