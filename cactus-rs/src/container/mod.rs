//! Container lifecycle: start a container, wait until the web application
//! answers, run the tests, stop it again.

mod bracket;
mod embedded;
mod probe;
mod process;
mod runner;

use async_trait::async_trait;

use crate::error::Result;

pub use bracket::{ContainerBracket, Deployment};
pub use embedded::EmbeddedContainer;
pub use probe::{HttpProbe, ProbeResult, ReadinessProbe, DEFAULT_PROBE_TIMEOUT};
pub use process::{ProcessContainer, StopCommand};
pub use runner::{ContainerRunner, ContainerState};

/// A container the runner can start and stop.
///
/// Both operations may take as long as they need: the runner decides when
/// the container is up or down by probing it, not by waiting for these
/// calls.
#[async_trait]
pub trait Container: Send + Sync {
    fn name(&self) -> String {
        "container".to_string()
    }

    async fn start_up(&self) -> Result<()>;

    async fn shut_down(&self) -> Result<()>;
}
