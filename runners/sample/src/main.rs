pub mod suites;

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use cactus::config::{CONTEXT_URL_ENV, TEST_PATTERN_ENV};
use cactus::container::{
    Container, ContainerBracket, ContainerRunner, EmbeddedContainer, HttpProbe, ProcessContainer,
};
use cactus::{
    run_suite, CactusError, ClassLoader, ClientTestCaseCaller, Configuration, ContainerSettings,
    Redirector, TestMatcher, TestRegistry,
};
use tracing::info;

/// Command starting an external container, split on whitespace.
const START_COMMAND_ENV: &str = "CACTUS_START_COMMAND";

/// Stands in for a container somebody else starts.
struct Unmanaged;

#[async_trait]
impl Container for Unmanaged {
    fn name(&self) -> String {
        "unmanaged".to_string()
    }

    async fn start_up(&self) -> cactus::Result<()> {
        Err(CactusError::Container(format!(
            "the container is not running and {START_COMMAND_ENV} is not set"
        )))
    }

    async fn shut_down(&self) -> cactus::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut registry = TestRegistry::new();
    let suites = suites::register(&mut registry);
    let loader = ClassLoader::new(Arc::new(registry));

    let (config, container): (Configuration, Arc<dyn Container>) =
        if env::var(CONTEXT_URL_ENV).is_ok_and(|url| !url.is_empty()) {
            let config = Configuration::from_env()?;
            let container: Arc<dyn Container> = match env::var(START_COMMAND_ENV) {
                Ok(command) if !command.trim().is_empty() => {
                    let mut parts = command.split_whitespace();
                    let program = parts.next().context("empty start command")?;
                    Arc::new(parts.fold(ProcessContainer::new(program), |container, arg| {
                        container.arg(arg)
                    }))
                }
                _ => Arc::new(Unmanaged),
            };
            (config, container)
        } else {
            let embedded = EmbeddedContainer::bind(
                "127.0.0.1:0".parse()?,
                Redirector::new(loader.clone()),
            )
            .await?
            .with_context_path("/test");
            let mut config = Configuration::new(&embedded.context_url())?;
            if let Some(pattern) = env::var(TEST_PATTERN_ENV).ok().filter(|value| !value.is_empty()) {
                config = config.with_test_matcher(TestMatcher::new(&pattern)?);
            }
            let container: Arc<dyn Container> = Arc::new(embedded);
            (config, container)
        };
    info!(context = %config.context_url(), container = %container.name(), "running sample suites");

    let probe = Arc::new(HttpProbe::for_redirector(&config)?);
    let runner = ContainerRunner::new(container, probe).with_settings(ContainerSettings::from_env()?);
    let mut bracket = ContainerBracket::new(runner);
    let caller = ClientTestCaseCaller::new(config, loader)?;

    let reports = bracket
        .run(|| async move { Ok(run_suite(caller, suites).await) })
        .await?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let failed: usize = reports.iter().map(|report| report.failures().count()).sum();
    if failed > 0 {
        bail!("{failed} test(s) failed");
    }
    Ok(())
}
