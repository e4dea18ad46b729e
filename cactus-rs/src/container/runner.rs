use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::probe::{ProbeResult, ReadinessProbe};
use super::Container;
use crate::config::ContainerSettings;
use crate::error::{CactusError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Idle,
    Starting,
    Running,
    /// The container answered before anything was started. It is left
    /// alone on shutdown.
    AlreadyRunning,
    Stopping,
    Stopped,
}

/// Starts a container, waits for it to answer, and stops it again.
///
/// A runner brackets exactly one container lifecycle. Start and stop run as
/// background tasks while the runner polls the readiness probe; when a wait
/// times out the background task is left to finish on its own.
pub struct ContainerRunner {
    container: Arc<dyn Container>,
    probe: Arc<dyn ReadinessProbe>,
    settings: ContainerSettings,
    state: ContainerState,
    server_name: Option<String>,
}

impl ContainerRunner {
    pub fn new(container: Arc<dyn Container>, probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            container,
            probe,
            settings: ContainerSettings::default(),
            state: ContainerState::Idle,
            server_name: None,
        }
    }

    pub fn with_settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn is_already_running(&self) -> bool {
        self.state == ContainerState::AlreadyRunning
    }

    /// `Server` header seen once the container answered.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Probes once. `None` when the probe was still pending after `limit`.
    async fn probe_within(&self, limit: Duration) -> Option<ProbeResult> {
        timeout(limit, self.probe.probe()).await.ok()
    }

    fn remaining(&self, started: Instant) -> Duration {
        self.settings.timeout.saturating_sub(started.elapsed())
    }

    fn enter(&mut self, state: ContainerState) {
        info!(container = %self.container.name(), from = ?self.state, to = ?state, "container state");
        self.state = state;
    }

    /// Starts the container unless it already answers, then waits until it
    /// does.
    ///
    /// Fails with [`CactusError::ContainerStartupTimeout`] once the timeout
    /// elapsed without a successful probe, and with the start-up error when
    /// the start task fails first.
    pub async fn start_up_container(&mut self) -> Result<()> {
        if self.state != ContainerState::Idle {
            return Err(CactusError::Container(format!(
                "runner already used, container is {:?}",
                self.state
            )));
        }

        let started = Instant::now();
        let initial = self
            .probe_within(self.settings.timeout)
            .await
            .unwrap_or_else(ProbeResult::unreachable);
        if initial.is_available() {
            self.server_name = initial.server;
            self.enter(ContainerState::AlreadyRunning);
            return Ok(());
        }

        self.enter(ContainerState::Starting);
        let container = self.container.clone();
        let mut start: Option<JoinHandle<Result<()>>> =
            Some(tokio::spawn(async move { container.start_up().await }));

        loop {
            let result = self
                .probe_within(self.remaining(started))
                .await
                .unwrap_or_else(ProbeResult::unreachable);
            if result.is_available() {
                self.server_name = result.server;
                break;
            }

            if start.as_ref().is_some_and(JoinHandle::is_finished) {
                if let Some(task) = start.take() {
                    self.check_start_task(task).await?;
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.settings.timeout {
                warn!(
                    last_code = result.code,
                    ?elapsed,
                    "container did not answer in time, abandoning start-up"
                );
                return Err(CactusError::ContainerStartupTimeout {
                    last_code: result.code,
                    elapsed,
                });
            }
            sleep(self.settings.check_interval.min(self.settings.timeout - elapsed)).await;
        }

        if !self.settings.startup_settle.is_zero() {
            sleep(self.settings.startup_settle).await;
        }
        self.enter(ContainerState::Running);
        Ok(())
    }

    async fn check_start_task(&mut self, task: JoinHandle<Result<()>>) -> Result<()> {
        let err = match task.await {
            Ok(Ok(())) => {
                debug!("start-up returned, waiting for the container to answer");
                return Ok(());
            }
            Ok(Err(err)) => err,
            Err(err) => CactusError::Container(format!("start-up task failed: {err}")),
        };
        self.enter(ContainerState::Stopped);
        Err(err)
    }

    /// Stops a container this runner started and waits until it no longer
    /// answers. A no-op for a container that was already running, or that
    /// does not answer anymore.
    pub async fn shut_down_container(&mut self) -> Result<()> {
        match self.state {
            ContainerState::Running | ContainerState::Starting => {}
            ContainerState::AlreadyRunning => {
                info!(container = %self.container.name(), "container was running before, leaving it up");
                return Ok(());
            }
            ContainerState::Idle | ContainerState::Stopping | ContainerState::Stopped => return Ok(()),
        }

        let started = Instant::now();
        let answering = self
            .probe_within(self.settings.timeout)
            .await
            .is_some_and(|result| result.is_available());
        if !answering {
            self.enter(ContainerState::Stopped);
            return Ok(());
        }

        self.enter(ContainerState::Stopping);
        let container = self.container.clone();
        let stop = tokio::spawn(async move { container.shut_down().await });

        loop {
            match self.probe_within(self.remaining(started)).await {
                Some(result) if !result.is_available() => break,
                Some(_) => {}
                None => {
                    return Err(CactusError::ContainerShutdownTimeout {
                        elapsed: started.elapsed(),
                    })
                }
            }
            let elapsed = started.elapsed();
            if elapsed >= self.settings.timeout {
                return Err(CactusError::ContainerShutdownTimeout { elapsed });
            }
            sleep(self.settings.check_interval.min(self.settings.timeout - elapsed)).await;
        }
        sleep(self.settings.shutdown_wait).await;

        if stop.is_finished() {
            match stop.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "container stopped answering but shut-down reported an error"),
                Err(err) => warn!(%err, "shut-down task failed"),
            }
        }
        self.enter(ContainerState::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::container::ProbeResult;

    /// A container whose readiness is a flag flipped by start/stop.
    #[derive(Default)]
    struct FakeContainer {
        up: Arc<AtomicBool>,
        starts: AtomicUsize,
        stops: AtomicUsize,
        start_delay: Duration,
        fail_start: bool,
        never_answers: bool,
    }

    #[async_trait]
    impl Container for FakeContainer {
        fn name(&self) -> String {
            "fake".to_string()
        }

        async fn start_up(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            sleep(self.start_delay).await;
            if self.fail_start {
                return Err(CactusError::Container("port already in use".to_string()));
            }
            if !self.never_answers {
                self.up.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn shut_down(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.up.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlagProbe(Arc<AtomicBool>);

    #[async_trait]
    impl ReadinessProbe for FlagProbe {
        async fn probe(&self) -> ProbeResult {
            if self.0.load(Ordering::SeqCst) {
                ProbeResult {
                    code: 200,
                    server: Some("Fake/1.0".to_string()),
                }
            } else {
                ProbeResult::unreachable()
            }
        }
    }

    /// Takes `delay` to answer, and answers like the flag says.
    struct SlowProbe {
        up: Arc<AtomicBool>,
        delay: Duration,
    }

    #[async_trait]
    impl ReadinessProbe for SlowProbe {
        async fn probe(&self) -> ProbeResult {
            sleep(self.delay).await;
            FlagProbe(self.up.clone()).probe().await
        }
    }

    fn settings() -> ContainerSettings {
        ContainerSettings {
            timeout: Duration::from_millis(10_000),
            check_interval: Duration::from_millis(300),
            shutdown_wait: Duration::from_millis(100),
            startup_settle: Duration::ZERO,
        }
    }

    fn runner(container: Arc<FakeContainer>) -> ContainerRunner {
        let probe = Arc::new(FlagProbe(container.up.clone()));
        ContainerRunner::new(container, probe).with_settings(settings())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let container = Arc::new(FakeContainer {
            start_delay: Duration::from_millis(1_000),
            ..FakeContainer::default()
        });
        let mut runner = runner(container.clone());

        runner.start_up_container().await.unwrap();
        assert_eq!(runner.state(), ContainerState::Running);
        assert_eq!(runner.server_name(), Some("Fake/1.0"));

        runner.shut_down_container().await.unwrap();
        assert_eq!(runner.state(), ContainerState::Stopped);
        assert_eq!(container.starts.load(Ordering::SeqCst), 1);
        assert_eq!(container.stops.load(Ordering::SeqCst), 1);

        runner.shut_down_container().await.unwrap();
        assert_eq!(container.stops.load(Ordering::SeqCst), 1);
        assert!(runner.start_up_container().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_timeout_bounds() {
        let container = Arc::new(FakeContainer {
            never_answers: true,
            ..FakeContainer::default()
        });
        let mut runner = runner(container);
        let settings = *runner.settings();

        let started = Instant::now();
        let err = runner.start_up_container().await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed >= settings.timeout, "{elapsed:?}");
        assert!(elapsed <= settings.timeout + settings.check_interval, "{elapsed:?}");
        match err {
            CactusError::ContainerStartupTimeout { last_code, .. } => {
                assert_eq!(last_code, ProbeResult::UNREACHABLE)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_running_is_left_alone() {
        let container = Arc::new(FakeContainer::default());
        container.up.store(true, Ordering::SeqCst);
        let mut runner = runner(container.clone());

        runner.start_up_container().await.unwrap();
        assert!(runner.is_already_running());
        runner.shut_down_container().await.unwrap();

        assert_eq!(container.starts.load(Ordering::SeqCst), 0);
        assert_eq!(container.stops.load(Ordering::SeqCst), 0);
        assert!(container.up.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_is_reported_early() {
        let container = Arc::new(FakeContainer {
            fail_start: true,
            start_delay: Duration::from_millis(50),
            ..FakeContainer::default()
        });
        let mut runner = runner(container);

        let started = Instant::now();
        let err = runner.start_up_container().await.unwrap_err();
        assert!(err.to_string().contains("port already in use"));
        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(runner.state(), ContainerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_timeout_bounds_with_slow_probe() {
        let container = Arc::new(FakeContainer {
            never_answers: true,
            ..FakeContainer::default()
        });
        for delay in [Duration::from_secs(5), Duration::from_secs(7), Duration::from_secs(60)] {
            let probe = Arc::new(SlowProbe {
                up: container.up.clone(),
                delay,
            });
            let mut runner = ContainerRunner::new(container.clone(), probe).with_settings(settings());
            let settings = *runner.settings();

            let started = Instant::now();
            let err = runner.start_up_container().await.unwrap_err();
            let elapsed = started.elapsed();
            assert!(elapsed >= settings.timeout, "{delay:?}: {elapsed:?}");
            assert!(
                elapsed <= settings.timeout + settings.check_interval,
                "{delay:?}: {elapsed:?}"
            );
            match err {
                CactusError::ContainerStartupTimeout { elapsed: reported, .. } => {
                    assert!(reported >= settings.timeout, "{reported:?}");
                    assert!(reported <= elapsed, "{reported:?} > {elapsed:?}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout_bounds_with_slow_probe() {
        let container = Arc::new(FakeContainer::default());
        let mut runner = runner(container);
        runner.start_up_container().await.unwrap();

        // The container keeps answering, slowly, after being told to stop.
        struct Stubborn;
        #[async_trait]
        impl ReadinessProbe for Stubborn {
            async fn probe(&self) -> ProbeResult {
                sleep(Duration::from_secs(4)).await;
                ProbeResult::status(200)
            }
        }
        let settings = *runner.settings();
        runner.probe = Arc::new(Stubborn);

        let started = Instant::now();
        let err = runner.shut_down_container().await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, CactusError::ContainerShutdownTimeout { .. }), "{err:?}");
        assert!(elapsed >= settings.timeout, "{elapsed:?}");
        assert!(elapsed <= settings.timeout + settings.check_interval, "{elapsed:?}");
    }
}
