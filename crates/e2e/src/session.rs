//! Test session: the context threaded through every example
//!
//! A [`TestSession`] owns the session-scoped resources (application server,
//! browser, recorder) and applies the per-example policy:
//!
//! ```text
//! retry (js examples only)
//!   └── clean state
//!       └── stub identity (request env / current user)
//!           └── record (feature examples only)
//!               └── example body
//! ```

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserSession;
use crate::cleaner::{NoopCleaner, StateCleaner, TruncationCleaner};
use crate::config::HarnessConfig;
use crate::driver::DriverRegistry;
use crate::error::{E2eError, E2eResult};
use crate::example::{guarded, Example, ExampleContext, ExampleKind};
use crate::identity::{Identity, StubWarden};
use crate::recorder::Recorder;
use crate::retry::run_with_retry;
use crate::server::{LauncherRegistry, ServerHandle};

/// Where the application under test lives
pub enum AppServer {
    /// Spawned and owned by this session
    Spawned(ServerHandle),
    /// Started by someone else
    External { host: String, port: u16 },
}

impl AppServer {
    pub fn host(&self) -> &str {
        match self {
            AppServer::Spawned(handle) => handle.host(),
            AppServer::External { host, .. } => host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            AppServer::Spawned(handle) => handle.port(),
            AppServer::External { port, .. } => *port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host(), self.port())
    }
}

/// Lazily created, session-scoped resources
pub struct SessionResources {
    config: HarnessConfig,
    drivers: DriverRegistry,
    launchers: LauncherRegistry,
    app: OnceCell<AppServer>,
    browser: OnceCell<BrowserSession>,
    recorder: OnceCell<Recorder>,
}

impl SessionResources {
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The application server, spawned on first call
    pub async fn app(&self) -> E2eResult<&AppServer> {
        self.app
            .get_or_try_init(|| async {
                let launcher = self.launchers.get(&self.config.server.launcher)?;
                let handle = ServerHandle::spawn(&self.config.server, launcher).await?;
                Ok::<_, E2eError>(AppServer::Spawned(handle))
            })
            .await
    }

    /// The browser, opened on first call with the JavaScript driver
    pub async fn browser(&self) -> E2eResult<&BrowserSession> {
        self.browser
            .get_or_try_init(|| async {
                let app_url = self.app().await?.base_url();
                let driver = self.drivers.javascript_driver()?;
                BrowserSession::start(
                    &self.config.drivers.webdriver_url,
                    driver,
                    &app_url,
                    self.config.drivers.max_wait(),
                )
                .await
            })
            .await
    }

    /// The recorder on the application server, which is started if needed
    pub async fn recorder(&self) -> E2eResult<&Recorder> {
        self.recorder
            .get_or_try_init(|| async {
                let app = self.app().await?;
                let mut recorder = Recorder::new(app.host(), app.port(), &self.config.recording.path);
                if let Some(dir) = &self.config.recording.artifact_dir {
                    recorder = recorder.with_artifact_dir(dir.clone());
                }
                Ok::<_, E2eError>(recorder)
            })
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleStatus {
    Passed,
    Failed,
}

/// What ended a failed example
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The body failed an assertion or returned an error
    Example,
    /// The body passed but the recording could not be stopped
    Recorder,
    /// Cleaning or resource startup failed before the body ran
    Setup,
}

/// Result of running a single example
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleReport {
    pub name: String,
    pub kind: ExampleKind,
    pub status: ExampleStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// Stop-call error from the last attempt, even when the body also failed
    pub recorder_error: Option<String>,
    pub artifact: Option<PathBuf>,
}

impl ExampleReport {
    pub fn passed(&self) -> bool {
        self.status == ExampleStatus::Passed
    }
}

/// Result of running all examples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub seed: Option<u64>,
    pub duration_ms: u64,
    pub results: Vec<ExampleReport>,
}

#[derive(Debug, Default)]
struct AttemptOutcome {
    failure: Option<FailureKind>,
    recorder_error: Option<String>,
    artifact: Option<PathBuf>,
}

pub struct TestSession {
    resources: Arc<SessionResources>,
    cleaner: Box<dyn StateCleaner>,
}

impl TestSession {
    /// Session with the default drivers and launchers
    pub fn new(config: HarnessConfig) -> E2eResult<Self> {
        Self::with_registries(config, DriverRegistry::default(), LauncherRegistry::default())
    }

    pub fn with_registries(
        config: HarnessConfig,
        mut drivers: DriverRegistry,
        launchers: LauncherRegistry,
    ) -> E2eResult<Self> {
        drivers.set_javascript_driver(&config.drivers.javascript_driver)?;
        launchers.get(&config.server.launcher)?;

        let cleaner: Box<dyn StateCleaner> = match &config.database.path {
            Some(path) => Box::new(TruncationCleaner::new(path.clone(), config.database.keep_tables.clone())),
            None => Box::new(NoopCleaner),
        };

        Ok(Self {
            resources: Arc::new(SessionResources {
                config,
                drivers,
                launchers,
                app: OnceCell::new(),
                browser: OnceCell::new(),
                recorder: OnceCell::new(),
            }),
            cleaner,
        })
    }

    /// Use an application that is already running instead of spawning one
    pub fn with_external_app(self, host: impl Into<String>, port: u16) -> E2eResult<Self> {
        self.resources
            .app
            .set(AppServer::External {
                host: host.into(),
                port,
            })
            .map_err(|_| E2eError::InvalidConfig("application already started".to_string()))?;
        Ok(self)
    }

    pub fn with_cleaner(mut self, cleaner: impl StateCleaner + 'static) -> Self {
        self.cleaner = Box::new(cleaner);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.resources.config
    }

    pub fn resources(&self) -> &Arc<SessionResources> {
        &self.resources
    }

    /// Run one example with the full hook chain
    pub async fn run_example(&self, example: &Example) -> ExampleReport {
        let start = Instant::now();
        let kind = example.kind();
        let max_attempts = if example.js {
            self.config().retry.js_attempts
        } else {
            1
        };

        let last = Mutex::new(AttemptOutcome::default());
        let last_ref = &last;

        let outcome = run_with_retry(&example.name, max_attempts, move |attempt| async move {
            let (result, details) = self.run_attempt(example, attempt).await;
            if let Ok(mut slot) = last_ref.lock() {
                *slot = details;
            }
            result
        })
        .await;

        let details = last.into_inner().unwrap_or_default();
        let duration_ms = start.elapsed().as_millis() as u64;

        let report = match outcome.result {
            Ok(()) => ExampleReport {
                name: example.name.clone(),
                kind,
                status: ExampleStatus::Passed,
                attempts: outcome.attempts,
                duration_ms,
                error: None,
                failure: None,
                recorder_error: None,
                artifact: details.artifact,
            },
            Err(e) => ExampleReport {
                name: example.name.clone(),
                kind,
                status: ExampleStatus::Failed,
                attempts: outcome.attempts,
                duration_ms,
                error: Some(e.to_string()),
                failure: details.failure.or(Some(FailureKind::Example)),
                recorder_error: details.recorder_error,
                artifact: details.artifact,
            },
        };

        if report.passed() {
            info!("✓ {} ({} ms)", report.name, report.duration_ms);
        } else {
            error!(
                "✗ {} - {}",
                report.name,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }

        report
    }

    async fn run_attempt(&self, example: &Example, attempt: u32) -> (E2eResult<()>, AttemptOutcome) {
        let kind = example.kind();
        let mut ctx = ExampleContext::new(example, attempt, Arc::clone(&self.resources));

        if let Err(e) = self.cleaner.clean() {
            return (Err(e), setup_failure());
        }

        match kind {
            ExampleKind::Controller => ctx.request_env_mut().set_warden(Arc::new(StubWarden)),
            ExampleKind::Feature => ctx.stub_current_user(Identity::stub()),
            ExampleKind::Other => {}
        }

        if kind != ExampleKind::Feature || !self.config().recording.enabled {
            let result = guarded(example.run(ctx)).await;
            let failure = result.as_ref().err().map(|_| FailureKind::Example);
            return (
                result,
                AttemptOutcome {
                    failure,
                    ..Default::default()
                },
            );
        }

        let recorder = match self.resources.recorder().await {
            Ok(recorder) => recorder,
            Err(e) => return (Err(e), setup_failure()),
        };

        let recorded = recorder
            .record_around(&example.name, || example.run(ctx))
            .await;

        let failure = match (&recorded.body, &recorded.recording) {
            (Err(_), _) => Some(FailureKind::Example),
            (Ok(()), Err(_)) => Some(FailureKind::Recorder),
            (Ok(()), Ok(_)) => None,
        };
        let (recorder_error, artifact) = match &recorded.recording {
            Ok(recording) => (None, recording.path.clone()),
            Err(e) => (Some(e.to_string()), None),
        };

        (
            recorded.into_result().map(|_| ()),
            AttemptOutcome {
                failure,
                recorder_error,
                artifact,
            },
        )
    }

    /// Run `examples` in configured order, one at a time
    pub async fn run_suite(&self, mut examples: Vec<Example>) -> SuiteReport {
        let start = Instant::now();

        let seed = if self.config().order.random {
            let seed = self.config().order.seed.unwrap_or_else(rand::random);
            examples.shuffle(&mut StdRng::seed_from_u64(seed));
            info!("Randomized with seed {}", seed);
            Some(seed)
        } else {
            None
        };

        info!("Running {} example(s)...", examples.len());

        let mut results = Vec::with_capacity(examples.len());
        for example in &examples {
            results.push(self.run_example(example).await);
        }

        let passed = results.iter().filter(|r| r.passed()).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Example Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );
        if let Some(seed) = seed {
            info!("Randomized with seed {}", seed);
        }

        SuiteReport {
            total: results.len(),
            passed,
            failed,
            seed,
            duration_ms,
            results,
        }
    }

    /// Write suite results to `dir/example-results.json`
    pub fn write_results(&self, report: &SuiteReport, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("example-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    /// Close the browser and stop the server
    pub async fn shutdown(self) -> E2eResult<()> {
        if let Some(browser) = self.resources.browser.get() {
            if let Err(e) = browser.quit().await {
                warn!("Failed to close browser session: {}", e);
            }
        }

        match Arc::try_unwrap(self.resources) {
            Ok(mut resources) => {
                if let Some(AppServer::Spawned(handle)) = resources.app.get_mut() {
                    handle.stop()?;
                }
            }
            Err(_) => {
                debug!("Session resources still shared, server stops when the last handle drops");
            }
        }

        Ok(())
    }
}

fn setup_failure() -> AttemptOutcome {
    AttemptOutcome {
        failure: Some(FailureKind::Setup),
        ..Default::default()
    }
}
