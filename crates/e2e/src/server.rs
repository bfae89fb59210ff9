//! Application server management - launchers, spawning and health checking

use std::collections::BTreeMap;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{E2eError, E2eResult};

/// A named recipe for booting the application server.
///
/// The launcher's environment is forced onto the child process on top of
/// whatever the parent environment provides.
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    pub name: String,
    pub environment: BTreeMap<String, String>,
}

impl ServerLauncher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: BTreeMap::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Launcher that boots Sail with verbose logging, AppMap and debug on
    pub fn sail_app() -> Self {
        Self::new("sail_app")
            .env("Verbose", "true")
            .env("APPMAP", "true")
            .env("DEBUG", "true")
    }
}

/// Launchers addressable by name from configuration
#[derive(Debug, Clone)]
pub struct LauncherRegistry {
    launchers: BTreeMap<String, ServerLauncher>,
}

impl Default for LauncherRegistry {
    fn default() -> Self {
        let mut registry = Self {
            launchers: BTreeMap::new(),
        };
        registry.register(ServerLauncher::new("default"));
        registry.register(ServerLauncher::sail_app());
        registry
    }
}

impl LauncherRegistry {
    pub fn register(&mut self, launcher: ServerLauncher) {
        self.launchers.insert(launcher.name.clone(), launcher);
    }

    pub fn get(&self, name: &str) -> E2eResult<&ServerLauncher> {
        self.launchers
            .get(name)
            .ok_or_else(|| E2eError::UnknownLauncher(name.to_string()))
    }
}

/// Handle to a running server process
pub struct ServerHandle {
    child: Child,
    host: String,
    port: u16,
    base_url: String,
}

impl ServerHandle {
    /// Spawn the application server with `launcher`'s environment
    pub async fn spawn(config: &ServerConfig, launcher: &ServerLauncher) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port(&config.host)?,
        };
        let base_url = format!("http://{}:{}", config.host, port);

        info!(
            "Spawning {} via launcher '{}' on {}",
            config.command.display(),
            launcher.name,
            base_url
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .env("SAIL_HOST", &config.host)
            .env("SAIL_PORT", port.to_string())
            .envs(&launcher.environment);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdout(Stdio::null()).stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.command.display(),
                e
            ))
        })?;

        let mut handle = ServerHandle {
            child,
            host: config.host.clone(),
            port,
            base_url,
        };

        if let Err(e) = handle
            .wait_for_healthy(&config.health_path, config.startup_timeout())
            .await
        {
            let _ = handle.stop();
            return Err(e);
        }

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Poll `health_path` until the server answers with 2xx
    async fn wait_for_healthy(&mut self, health_path: &str, timeout: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "Server exited during startup with {}",
                    status
                )));
            }

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while the server boots
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        info!("Stopping server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        if self.child.try_wait()?.is_none() {
            debug!("Server ignored SIGTERM, killing");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Ask the OS for an unused port on `host`
fn find_free_port(host: &str) -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}
