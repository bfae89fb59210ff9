//! sail-e2e
//!
//! Command-line companion to the harness: drive the remote recorder by hand
//! and inspect the registered browser drivers.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use sail_e2e::driver::DriverRegistry;
use sail_e2e::{logging, HarnessConfig, Recorder};

#[derive(Parser)]
#[command(name = "sail-e2e")]
#[command(about = "Sail E2E harness tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "sail-e2e.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or stop a remote AppMap recording
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Print the capabilities of every registered driver
    Drivers,

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum RecordAction {
    Start(Target),
    Stop {
        #[command(flatten)]
        target: Target,

        /// Write the AppMap here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Target {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(if cli.debug { "debug" } else { "info" });

    let mut config = HarnessConfig::load(&cli.config)?;
    config.apply_env();

    match cli.command {
        Commands::Record { action } => match action {
            RecordAction::Start(target) => {
                let recorder = Recorder::new(&target.host, target.port, &config.recording.path);
                recorder.start().await?;
                info!("Recording requested at {}", recorder.url());
            }
            RecordAction::Stop { target, out } => {
                let recorder = Recorder::new(&target.host, target.port, &config.recording.path);
                let recording = recorder.stop("manual").await?;
                match out {
                    Some(path) => {
                        std::fs::write(&path, &recording.body)?;
                        info!("AppMap written to {}", path.display());
                    }
                    None => println!("{}", recording.body),
                }
            }
        },
        Commands::Drivers => {
            let mut registry = DriverRegistry::default();
            registry.set_javascript_driver(&config.drivers.javascript_driver)?;
            let js = registry.javascript_driver()?.name.clone();
            for driver in registry.iter() {
                let marker = if driver.name == js { " (javascript)" } else { "" };
                println!("{}{}", driver.name, marker);
                println!("{}", serde_json::to_string_pretty(&driver.capabilities())?);
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
