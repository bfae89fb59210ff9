//! Sail E2E Test Harness
//!
//! This crate runs controller and browser examples against the Sail
//! settings dashboard:
//! - Spawns the application through a named launcher and health checks it
//! - Drives Chrome over WebDriver with registered driver configurations
//! - Resets state and stubs the signed-in admin before every example
//! - Retries flaky `js` examples
//! - Brackets feature examples with remote AppMap recording
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TestSession                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_suite(examples) -> SuiteReport                         │
//! │    └── run_example(example) -> ExampleReport                │
//! │          ├── run_with_retry (js)                            │
//! │          ├── StateCleaner::clean                            │
//! │          ├── StubWarden / Identity::stub                    │
//! │          └── Recorder::record_around (feature)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionResources (lazy)                                    │
//! │    ├── app()      -> ServerHandle via ServerLauncher        │
//! │    ├── browser()  -> BrowserSession via DriverConfig        │
//! │    └── recorder() -> POST/DELETE /_appmap/record            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod cleaner;
pub mod config;
pub mod driver;
pub mod error;
pub mod example;
pub mod identity;
pub mod logging;
pub mod page;
pub mod recorder;
pub mod retry;
pub mod server;
pub mod session;
pub mod settings;

pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use example::{Example, ExampleContext, ExampleKind};
pub use recorder::{Recorder, RecorderState, Recording};
pub use session::{ExampleReport, SuiteReport, TestSession};
pub use settings::{expect_setting, CastType, Setting};
