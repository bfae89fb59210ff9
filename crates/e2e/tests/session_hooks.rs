//! Per-example policy: cleaning, identity stubs, retries and recording

use httpmock::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use sail_e2e::cleaner::StateCleaner;
use sail_e2e::identity::Identity;
use sail_e2e::session::{ExampleStatus, FailureKind};
use sail_e2e::{
    CastType, E2eError, E2eResult, Example, ExampleKind, HarnessConfig, Setting, TestSession,
};

const RECORD_PATH: &str = "/_appmap/record";

#[derive(Clone, Default)]
struct CountingCleaner(Arc<AtomicU32>);

impl StateCleaner for CountingCleaner {
    fn clean(&self) -> E2eResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingCleaner;

impl StateCleaner for FailingCleaner {
    fn clean(&self) -> E2eResult<()> {
        Err(E2eError::InvalidConfig("database is locked".to_string()))
    }
}

fn test_config(artifact_dir: Option<&std::path::Path>) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.order.random = false;
    config.recording.artifact_dir = artifact_dir.map(|p| p.to_path_buf());
    config
}

fn session_for(server: &MockServer, config: HarnessConfig) -> TestSession {
    sail_e2e::logging::init_test("debug");
    TestSession::new(config)
        .unwrap()
        .with_external_app(server.host(), server.port())
        .unwrap()
}

async fn mock_recorder<'a>(
    server: &'a MockServer,
    stop_status: u16,
) -> (httpmock::Mock<'a>, httpmock::Mock<'a>) {
    let start = server
        .mock_async(|when, then| {
            when.method(POST).path(RECORD_PATH);
            then.status(200);
        })
        .await;
    let stop = server
        .mock_async(move |when, then| {
            when.method(DELETE).path(RECORD_PATH);
            then.status(stop_status).body(r#"{"events":[]}"#);
        })
        .await;
    (start, stop)
}

#[tokio::test]
async fn feature_example_is_recorded_with_stubbed_user() {
    let server = MockServer::start_async().await;
    let (start, stop) = mock_recorder(&server, 200).await;
    let dir = tempfile::tempdir().unwrap();
    let session = session_for(&server, test_config(Some(dir.path())));

    let example = Example::new("edits a boolean setting", |ctx| async move {
        assert_eq!(ctx.current_user(), Some(Identity::stub()));
        assert!(ctx.request_env().warden().is_none());
        Ok(())
    })
    .file("spec/features/settings_spec.rs");

    let report = session.run_example(&example).await;

    assert!(report.passed(), "{:?}", report.error);
    assert_eq!(report.kind, ExampleKind::Feature);
    assert_eq!(report.attempts, 1);
    start.assert_hits_async(1).await;
    stop.assert_hits_async(1).await;

    let artifact = report.artifact.expect("artifact path");
    assert_eq!(std::fs::read_to_string(artifact).unwrap(), r#"{"events":[]}"#);
}

#[tokio::test]
async fn controller_example_gets_warden_and_no_recording() {
    let server = MockServer::start_async().await;
    let (start, stop) = mock_recorder(&server, 200).await;
    let session = session_for(&server, test_config(None));

    let example = Example::new("updates a setting", |ctx| async move {
        let user = ctx.request_env().current_user().expect("warden user");
        assert!(user.is_admin);
        assert_eq!(user.id, 1);
        Ok(())
    })
    .file("spec/controllers/sail/settings_controller_spec.rs");

    let report = session.run_example(&example).await;

    assert!(report.passed(), "{:?}", report.error);
    assert_eq!(report.kind, ExampleKind::Controller);
    start.assert_hits_async(0).await;
    stop.assert_hits_async(0).await;
}

#[tokio::test]
async fn js_example_passes_on_third_attempt() {
    let server = MockServer::start_async().await;
    let (start, stop) = mock_recorder(&server, 200).await;
    let cleans = CountingCleaner::default();
    let session = session_for(&server, test_config(None)).with_cleaner(cleans.clone());

    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let example = Example::new("toggles the slider", move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if run < 3 {
                return Err(E2eError::AssertionFailed(format!("slider not found on run {}", run)));
            }
            Ok(())
        }
    })
    .file("spec/features/slider_spec.rs")
    .js();

    let report = session.run_example(&example).await;

    assert_eq!(report.status, ExampleStatus::Passed);
    assert_eq!(report.attempts, 3);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(cleans.0.load(Ordering::SeqCst), 3);
    start.assert_hits_async(3).await;
    stop.assert_hits_async(3).await;
}

#[tokio::test]
async fn non_js_example_is_not_retried() {
    let server = MockServer::start_async().await;
    let session = session_for(&server, test_config(None));

    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let example = Example::new("casts a value", move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(E2eError::AssertionFailed("expected 3".to_string())) }
    });

    let report = session.run_example(&example).await;

    assert_eq!(report.status, ExampleStatus::Failed);
    assert_eq!(report.failure, Some(FailureKind::Example));
    assert_eq!(report.attempts, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_failure_is_reported_as_recorder_failure() {
    let server = MockServer::start_async().await;
    let (_start, stop) = mock_recorder(&server, 500).await;
    let session = session_for(&server, test_config(None));

    let example = Example::new("renders the dashboard", |_ctx| async { Ok(()) })
        .with_kind(ExampleKind::Feature);

    let report = session.run_example(&example).await;

    assert_eq!(report.status, ExampleStatus::Failed);
    assert_eq!(report.failure, Some(FailureKind::Recorder));
    assert!(report.error.as_deref().unwrap().contains("500"));
    assert!(report.recorder_error.is_some());
    stop.assert_hits_async(1).await;
}

#[tokio::test]
async fn example_failure_and_stop_failure_are_both_reported() {
    let server = MockServer::start_async().await;
    mock_recorder(&server, 500).await;
    let session = session_for(&server, test_config(None));

    let example = Example::new("shows the group link", |_ctx| async {
        Err(E2eError::AssertionFailed("expected true".to_string()))
    })
    .with_kind(ExampleKind::Feature);

    let report = session.run_example(&example).await;

    assert_eq!(report.failure, Some(FailureKind::Example));
    assert!(report.error.as_deref().unwrap().contains("expected true"));
    assert!(report.recorder_error.as_deref().unwrap().contains("500"));
}

#[tokio::test]
async fn cleaner_failure_skips_the_body() {
    let server = MockServer::start_async().await;
    let (start, _stop) = mock_recorder(&server, 200).await;
    let session = session_for(&server, test_config(None)).with_cleaner(FailingCleaner);

    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let example = Example::new("never runs", move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    })
    .with_kind(ExampleKind::Feature);

    let report = session.run_example(&example).await;

    assert_eq!(report.failure, Some(FailureKind::Setup));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    start.assert_hits_async(0).await;
}

#[tokio::test]
async fn recording_can_be_disabled() {
    let server = MockServer::start_async().await;
    let (start, stop) = mock_recorder(&server, 200).await;
    let mut config = test_config(None);
    config.recording.enabled = false;
    let session = session_for(&server, config);

    let example = Example::new("plain feature", |_ctx| async { Ok(()) })
        .with_kind(ExampleKind::Feature);

    assert!(session.run_example(&example).await.passed());
    start.assert_hits_async(0).await;
    stop.assert_hits_async(0).await;
}

#[tokio::test]
async fn suite_order_follows_seed_and_results_are_written() {
    let server = MockServer::start_async().await;
    let mut config = test_config(None);
    config.order.random = true;
    config.order.seed = Some(1234);

    let examples = || {
        (0..6)
            .map(|i| Example::new(format!("example {}", i), |_ctx| async { Ok(()) }))
            .collect::<Vec<_>>()
    };

    let first = session_for(&server, config.clone()).run_suite(examples()).await;
    let second = session_for(&server, config).run_suite(examples()).await;

    assert_eq!(first.seed, Some(1234));
    assert_eq!(first.total, 6);
    assert_eq!(first.passed, 6);
    let names = |r: &sail_e2e::SuiteReport| r.results.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&first), names(&second));

    let dir = tempfile::tempdir().unwrap();
    let session = session_for(&server, test_config(None));
    let path = session.write_results(&first, dir.path()).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["seed"], 1234);
    assert_eq!(written["results"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn external_app_cannot_be_set_twice() {
    let server = MockServer::start_async().await;
    let session = session_for(&server, test_config(None));
    let result = session.with_external_app("127.0.0.1", 1);
    assert!(matches!(result, Err(E2eError::InvalidConfig(_))));
}

#[tokio::test]
async fn expect_setting_waits_for_the_card_to_render() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/session");
            then.status(200)
                .json_body(serde_json::json!({ "value": { "sessionId": "s1" } }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_matches(Regex::new("^/session/s1/(timeouts|url)$").unwrap());
            then.status(200).json_body(serde_json::json!({ "value": null }));
        })
        .await;
    let loading = server
        .mock_async(|when, then| {
            when.method(GET).path("/session/s1/source");
            then.status(200)
                .json_body(serde_json::json!({ "value": "<p>Loading settings</p>" }));
        })
        .await;

    let mut config = test_config(None);
    config.recording.enabled = false;
    config.drivers.webdriver_url = server.base_url();
    config.drivers.max_wait_secs = 10;
    let session = session_for(&server, config);

    let example = Example::new("shows the boolean card", |ctx| async move {
        ctx.visit("/sail").await?;
        let setting = Setting::new("feature_enabled", CastType::Boolean, "tuning");
        ctx.expect_setting(&setting).await
    })
    .file("spec/features/settings_spec.rs");

    let render = async {
        while loading.hits_async().await < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        server
            .mock_async(|when, then| {
                when.method(GET).path("/session/s1/source");
                then.status(200).json_body(serde_json::json!({
                    "value": r#"<h3>Feature Enabled</h3><span>boolean</span>
<a href="/sail?query=tuning">tuning</a><span class="slider round"></span><button>SAVE</button>"#
                }));
            })
            .await;
        loading.delete_async().await;
    };

    let (report, ()) = tokio::join!(session.run_example(&example), render);

    assert!(report.passed(), "{:?}", report.error);
}
