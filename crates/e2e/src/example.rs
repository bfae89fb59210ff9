//! Examples, their metadata and the context handed to their bodies

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{E2eError, E2eResult};
use crate::identity::{Identity, RequestEnv};
use crate::page::Page;
use crate::session::SessionResources;
use crate::settings::{self, Setting};

/// Which layer of the stack an example exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleKind {
    /// Calls controllers directly with a request env
    Controller,
    /// Drives a browser against the running application
    Feature,
    Other,
}

impl ExampleKind {
    /// Infer the kind from a path such as `spec/features/settings_spec.rb`
    pub fn infer_from_path(path: &Path) -> Self {
        for component in path.components() {
            if let Component::Normal(part) = component {
                match part.to_str() {
                    Some("controllers") => return ExampleKind::Controller,
                    Some("features") => return ExampleKind::Feature,
                    _ => {}
                }
            }
        }
        ExampleKind::Other
    }
}

type Body = Arc<dyn Fn(ExampleContext) -> BoxFuture<'static, E2eResult<()>> + Send + Sync>;

/// A single runnable example
#[derive(Clone)]
pub struct Example {
    pub name: String,
    pub file: Option<PathBuf>,
    kind: Option<ExampleKind>,
    pub js: bool,
    body: Body,
}

impl std::fmt::Debug for Example {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Example")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("kind", &self.kind())
            .field("js", &self.js)
            .finish()
    }
}

impl Example {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(ExampleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            file: None,
            kind: None,
            js: false,
            body: Arc::new(move |ctx| body(ctx).boxed()),
        }
    }

    /// Source location, used for kind inference when no kind is set
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn kind(&self) -> ExampleKind {
        self.kind.unwrap_or_else(|| {
            self.file
                .as_deref()
                .map(ExampleKind::infer_from_path)
                .unwrap_or(ExampleKind::Other)
        })
    }

    pub fn with_kind(mut self, kind: ExampleKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Mark as needing the JavaScript driver, which also enables retries
    pub fn js(mut self) -> Self {
        self.js = true;
        self
    }

    pub(crate) fn run(&self, ctx: ExampleContext) -> BoxFuture<'static, E2eResult<()>> {
        (self.body)(ctx)
    }
}

/// Everything an example body can reach
#[derive(Clone)]
pub struct ExampleContext {
    pub name: String,
    pub kind: ExampleKind,
    pub js: bool,
    pub attempt: u32,
    request_env: RequestEnv,
    current_user: Option<Identity>,
    resources: Arc<SessionResources>,
}

impl ExampleContext {
    pub(crate) fn new(example: &Example, attempt: u32, resources: Arc<SessionResources>) -> Self {
        Self {
            name: example.name.clone(),
            kind: example.kind(),
            js: example.js,
            attempt,
            request_env: RequestEnv::default(),
            current_user: None,
            resources,
        }
    }

    pub fn request_env(&self) -> &RequestEnv {
        &self.request_env
    }

    pub fn request_env_mut(&mut self) -> &mut RequestEnv {
        &mut self.request_env
    }

    /// Replace the signed-in user seen by this context's `current_user()`.
    ///
    /// The stub stays in the harness process. The application server must be
    /// booted with its auth bypassed for the browser to see a signed-in admin.
    pub fn stub_current_user(&mut self, identity: Identity) {
        self.current_user = Some(identity);
    }

    /// Signed-in user: the stubbed one, else whatever the request env's warden says
    pub fn current_user(&self) -> Option<Identity> {
        self.current_user
            .clone()
            .or_else(|| self.request_env.current_user())
    }

    /// Base URL of the application, starting it if needed
    pub async fn app_url(&self) -> E2eResult<String> {
        Ok(self.resources.app().await?.base_url())
    }

    /// Navigate the browser, opening it on first use
    pub async fn visit(&self, path: &str) -> E2eResult<()> {
        self.resources.browser().await?.visit(path).await
    }

    pub async fn page(&self) -> E2eResult<Page> {
        self.resources.browser().await?.page().await
    }

    /// Wait, up to the configured max wait, for the page to pass `check`
    pub async fn wait_for<F>(&self, check: F) -> E2eResult<Page>
    where
        F: Fn(&Page) -> E2eResult<()>,
    {
        self.resources.browser().await?.wait_for(check).await
    }

    pub async fn assert_text(&self, text: &str) -> E2eResult<()> {
        self.wait_for(|page| page.assert_text(text)).await.map(drop)
    }

    pub async fn assert_link(&self, locator: &str) -> E2eResult<()> {
        self.wait_for(|page| page.assert_link(locator)).await.map(drop)
    }

    pub async fn assert_button(&self, locator: &str) -> E2eResult<()> {
        self.wait_for(|page| page.assert_button(locator)).await.map(drop)
    }

    pub async fn assert_css(&self, selector: &str) -> E2eResult<()> {
        self.wait_for(|page| page.assert_css(selector)).await.map(drop)
    }

    pub async fn assert_field(&self, locator: &str) -> E2eResult<()> {
        self.wait_for(|page| page.assert_field(locator)).await.map(drop)
    }

    /// [`settings::expect_setting`], retried until the edit card renders
    pub async fn expect_setting(&self, setting: &Setting) -> E2eResult<()> {
        self.wait_for(|page| settings::expect_setting(page, setting))
            .await
            .map(drop)
    }
}

/// Await `fut`, turning a panic into an assertion failure
pub async fn guarded<Fut>(fut: Fut) -> E2eResult<()>
where
    Fut: Future<Output = E2eResult<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(E2eError::AssertionFailed(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "example panicked".to_string()
    }
}
