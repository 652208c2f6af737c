//! Development server with live reload.
//!
//! Pages are rendered from their templates on every request. Bundle entries
//! are compiled on demand at `/<bundle>.js`; every other path is classified
//! by the transform chain and served as the artifact its pipeline produces.
//!
//! File changes are watched on a dedicated thread, aggregated by the
//! debouncer and broadcast to connected clients: a batch of stylesheets the
//! server has already delivered swaps styles in place, anything else reloads
//! the page. Served scripts have their import specifiers rewritten to
//! root-absolute URLs, with `?import` on assets.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, MethodRouter},
    Router,
};
use demokit_core::dev::rewrite::IMPORT_QUERY;
use demokit_core::dev::{
    client_script, rewrite_imports, Debouncer, ReloadMessage, ServerConfig, ServerOverrides,
    WatchOptions, CLIENT_PATH, WS_PATH,
};
use demokit_core::env::ProcessEnv;
use demokit_core::html::RenderOptions;
use demokit_core::pipeline::mime_type;
use demokit_core::{Artifact, BuildPlan, ModuleOutput, PipelineRunner, TransformChain};
use demokit_util::hash::{short_hash, SHORT_HASH_LEN};
use miette::{IntoDiagnostic, Result, WrapErr};
use notify::{Config, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use super::load_plan;

/// How long the watch loop blocks when nothing is pending.
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Project root.
    pub cwd: PathBuf,
    /// Explicit config file path (overrides auto-discovery).
    pub config: Option<PathBuf>,
    /// Command-line host/port/feature overrides.
    pub overrides: ServerOverrides,
    /// Force the polling watcher.
    pub poll: bool,
}

/// Caller-supplied customization of the server's routes.
///
/// Each hook is invoked exactly once, after the built-in routes are known
/// and before the listener is bound.
pub type MiddlewareHook = Box<dyn FnOnce(&mut DevApp) + Send>;

/// The part of the app a [`MiddlewareHook`] may extend.
pub struct DevApp {
    root: PathBuf,
    router: Router,
}

impl DevApp {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            router: Router::new(),
        }
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a route. Hook routes take precedence over module serving.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) {
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, method_router);
    }

    /// Merge a whole router.
    pub fn merge(&mut self, other: Router) {
        let router = std::mem::take(&mut self.router);
        self.router = router.merge(other);
    }
}

/// Shared server state.
struct DevState {
    plan: BuildPlan,
    chain: Arc<TransformChain>,
    runner: PipelineRunner,
    hot: bool,
    reload_tx: broadcast::Sender<ReloadMessage>,
    /// Processed modules, keyed by root-relative path. Cleared on change.
    modules: RwLock<HashMap<PathBuf, ModuleOutput>>,
    /// Emitted asset bytes, keyed by output path. Cleared on change.
    media: RwLock<HashMap<String, Vec<u8>>>,
}

pub struct DevServer {
    config: ServerConfig,
    plan: BuildPlan,
    watch: WatchOptions,
    hooks: Vec<MiddlewareHook>,
}

impl DevServer {
    #[must_use]
    pub fn new(config: ServerConfig, plan: BuildPlan) -> Self {
        let watch = WatchOptions::from(&plan.config().watch);
        Self {
            config,
            plan,
            watch,
            hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_watch(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    #[must_use]
    pub fn with_middleware(mut self, hook: MiddlewareHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Build the app, running every hook once.
    fn into_app(self) -> (Router, Arc<DevState>, ServerConfig, WatchOptions) {
        let (reload_tx, _) = broadcast::channel::<ReloadMessage>(16);
        let state = Arc::new(DevState {
            chain: self.plan.chain(),
            runner: self.plan.runner(),
            hot: self.config.hot,
            reload_tx,
            modules: RwLock::new(HashMap::new()),
            media: RwLock::new(HashMap::new()),
            plan: self.plan,
        });

        let mut custom = DevApp::new(state.plan.root().to_path_buf());
        for hook in self.hooks {
            hook(&mut custom);
        }

        let mut builtin = Router::new();
        if state.hot {
            builtin = builtin
                .route(WS_PATH, get(reload_websocket))
                .route(CLIENT_PATH, get(serve_client));
        }
        let builtin = builtin
            .fallback(serve_request)
            .with_state(Arc::clone(&state));

        let mut app = custom.router.merge(builtin).layer(CorsLayer::permissive());
        if self.config.compress {
            app = app.layer(CompressionLayer::new());
        }

        (app, state, self.config, self.watch)
    }

    /// Bind and serve until interrupted. A bind failure is fatal.
    pub async fn serve(self) -> Result<()> {
        let (app, state, config, watch) = self.into_app();

        let addr = config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to bind {addr}"))?;

        let (change_tx, mut change_rx) = mpsc::channel::<Vec<PathBuf>>(16);
        let watch_root = state.plan.root().to_path_buf();
        std::thread::spawn(move || {
            if let Err(e) = watch_files(&watch_root, &watch, &change_tx) {
                tracing::error!(error = ?e, "file watcher stopped");
            }
        });

        let change_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(changed) = change_rx.recv().await {
                handle_file_change(&change_state, &changed);
            }
        });

        println!();
        println!("  Dev server running at {}", config.display_url());
        for page in state.plan.html() {
            println!("    {:<16} {}", page.page, demokit_core::html::url_path(&page.output_path));
        }
        if config.hot {
            println!("  Live reload enabled");
        }
        println!();
        println!("  Press Ctrl+C to stop");
        println!();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .into_diagnostic()?;

        tracing::info!("dev server stopped");
        Ok(())
    }
}

/// Run the dev server.
pub async fn run(action: DevAction) -> Result<()> {
    let plan = load_plan(&action.cwd, action.config.as_deref())
        .map_err(|e| miette::miette!(code = e.code(), "{e}"))?;

    let config = ServerConfig::resolve(&action.overrides, &ProcessEnv, &plan.config().server);
    let mut watch = WatchOptions::from(&plan.config().watch);
    watch.poll |= action.poll;

    tracing::debug!(host = %config.host, port = config.port, hot = config.hot, compress = config.compress, "server config");

    let mocks = mocks_hook(plan.config().mocks.clone());
    DevServer::new(config, plan)
        .with_watch(watch)
        .with_middleware(mocks)
        .serve()
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Mocks
// ============================================================================

/// Answer GET and POST on each configured path with the contents of its
/// JSON file. Files are read per request, so edits apply immediately.
#[must_use]
pub fn mocks_hook(mocks: BTreeMap<String, PathBuf>) -> MiddlewareHook {
    Box::new(move |app: &mut DevApp| {
        for (route, file) in mocks {
            let route = if route.starts_with('/') {
                route
            } else {
                format!("/{route}")
            };
            let file = app.root().join(file);
            tracing::debug!(route = %route, file = %file.display(), "mock route");
            let handler = move || {
                let file = file.clone();
                async move { serve_mock(&file).await }
            };
            app.route(&route, get(handler.clone()).post(handler));
        }
    })
}

async fn serve_mock(file: &Path) -> Response {
    match tokio::fs::read(file).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "mock file unreadable");
            (StatusCode::NOT_FOUND, format!("mock not found: {}", file.display())).into_response()
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn serve_client() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        client_script(),
    )
}

/// Pages, bundle entries, emitted assets, then chain-resolved modules.
async fn serve_request(State(state): State<Arc<DevState>>, headers: HeaderMap, uri: Uri) -> Response {
    let path = uri.path();

    if let Some(page) = state.plan.page_for_url(path) {
        let options = RenderOptions {
            reload_client: state.hot.then(|| CLIENT_PATH.to_string()),
        };
        return match state.plan.render_page(page, &options) {
            Ok(html) => Html(html).into_response(),
            Err(e) => failure(&state, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        };
    }

    if let Some(entry) = state.plan.entry_for_url(path) {
        return match state.runner.compile_entry(entry, &state.plan.config().tsconfig) {
            Ok(code) => {
                let code = rewrite_imports(&code, &entry.source_path);
                cached_response(&headers, "application/javascript", code.into_bytes())
            }
            Err(e) => failure(&state, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        };
    }

    let rel = path.trim_start_matches('/');
    if rel.is_empty() {
        return not_found(path);
    }

    let media = state.media.read().ok().and_then(|m| m.get(rel).cloned());
    if let Some(bytes) = media {
        return cached_response(&headers, mime_type(Path::new(rel)), bytes);
    }

    let module = PathBuf::from(rel);
    if module
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let as_import = uri
        .query()
        .is_some_and(|q| q.split('&').any(|p| p == IMPORT_QUERY));
    serve_module(state, module, &headers, as_import).await
}

async fn serve_module(
    state: Arc<DevState>,
    module: PathBuf,
    headers: &HeaderMap,
    as_import: bool,
) -> Response {
    let cached = state
        .modules
        .read()
        .ok()
        .and_then(|m| m.get(&module).cloned());

    let output = if let Some(output) = cached {
        output
    } else {
        let worker = Arc::clone(&state);
        let path = module.clone();
        let processed =
            tokio::task::spawn_blocking(move || worker.runner.process(&worker.chain, &path)).await;
        match processed {
            Ok(Ok(output)) => {
                if let Artifact::File { output_path, bytes } = &output.artifact {
                    if let Ok(mut media) = state.media.write() {
                        media.insert(output_path.clone(), bytes.clone());
                    }
                }
                if let Ok(mut modules) = state.modules.write() {
                    modules.insert(module.clone(), output.clone());
                }
                output
            }
            Ok(Err(demokit_core::Error::UnresolvableModule { .. })) => return not_found(&module.display().to_string()),
            Ok(Err(demokit_core::Error::Io(e))) if e.kind() == std::io::ErrorKind::NotFound => {
                return not_found(&module.display().to_string());
            }
            Ok(Err(e)) => return failure(&state, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
            Err(e) => return failure(&state, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    };

    match output.artifact {
        Artifact::Script { code } => {
            let code = rewrite_imports(&code, &module);
            cached_response(headers, "application/javascript", code.into_bytes())
        }
        Artifact::Inline { data_url } if as_import => {
            let code = format!("export default {};\n", json_string(&data_url));
            cached_response(headers, "application/javascript", code.into_bytes())
        }
        Artifact::File { output_path, .. } if as_import => {
            let code = format!("export default {};\n", json_string(&format!("/{output_path}")));
            cached_response(headers, "application/javascript", code.into_bytes())
        }
        Artifact::File { bytes, .. } => cached_response(headers, mime_type(&module), bytes),
        Artifact::Inline { .. } => match tokio::fs::read(state.plan.root().join(&module)).await {
            Ok(bytes) => cached_response(headers, mime_type(&module), bytes),
            Err(_) => not_found(&module.display().to_string()),
        },
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Response with a content-hash ETag; `304` when the client already has it.
fn cached_response(headers: &HeaderMap, content_type: &'static str, body: Vec<u8>) -> Response {
    let etag = format!("\"{}\"", short_hash(&body, SHORT_HASH_LEN * 2));
    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);

    let mut response = if fresh {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        ([(header::CONTENT_TYPE, content_type)], body).into_response()
    };
    let response_headers = response.headers_mut();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response_headers.insert(header::ETAG, value);
    }
    response
}

fn not_found(path: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("Not found: {path}")).into_response()
}

/// Log, tell connected clients, and answer with `status`.
fn failure(state: &DevState, status: StatusCode, message: &str) -> Response {
    tracing::error!("{message}");
    if state.hot {
        let _ = state.reload_tx.send(ReloadMessage::Error {
            message: message.to_string(),
        });
    }
    (status, message.to_string()).into_response()
}

// ============================================================================
// WebSocket
// ============================================================================

async fn reload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DevState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_reload_socket(socket, state))
}

async fn handle_reload_socket(mut socket: WebSocket, state: Arc<DevState>) {
    let mut rx = state.reload_tx.subscribe();

    if socket
        .send(Message::Text(ReloadMessage::Connected.to_json()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    if socket.send(Message::Text(msg.to_json())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "reload client lagged");
                    if socket.send(Message::Text(ReloadMessage::Reload.to_json())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

// ============================================================================
// File Watching
// ============================================================================

/// Watch `root` recursively and send debounced batches of changed paths.
fn watch_files(root: &Path, options: &WatchOptions, batches: &mpsc::Sender<Vec<PathBuf>>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher: Box<dyn Watcher> = if options.poll {
        let config = Config::default().with_poll_interval(options.poll_interval);
        Box::new(PollWatcher::new(tx, config).into_diagnostic()?)
    } else {
        Box::new(RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?)
    };
    watcher.watch(root, RecursiveMode::Recursive).into_diagnostic()?;
    tracing::debug!(root = %root.display(), poll = options.poll, "watching");

    let mut debouncer = Debouncer::new(options.aggregate_timeout);

    loop {
        let wait = debouncer
            .time_until_ready(Instant::now())
            .unwrap_or(IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(Ok(event)) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    continue;
                }
                for path in event.paths {
                    let rel = path.strip_prefix(root).unwrap_or(&path);
                    if !options.should_ignore(rel) {
                        debouncer.record(path);
                    }
                }
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "watch error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(batch) = debouncer.drain_ready() {
            if batches.blocking_send(batch).is_err() {
                break;
            }
        }
    }

    Ok(())
}

/// Drop every cached module and emitted asset, then tell clients what to do.
fn handle_file_change(state: &DevState, changed: &[PathBuf]) {
    let served: HashSet<PathBuf> = state
        .modules
        .write()
        .map(|mut modules| modules.drain().map(|(path, _)| path).collect())
        .unwrap_or_default();
    if let Ok(mut media) = state.media.write() {
        media.clear();
    }
    tracing::info!(count = changed.len(), "files changed");

    if state.hot {
        let msg = ReloadMessage::for_changes(state.plan.root(), changed, |rel| served.contains(rel));
        tracing::debug!(message = %msg.to_json(), "broadcasting");
        let _ = state.reload_tx.send(msg);
    }
}
