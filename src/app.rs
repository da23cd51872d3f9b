use std::path::{Component, Path};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use log::{info, warn};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;

use crate::auth;
use crate::config::Config;
use crate::error::AppError;
use crate::patients;
use crate::session::{MemorySessionStore, Session, SessionStore};
use crate::store::{tashkent_now, ActionEntry, DataStore};

/// Sheet payloads from the browser editor can be large.
const BODY_LIMIT: usize = 50 * 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub store: DataStore,
    pub sessions: Arc<dyn SessionStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, sessions: Arc<dyn SessionStore>) -> Self {
        let store = DataStore::new(config.data_dir.clone(), config.candidates("template.xlsx"));
        AppState {
            config,
            store,
            sessions,
        }
    }

    /// Record `action` in the activity log. Failures are logged, not returned.
    pub fn log_action(&self, session: &Session, action: &str, details: Value) {
        let entry = ActionEntry {
            time: tashkent_now(),
            user_id: Some(session.user_id),
            login: session.login.clone(),
            name: session.name.clone(),
            action: action.to_string(),
            details,
        };
        if let Err(e) = self.store.append_action(entry) {
            warn!("Could not record action '{}': {}", action, e);
        }
    }
}

pub fn parse_id(raw: &str) -> Result<u64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::bad_request("Invalid id"))
}

pub fn router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/profile", get(auth::profile).put(auth::update_profile))
        .route("/users", get(auth::list_users).post(auth::create_user))
        .route("/users/:id", put(auth::update_user).delete(auth::delete_user))
        .route("/actions", get(auth::list_actions))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route("/patients/export", post(patients::export_patients))
        .route("/patients/bulk-delete", post(patients::bulk_delete))
        .route("/patients/:id/sheet", get(patients::sheet_url))
        .route("/patients/:id/save", post(patients::save_patient))
        .route("/patients/:id/download", get(patients::download_patient))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
        .merge(protected);

    let static_files: Router = Router::new().fallback_service(ServeDir::new(&state.config.public_dir));
    let static_files = match hidden_prefix(&state.config.public_dir, state.store.data_dir()) {
        Some(hidden) => {
            info!("Hiding /{} from static files", hidden.join("/"));
            static_files.layer(middleware::from_fn_with_state(Arc::new(hidden), hide_data_dir))
        }
        None => static_files,
    };

    Router::new()
        .nest("/api", api)
        .nest_service("/files", ServeDir::new(state.store.patients_dir()))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Components of `data_dir` relative to `public_dir`, when the data
/// directory sits inside the served tree.
fn hidden_prefix(public_dir: &Path, data_dir: &Path) -> Option<Vec<String>> {
    let public = public_dir.canonicalize().unwrap_or_else(|_| public_dir.to_path_buf());
    let data = data_dir.canonicalize().unwrap_or_else(|_| data_dir.to_path_buf());
    let relative = data.strip_prefix(&public).ok()?;

    Some(
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect(),
    )
}

/// Whether a decoded request path points at or below `hidden`.
fn under_prefix(hidden: &[String], path: &str) -> bool {
    let parts: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    parts.len() >= hidden.len()
        && hidden
            .iter()
            .zip(parts)
            .all(|(h, p)| h.eq_ignore_ascii_case(p))
}

/// Static file requests for anything under the data directory get a 404.
/// Paths are percent-decoded first so `/dat%61/` is caught too.
async fn hide_data_dir(
    State(hidden): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Response {
    let refused = match urlencoding::decode(request.uri().path()) {
        Ok(path) => under_prefix(&hidden, &path),
        Err(_) => true,
    };

    if refused {
        warn!("Refused static request for {}", request.uri().path());
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Prepare the data directory and seed the default account.
pub fn prepare(state: &AppState) -> Result<(), AppError> {
    state.store.ensure_layout()?;
    if !state.store.has_users() {
        state.store.ensure_users(auth::default_admin()?)?;
    }
    Ok(())
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let address = config.address();
    let state = Arc::new(AppState::new(config, Arc::new(MemorySessionStore::new())));

    info!("Data directory: {}", state.store.data_dir().display());
    prepare(&state)?;

    let app = router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
