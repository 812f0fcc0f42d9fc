use crate::favorites::{FavoritesStore, Toggle};
use crate::models::{CatalogMovie, MovieId};
use crate::session::Session;
use crate::storage::{FileStore, KeyValueStore};
use crate::tmdb::{self, TimeWindow, TmdbApi, TmdbClient};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{env, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 256 * 1024;
const DEFAULT_DATA_PATH: &str = "data/storage.json";
const DEFAULT_ADDR: &str = "0.0.0.0:3146";

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub favorites: Arc<Mutex<FavoritesStore>>,
    pub session: Arc<Session>,
}

impl AppState {
    /// Builds the state around one storage backend shared by favorites and session.
    pub fn new(tmdb: Arc<dyn TmdbApi>, storage: Arc<dyn KeyValueStore>) -> Self {
        let favorites = FavoritesStore::open(storage.clone());
        Self {
            tmdb,
            favorites: Arc::new(Mutex::new(favorites)),
            session: Arc::new(Session::new(storage)),
        }
    }
}

pub async fn run_server() -> Result<()> {
    let data_path = env::var("MOVIE_EXPLORER_DATA")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());
    let storage: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&data_path)
            .with_context(|| format!("Failed to open storage at {}", data_path))?,
    );
    info!("Using storage file {}", data_path);

    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env()?);
    let state = AppState::new(tmdb, storage);
    let app = build_router(state);

    let addr: SocketAddr = env::var("MOVIE_EXPLORER_ADDR")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
        .parse()
        .context("MOVIE_EXPLORER_ADDR is not a valid socket address")?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/movies/trending", get(trending))
        .route("/movies/search", get(search))
        .route("/movies/:id", get(movie))
        .route("/genres", get(genres))
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/toggle", post(toggle_favorite))
        .route(
            "/favorites/:id",
            get(favorite_status).delete(remove_favorite),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(session_info))
        .route("/preferences/dark-mode", put(set_dark_mode))
        .route("/preferences/dark-mode/toggle", post(toggle_dark_mode))
        .merge(gated)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn upstream_error(context: &str, err: anyhow::Error) -> Response {
    error!("{} failed: {:#}", context, err);
    error_response(StatusCode::BAD_GATEWAY, format!("{}: {}", context, err))
}

async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.session.is_authenticated() {
        return error_response(StatusCode::UNAUTHORIZED, "Not signed in");
    }
    next.run(request).await
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    match state.session.login(&body.username, &body.password) {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            warn!("Login rejected: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn logout(State(state): State<AppState>) -> Response {
    match state.session.logout() {
        Ok(()) => Json(state.session.info()).into_response(),
        Err(e) => {
            error!("Logout failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn session_info(State(state): State<AppState>) -> Response {
    Json(state.session.info()).into_response()
}

#[derive(Deserialize)]
struct DarkModeRequest {
    enabled: bool,
}

async fn set_dark_mode(State(state): State<AppState>, Json(body): Json<DarkModeRequest>) -> Response {
    dark_mode_response(state.session.set_dark_mode(body.enabled))
}

async fn toggle_dark_mode(State(state): State<AppState>) -> Response {
    dark_mode_response(state.session.toggle_dark_mode())
}

fn dark_mode_response(result: Result<bool>) -> Response {
    match result {
        Ok(enabled) => Json(json!({ "dark_mode": enabled })).into_response(),
        Err(e) => {
            error!("Failed to store theme preference: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct TrendingQuery {
    #[serde(default)]
    window: TimeWindow,
}

async fn trending(State(state): State<AppState>, Query(q): Query<TrendingQuery>) -> Response {
    match state.tmdb.trending(q.window).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => upstream_error("Fetching trending movies", e),
    }
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    query: String,
    page: Option<u32>,
}

async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Response {
    match tmdb::search_movies(state.tmdb.as_ref(), &q.query, q.page.unwrap_or(1)).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => upstream_error("Searching movies", e),
    }
}

async fn movie(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let Some(id) = MovieId::from(raw_id.as_str()).normalize() else {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid movie id '{}'", raw_id));
    };
    match tmdb::movie_overview(state.tmdb.as_ref(), id).await {
        Ok(overview) => {
            let favorite = state.favorites.lock().await.is_favorite(&MovieId::from(id));
            Json(json!({ "movie": overview, "favorite": favorite })).into_response()
        }
        Err(e) => upstream_error("Fetching movie details", e),
    }
}

async fn genres(State(state): State<AppState>) -> Response {
    match state.tmdb.genres().await {
        Ok(genres) => Json(json!({ "genres": genres })).into_response(),
        Err(e) => upstream_error("Fetching genres", e),
    }
}

async fn list_favorites(State(state): State<AppState>) -> Response {
    let store = state.favorites.lock().await;
    Json(json!({
        "favorites": store.favorites(),
        "write_error": store.last_write_error(),
    }))
    .into_response()
}

fn check_movie_id(movie: &CatalogMovie) -> Option<Response> {
    if movie.id.normalize().is_none() {
        return Some(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid movie id '{}'", movie.id),
        ));
    }
    None
}

async fn add_favorite(State(state): State<AppState>, Json(movie): Json<CatalogMovie>) -> Response {
    if let Some(rejection) = check_movie_id(&movie) {
        return rejection;
    }
    let mut store = state.favorites.lock().await;
    let added = store.add_favorite(&movie);
    Json(json!({
        "added": added,
        "favorite": true,
        "write_error": store.last_write_error(),
    }))
    .into_response()
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Json(movie): Json<CatalogMovie>,
) -> Response {
    if let Some(rejection) = check_movie_id(&movie) {
        return rejection;
    }
    let mut store = state.favorites.lock().await;
    let Some(outcome) = store.toggle_favorite(&movie) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid movie id '{}'", movie.id),
        );
    };
    info!("Toggled favorite {} -> {:?}", movie.id, outcome);
    Json(json!({
        "status": outcome,
        "favorite": outcome == Toggle::Added,
        "write_error": store.last_write_error(),
    }))
    .into_response()
}

async fn favorite_status(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let id = MovieId::from(raw_id);
    let favorite = state.favorites.lock().await.is_favorite(&id);
    Json(json!({ "id": id, "favorite": favorite })).into_response()
}

async fn remove_favorite(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let id = MovieId::from(raw_id);
    let mut store = state.favorites.lock().await;
    let removed = store.remove_favorite(&id);
    Json(json!({
        "removed": removed,
        "write_error": store.last_write_error(),
    }))
    .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
