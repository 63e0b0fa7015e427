// Define data modules
mod analytics; // Core metrics derivation (pure, HTTP-free)
mod error; // Store error taxonomy
mod gamification; // Points / levels / badge rules
mod models; // Data structures (Task, UserStats, sessions, etc.)
mod routes_insights; // HTTP handlers for analytics, stats & timer APIs
mod routes_tasks; // HTTP handlers for task APIs
mod store; // Persistent storage (db.json) + snapshot subscriptions
mod timer; // Focus timer state machine + tick driver

// Import axum routing utilities and Router
use axum::{
    Router,
    routing::{get, post, put}, // HTTP method helpers
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir; // Used to serve static files (HTML/CSS/JS)
use tracing_subscriber::EnvFilter;

use store::Store;
use timer::TimerService;

// Shared handles passed into every handler; explicit state instead
// of ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub timer: Arc<TimerService>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(Store::open(store::DB_PATH).expect("failed to open store"));
    let timer = TimerService::new(Arc::clone(&store));
    let state = AppState { store, timer };

    let api = Router::new()
        // tasks
        .route(
            "/tasks",
            get(routes_tasks::get_tasks).post(routes_tasks::create_task),
        )
        .route(
            "/tasks/:id",
            put(routes_tasks::update_task).delete(routes_tasks::delete_task),
        )
        .route("/tasks/:id/toggle", post(routes_tasks::toggle_task))
        // derived state
        .route("/analytics", get(routes_insights::get_analytics))
        .route("/stats", get(routes_insights::get_stats))
        .route("/stats/streak", post(routes_insights::put_streak))
        // focus timer
        .route("/timer", get(routes_insights::get_timer))
        .route("/timer/start", post(routes_insights::start_timer))
        .route("/timer/pause", post(routes_insights::pause_timer))
        .route("/timer/resume", post(routes_insights::resume_timer))
        .route("/timer/stop", post(routes_insights::stop_timer))
        .route("/timer/break", post(routes_insights::start_break))
        .route("/timer/reset", post(routes_insights::reset_timer))
        .route("/timer/duration", post(routes_insights::set_duration))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api)
        .nest_service("/", ServeDir::new("static"));

    let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();

    tracing::info!("server running at http://{addr}");
    tracing::info!("static files: http://{addr}/");
    tracing::info!("API base:     http://{addr}/api");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind failed");

    axum::serve(listener, app).await.expect("server error");
}
