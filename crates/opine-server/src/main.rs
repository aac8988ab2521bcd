mod sweep;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use opine_api::auth::{self, AppState, AppStateInner};
use opine_api::middleware::require_auth;
use opine_api::{follows, polls, votes};
use opine_mailer::Mailer;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opine=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("OPINE_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: OPINE_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set a long random value in your .env file and restart.");
        std::process::exit(1);
    }

    let host = std::env::var("OPINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("OPINE_PORT")
        .unwrap_or_else(|_| "3400".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("OPINE_DB_PATH")
        .unwrap_or_else(|_| "opine.db".into())
        .into();
    let sweep_config = sweep::SweepConfig {
        interval_secs: env_u64("OPINE_REMINDER_INTERVAL_SECS", 300),
        window_hours: env_u64("OPINE_REMINDER_WINDOW_HOURS", 24) as i64,
        lookback_hours: env_u64("OPINE_EXPIRED_LOOKBACK_HOURS", 48) as i64,
    };

    // Mail provider; without one, reminders are logged and dropped
    let mailer = match (
        std::env::var("OPINE_MAIL_API_URL"),
        std::env::var("OPINE_MAIL_API_KEY"),
        std::env::var("OPINE_MAIL_FROM"),
    ) {
        (Ok(url), Ok(key), Ok(from)) if !key.is_empty() => {
            info!("Mail provider configured at {}", url);
            Mailer::http(url, key, from)
        }
        _ => {
            warn!("No mail provider configured; reminder emails will not be sent");
            Mailer::Null
        }
    };

    // Init database
    let db = Arc::new(opine_db::Database::open(&db_path)?);

    // Background reminder sweep
    tokio::spawn(sweep::run_reminder_loop(db.clone(), mailer, sweep_config));

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { db, jwt_secret });

    // Routes
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/polls/{poll_id}",
            get(polls::get_poll).delete(polls::delete_poll),
        )
        .route(
            "/polls/{poll_id}/vote",
            post(votes::cast_vote).delete(votes::retract_vote),
        )
        .route("/polls/{poll_id}/results", get(votes::get_results))
        .route("/polls/{poll_id}/eligibility", get(votes::check_eligibility))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/polls", post(polls::create_poll))
        .route("/polls/{poll_id}/close", post(polls::close_poll))
        .route(
            "/polls/{poll_id}/follow",
            post(follows::follow_poll).delete(follows::unfollow_poll),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Opine server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
