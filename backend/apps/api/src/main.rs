//! API Server Entry Point
//!
//! Application entry point and server initialization. Uses `anyhow` for
//! startup errors; request-level failures are classified `auth::AuthError`s.
//!
//! Dependency-absence behavior is decided HERE, once, and logged: a missing
//! SMTP config selects the LogMailer, and the transient store runs in-process
//! until an external backend is wired in.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use auth::application::config::{AuthConfig, OAuthProviderConfig};
use auth::domain::repository::SessionRepository;
use auth::infra::{HttpIdentityProviderClient, PgAuthRepository};
use auth::presentation::{AuthAppState, GateConfig, GateState, auth_router, edge_gate};
use axum::{
    Router, http,
    http::{Method, header},
};
use base64::Engine;
use base64::engine::general_purpose;
use platform::kv::MemoryTtlStore;
use platform::mail::{LogMailer, Mailer, SmtpConfig, SmtpMailer};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,auth=info,platform=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations").run(&pool).await?;

    tracing::info!("Migrations completed");

    let repo = Arc::new(PgAuthRepository::new(pool.clone()));

    // Startup cleanup: remove expired sessions
    // Errors here should not prevent server startup
    match repo.cleanup_expired_sessions().await {
        Ok(sessions) => {
            tracing::info!(sessions_deleted = sessions, "Session cleanup completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Session cleanup failed, continuing anyway");
        }
    }

    let config = Arc::new(build_auth_config()?);

    // Mail: explicit fallback decision, not a silent default
    let mailer: Arc<dyn Mailer> = match SmtpConfig::from_env() {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            tracing::warn!(
                "No SMTP configuration found; using LogMailer (emails are logged, not delivered)"
            );
            Arc::new(LogMailer)
        }
    };

    // Transient store: in-process fallback with the same TTL semantics an
    // external backend would provide
    let kv = Arc::new(MemoryTtlStore::new());
    tracing::info!("Transient store running in-process");

    // Periodic sweep of expired sessions and transient entries
    {
        let repo = repo.clone();
        let kv = kv.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                if let Err(e) = repo.cleanup_expired_sessions().await {
                    tracing::warn!(error = %e, "Periodic session cleanup failed");
                }
                let swept = kv.sweep();
                if swept > 0 {
                    tracing::debug!(entries = swept, "Swept expired transient entries");
                }
            }
        });
    }

    let state = AuthAppState {
        repo: repo.clone(),
        kv: kv.clone(),
        mailer,
        oauth: Arc::new(HttpIdentityProviderClient::new()),
        config: config.clone(),
    };

    // Edge gate runs ahead of everything and reads only the cookie signature
    let gate_state = GateState {
        config: config.clone(),
        gate: Arc::new(GateConfig::default()),
    };

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest("/api/auth", auth_router(state))
        .layer(axum::middleware::from_fn_with_state(gate_state, edge_gate))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the auth config from the environment
fn build_auth_config() -> anyhow::Result<AuthConfig> {
    let mut config = if cfg!(debug_assertions) {
        AuthConfig::development()
    } else {
        // In production both secrets must come from the environment
        AuthConfig {
            session_secret: secret_from_env("AUTH_SESSION_SECRET")?,
            token_secret: secret_from_env("AUTH_TOKEN_SECRET")?,
            ..AuthConfig::default()
        }
    };

    if let Ok(base_url) = env::var("BASE_URL") {
        config.base_url = base_url;
    }

    if let Ok(emails) = env::var("PRIVILEGED_EMAILS") {
        config.privileged_emails = emails
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
    }

    if let Ok(pepper) = env::var("PASSWORD_PEPPER") {
        config.password_pepper = Some(pepper.into_bytes());
    }

    // Google is the only provider wired out of the box; others follow the
    // same shape
    if let (Ok(client_id), Ok(client_secret)) =
        (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET"))
    {
        config.oauth_providers.insert(
            "google".to_string(),
            OAuthProviderConfig {
                authorize_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_endpoint: "https://openidconnect.googleapis.com/v1/userinfo"
                    .to_string(),
                client_id,
                client_secret,
                redirect_uri: format!("{}/api/auth/oauth/google/callback", config.base_url),
                scopes: "openid email profile".to_string(),
            },
        );
        tracing::info!("Google OAuth provider configured");
    }

    Ok(config)
}

/// Decode a base64 32-byte secret from the environment
fn secret_from_env(name: &str) -> anyhow::Result<[u8; 32]> {
    let value =
        env::var(name).map_err(|_| anyhow::anyhow!("{} must be set in production", name))?;
    let bytes = general_purpose::STANDARD.decode(&value)?;
    if bytes.len() != 32 {
        anyhow::bail!("{} must decode to exactly 32 bytes", name);
    }
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&bytes);
    Ok(secret)
}
