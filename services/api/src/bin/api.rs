//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, HousecallProAdapter, ResendEmailAdapter, SupabaseAuthClient, TwilioSmsAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{
            login_handler, logout_handler, password_reset_handler, signup_handler,
            update_password_handler,
        },
        functions::{book_handler, job_status_handler, send_confirmation_handler},
        messages::{contacts_handler, conversation_handler, mark_read_handler, send_message_handler},
        profile::{get_profile_handler, update_profile_handler},
        require_auth,
        rest::{pricing_table_handler, quote_handler, service_types_handler},
        state::AppState,
        ApiDoc,
    },
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use cleaning_core::ports::{EmailSender, FieldServiceCrm, SmsSender};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .user_agent(concat!("cleaning-api/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let auth = SupabaseAuthClient::new(http.clone(), &config.supabase_url, &config.supabase_anon_key);

    let crm: Option<Arc<dyn FieldServiceCrm>> = match &config.housecall_pro_api_key {
        Some(key) => Some(Arc::new(HousecallProAdapter::new(
            http.clone(),
            &config.housecall_pro_base_url,
            key,
        ))),
        None => {
            warn!("HOUSECALL_PRO_API_KEY not set; online booking is disabled.");
            None
        }
    };
    let email: Option<Arc<dyn EmailSender>> = match &config.resend_api_key {
        Some(key) => Some(Arc::new(ResendEmailAdapter::new(
            http.clone(),
            key,
            &config.confirmation_from_email,
        ))),
        None => {
            warn!("RESEND_API_KEY not set; booking confirmations are disabled.");
            None
        }
    };
    let sms: Option<Arc<dyn SmsSender>> = match &config.twilio {
        Some(twilio) => Some(Arc::new(TwilioSmsAdapter::new(http.clone(), twilio.clone()))),
        None => {
            info!("Twilio not configured; confirmations will be email only.");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        auth,
        profiles: db_adapter.clone(),
        service_types: db_adapter.clone(),
        messages: db_adapter,
        crm,
        email,
        sms,
    });

    // --- 5. CORS ---
    let origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid ALLOWED_ORIGIN '{}': {}", config.allowed_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/service-types", get(service_types_handler))
        .route("/pricing", get(pricing_table_handler))
        .route("/quote", post(quote_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/password-reset", post(password_reset_handler))
        .route("/housecall-pro/book", post(book_handler))
        .route("/housecall-pro/jobs/{id}", get(job_status_handler))
        .route("/send-booking-confirmation", post(send_confirmation_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/password", post(update_password_handler))
        .route("/profile", get(get_profile_handler).put(update_profile_handler))
        .route("/contacts", get(contacts_handler))
        .route("/messages", post(send_message_handler))
        .route("/messages/{id}", get(conversation_handler))
        .route("/messages/{id}/read", post(mark_read_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received.");
                shutdown.cancel();
            }
        }
    });

    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
