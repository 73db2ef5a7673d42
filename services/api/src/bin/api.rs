//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DisabledMailer, GoogleBooksAdapter, OpenAiRecommendAdapter, PgStore, SmtpMailer,
        StripeAdapter,
    },
    config::Config,
    error::ApiError,
    notifications::{spawn_notification_worker, ChannelSink},
    reminders::start_reminder_scheduler,
    web::{
        ai::recommendations_handler,
        auth::{login_handler, logout_handler, signup_handler},
        books::{
            book_details_handler, checked_out_handler, checkin_handler, checkout_handler,
            history_handler, purchase_confirmation_handler, register_book_handler,
            search_books_handler,
        },
        favorites::{
            add_favorite_handler, favorite_status_handler, list_favorites_handler,
            remove_favorite_handler,
        },
        middleware::require_auth,
        payments::create_intent_handler,
        reviews::{add_review_handler, book_reviews_handler, my_reviews_handler},
        state::AppState,
        ApiDoc,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use library_core::engine::AvailabilityEngine;
use library_core::ports::{NotificationSender, NotificationSink};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
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
    let store = Arc::new(PgStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize External Adapters ---
    let http_client = reqwest::Client::new();

    let catalog = Arc::new(GoogleBooksAdapter::new(
        http_client.clone(),
        config.google_books_api_key.clone(),
    ));

    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let recommender = Arc::new(OpenAiRecommendAdapter::new(
        Client::with_config(openai_config),
        config.recommendation_model.clone(),
    ));

    let payments = Arc::new(StripeAdapter::new(
        http_client.clone(),
        config
            .stripe_secret_key
            .clone()
            .ok_or_else(|| ApiError::Internal("STRIPE_SECRET_KEY is required".to_string()))?,
    ));

    // --- 4. Start the Notification Pipeline ---
    let mailer: Arc<dyn NotificationSender> = match (
        config.smtp_host.as_deref(),
        config.smtp_username.clone(),
        config.smtp_password.clone(),
        config.email_from.as_deref(),
    ) {
        (Some(host), Some(username), Some(password), Some(from)) => {
            let from = from
                .parse()
                .map_err(|e| ApiError::Internal(format!("invalid EMAIL_FROM address: {e}")))?;
            Arc::new(
                SmtpMailer::new(host, username, password, from)
                    .map_err(|e| ApiError::Internal(format!("smtp setup failed: {e}")))?,
            )
        }
        _ => {
            warn!("SMTP is not fully configured; notification emails will be dropped");
            Arc::new(DisabledMailer)
        }
    };

    let (sink, rx) = ChannelSink::new();
    let notifications: Arc<dyn NotificationSink> = Arc::new(sink);
    spawn_notification_worker(rx, mailer);

    // --- 5. Build the Engine and Shared AppState ---
    let engine = Arc::new(AvailabilityEngine::new(
        store.clone(),
        notifications.clone(),
    ));

    let app_state = Arc::new(AppState {
        store: store.clone(),
        engine,
        catalog,
        payments,
        recommender,
        notifications: notifications.clone(),
        config: config.clone(),
    });

    // --- 6. Start the Due-Date Reminder Scheduler ---
    let _scheduler = start_reminder_scheduler(
        store.clone(),
        notifications.clone(),
        &config.reminder_schedule,
    )
    .await?;

    // --- 7. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("invalid ALLOWED_ORIGIN: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, COOKIE]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/books/search", get(search_books_handler))
        .route("/books/checked-out", get(checked_out_handler))
        .route("/books/history", get(history_handler))
        .route("/books/register", post(register_book_handler))
        .route("/books/checkout", post(checkout_handler))
        .route("/books/checkin", post(checkin_handler))
        .route(
            "/books/purchase-confirmation",
            post(purchase_confirmation_handler),
        )
        .route("/books/{google_book_id}", get(book_details_handler))
        .route("/payments/intent", post(create_intent_handler))
        .route("/reviews", post(add_review_handler))
        .route("/reviews/book/{book_id}", get(book_reviews_handler))
        .route("/reviews/mine", get(my_reviews_handler))
        .route(
            "/favorites",
            post(add_favorite_handler).get(list_favorites_handler),
        )
        .route("/favorites/{book_id}", delete(remove_favorite_handler))
        .route("/favorites/{book_id}/status", get(favorite_status_handler))
        .route("/ai/recommendations", post(recommendations_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 8. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
