//! services/api/src/web/mod.rs

pub mod ai;
pub mod auth;
pub mod books;
pub mod favorites;
pub mod middleware;
pub mod payments;
pub mod reviews;
pub mod state;

pub use middleware::require_auth;

use utoipa::OpenApi;

/// The aggregated OpenAPI document for every HTTP endpoint.
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        books::search_books_handler,
        books::book_details_handler,
        books::register_book_handler,
        books::checkout_handler,
        books::checkin_handler,
        books::checked_out_handler,
        books::history_handler,
        books::purchase_confirmation_handler,
        payments::create_intent_handler,
        reviews::add_review_handler,
        reviews::book_reviews_handler,
        reviews::my_reviews_handler,
        favorites::add_favorite_handler,
        favorites::remove_favorite_handler,
        favorites::list_favorites_handler,
        favorites::favorite_status_handler,
        ai::recommendations_handler,
    ),
    components(schemas(
        auth::SignupRequest,
        auth::LoginRequest,
        auth::AuthResponse,
        books::BookSummary,
        books::RegisterBookRequest,
        books::RegisterBookResponse,
        books::CheckoutBookRequest,
        books::CheckoutBookResponse,
        books::CheckinRequest,
        books::PurchaseConfirmationRequest,
        books::MessageResponse,
        books::LoanResponse,
        payments::CartItem,
        payments::CreateIntentRequest,
        payments::CreateIntentResponse,
        reviews::AddReviewRequest,
        reviews::ReviewResponse,
        reviews::MyReviewResponse,
        favorites::AddFavoriteRequest,
        favorites::FavoriteResponse,
        favorites::FavoriteStatusResponse,
        favorites::FavoriteMessageResponse,
        ai::RecommendationRequest,
        ai::RecommendationResponse,
    )),
    info(
        title = "Virtual Library API",
        description = "Catalog search, book lending and purchase tracking, reviews, favorites and recommendations."
    )
)]
pub struct ApiDoc;
