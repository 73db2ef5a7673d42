pub mod catalog;
pub mod db;
pub mod mailer;
pub mod payments;
pub mod recommend_llm;

pub use catalog::GoogleBooksAdapter;
pub use db::PgStore;
pub use mailer::{DisabledMailer, SmtpMailer};
pub use payments::StripeAdapter;
pub use recommend_llm::OpenAiRecommendAdapter;
