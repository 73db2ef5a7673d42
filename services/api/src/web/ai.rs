//! services/api/src/web/ai.rs
//!
//! Book recommendation endpoint. Builds a prompt from the user's stated
//! preferences and recent reading history, then hands it to the language
//! model behind the recommendation port.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use library_core::domain::{HistoryEntry, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::web::state::AppState;

const HISTORY_PROMPT_LIMIT: i64 = 20;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RecommendationRequest {
    /// Optional free-text interests, e.g. "space opera, unreliable narrators".
    #[serde(default)]
    pub user_preferences: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RecommendationResponse {
    pub recommendations: String,
}

//=========================================================================================
// Prompt Construction
//=========================================================================================

fn history_line(entry: &HistoryEntry) -> String {
    match &entry.author {
        Some(author) => format!("{} by {}", entry.title, author),
        None => entry.title.clone(),
    }
}

/// Assembles the recommendation prompt. With history present the model is
/// asked to name reading trends first; without it, to fall back to popular
/// titles.
pub(crate) fn build_prompt(preferences: Option<&str>, history: &[HistoryEntry]) -> String {
    let mut prompt = String::from("I am a virtual library user looking for book recommendations.");

    if let Some(prefs) = preferences.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str(&format!(" My explicit interests include: {prefs}."));
    }

    if history.is_empty() {
        prompt.push_str(
            " I have no extensive reading history yet. Please suggest 5 to 7 popular books \
             across different genres or based on my stated interests if any.",
        );
    } else {
        let titles = history.iter().map(history_line).collect::<Vec<_>>();
        prompt.push_str(&format!(
            " My reading history includes the following books: {}.",
            titles.join("; ")
        ));
        prompt.push_str(
            " Based on this history, please identify any **trends** in my reading habits \
             (e.g., preferred genres, authors, themes, styles). Then, suggest 5 to 7 new \
             books that fit these trends, or expand on them.",
        );
    }

    prompt.push_str(
        " For each recommendation, provide the title, author, and a brief reason for the \
         suggestion, clearly linking it to an identified trend or general appeal. Format \
         your response as a numbered list, starting with \"Identified Trends:\" if history \
         is provided, and use HTML tags for bolding or lists if appropriate.",
    );

    prompt
}

//=========================================================================================
// Handler
//=========================================================================================

/// POST /ai/recommendations - Personalized book recommendations
#[utoipa::path(
    post,
    path = "/ai/recommendations",
    request_body = RecommendationRequest,
    responses(
        (status = 200, description = "Generated recommendations", body = RecommendationResponse),
        (status = 500, description = "Recommendation backend error")
    )
)]
pub async fn recommendations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<RecommendationRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // A history lookup failure degrades to an unpersonalized prompt rather
    // than failing the request.
    let history = match state.store.reading_history(user.id, HISTORY_PROMPT_LIMIT).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("could not load reading history for recommendations: {e}");
            Vec::new()
        }
    };

    let prompt = build_prompt(req.user_preferences.as_deref(), &history);

    let recommendations = state.recommender.recommend(&prompt).await.map_err(|e| {
        error!("recommendation backend failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error generating recommendations".to_string(),
        )
    })?;

    Ok(Json(RecommendationResponse { recommendations }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, author: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            title: title.to_string(),
            author: author.map(str::to_string),
        }
    }

    #[test]
    fn empty_history_asks_for_popular_books() {
        let prompt = build_prompt(None, &[]);
        assert!(prompt.contains("no extensive reading history"));
        assert!(!prompt.contains("trends"));
    }

    #[test]
    fn history_triggers_trend_analysis_wording() {
        let history = vec![
            entry("Dune", Some("Frank Herbert")),
            entry("Hyperion", None),
        ];
        let prompt = build_prompt(None, &history);
        assert!(prompt.contains("Dune by Frank Herbert; Hyperion."));
        assert!(prompt.contains("**trends**"));
        assert!(prompt.contains("Identified Trends:"));
    }

    #[test]
    fn preferences_are_included_when_nonblank() {
        let prompt = build_prompt(Some("  hard sci-fi  "), &[]);
        assert!(prompt.contains("My explicit interests include: hard sci-fi."));

        let prompt = build_prompt(Some("   "), &[]);
        assert!(!prompt.contains("explicit interests"));
    }
}
