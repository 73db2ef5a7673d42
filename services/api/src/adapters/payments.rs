//! services/api/src/adapters/payments.rs
//!
//! This module contains the Stripe adapter, the concrete implementation of the
//! `PaymentBridge` port. It talks to the payment-intents endpoint directly
//! over HTTPS with form-encoded bodies, the way the Stripe API expects.
//!
//! The one contract the rest of the system relies on is that the intent's
//! metadata round-trips the purchased item list, so the purchase-confirmation
//! step can name the right local book rows afterwards.

use async_trait::async_trait;
use library_core::domain::{BookId, PaymentItem, PaymentMetadata};
use library_core::ports::{PaymentBridge, PortError, PortResult};
use serde::{Deserialize, Serialize};

const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

//=========================================================================================
// Metadata Wire Format
//=========================================================================================

/// The JSON shape of one metadata item. Stripe metadata values are plain
/// strings, so the item list is embedded as a JSON document.
#[derive(Serialize, Deserialize)]
struct MetadataItem {
    id: i64,
    google_book_id: String,
    title: String,
    author: Option<String>,
    quantity: u32,
}

fn items_to_json(items: &[PaymentItem]) -> PortResult<String> {
    let wire: Vec<MetadataItem> = items
        .iter()
        .map(|item| MetadataItem {
            id: item.book_id.get(),
            google_book_id: item.google_book_id.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            quantity: item.quantity,
        })
        .collect();
    serde_json::to_string(&wire)
        .map_err(|e| PortError::Unexpected(format!("failed to encode payment metadata: {e}")))
}

/// Decodes a metadata item list produced by [`items_to_json`]. Exercised by
/// reconciliation tooling and the round-trip tests below.
pub fn items_from_json(raw: &str) -> PortResult<Vec<PaymentItem>> {
    let wire: Vec<MetadataItem> = serde_json::from_str(raw)
        .map_err(|e| PortError::Unexpected(format!("failed to decode payment metadata: {e}")))?;
    wire.into_iter()
        .map(|item| {
            Ok(PaymentItem {
                book_id: BookId::new(item.id)
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
                google_book_id: item.google_book_id,
                title: item.title,
                author: item.author,
                quantity: item.quantity,
            })
        })
        .collect()
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PaymentBridge` against the Stripe API.
#[derive(Clone)]
pub struct StripeAdapter {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeAdapter {
    /// Creates a new `StripeAdapter`.
    pub fn new(http: reqwest::Client, secret_key: String) -> Self {
        Self {
            http,
            secret_key,
            base_url: STRIPE_BASE_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct PaymentIntentResponse {
    client_secret: String,
}

#[derive(Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

#[async_trait]
impl PaymentBridge for StripeAdapter {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> PortResult<String> {
        let items_json = items_to_json(&metadata.items)?;
        let form: Vec<(&str, String)> = vec![
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_string()),
            ("payment_method_types[]", "card".to_string()),
            ("metadata[user_id]", metadata.user_id.to_string()),
            ("metadata[items]", items_json),
        ];

        let response = self
            .http
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("payment intent request failed: {e}")))?;

        if !response.status().is_success() {
            let detail = response
                .json::<StripeErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(PortError::Unexpected(format!(
                "payment intent rejected: {detail}"
            )));
        }

        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("payment response malformed: {e}")))?;
        Ok(intent.client_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_items() -> Vec<PaymentItem> {
        vec![
            PaymentItem {
                book_id: BookId::new(7).unwrap(),
                google_book_id: "GB123".into(),
                title: "Dune".into(),
                author: Some("F. Herbert".into()),
                quantity: 1,
            },
            PaymentItem {
                book_id: BookId::new(12).unwrap(),
                google_book_id: "GB456".into(),
                title: "Hyperion".into(),
                author: None,
                quantity: 2,
            },
        ]
    }

    #[test]
    fn metadata_items_round_trip() {
        let items = sample_items();
        let encoded = items_to_json(&items).unwrap();
        let decoded = items_from_json(&encoded).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn metadata_carries_local_ids_as_integers() {
        let encoded = items_to_json(&sample_items()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value[0]["id"], 7);
        assert_eq!(value[1]["quantity"], 2);
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        assert!(items_from_json("not json").is_err());
        // A non-positive id can never reference a real book row.
        assert!(items_from_json(r#"[{"id":0,"google_book_id":"x","title":"t","author":null,"quantity":1}]"#).is_err());
    }
}
