//! services/api/src/adapters/catalog.rs
//!
//! This module contains the Google Books adapter, the concrete implementation
//! of the `CatalogSource` port. The catalog is read-only and knows nothing
//! about local availability.

use async_trait::async_trait;
use library_core::domain::CatalogVolume;
use library_core::ports::{CatalogSource, PortError, PortResult};
use serde::Deserialize;

const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CatalogSource` against the Google Books API.
#[derive(Clone)]
pub struct GoogleBooksAdapter {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GoogleBooksAdapter {
    /// Creates a new `GoogleBooksAdapter`. The API key is optional; without
    /// one, requests run against the public quota.
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: GOOGLE_BOOKS_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Deserialize)]
struct VolumesResponse {
    items: Option<Vec<VolumeResource>>,
}

#[derive(Deserialize)]
struct VolumeResource {
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
    #[serde(rename = "accessInfo")]
    access_info: Option<AccessInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
    image_links: Option<ImageLinks>,
    published_date: Option<String>,
    categories: Option<Vec<String>>,
    page_count: Option<i32>,
    publisher: Option<String>,
}

#[derive(Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessInfo {
    web_reader_link: Option<String>,
}

impl VolumeResource {
    fn to_domain(self) -> CatalogVolume {
        CatalogVolume {
            google_book_id: self.id,
            title: self.volume_info.title.unwrap_or_else(|| "Untitled".to_string()),
            authors: self.volume_info.authors.unwrap_or_default(),
            description: self.volume_info.description,
            cover_image_url: self.volume_info.image_links.and_then(|l| l.thumbnail),
            published_date: self.volume_info.published_date,
            categories: self.volume_info.categories.unwrap_or_default(),
            page_count: self.volume_info.page_count,
            publisher: self.volume_info.publisher,
            web_reader_link: self.access_info.and_then(|a| a.web_reader_link),
        }
    }
}

//=========================================================================================
// `CatalogSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogSource for GoogleBooksAdapter {
    async fn search(&self, query: &str, subject: Option<&str>) -> PortResult<Vec<CatalogVolume>> {
        let url = format!("{}/volumes", self.base_url);
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
        if let Some(subject) = subject {
            params.push(("subject", subject.to_string()));
        }
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("catalog search failed: {e}")))?
            .error_for_status()
            .map_err(|e| PortError::Unexpected(format!("catalog search failed: {e}")))?;

        let body: VolumesResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("catalog response malformed: {e}")))?;

        Ok(body
            .items
            .unwrap_or_default()
            .into_iter()
            .map(VolumeResource::to_domain)
            .collect())
    }

    async fn lookup(&self, google_book_id: &str) -> PortResult<CatalogVolume> {
        let url = format!("{}/volumes/{}", self.base_url, google_book_id);
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("catalog lookup failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(format!(
                "no catalog entry for {google_book_id}"
            )));
        }

        let response = response
            .error_for_status()
            .map_err(|e| PortError::Unexpected(format!("catalog lookup failed: {e}")))?;

        let volume: VolumeResource = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("catalog response malformed: {e}")))?;

        Ok(volume.to_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_search_response() {
        let body = r#"{
            "items": [{
                "id": "GB123",
                "volumeInfo": {
                    "title": "Dune",
                    "authors": ["Frank Herbert"],
                    "description": "Spice.",
                    "imageLinks": { "thumbnail": "https://img/dune.jpg" },
                    "publishedDate": "1965",
                    "categories": ["Fiction", "Science Fiction"],
                    "pageCount": 412,
                    "publisher": "Chilton"
                },
                "accessInfo": { "webReaderLink": "https://play/reader?id=GB123" }
            }]
        }"#;

        let parsed: VolumesResponse = serde_json::from_str(body).unwrap();
        let volumes: Vec<_> = parsed
            .items
            .unwrap()
            .into_iter()
            .map(VolumeResource::to_domain)
            .collect();

        assert_eq!(volumes.len(), 1);
        let dune = &volumes[0];
        assert_eq!(dune.google_book_id, "GB123");
        assert_eq!(dune.title, "Dune");
        assert_eq!(dune.authors, vec!["Frank Herbert"]);
        assert_eq!(dune.cover_image_url.as_deref(), Some("https://img/dune.jpg"));
        assert_eq!(dune.page_count, Some(412));
        assert_eq!(
            dune.web_reader_link.as_deref(),
            Some("https://play/reader?id=GB123")
        );
    }

    #[test]
    fn tolerates_sparse_volumes() {
        // Plenty of Google Books entries carry no authors, images or categories.
        let body = r#"{ "items": [{ "id": "GB9", "volumeInfo": {} }] }"#;
        let parsed: VolumesResponse = serde_json::from_str(body).unwrap();
        let mut items = parsed.items.unwrap();
        let volume = items.remove(0).to_domain();

        assert_eq!(volume.title, "Untitled");
        assert!(volume.authors.is_empty());
        assert!(volume.cover_image_url.is_none());
        assert!(volume.web_reader_link.is_none());
    }

    #[test]
    fn empty_result_sets_decode_to_no_items() {
        let parsed: VolumesResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.items.is_none());
    }

    #[tokio::test]
    async fn base_url_override_is_test_only_plumbing() {
        let adapter = GoogleBooksAdapter::new(reqwest::Client::new(), None)
            .with_base_url("http://127.0.0.1:1/unreachable".into());
        // No server there: the port error must be Unexpected, not a panic.
        let err = adapter.lookup("GB123").await.unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
    }
}
