use reqwest::Client;
use serde_json::json;

use crate::client::ClientError;
use crate::routes::categories::Category;

pub const MIN_CATEGORY_SELECTIONS: usize = 3;

/// The onboarding screen's controller: a toggleable set of category ids
/// gated on a minimum selection count before it may be submitted.
pub struct CategorySelector {
    http_client: Client,
    preferences_endpoint: String,
    categories_endpoint: String,
    selected: Vec<String>,
}

impl CategorySelector {
    pub fn new(preferences_endpoint: String, categories_endpoint: String) -> Self {
        Self {
            http_client: Client::new(),
            preferences_endpoint,
            categories_endpoint,
            selected: Vec::new(),
        }
    }

    /// Selecting an already-selected id removes it. Insertion order is kept
    /// so the submitted list reads in the order the user picked.
    pub fn toggle(&mut self, category_id: &str) {
        if let Some(pos) = self.selected.iter().position(|id| id == category_id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(category_id.to_string());
        }
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn is_selected(&self, category_id: &str) -> bool {
        self.selected.iter().any(|id| id == category_id)
    }

    pub fn can_submit(&self) -> bool {
        self.selected.len() >= MIN_CATEGORY_SELECTIONS
    }

    pub async fn fetch_categories(&self) -> Result<Vec<Category>, ClientError> {
        #[derive(serde::Deserialize)]
        struct CategoriesResponse {
            categories: Vec<Category>,
        }

        let response = self
            .http_client
            .get(&self.categories_endpoint)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Rejected(response.status()));
        }

        let body = response.json::<CategoriesResponse>().await?;
        Ok(body.categories)
    }

    /// Posts the selection as JSON. Where to navigate afterwards is still an
    /// open integration point; the response body is ignored.
    pub async fn submit(&self) -> Result<(), ClientError> {
        if !self.can_submit() {
            return Err(ClientError::NotEnoughSelections(MIN_CATEGORY_SELECTIONS));
        }

        let response = self
            .http_client
            .post(&self.preferences_endpoint)
            .json(&json!({ "categories": self.selected }))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::error!("Saving preferences failed with status {}", response.status());
            return Err(ClientError::Rejected(response.status()));
        }

        tracing::info!("Saved {} category preferences", self.selected.len());
        Ok(())
    }
}
