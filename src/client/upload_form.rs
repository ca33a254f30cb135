use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use crate::client::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormState {
    Idle,
    Collecting,
    Submitting,
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub contents: Bytes,
}

/// The upload dialog's controller. Collects title, description and a file,
/// then submits them as one multipart request. On failure the fields are
/// kept so the user can retry without re-entering anything; an in-flight
/// submission cannot be cancelled.
pub struct UploadForm {
    http_client: Client,
    endpoint: String,
    state: UploadFormState,
    title: String,
    description: String,
    file: Option<SelectedFile>,
}

impl UploadForm {
    pub fn new(endpoint: String) -> Self {
        Self {
            http_client: Client::new(),
            endpoint,
            state: UploadFormState::Idle,
            title: String::new(),
            description: String::new(),
            file: None,
        }
    }

    /// Dialog opened.
    pub fn open(&mut self) {
        if self.state != UploadFormState::Submitting {
            self.state = UploadFormState::Collecting;
        }
    }

    pub fn state(&self) -> UploadFormState {
        self.state
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn select_file(&mut self, name: impl Into<String>, contents: Bytes) {
        self.file = Some(SelectedFile {
            name: name.into(),
            contents,
        });
    }

    /// Submit stays disabled until the dialog is open and a file is picked,
    /// and while a request is in flight. A failed attempt stays submittable
    /// so the user can retry. Title is enforced by the form itself, not
    /// here.
    pub fn can_submit(&self) -> bool {
        self.file.is_some()
            && matches!(
                self.state,
                UploadFormState::Collecting | UploadFormState::Failed
            )
    }

    pub async fn submit(&mut self) -> Result<(), ClientError> {
        match self.state {
            UploadFormState::Submitting => return Err(ClientError::AlreadySubmitting),
            UploadFormState::Collecting | UploadFormState::Failed => {}
            UploadFormState::Idle | UploadFormState::Success => {
                return Err(ClientError::DialogNotOpen)
            }
        }
        let file = match &self.file {
            Some(file) => file.clone(),
            None => return Err(ClientError::NoFileSelected),
        };

        self.state = UploadFormState::Submitting;

        let form = Form::new()
            .part(
                "video",
                Part::bytes(file.contents.to_vec()).file_name(file.name),
            )
            .text("title", self.title.clone())
            .text("description", self.description.clone())
            // Category tagging from the dialog is not wired up yet; the
            // endpoint still requires the field.
            .text("categories", "[]");

        let result = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Video uploaded");
                self.title.clear();
                self.description.clear();
                self.file = None;
                self.state = UploadFormState::Success;
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                tracing::error!("Upload rejected with status {}", status);
                self.state = UploadFormState::Failed;
                Err(ClientError::Rejected(status))
            }
            Err(e) => {
                tracing::error!("Upload request failed: {:?}", e);
                self.state = UploadFormState::Failed;
                Err(ClientError::Request(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    fn collecting_form(endpoint: &str) -> UploadForm {
        let mut form = UploadForm::new(endpoint.to_string());
        form.open();
        form
    }

    async fn serve_stub(status: axum::http::StatusCode) -> String {
        let app = Router::new().route(
            "/api/videos",
            post(move || async move { (status, Json(json!({ "video": {} }))) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/videos", addr)
    }

    #[test]
    fn opening_the_dialog_starts_collecting() {
        let mut form = UploadForm::new("http://localhost/api/videos".to_string());
        assert_eq!(form.state(), UploadFormState::Idle);
        form.open();
        assert_eq!(form.state(), UploadFormState::Collecting);
    }

    #[test]
    fn submit_is_disabled_without_a_file() {
        let mut form = collecting_form("http://localhost/api/videos");
        form.set_title("Test");
        assert!(!form.can_submit());
        form.select_file("clip.mp4", Bytes::from_static(b"12345"));
        assert!(form.can_submit());
    }

    #[tokio::test]
    async fn submitting_without_a_file_is_an_error() {
        let mut form = collecting_form("http://localhost/api/videos");
        let err = form.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::NoFileSelected));
    }

    #[tokio::test]
    async fn submitting_before_the_dialog_opens_is_an_error() {
        let mut form = UploadForm::new("http://localhost/api/videos".to_string());
        form.select_file("clip.mp4", Bytes::from_static(b"12345"));
        assert!(!form.can_submit());
        let err = form.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::DialogNotOpen));
        assert_eq!(form.state(), UploadFormState::Idle);
    }

    #[tokio::test]
    async fn successful_submit_clears_the_fields() {
        let endpoint = serve_stub(axum::http::StatusCode::OK).await;
        let mut form = collecting_form(&endpoint);
        form.set_title("Test");
        form.set_description("A clip");
        form.select_file("clip.mp4", Bytes::from_static(b"12345"));

        form.submit().await.unwrap();

        assert_eq!(form.state(), UploadFormState::Success);
        assert_eq!(form.title(), "");
        assert_eq!(form.description(), "");
        assert!(form.file().is_none());
    }

    #[tokio::test]
    async fn rejected_submit_preserves_the_fields_for_retry() {
        let endpoint = serve_stub(axum::http::StatusCode::INTERNAL_SERVER_ERROR).await;
        let mut form = collecting_form(&endpoint);
        form.set_title("Test");
        form.set_description("A clip");
        form.select_file("clip.mp4", Bytes::from_static(b"12345"));

        let err = form.submit().await.unwrap_err();

        assert!(matches!(err, ClientError::Rejected(_)));
        assert_eq!(form.state(), UploadFormState::Failed);
        assert_eq!(form.title(), "Test");
        assert_eq!(form.description(), "A clip");
        assert!(form.file().is_some());
    }

    #[tokio::test]
    async fn transport_failure_preserves_the_fields_for_retry() {
        // Nothing listens on port 1.
        let mut form = collecting_form("http://127.0.0.1:1/api/videos");
        form.set_title("Test");
        form.select_file("clip.mp4", Bytes::from_static(b"12345"));

        let err = form.submit().await.unwrap_err();

        assert!(matches!(err, ClientError::Request(_)));
        assert_eq!(form.state(), UploadFormState::Failed);
        assert_eq!(form.title(), "Test");
        assert!(form.file().is_some());
        // The failed form stays submittable for the retry.
        assert!(form.can_submit());
    }
}
