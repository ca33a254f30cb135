//! Library-side counterparts of the upload dialog and the onboarding
//! category picker. Each holds its own state machine and talks to the
//! server over plain HTTP.

pub mod onboarding;
pub mod upload_form;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("no file selected")]
    NoFileSelected,

    #[error("the upload dialog is not open")]
    DialogNotOpen,

    #[error("a submission is already in flight")]
    AlreadySubmitting,

    #[error("at least {0} categories must be selected")]
    NotEnoughSelections(usize),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server rejected the request with status {0}")]
    Rejected(reqwest::StatusCode),
}
