use shared::domain::MemoId;
use thiserror::Error;

use crate::{image::ImageRejection, wizard::WizardStep};

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("'{action}' is not available at step {step}")]
    InvalidStep {
        action: &'static str,
        step: WizardStep,
    },
    #[error("select at least one category")]
    EmptySelection,
    #[error("category '{0}' is not offered for this record type")]
    UnknownCategory(String),
    #[error("tag '{0}' is not one of the common tags")]
    UnknownTag(String),
    #[error("a title is required")]
    TitleRequired,
    #[error("at least one category needs some text")]
    NoContent,
    #[error(transparent)]
    ImageRejected(#[from] ImageRejection),
    #[error("memo belongs to another user")]
    Forbidden,
    #[error("memo {0} no longer exists")]
    MemoNotFound(MemoId),
    #[error("saving the memo failed")]
    Persistence(#[source] anyhow::Error),
    #[error("uploading the image failed")]
    Upload(#[source] anyhow::Error),
}

impl WizardError {
    /// Local input problems the user fixes by editing; never reach a collaborator.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WizardError::EmptySelection
                | WizardError::UnknownCategory(_)
                | WizardError::UnknownTag(_)
                | WizardError::TitleRequired
                | WizardError::NoContent
                | WizardError::ImageRejected(_)
        )
    }

    /// Collaborator failures; the same action can simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WizardError::Persistence(_) | WizardError::Upload(_))
    }
}
