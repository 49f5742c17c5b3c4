//! Memo composition logic: the step-by-step wizard, the draft it edits, and
//! the filters and statistics used by list and dashboard views.

pub mod aggregate;
pub mod catalog;
pub mod collaborator;
pub mod draft;
pub mod error;
pub mod export;
pub mod image;
pub mod session;
pub mod wizard;

pub use aggregate::{compute_stats, filter_by_keyword, filter_by_tag};
pub use catalog::{CategoryCatalog, CategoryData, HintTemplate};
pub use collaborator::{ImageStore, MemoPatch, MemoStore, NewMemo};
pub use draft::Draft;
pub use error::WizardError;
pub use image::{ImageRejection, ImageUpload};
pub use session::Session;
pub use wizard::{WizardController, WizardStep};
