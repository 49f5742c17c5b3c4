//! Step-by-step memo composition.
//!
//! A [`WizardController`] walks the user from choosing a record type through
//! one editing page per category to a review page, and hands the finished
//! [`Draft`] to a [`MemoStore`]. Every transition either succeeds or returns a
//! [`WizardError`] without touching any state, so a rejected action never
//! loses what the user has typed.

use std::{fmt, sync::Arc};

use shared::domain::{Memo, MemoBlock, MemoId, RecordMode, RecordType};
use tracing::{debug, info, warn};

use crate::{
    catalog::{CategoryCatalog, CategoryData, HintTemplate, MAX_CUSTOM_CATEGORIES},
    collaborator::{ImageStore, MemoStore},
    draft::{self, Draft},
    error::WizardError,
    image::ImageUpload,
    session::Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectType,
    SelectMode,
    SelectCustomCategories,
    Editing { index: usize },
    Review,
    Saved { memo_id: MemoId },
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardStep::SelectType => f.write_str("select-type"),
            WizardStep::SelectMode => f.write_str("select-mode"),
            WizardStep::SelectCustomCategories => f.write_str("select-custom-categories"),
            WizardStep::Editing { index } => write!(f, "editing({index})"),
            WizardStep::Review => f.write_str("review"),
            WizardStep::Saved { memo_id } => write!(f, "saved({memo_id})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveTarget {
    Create,
    Update(MemoId),
}

pub struct WizardController {
    session: Session,
    catalog: Arc<CategoryCatalog>,
    step: WizardStep,
    record_type: Option<RecordType>,
    record_mode: Option<RecordMode>,
    selection: Vec<String>,
    draft: Option<Draft>,
    target: SaveTarget,
}

impl WizardController {
    pub fn new(session: Session, catalog: Arc<CategoryCatalog>) -> Self {
        Self {
            session,
            catalog,
            step: WizardStep::SelectType,
            record_type: None,
            record_mode: None,
            selection: Vec::new(),
            draft: None,
            target: SaveTarget::Create,
        }
    }

    /// Opens a saved memo for revision, starting on its first block.
    /// Saving updates the memo in place.
    pub fn edit_existing(
        session: Session,
        catalog: Arc<CategoryCatalog>,
        memo: &Memo,
    ) -> Result<Self, WizardError> {
        if memo.user_id != session.user_id {
            return Err(WizardError::Forbidden);
        }
        if memo.blocks.is_empty() {
            return Err(WizardError::NoContent);
        }
        let draft = Draft::from_memo(memo);
        Ok(Self {
            session,
            catalog,
            step: WizardStep::Editing { index: 0 },
            record_type: Some(draft.record_type),
            record_mode: Some(draft.record_mode),
            selection: draft.blocks.iter().map(|b| b.category_name.clone()).collect(),
            draft: Some(draft),
            target: SaveTarget::Update(memo.id),
        })
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    pub fn record_type(&self) -> Option<RecordType> {
        self.record_type
    }

    pub fn record_mode(&self) -> Option<RecordMode> {
        self.record_mode
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// The draft as shown on the review page; `None` outside `Review`.
    pub fn review(&self) -> Option<&Draft> {
        match self.step {
            WizardStep::Review => self.draft.as_ref(),
            _ => None,
        }
    }

    pub fn is_editing_existing(&self) -> bool {
        matches!(self.target, SaveTarget::Update(_))
    }

    // Selection phase

    /// Picks the record type. Also acts as "go back and pick again" from the
    /// later selection steps, discarding the chosen mode and categories.
    pub fn choose_type(&mut self, record_type: RecordType) -> Result<(), WizardError> {
        match self.step {
            WizardStep::SelectType
            | WizardStep::SelectMode
            | WizardStep::SelectCustomCategories => {
                self.record_type = Some(record_type);
                self.record_mode = None;
                self.selection.clear();
                self.step = WizardStep::SelectMode;
                Ok(())
            }
            step => Err(invalid("choose_type", step)),
        }
    }

    pub fn choose_mode(&mut self, record_mode: RecordMode) -> Result<(), WizardError> {
        let record_type = match (self.step, self.record_type) {
            (WizardStep::SelectMode, Some(record_type)) => record_type,
            (step, _) => return Err(invalid("choose_mode", step)),
        };
        self.record_mode = Some(record_mode);
        match record_mode {
            RecordMode::Default => {
                self.selection = self.catalog.default_category_names(record_type);
                self.start_editing(record_type, record_mode);
            }
            RecordMode::Custom => {
                self.selection.clear();
                self.step = WizardStep::SelectCustomCategories;
            }
        }
        Ok(())
    }

    /// Adds or removes a custom category. Returns whether `name` is selected
    /// afterwards; adding past the cap is ignored and returns `false`.
    pub fn toggle_custom_category(&mut self, name: &str) -> Result<bool, WizardError> {
        let record_type = match (self.step, self.record_type) {
            (WizardStep::SelectCustomCategories, Some(record_type)) => record_type,
            (step, _) => return Err(invalid("toggle_custom_category", step)),
        };
        if !self
            .catalog
            .custom_options(record_type)
            .iter()
            .any(|option| option == name)
        {
            return Err(WizardError::UnknownCategory(name.to_string()));
        }

        if let Some(pos) = self.selection.iter().position(|c| c == name) {
            self.selection.remove(pos);
            return Ok(false);
        }
        if self.selection.len() >= MAX_CUSTOM_CATEGORIES {
            debug!(category = name, "custom category cap reached; ignoring");
            return Ok(false);
        }
        self.selection.push(name.to_string());
        Ok(true)
    }

    pub fn confirm_custom_categories(&mut self) -> Result<(), WizardError> {
        let record_type = match (self.step, self.record_type) {
            (WizardStep::SelectCustomCategories, Some(record_type)) => record_type,
            (step, _) => return Err(invalid("confirm_custom_categories", step)),
        };
        if self.selection.is_empty() {
            return Err(WizardError::EmptySelection);
        }
        self.start_editing(record_type, RecordMode::Custom);
        Ok(())
    }

    /// Steps back one selection page, clearing what that page chose.
    pub fn back(&mut self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::SelectMode => {
                self.record_type = None;
                self.step = WizardStep::SelectType;
                Ok(())
            }
            WizardStep::SelectCustomCategories => {
                self.record_mode = None;
                self.selection.clear();
                self.step = WizardStep::SelectMode;
                Ok(())
            }
            step => Err(invalid("back", step)),
        }
    }

    fn start_editing(&mut self, record_type: RecordType, record_mode: RecordMode) {
        self.draft = Some(Draft::from_categories(
            record_type,
            record_mode,
            &self.selection,
        ));
        self.step = WizardStep::Editing { index: 0 };
    }

    // Editing phase

    pub fn current_index(&self) -> Option<usize> {
        match self.step {
            WizardStep::Editing { index } => Some(index),
            _ => None,
        }
    }

    pub fn current_block(&self) -> Option<&MemoBlock> {
        let index = self.current_index()?;
        self.draft.as_ref()?.blocks.get(index)
    }

    /// `(position, total)` with a 1-based position, while editing.
    pub fn progress(&self) -> Option<(usize, usize)> {
        let index = self.current_index()?;
        Some((index + 1, self.block_count()))
    }

    /// Hint for the focused block. Only default-mode categories have one.
    pub fn current_hint(&self) -> Option<&str> {
        self.current_category()?.hint.as_deref()
    }

    /// Quick templates for the focused block; empty in custom mode.
    pub fn current_templates(&self) -> &[String] {
        self.current_category()
            .map(|c| c.templates.as_slice())
            .unwrap_or_default()
    }

    pub fn current_hint_templates(&self) -> &[HintTemplate] {
        match self.current_block() {
            Some(block) => self.catalog.hint_templates(&block.category_name),
            None => &[],
        }
    }

    fn current_category(&self) -> Option<&CategoryData> {
        let draft = self.draft.as_ref()?;
        if draft.record_mode != RecordMode::Default {
            return None;
        }
        let block = self.current_block()?;
        self.catalog.category(draft.record_type, &block.category_name)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), WizardError> {
        self.editing_index("set_title")?;
        if let Some(draft) = self.draft.as_mut() {
            draft.title = title.into();
        }
        Ok(())
    }

    pub fn set_block_text(&mut self, text: impl Into<String>) -> Result<(), WizardError> {
        self.focused_block_mut("set_block_text")?.text = Some(text.into());
        Ok(())
    }

    /// Adding requires a tag from the common vocabulary; a present tag can
    /// always be removed.
    pub fn toggle_block_tag(&mut self, tag: &str) -> Result<(), WizardError> {
        let known = self.catalog.is_common_tag(tag);
        let block = self.focused_block_mut("toggle_block_tag")?;
        if !block.has_tag(tag) && !known {
            return Err(WizardError::UnknownTag(tag.to_string()));
        }
        draft::toggle_tag(block, tag);
        Ok(())
    }

    pub fn apply_template(&mut self, template: &str) -> Result<(), WizardError> {
        draft::append_template(self.focused_block_mut("apply_template")?, template);
        Ok(())
    }

    pub fn set_caption(&mut self, caption: &str) -> Result<(), WizardError> {
        let caption = caption.trim();
        self.focused_block_mut("set_caption")?.caption =
            (!caption.is_empty()).then(|| caption.to_string());
        Ok(())
    }

    pub fn clear_image(&mut self) -> Result<(), WizardError> {
        draft::clear_image(self.focused_block_mut("clear_image")?);
        Ok(())
    }

    /// Validates and uploads an image for the focused block. The block only
    /// changes once the upload has produced a URL.
    pub async fn attach_image(
        &mut self,
        images: &dyn ImageStore,
        upload: ImageUpload,
    ) -> Result<String, WizardError> {
        self.focused_block_mut("attach_image")?;
        upload.validate()?;

        let memo_id = match self.target {
            SaveTarget::Update(memo_id) => Some(memo_id),
            SaveTarget::Create => None,
        };
        let url = images
            .upload_image(self.session.user_id, &upload, memo_id)
            .await
            .map_err(|error| {
                warn!(user_id = %self.session.user_id, %error, "image upload failed");
                WizardError::Upload(error)
            })?;

        draft::set_image(self.focused_block_mut("attach_image")?, url.clone());
        Ok(url)
    }

    pub fn next(&mut self) -> Result<(), WizardError> {
        let index = self.editing_index("next")?;
        if index + 1 >= self.block_count() {
            return Err(invalid("next", self.step));
        }
        self.step = WizardStep::Editing { index: index + 1 };
        Ok(())
    }

    pub fn previous(&mut self) -> Result<(), WizardError> {
        let index = self.editing_index("previous")?;
        if index == 0 {
            return Err(invalid("previous", self.step));
        }
        self.step = WizardStep::Editing { index: index - 1 };
        Ok(())
    }

    pub fn to_review(&mut self) -> Result<(), WizardError> {
        let index = self.editing_index("to_review")?;
        if index + 1 != self.block_count() {
            return Err(invalid("to_review", self.step));
        }
        if !self.draft.as_ref().is_some_and(Draft::has_title) {
            return Err(WizardError::TitleRequired);
        }
        self.step = WizardStep::Review;
        Ok(())
    }

    // Review phase

    /// Flips the public flag on the review page. When revising a saved memo
    /// the flag can also be flipped while editing.
    pub fn toggle_public(&mut self) -> Result<(), WizardError> {
        let allowed = match self.step {
            WizardStep::Review => true,
            WizardStep::Editing { .. } => self.is_editing_existing(),
            _ => false,
        };
        match (allowed, self.draft.as_mut()) {
            (true, Some(draft)) => {
                draft.is_public = !draft.is_public;
                Ok(())
            }
            _ => Err(invalid("toggle_public", self.step)),
        }
    }

    /// Returns to the last editing page with the same draft.
    pub fn back_to_edit(&mut self) -> Result<(), WizardError> {
        if self.step != WizardStep::Review {
            return Err(invalid("back_to_edit", self.step));
        }
        self.step = WizardStep::Editing {
            index: self.block_count().saturating_sub(1),
        };
        Ok(())
    }

    /// Persists the draft. On failure the wizard stays where it was with the
    /// draft intact so the call can be repeated.
    pub async fn save(&mut self, store: &dyn MemoStore) -> Result<MemoId, WizardError> {
        let allowed = match self.step {
            WizardStep::Review => true,
            WizardStep::Editing { index } => {
                self.is_editing_existing() && index + 1 == self.block_count()
            }
            _ => false,
        };
        let draft = match (allowed, self.draft.as_ref()) {
            (true, Some(draft)) => draft,
            _ => return Err(invalid("save", self.step)),
        };
        if !draft.has_title() {
            return Err(WizardError::TitleRequired);
        }
        if !draft.has_text_content() {
            return Err(WizardError::NoContent);
        }

        let memo_id = match self.target {
            SaveTarget::Create => store
                .create_memo(draft.to_new_memo(&self.session))
                .await
                .map_err(|error| {
                    warn!(user_id = %self.session.user_id, %error, "creating memo failed");
                    WizardError::Persistence(error)
                })?,
            SaveTarget::Update(memo_id) => {
                let updated = store
                    .update_memo(memo_id, draft.to_patch(&self.session))
                    .await
                    .map_err(|error| {
                        warn!(%memo_id, %error, "updating memo failed");
                        WizardError::Persistence(error)
                    })?;
                if !updated {
                    return Err(WizardError::MemoNotFound(memo_id));
                }
                memo_id
            }
        };

        info!(%memo_id, user_id = %self.session.user_id, "memo saved");
        self.draft = None;
        self.step = WizardStep::Saved { memo_id };
        Ok(memo_id)
    }

    fn block_count(&self) -> usize {
        self.draft.as_ref().map_or(0, |d| d.blocks.len())
    }

    fn editing_index(&self, action: &'static str) -> Result<usize, WizardError> {
        self.current_index().ok_or_else(|| invalid(action, self.step))
    }

    fn focused_block_mut(&mut self, action: &'static str) -> Result<&mut MemoBlock, WizardError> {
        let step = self.step;
        let index = self.editing_index(action)?;
        self.draft
            .as_mut()
            .and_then(|d| d.blocks.get_mut(index))
            .ok_or_else(|| invalid(action, step))
    }
}

fn invalid(action: &'static str, step: WizardStep) -> WizardError {
    WizardError::InvalidStep { action, step }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
