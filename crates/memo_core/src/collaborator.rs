//! Boundaries the core talks through. `storage::Storage` implements both
//! traits; tests substitute in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{Memo, MemoBlock, MemoId, RecordMode, RecordType, UserId};

use crate::image::ImageUpload;

#[derive(Debug, Clone, PartialEq)]
pub struct NewMemo {
    pub user_id: UserId,
    /// Only set for public memos.
    pub user_name: Option<String>,
    pub title: String,
    pub blocks: Vec<MemoBlock>,
    pub is_public: bool,
    pub record_type: RecordType,
    pub record_mode: RecordMode,
}

/// Fields to overwrite on an existing memo. `None` leaves a field as stored;
/// `user_name: Some(None)` clears the author name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoPatch {
    pub title: Option<String>,
    pub blocks: Option<Vec<MemoBlock>>,
    pub is_public: Option<bool>,
    pub user_name: Option<Option<String>>,
}

impl MemoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.blocks.is_none()
            && self.is_public.is_none()
            && self.user_name.is_none()
    }
}

#[async_trait]
pub trait MemoStore: Send + Sync {
    async fn create_memo(&self, memo: NewMemo) -> Result<MemoId>;
    async fn get_memo(&self, memo_id: MemoId) -> Result<Option<Memo>>;
    /// Returns `false` when no memo has this id.
    async fn update_memo(&self, memo_id: MemoId, patch: MemoPatch) -> Result<bool>;
    /// Returns `false` when no memo has this id.
    async fn delete_memo(&self, memo_id: MemoId) -> Result<bool>;
    /// Newest first.
    async fn list_memos_by_owner(&self, owner: UserId) -> Result<Vec<Memo>>;
    /// Newest first.
    async fn list_public_memos(&self) -> Result<Vec<Memo>>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores an already validated image and returns its public URL.
    async fn upload_image(
        &self,
        owner: UserId,
        upload: &ImageUpload,
        memo_id: Option<MemoId>,
    ) -> Result<String>;
}
