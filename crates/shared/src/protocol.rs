use serde::{Deserialize, Serialize};

use crate::domain::{
    ImageId, Memo, MemoBlock, MemoId, RecordMode, RecordType, UserId, UserProfile,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemoRequest {
    pub user_id: UserId,
    pub title: String,
    pub blocks: Vec<MemoBlock>,
    #[serde(default)]
    pub is_public: bool,
    pub record_type: RecordType,
    pub record_mode: RecordMode,
}

/// Partial update; absent fields are left as stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMemoRequest {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<MemoBlock>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoCreatedResponse {
    pub memo_id: MemoId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub image_id: ImageId,
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoStats {
    pub total_count: usize,
    pub reflection_count: usize,
    pub current_month_count: usize,
    pub top_tags: Vec<TagCount>,
    pub monthly_counts: Vec<MonthlyCount>,
}

/// Pushed to subscribers of the shared feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedEvent {
    MemoPublished { memo: Memo },
    MemoWithdrawn { memo_id: MemoId },
}
