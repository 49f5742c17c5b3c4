use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use memo_core::{
    aggregate::{compute_stats, filter_by_keyword, filter_by_tag},
    catalog::{CategoryCatalog, CategoryData, HintTemplate, MAX_CUSTOM_CATEGORIES},
    collaborator::{MemoPatch, MemoStore, NewMemo},
    export::{csv_file_name, memo_to_csv},
    image::{ImageRejection, ImageUpload},
    session::Session,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ImageId, Memo, MemoBlock, MemoId, RecordMode, RecordType, UserId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateMemoRequest, ImageUploadResponse, LoginResponse, MemoStats, ProfileUpdate,
        UpdateMemoRequest,
    },
};
use storage::{StoredImage, Storage};
use tracing::{error, info};

const MAX_USERNAME_CHARS: usize = 64;
const INTERNAL_ERROR_MESSAGE: &str = "something went wrong, please try again";

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub catalog: Arc<CategoryCatalog>,
    /// Zone used for month boundaries and export dates when the caller
    /// does not name one.
    pub default_offset: FixedOffset,
}

impl ApiContext {
    pub fn new(storage: Storage, catalog: Arc<CategoryCatalog>) -> Self {
        Self {
            storage,
            catalog,
            default_offset: Utc.fix(),
        }
    }

    pub fn with_default_offset(mut self, offset: FixedOffset) -> Self {
        self.default_offset = offset;
        self
    }
}

/// Categories offered for one record type and mode, with the tag vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogView {
    pub record_type: RecordType,
    pub record_mode: RecordMode,
    pub categories: Vec<CategoryData>,
    pub common_tags: Vec<String>,
    pub max_custom_categories: usize,
}

/// A rendered CSV export and the name to download it under.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub file_name: String,
    pub content: String,
}

pub async fn login(ctx: &ApiContext, username: &str) -> Result<LoginResponse, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username is required"));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::validation("username is too long"));
    }
    let user_id = ctx.storage.create_user(username).await.map_err(internal)?;
    let profile = ctx
        .storage
        .ensure_profile(user_id, username)
        .await
        .map_err(internal)?;
    info!(%user_id, "user logged in");
    Ok(LoginResponse { user_id, profile })
}

pub async fn get_profile(ctx: &ApiContext, user_id: UserId) -> Result<UserProfile, ApiError> {
    ctx.storage
        .get_profile(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("profile"))
}

pub async fn save_profile(
    ctx: &ApiContext,
    user_id: UserId,
    update: &ProfileUpdate,
) -> Result<UserProfile, ApiError> {
    ensure_user(ctx, user_id).await?;
    ctx.storage
        .save_profile(user_id, update)
        .await
        .map_err(internal)
}

pub fn catalog(ctx: &ApiContext, record_type: RecordType, record_mode: RecordMode) -> CatalogView {
    CatalogView {
        record_type,
        record_mode,
        categories: ctx.catalog.categories(record_type, record_mode),
        common_tags: ctx.catalog.common_tags().to_vec(),
        max_custom_categories: MAX_CUSTOM_CATEGORIES,
    }
}

pub fn hint_templates(ctx: &ApiContext, category_name: &str) -> Vec<HintTemplate> {
    ctx.catalog.hint_templates(category_name).to_vec()
}

/// Stores a memo composed by a client. The same rules the wizard enforces
/// before saving apply here.
pub async fn create_memo(ctx: &ApiContext, request: CreateMemoRequest) -> Result<Memo, ApiError> {
    let session = session_for(ctx, request.user_id).await?;
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("a title is required"));
    }
    let blocks = checked_blocks(ctx, request.record_type, request.record_mode, request.blocks)?;

    let memo_id = ctx
        .storage
        .create_memo(NewMemo {
            user_id: request.user_id,
            user_name: request.is_public.then(|| session.public_author_name()),
            title: title.to_string(),
            blocks,
            is_public: request.is_public,
            record_type: request.record_type,
            record_mode: request.record_mode,
        })
        .await
        .map_err(internal)?;
    fetch_memo(ctx, memo_id).await
}

/// Owners see all their memos; anyone else only public ones.
pub async fn get_memo(ctx: &ApiContext, viewer: UserId, memo_id: MemoId) -> Result<Memo, ApiError> {
    let memo = fetch_memo(ctx, memo_id).await?;
    if memo.user_id != viewer && !memo.is_public {
        return Err(ApiError::new(ErrorCode::Forbidden, "memo is private"));
    }
    Ok(memo)
}

pub async fn update_memo(
    ctx: &ApiContext,
    memo_id: MemoId,
    request: UpdateMemoRequest,
) -> Result<Memo, ApiError> {
    let existing = owned_memo(ctx, request.user_id, memo_id).await?;

    let title = match request.title {
        Some(title) if title.trim().is_empty() => {
            return Err(ApiError::validation("a title is required"));
        }
        Some(title) => Some(title.trim().to_string()),
        None => None,
    };
    let blocks = request
        .blocks
        .map(|blocks| checked_blocks(ctx, existing.record_type, existing.record_mode, blocks))
        .transpose()?;
    let user_name = match request.is_public {
        Some(true) => Some(Some(session_for(ctx, request.user_id).await?.public_author_name())),
        Some(false) => Some(None),
        None => None,
    };
    let patch = MemoPatch {
        title,
        blocks,
        is_public: request.is_public,
        user_name,
    };
    if patch.is_empty() {
        return Ok(existing);
    }

    let updated = ctx
        .storage
        .update_memo(memo_id, patch)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::not_found("memo"));
    }
    fetch_memo(ctx, memo_id).await
}

/// Deletes the memo and returns what was removed.
pub async fn delete_memo(ctx: &ApiContext, viewer: UserId, memo_id: MemoId) -> Result<Memo, ApiError> {
    let memo = owned_memo(ctx, viewer, memo_id).await?;
    if !ctx.storage.delete_memo(memo_id).await.map_err(internal)? {
        return Err(ApiError::not_found("memo"));
    }
    info!(%memo_id, user_id = %viewer, "memo deleted");
    Ok(memo)
}

pub async fn list_memos(
    ctx: &ApiContext,
    user_id: UserId,
    keyword: Option<&str>,
    tag: Option<&str>,
) -> Result<Vec<Memo>, ApiError> {
    let memos = ctx
        .storage
        .list_memos_by_owner(user_id)
        .await
        .map_err(internal)?;
    let by_keyword: Vec<Memo> = filter_by_keyword(&memos, keyword.unwrap_or_default().trim())
        .into_iter()
        .cloned()
        .collect();
    Ok(match tag.filter(|t| !t.is_empty()) {
        Some(tag) => filter_by_tag(&by_keyword, tag).into_iter().cloned().collect(),
        None => by_keyword,
    })
}

pub async fn list_public_memos(ctx: &ApiContext) -> Result<Vec<Memo>, ApiError> {
    ctx.storage.list_public_memos().await.map_err(internal)
}

pub async fn stats(
    ctx: &ApiContext,
    user_id: UserId,
    tz_offset_minutes: Option<i32>,
) -> Result<MemoStats, ApiError> {
    let offset = resolve_offset(ctx, tz_offset_minutes)?;
    let memos = ctx
        .storage
        .list_memos_by_owner(user_id)
        .await
        .map_err(internal)?;
    Ok(compute_stats(&memos, &Utc::now().with_timezone(&offset)))
}

pub async fn export_csv(
    ctx: &ApiContext,
    viewer: UserId,
    memo_id: MemoId,
    tz_offset_minutes: Option<i32>,
) -> Result<CsvExport, ApiError> {
    let offset = resolve_offset(ctx, tz_offset_minutes)?;
    let memo = get_memo(ctx, viewer, memo_id).await?;
    Ok(CsvExport {
        file_name: csv_file_name(&memo),
        content: memo_to_csv(&memo, offset),
    })
}

pub async fn upload_image(
    ctx: &ApiContext,
    owner: UserId,
    memo_id: Option<MemoId>,
    upload: ImageUpload,
) -> Result<ImageUploadResponse, ApiError> {
    upload.validate().map_err(rejected_image)?;
    ensure_user(ctx, owner).await?;
    if let Some(memo_id) = memo_id {
        owned_memo(ctx, owner, memo_id).await?;
    }
    let image_id = ctx
        .storage
        .store_image(owner, &upload, memo_id)
        .await
        .map_err(internal)?;
    Ok(ImageUploadResponse {
        image_id,
        url: ctx.storage.image_url(image_id),
        size_bytes: upload.bytes.len() as u64,
    })
}

pub async fn load_image(ctx: &ApiContext, image_id: ImageId) -> Result<StoredImage, ApiError> {
    ctx.storage
        .load_image(image_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("image"))
}

async fn ensure_user(ctx: &ApiContext, user_id: UserId) -> Result<String, ApiError> {
    ctx.storage
        .username_for_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "unknown user"))
}

/// Identity of `user_id` as the wizard would see it, named after the profile.
async fn session_for(ctx: &ApiContext, user_id: UserId) -> Result<Session, ApiError> {
    let username = ensure_user(ctx, user_id).await?;
    let profile = ctx.storage.get_profile(user_id).await.map_err(internal)?;
    let mut session = Session::new(user_id).with_display_name(
        profile
            .as_ref()
            .map_or(username.as_str(), |p| p.display_name.as_str()),
    );
    session.photo_url = profile.and_then(|p| p.photo_url);
    Ok(session)
}

async fn fetch_memo(ctx: &ApiContext, memo_id: MemoId) -> Result<Memo, ApiError> {
    ctx.storage
        .get_memo(memo_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("memo"))
}

async fn owned_memo(ctx: &ApiContext, user_id: UserId, memo_id: MemoId) -> Result<Memo, ApiError> {
    let memo = fetch_memo(ctx, memo_id).await?;
    if memo.user_id != user_id {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "memo belongs to another user",
        ));
    }
    Ok(memo)
}

/// Puts blocks in stored order, renumbers them, and applies the save rules:
/// the catalog's default list in default mode, distinct offered categories
/// up to the cap in custom mode, known tags, some text.
fn checked_blocks(
    ctx: &ApiContext,
    record_type: RecordType,
    record_mode: RecordMode,
    mut blocks: Vec<MemoBlock>,
) -> Result<Vec<MemoBlock>, ApiError> {
    if blocks.is_empty() {
        return Err(ApiError::validation("a memo needs at least one category"));
    }
    blocks.sort_by_key(|b| b.order);

    match record_mode {
        RecordMode::Default => {
            let expected = ctx.catalog.default_category_names(record_type);
            if !blocks.iter().map(|b| &b.category_name).eq(expected.iter()) {
                return Err(ApiError::validation(format!(
                    "default {} memos use the categories {}",
                    record_type.as_str(),
                    expected.join(", ")
                )));
            }
        }
        RecordMode::Custom => {
            if blocks.len() > MAX_CUSTOM_CATEGORIES {
                return Err(ApiError::validation(format!(
                    "at most {MAX_CUSTOM_CATEGORIES} custom categories are allowed"
                )));
            }
            let offered = ctx.catalog.custom_options(record_type);
            for (index, block) in blocks.iter().enumerate() {
                if !offered.contains(&block.category_name) {
                    return Err(ApiError::validation(format!(
                        "category '{}' is not offered for {} memos",
                        block.category_name,
                        record_type.as_str()
                    )));
                }
                if blocks[..index]
                    .iter()
                    .any(|b| b.category_name == block.category_name)
                {
                    return Err(ApiError::validation(format!(
                        "category '{}' is listed twice",
                        block.category_name
                    )));
                }
            }
        }
    }

    if let Some(tag) = blocks
        .iter()
        .flat_map(|b| &b.tags)
        .find(|tag| !ctx.catalog.is_common_tag(tag))
    {
        return Err(ApiError::validation(format!(
            "tag '{tag}' is not one of the common tags"
        )));
    }
    if !blocks.iter().any(MemoBlock::has_text) {
        return Err(ApiError::validation("at least one category needs some text"));
    }
    for (index, block) in blocks.iter_mut().enumerate() {
        block.order = index as u32;
    }
    Ok(blocks)
}

fn resolve_offset(ctx: &ApiContext, minutes: Option<i32>) -> Result<FixedOffset, ApiError> {
    match minutes {
        None => Ok(ctx.default_offset),
        Some(minutes) => minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ApiError::validation("timezone offset out of range")),
    }
}

fn rejected_image(rejection: ImageRejection) -> ApiError {
    let code = match rejection {
        ImageRejection::TooLarge { .. } => ErrorCode::PayloadTooLarge,
        _ => ErrorCode::Validation,
    };
    ApiError::new(code, rejection.to_string())
}

/// Logs the cause; callers only learn that the request failed.
fn internal(err: anyhow::Error) -> ApiError {
    error!(error = %format!("{err:#}"), "storage call failed");
    ApiError::new(ErrorCode::Internal, INTERNAL_ERROR_MESSAGE)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
