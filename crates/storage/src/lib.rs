use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memo_core::{
    collaborator::{ImageStore, MemoPatch, MemoStore, NewMemo},
    image::{normalize_mime, ImageUpload},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{ImageId, Memo, MemoBlock, MemoId, RecordMode, RecordType, UserId, UserProfile},
    protocol::ProfileUpdate,
};

/// Display name given to profiles created without one.
pub const DEFAULT_DISPLAY_NAME: &str = "ユーザー";

const MEMO_COLUMNS: &str = "id, user_id, user_name, title, blocks_json, is_public, record_type, record_mode, created_at, updated_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image_id: ImageId,
    pub owner_id: UserId,
    pub memo_id: Option<MemoId>,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            public_base_url: String::new(),
        })
    }

    /// Prefix for image URLs handed out by [`ImageStore::upload_image`].
    /// Without one, URLs are server-relative (`/images/{id}`).
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn username_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT username FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT user_id, display_name, photo_url, bio, created_at, updated_at
             FROM user_profiles WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserProfile {
            user_id: UserId(r.get::<i64, _>(0)),
            display_name: r.get::<String, _>(1),
            photo_url: r.get::<Option<String>, _>(2),
            bio: r.get::<Option<String>, _>(3),
            created_at: r.get::<DateTime<Utc>, _>(4),
            updated_at: r.get::<Option<DateTime<Utc>>, _>(5),
        }))
    }

    /// Creates the profile on first save, otherwise overwrites the given
    /// fields and stamps `updated_at`.
    pub async fn save_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        let now = Utc::now();
        let display_name = update
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        sqlx::query(
            "INSERT INTO user_profiles (user_id, display_name, photo_url, bio, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = COALESCE(?, display_name),
                photo_url = COALESCE(?, photo_url),
                bio = COALESCE(?, bio),
                updated_at = ?",
        )
        .bind(user_id.0)
        .bind(display_name.unwrap_or(DEFAULT_DISPLAY_NAME))
        .bind(update.photo_url.as_deref())
        .bind(update.bio.as_deref())
        .bind(now)
        .bind(display_name)
        .bind(update.photo_url.as_deref())
        .bind(update.bio.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save profile for user {user_id}"))?;

        self.get_profile(user_id)
            .await?
            .with_context(|| format!("profile for user {user_id} missing after save"))
    }

    /// Returns the stored profile, creating one named `display_name` if the
    /// user has none yet.
    pub async fn ensure_profile(&self, user_id: UserId, display_name: &str) -> Result<UserProfile> {
        if let Some(profile) = self.get_profile(user_id).await? {
            return Ok(profile);
        }
        self.save_profile(
            user_id,
            &ProfileUpdate {
                display_name: Some(display_name.to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
    }

    pub async fn store_image(
        &self,
        owner: UserId,
        upload: &ImageUpload,
        memo_id: Option<MemoId>,
    ) -> Result<ImageId> {
        let size_bytes = i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX);
        let rec = sqlx::query(
            "INSERT INTO images (owner_user_id, memo_id, bytes, mime_type, filename, size_bytes, created_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(owner.0)
        .bind(memo_id.map(|id| id.0))
        .bind(upload.bytes.as_slice())
        .bind(normalize_mime(&upload.mime_type))
        .bind(upload.filename.as_deref())
        .bind(size_bytes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("failed to store image")?;
        Ok(ImageId(rec.get::<i64, _>(0)))
    }

    pub async fn load_image(&self, image_id: ImageId) -> Result<Option<StoredImage>> {
        let row = sqlx::query(
            "SELECT id, owner_user_id, memo_id, bytes, mime_type, filename, size_bytes, created_at FROM images WHERE id = ?",
        )
        .bind(image_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredImage {
            image_id: ImageId(r.get::<i64, _>(0)),
            owner_id: UserId(r.get::<i64, _>(1)),
            memo_id: r.get::<Option<i64>, _>(2).map(MemoId),
            bytes: r.get::<Vec<u8>, _>(3),
            mime_type: r.get::<String, _>(4),
            filename: r.get::<Option<String>, _>(5),
            size_bytes: r.get::<i64, _>(6).max(0) as u64,
            created_at: r.get::<DateTime<Utc>, _>(7),
        }))
    }

    pub fn image_url(&self, image_id: ImageId) -> String {
        format!("{}/images/{image_id}", self.public_base_url)
    }

    async fn fetch_memos(&self, filter: &str, bind: Option<i64>) -> Result<Vec<Memo>> {
        let sql = format!(
            "SELECT {MEMO_COLUMNS} FROM memos WHERE {filter} ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(memo_from_row)
            .collect()
    }
}

fn memo_from_row(r: &SqliteRow) -> Result<Memo> {
    let id = MemoId(r.get::<i64, _>(0));
    let blocks: Vec<MemoBlock> = serde_json::from_str(&r.get::<String, _>(4))
        .with_context(|| format!("memo {id} has malformed blocks"))?;
    Ok(Memo {
        id,
        user_id: UserId(r.get::<i64, _>(1)),
        user_name: r.get::<Option<String>, _>(2),
        title: r.get::<String, _>(3),
        blocks,
        is_public: r.get::<bool, _>(5),
        record_type: RecordType::from_str(&r.get::<String, _>(6))?,
        record_mode: RecordMode::from_str(&r.get::<String, _>(7))?,
        created_at: r.get::<DateTime<Utc>, _>(8),
        updated_at: r.get::<Option<DateTime<Utc>>, _>(9),
    })
}

#[async_trait]
impl MemoStore for Storage {
    async fn create_memo(&self, memo: NewMemo) -> Result<MemoId> {
        let blocks_json = serde_json::to_string(&memo.blocks)?;
        let rec = sqlx::query(
            "INSERT INTO memos (user_id, user_name, title, blocks_json, is_public, record_type, record_mode, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(memo.user_id.0)
        .bind(memo.user_name.as_deref())
        .bind(&memo.title)
        .bind(blocks_json)
        .bind(memo.is_public)
        .bind(memo.record_type.as_str())
        .bind(memo.record_mode.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create memo for user {}", memo.user_id))?;
        let memo_id = MemoId(rec.get::<i64, _>(0));
        debug!(%memo_id, user_id = %memo.user_id, "memo created");
        Ok(memo_id)
    }

    async fn get_memo(&self, memo_id: MemoId) -> Result<Option<Memo>> {
        let sql = format!("SELECT {MEMO_COLUMNS} FROM memos WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(memo_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(memo_from_row).transpose()
    }

    async fn update_memo(&self, memo_id: MemoId, patch: MemoPatch) -> Result<bool> {
        let blocks_json = patch
            .blocks
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            "UPDATE memos SET
                title = COALESCE(?, title),
                blocks_json = COALESCE(?, blocks_json),
                is_public = COALESCE(?, is_public),
                user_name = CASE WHEN ? THEN ? ELSE user_name END,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(patch.title.as_deref())
        .bind(blocks_json)
        .bind(patch.is_public)
        .bind(patch.user_name.is_some())
        .bind(patch.user_name.clone().flatten())
        .bind(Utc::now())
        .bind(memo_id.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update memo {memo_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_memo(&self, memo_id: MemoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM memos WHERE id = ?")
            .bind(memo_id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete memo {memo_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_memos_by_owner(&self, owner: UserId) -> Result<Vec<Memo>> {
        self.fetch_memos("user_id = ?", Some(owner.0)).await
    }

    async fn list_public_memos(&self) -> Result<Vec<Memo>> {
        self.fetch_memos("is_public = 1", None).await
    }
}

#[async_trait]
impl ImageStore for Storage {
    async fn upload_image(
        &self,
        owner: UserId,
        upload: &ImageUpload,
        memo_id: Option<MemoId>,
    ) -> Result<String> {
        upload.validate()?;
        let image_id = self.store_image(owner, upload, memo_id).await?;
        Ok(self.image_url(image_id))
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
