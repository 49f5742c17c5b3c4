use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(MemoId);
id_newtype!(ImageId);

/// Stable identifier of a block inside a memo. Survives edits and reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub Uuid);

impl BlockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag marking a block as a reflection ("反省").
pub const REFLECTION_TAG: &str = "#反省";

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Building,
    Activity,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Building => "building",
            RecordType::Activity => "activity",
        }
    }
}

impl FromStr for RecordType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "building" => Ok(RecordType::Building),
            "activity" => Ok(RecordType::Activity),
            _ => Err(ParseEnumError {
                kind: "record type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    Default,
    Custom,
}

impl RecordMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordMode::Default => "default",
            RecordMode::Custom => "custom",
        }
    }
}

impl FromStr for RecordMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(RecordMode::Default),
            "custom" => Ok(RecordMode::Custom),
            _ => Err(ParseEnumError {
                kind: "record mode",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoBlock {
    pub id: BlockId,
    #[serde(rename = "type", default)]
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub category_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub order: u32,
}

impl MemoBlock {
    /// A fresh text block for `category_name` at position `order`, with empty text.
    pub fn empty(category_name: impl Into<String>, order: u32) -> Self {
        Self {
            id: BlockId::new(),
            kind: BlockKind::Text,
            text: Some(String::new()),
            image_url: None,
            caption: None,
            category_name: category_name.into(),
            tags: Vec::new(),
            order,
        }
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|text| !text.trim().is_empty())
    }

    pub fn has_content(&self) -> bool {
        self.has_text() || self.image_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub id: MemoId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub title: String,
    pub blocks: Vec<MemoBlock>,
    #[serde(default)]
    pub is_public: bool,
    pub record_type: RecordType,
    pub record_mode: RecordMode,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Memo {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.blocks.iter().any(|block| block.has_tag(tag))
    }

    pub fn is_reflection(&self) -> bool {
        self.has_tag(REFLECTION_TAG)
    }

    /// Blocks that carry text or an image, in their stored order.
    pub fn content_blocks(&self) -> Vec<&MemoBlock> {
        let mut blocks: Vec<&MemoBlock> =
            self.blocks.iter().filter(|b| b.has_content()).collect();
        blocks.sort_by_key(|b| b.order);
        blocks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
