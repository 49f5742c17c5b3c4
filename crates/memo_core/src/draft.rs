use serde::{Deserialize, Serialize};
use shared::domain::{BlockKind, Memo, MemoBlock, RecordMode, RecordType};

use crate::{
    collaborator::{MemoPatch, NewMemo},
    session::Session,
};

/// The memo being composed by a wizard session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub record_type: RecordType,
    pub record_mode: RecordMode,
    pub blocks: Vec<MemoBlock>,
    pub is_public: bool,
}

impl Draft {
    /// One empty text block per category, in the given order.
    pub fn from_categories(
        record_type: RecordType,
        record_mode: RecordMode,
        categories: &[String],
    ) -> Self {
        let blocks = categories
            .iter()
            .enumerate()
            .map(|(index, name)| MemoBlock::empty(name.clone(), index as u32))
            .collect();
        Self {
            title: String::new(),
            record_type,
            record_mode,
            blocks,
            is_public: false,
        }
    }

    /// Draft for revising a saved memo. Blocks are put in stored order and
    /// renumbered so `order` matches position.
    pub fn from_memo(memo: &Memo) -> Self {
        let mut blocks = memo.blocks.clone();
        blocks.sort_by_key(|b| b.order);
        for (index, block) in blocks.iter_mut().enumerate() {
            block.order = index as u32;
        }
        Self {
            title: memo.title.clone(),
            record_type: memo.record_type,
            record_mode: memo.record_mode,
            blocks,
            is_public: memo.is_public,
        }
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn has_text_content(&self) -> bool {
        self.blocks.iter().any(MemoBlock::has_text)
    }

    fn author_name(&self, session: &Session) -> Option<String> {
        self.is_public.then(|| session.public_author_name())
    }

    pub fn to_new_memo(&self, session: &Session) -> NewMemo {
        NewMemo {
            user_id: session.user_id,
            user_name: self.author_name(session),
            title: self.title.trim().to_string(),
            blocks: self.blocks.clone(),
            is_public: self.is_public,
            record_type: self.record_type,
            record_mode: self.record_mode,
        }
    }

    pub fn to_patch(&self, session: &Session) -> MemoPatch {
        MemoPatch {
            title: Some(self.title.trim().to_string()),
            blocks: Some(self.blocks.clone()),
            is_public: Some(self.is_public),
            user_name: Some(self.author_name(session)),
        }
    }
}

/// Adds `tag` if absent, removes it if present.
pub fn toggle_tag(block: &mut MemoBlock, tag: &str) {
    if let Some(pos) = block.tags.iter().position(|t| t == tag) {
        block.tags.remove(pos);
    } else {
        block.tags.push(tag.to_string());
    }
}

/// Appends `template` after a blank line, or sets it when the block is empty.
pub fn append_template(block: &mut MemoBlock, template: &str) {
    let text = block.text.get_or_insert_with(String::new);
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(template);
}

pub fn set_image(block: &mut MemoBlock, url: String) {
    block.image_url = Some(url);
    block.kind = BlockKind::Image;
}

pub fn clear_image(block: &mut MemoBlock) {
    block.image_url = None;
    block.caption = None;
    block.kind = BlockKind::Text;
}
