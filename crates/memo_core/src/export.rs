//! Spreadsheet export of a single memo.

use chrono::FixedOffset;
use shared::domain::Memo;

/// Excel needs the BOM to pick UTF-8 for Japanese text.
const BOM: char = '\u{feff}';

/// CSV document for `memo`, with the creation date shown in `offset`.
pub fn memo_to_csv(memo: &Memo, offset: FixedOffset) -> String {
    let created = memo.created_at.with_timezone(&offset);
    let mut rows: Vec<Vec<String>> = vec![
        vec!["タイトル".into(), memo.title.clone()],
        vec!["作成日".into(), created.format("%Y/%-m/%-d").to_string()],
        Vec::new(),
        vec!["カテゴリ".into(), "内容".into(), "タグ".into()],
    ];
    for block in memo.content_blocks() {
        rows.push(vec![
            block.category_name.clone(),
            block.text.clone().unwrap_or_default(),
            block.tags.join("; "),
        ]);
    }

    let body = rows
        .iter()
        .map(|row| row.iter().map(|cell| quote(cell)).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{BOM}{body}")
}

/// Download name for the export; path separators in the title are replaced.
pub fn csv_file_name(memo: &Memo) -> String {
    let stem: String = memo
        .title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' | '\r' | '\n' => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() {
        format!("memo-{}.csv", memo.id)
    } else {
        format!("{stem}.csv")
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::domain::{MemoBlock, MemoId, RecordMode, RecordType, UserId};

    fn memo() -> Memo {
        let mut empty = MemoBlock::empty("トイレ", 0);
        empty.tags.push("#気づき".into());
        let mut late = MemoBlock::empty("所感", 2);
        late.text = Some("言った \"楽しい\"".into());
        let mut early = MemoBlock::empty("施設の概要", 1);
        early.text = Some("広い".into());
        early.tags = vec!["#気づき".into(), "#反省".into()];
        Memo {
            id: MemoId(4),
            user_id: UserId(1),
            user_name: None,
            title: "動物園/春".into(),
            blocks: vec![empty, late, early],
            is_public: false,
            record_type: RecordType::Building,
            record_mode: RecordMode::Default,
            created_at: Utc.with_ymd_and_hms(2026, 3, 31, 20, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn export_lists_content_blocks_in_order() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let csv = memo_to_csv(&memo(), jst);
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split('\n').collect();
        assert_eq!(
            lines,
            [
                "\"タイトル\",\"動物園/春\"",
                "\"作成日\",\"2026/4/1\"",
                "",
                "\"カテゴリ\",\"内容\",\"タグ\"",
                "\"施設の概要\",\"広い\",\"#気づき; #反省\"",
                "\"所感\",\"言った \"\"楽しい\"\"\",\"\"",
            ]
        );
    }

    #[test]
    fn file_name_is_sanitized() {
        assert_eq!(csv_file_name(&memo()), "動物園_春.csv");
        let mut untitled = memo();
        untitled.title = "  ".into();
        assert_eq!(csv_file_name(&untitled), "memo-4.csv");
    }
}
