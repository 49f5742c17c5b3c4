//! Static category configuration: which categories a record type offers,
//! their hints and templates, and the common tag vocabulary.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared::domain::{RecordMode, RecordType};

/// Upper bound on categories picked in custom mode.
pub const MAX_CUSTOM_CATEGORIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default)]
    pub templates: Vec<String>,
}

impl CategoryData {
    fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hint: None,
            templates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintTemplate {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TypeCatalog {
    default: Vec<CategoryData>,
    #[serde(default)]
    custom: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCatalog {
    common_tags: Vec<String>,
    building: TypeCatalog,
    activity: TypeCatalog,
    #[serde(default)]
    hint_templates: BTreeMap<String, Vec<HintTemplate>>,
}

impl CategoryCatalog {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let catalog: Self = toml::from_str(raw).context("invalid category catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.common_tags.is_empty() {
            bail!("catalog must define at least one common tag");
        }
        for (record_type, entry) in [
            (RecordType::Building, &self.building),
            (RecordType::Activity, &self.activity),
        ] {
            if entry.default.is_empty() {
                bail!(
                    "catalog has no default categories for '{}'",
                    record_type.as_str()
                );
            }
        }
        Ok(())
    }

    fn entry(&self, record_type: RecordType) -> &TypeCatalog {
        match record_type {
            RecordType::Building => &self.building,
            RecordType::Activity => &self.activity,
        }
    }

    /// Ordered categories offered for `record_type` in `record_mode`.
    /// Custom categories carry no hint and no quick templates.
    pub fn categories(
        &self,
        record_type: RecordType,
        record_mode: RecordMode,
    ) -> Vec<CategoryData> {
        let entry = self.entry(record_type);
        match record_mode {
            RecordMode::Default => entry.default.clone(),
            RecordMode::Custom => entry
                .custom
                .iter()
                .map(|name| CategoryData::bare(name))
                .collect(),
        }
    }

    pub fn default_category_names(&self, record_type: RecordType) -> Vec<String> {
        self.entry(record_type)
            .default
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn custom_options(&self, record_type: RecordType) -> &[String] {
        &self.entry(record_type).custom
    }

    /// Hint and quick templates for a default category of `record_type`.
    pub fn category(&self, record_type: RecordType, name: &str) -> Option<&CategoryData> {
        self.entry(record_type).default.iter().find(|c| c.name == name)
    }

    /// Detailed named templates for `category_name`; empty when none exist.
    pub fn hint_templates(&self, category_name: &str) -> &[HintTemplate] {
        self.hint_templates
            .get(category_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn common_tags(&self) -> &[String] {
        &self.common_tags
    }

    pub fn is_common_tag(&self, tag: &str) -> bool {
        self.common_tags.iter().any(|t| t == tag)
    }

    /// The catalog the app ships with.
    pub fn builtin() -> Self {
        let shared_tail = || {
            vec![
                cat("所感", "どう感じましたか？", &["良かった点：\n気になった点："]),
                cat("トイレ", "トイレの情報", &["場所：\n清潔度：\nおむつ交換台："]),
                cat("休憩スペース", "休憩できる場所", &["場所：\n広さ：\n設備："]),
                cat("食事場所はあるか", "食事ができる場所", &["場所：\n種類：\n価格帯："]),
                cat("持っていくべき荷物", "必要な持ち物", &["必須：\nあると便利："]),
                cat(
                    "反省点",
                    "次回に活かすこと",
                    &["失敗した点：\n気づいた点：\n次に活かすこと："],
                ),
            ]
        };
        let custom_tail = [
            "危険予測",
            "事前学習",
            "気づいたこと",
            "オトナが楽しめるポイント",
            "お土産",
            "記念品",
            "カブブック記録場所検討",
        ];

        let mut building_default = vec![cat(
            "施設の概要",
            "施設の基本情報を記録しましょう",
            &["名称：\n場所：\n特徴："],
        )];
        building_default.extend(shared_tail());
        let mut activity_default = vec![cat(
            "活動内容の概要",
            "活動の基本情報を記録しましょう",
            &["活動名：\n場所：\n時間："],
        )];
        activity_default.extend(shared_tail());

        let building_custom = ["混雑度", "未就学児の考慮", "対象年齢"]
            .into_iter()
            .chain(custom_tail)
            .map(str::to_string)
            .collect();
        let activity_custom = ["集合時間", "活動内容", "備品メモ"]
            .into_iter()
            .chain(custom_tail)
            .map(str::to_string)
            .collect();

        let hint_templates = BUILTIN_HINT_TEMPLATES
            .iter()
            .map(|(category, templates)| {
                (
                    category.to_string(),
                    templates
                        .iter()
                        .map(|(name, template)| HintTemplate {
                            name: name.to_string(),
                            template: template.to_string(),
                        })
                        .collect(),
                )
            })
            .collect();

        Self {
            common_tags: ["#気づき", "#反省", "#アイデア", "#調べる", "#誰かに相談する"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            building: TypeCatalog {
                default: building_default,
                custom: building_custom,
            },
            activity: TypeCatalog {
                default: activity_default,
                custom: activity_custom,
            },
            hint_templates,
        }
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn cat(name: &str, hint: &str, templates: &[&str]) -> CategoryData {
    CategoryData {
        name: name.to_string(),
        hint: Some(hint.to_string()),
        templates: templates.iter().map(|t| t.to_string()).collect(),
    }
}

const BUILTIN_HINT_TEMPLATES: &[(&str, &[(&str, &str)])] = &[
    (
        "施設の概要",
        &[
            ("施設情報", "施設名：\n営業時間：\n所在地：\nWebサイト："),
            ("駐車場情報", "場所：\n台数：\n距離：\n料金："),
            ("料金", "大人：\n子ども：\n割引："),
        ],
    ),
    (
        "反省点",
        &[
            ("計画面", "失敗した点：\n気づいた点："),
            ("現地対応", "困ったこと："),
            ("教訓", "次に活かすこと："),
        ],
    ),
    (
        "活動内容の概要",
        &[
            ("基本情報", "活動名：\n時間：\n場所："),
            ("参加者", "人数：\n年齢層："),
            ("内容", "概要："),
        ],
    ),
    (
        "トイレ",
        &[
            ("基本情報", "場所：\n数：\n清潔度："),
            ("設備", "おむつ替え台：\nベビーチェア："),
            ("アクセス", "距離：\n案内表示："),
        ],
    ),
    (
        "所感",
        &[
            ("全体的な印象", "良かった点：\n改善してほしい点："),
            ("子どもの反応", "楽しんでいた点：\n飽きていた点："),
            ("大人の視点", "学びになった点：\n疲労度："),
        ],
    ),
    (
        "集合時間",
        &[
            ("基本情報", "集合時刻：\n集合場所：\n解散時刻："),
            ("準備時間", "準備開始：\n移動時間："),
            ("注意事項", "遅刻対応：\n緊急連絡先："),
        ],
    ),
    (
        "活動内容",
        &[
            ("概要", "活動名：\n目的：\n対象年齢："),
            ("詳細", "進行手順：\n必要時間：\n難易度："),
            ("準備物", "材料：\n道具：\n配布物："),
        ],
    ),
    (
        "備品メモ",
        &[
            ("持参品", "個人持参：\n団体持参：\n忘れ物対策："),
            ("現地調達", "購入予定：\n借用予定：\n代替案："),
            ("管理", "責任者：\n保管場所：\n返却方法："),
        ],
    ),
    (
        "混雑度",
        &[
            ("時間帯", "平日：\n土日祝：\nピーク時間："),
            ("季節要因", "春夏：\n秋冬：\n特別期間："),
            ("対策", "回避方法：\n待ち時間：\n代替プラン："),
        ],
    ),
    (
        "未就学児の考慮",
        &[
            ("安全面", "危険箇所：\n注意事項：\n見守りポイント："),
            ("設備", "ベビーカー：\nおむつ替え：\n授乳室："),
            ("配慮事項", "年齢制限：\n体力的配慮：\n興味の持続："),
        ],
    ),
    (
        "対象年齢",
        &[
            ("推奨年齢", "最適年齢：\n下限年齢：\n上限年齢："),
            ("年齢別対応", "幼児向け：\n小学生向け：\n中高生向け："),
            ("調整方法", "難易度調整：\n時間調整：\n内容変更："),
        ],
    ),
    (
        "危険予測",
        &[
            ("物理的危険", "転倒リスク：\n衝突リスク：\n落下リスク："),
            ("環境的危険", "天候影響：\n交通状況：\n人混み："),
            ("対策", "予防策：\n対応手順：\n緊急時連絡："),
        ],
    ),
    (
        "事前学習",
        &[
            ("調査項目", "基本情報：\n利用方法：\nルール・マナー："),
            ("準備資料", "パンフレット：\nWebサイト：\n体験談："),
            ("共有方法", "説明資料：\n事前説明：\n当日説明："),
        ],
    ),
    (
        "気づいたこと",
        &[
            ("発見", "新しい発見：\n意外だった点：\n興味深い点："),
            ("学び", "教育的価値：\n体験の意味：\n今後の活用："),
            ("改善点", "準備不足：\n情報不足：\n計画変更点："),
        ],
    ),
    (
        "オトナが楽しめるポイント",
        &[
            ("大人向け要素", "歴史・文化：\n技術・仕組み：\n芸術・美学："),
            ("リラックス", "休憩スペース：\nカフェ・食事：\n景色・雰囲気："),
            ("学習機会", "専門知識：\n新しい体験：\n話題作り："),
        ],
    ),
    (
        "お土産",
        &[
            ("種類", "食品：\n雑貨：\n記念品："),
            ("価格帯", "予算：\n相場：\nコスパ："),
            ("購入ポイント", "おすすめ：\n注意点：\n保存方法："),
        ],
    ),
    (
        "記念品",
        &[
            ("撮影", "写真スポット：\n撮影ルール：\nデータ保存："),
            ("作品", "制作物：\n持ち帰り：\n保管方法："),
            ("思い出", "印象的場面：\n子どもの反応：\n記録方法："),
        ],
    ),
    (
        "カブブック記録場所検討",
        &[
            ("記録項目", "活動内容：\n学んだこと：\n感想："),
            ("写真選定", "代表写真：\n活動写真：\n集合写真："),
            ("レイアウト", "ページ構成：\nコメント欄：\n装飾アイデア："),
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_default_lists_have_seven_categories() {
        let catalog = CategoryCatalog::builtin();
        for record_type in [RecordType::Building, RecordType::Activity] {
            assert_eq!(catalog.categories(record_type, RecordMode::Default).len(), 7);
            assert_eq!(catalog.custom_options(record_type).len(), 10);
        }
        assert_eq!(
            catalog.default_category_names(RecordType::Building)[0],
            "施設の概要"
        );
    }

    #[test]
    fn custom_categories_have_no_quick_templates() {
        let catalog = CategoryCatalog::builtin();
        let custom = catalog.categories(RecordType::Activity, RecordMode::Custom);
        assert!(custom.iter().all(|c| c.hint.is_none() && c.templates.is_empty()));
        assert!(catalog.category(RecordType::Activity, "集合時間").is_none());
    }

    #[test]
    fn hint_lookup_for_unknown_category_is_empty() {
        let catalog = CategoryCatalog::builtin();
        assert!(catalog.hint_templates("存在しない").is_empty());
        assert_eq!(catalog.hint_templates("トイレ").len(), 3);
    }

    #[test]
    fn toml_catalog_round_trips_through_loader() {
        let raw = r##"
common_tags = ["#a", "#b"]

[building]
default = [{ name = "概要", hint = "hint", templates = ["x："] }]
custom = ["c1", "c2"]

[activity]
default = [{ name = "活動" }]

[hint_templates]
"概要" = [{ name = "n", template = "t" }]
"##;
        let catalog = CategoryCatalog::from_toml_str(raw).expect("catalog");
        assert_eq!(catalog.common_tags(), ["#a", "#b"]);
        assert_eq!(catalog.custom_options(RecordType::Building).len(), 2);
        assert!(catalog.custom_options(RecordType::Activity).is_empty());
        assert_eq!(catalog.hint_templates("概要")[0].template, "t");
    }

    #[test]
    fn toml_catalog_without_defaults_is_rejected() {
        let raw = r##"
common_tags = ["#a"]
[building]
default = []
[activity]
default = [{ name = "活動" }]
"##;
        assert!(CategoryCatalog::from_toml_str(raw).is_err());
    }
}
