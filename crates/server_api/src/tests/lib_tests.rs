use super::*;
use shared::domain::REFLECTION_TAG;

async fn setup() -> (ApiContext, UserId) {
    let storage = Storage::new("sqlite::memory:")
        .await
        .expect("db")
        .with_public_base_url("http://memo.test");
    let ctx = ApiContext::new(storage, Arc::new(CategoryCatalog::builtin()));
    let alice = login(&ctx, "alice").await.expect("login").user_id;
    (ctx, alice)
}

fn block(category: &str, text: &str, tags: &[&str], order: u32) -> MemoBlock {
    let mut block = MemoBlock::empty(category, order);
    block.text = Some(text.to_string());
    block.tags = tags.iter().map(|t| t.to_string()).collect();
    block
}

/// A default building memo, submitted back to front.
fn request(user_id: UserId, title: &str, is_public: bool) -> CreateMemoRequest {
    let names = CategoryCatalog::builtin().default_category_names(RecordType::Building);
    let blocks = names
        .iter()
        .enumerate()
        .rev()
        .map(|(i, name)| match name.as_str() {
            "施設の概要" => block(name, "駅から近い", &["#気づき"], i as u32),
            "所感" => block(name, "楽しかった", &[REFLECTION_TAG], i as u32),
            _ => MemoBlock::empty(name.as_str(), i as u32),
        })
        .collect();
    CreateMemoRequest {
        user_id,
        title: title.to_string(),
        blocks,
        is_public,
        record_type: RecordType::Building,
        record_mode: RecordMode::Default,
    }
}

#[tokio::test]
async fn login_creates_user_and_profile_once() {
    let (ctx, alice) = setup().await;
    let again = login(&ctx, "  alice ").await.expect("login again");
    assert_eq!(again.user_id, alice);
    assert_eq!(again.profile.display_name, "alice");

    let err = login(&ctx, "   ").await.expect_err("blank username");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn profile_updates_flow_into_public_author_name() {
    let (ctx, alice) = setup().await;
    save_profile(
        &ctx,
        alice,
        &ProfileUpdate {
            display_name: Some("アリス".into()),
            ..ProfileUpdate::default()
        },
    )
    .await
    .expect("save profile");
    assert_eq!(
        get_profile(&ctx, alice).await.expect("profile").display_name,
        "アリス"
    );

    let memo = create_memo(&ctx, request(alice, "図書館", true))
        .await
        .expect("create");
    assert_eq!(memo.user_name.as_deref(), Some("アリス"));

    let private = create_memo(&ctx, request(alice, "公園", false))
        .await
        .expect("create");
    assert_eq!(private.user_name, None);
}

#[tokio::test]
async fn created_blocks_are_put_in_order() {
    let (ctx, alice) = setup().await;
    let memo = create_memo(&ctx, request(alice, "  博物館  ", false))
        .await
        .expect("create");
    assert_eq!(memo.title, "博物館");
    let names: Vec<String> = memo.blocks.iter().map(|b| b.category_name.clone()).collect();
    assert_eq!(
        names,
        ctx.catalog.default_category_names(RecordType::Building)
    );
    assert!(memo.blocks.iter().enumerate().all(|(i, b)| b.order == i as u32));
}

#[tokio::test]
async fn create_rejects_what_the_wizard_would() {
    let (ctx, alice) = setup().await;

    let err = create_memo(&ctx, request(alice, " ", false))
        .await
        .expect_err("title");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut empty = request(alice, "空", false);
    for block in &mut empty.blocks {
        block.text = Some(String::new());
    }
    let err = create_memo(&ctx, empty).await.expect_err("no text");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut odd_tag = request(alice, "タグ", false);
    odd_tag.blocks[0].tags.push("#独自".into());
    let err = create_memo(&ctx, odd_tag).await.expect_err("unknown tag");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut too_many = request(alice, "多すぎ", false);
    too_many.record_mode = RecordMode::Custom;
    too_many.blocks = (0..11).map(|i| block("お土産", "x", &[], i)).collect();
    let err = create_memo(&ctx, too_many).await.expect_err("cap");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = create_memo(&ctx, request(UserId(999), "誰", false))
        .await
        .expect_err("unknown user");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn default_memos_must_carry_the_catalog_list() {
    let (ctx, alice) = setup().await;

    let mut made_up = request(alice, "でたらめ", false);
    made_up.blocks = vec![block("でたらめ", "x", &[], 0)];
    let err = create_memo(&ctx, made_up).await.expect_err("unknown category");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut short = request(alice, "足りない", false);
    short.blocks.retain(|b| b.category_name != "反省点");
    let err = create_memo(&ctx, short).await.expect_err("missing category");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut swapped = request(alice, "入れ替え", false);
    for block in &mut swapped.blocks {
        block.order = match block.order {
            0 => 1,
            1 => 0,
            other => other,
        };
    }
    let err = create_memo(&ctx, swapped).await.expect_err("out of order");
    assert_eq!(err.code, ErrorCode::Validation);

    let memo = create_memo(&ctx, request(alice, "正しい", false))
        .await
        .expect("create");
    let err = update_memo(
        &ctx,
        memo.id,
        UpdateMemoRequest {
            user_id: alice,
            blocks: Some(vec![block("所感", "だけ", &[], 0)]),
            ..UpdateMemoRequest::default()
        },
    )
    .await
    .expect_err("update drops defaults");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn custom_memos_pick_from_the_offered_options() {
    let (ctx, alice) = setup().await;
    let custom = |blocks: Vec<MemoBlock>| {
        let mut request = request(alice, "カスタム", false);
        request.record_mode = RecordMode::Custom;
        request.blocks = blocks;
        request
    };

    let err = create_memo(&ctx, custom(vec![block("施設の概要", "x", &[], 0)]))
        .await
        .expect_err("default category in custom mode");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = create_memo(&ctx, custom(vec![block("集合時間", "x", &[], 0)]))
        .await
        .expect_err("activity option on a building memo");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = create_memo(
        &ctx,
        custom(vec![
            block("お土産", "x", &[], 0),
            block("お土産", "y", &[], 1),
        ]),
    )
    .await
    .expect_err("duplicate");
    assert_eq!(err.code, ErrorCode::Validation);

    let memo = create_memo(
        &ctx,
        custom(vec![
            block("お土産", "クッキー", &[], 1),
            block("混雑度", "空いていた", &["#気づき"], 0),
        ]),
    )
    .await
    .expect("create");
    let names: Vec<&str> = memo.blocks.iter().map(|b| b.category_name.as_str()).collect();
    assert_eq!(names, ["混雑度", "お土産"]);
}

#[tokio::test]
async fn only_the_owner_may_change_a_memo() {
    let (ctx, alice) = setup().await;
    let bob = login(&ctx, "bob").await.expect("bob").user_id;
    let memo = create_memo(&ctx, request(alice, "秘密", false))
        .await
        .expect("create");

    let err = get_memo(&ctx, bob, memo.id).await.expect_err("private");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = update_memo(
        &ctx,
        memo.id,
        UpdateMemoRequest {
            user_id: bob,
            title: Some("乗っ取り".into()),
            ..UpdateMemoRequest::default()
        },
    )
    .await
    .expect_err("not owner");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = delete_memo(&ctx, bob, memo.id).await.expect_err("not owner");
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert!(get_memo(&ctx, alice, memo.id).await.is_ok());
}

#[tokio::test]
async fn unknown_memos_are_not_found() {
    let (ctx, alice) = setup().await;
    let err = get_memo(&ctx, alice, MemoId(404)).await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = delete_memo(&ctx, alice, MemoId(404)).await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn publishing_sets_and_clears_the_author_name() {
    let (ctx, alice) = setup().await;
    let memo = create_memo(&ctx, request(alice, "動物園", false))
        .await
        .expect("create");

    let published = update_memo(
        &ctx,
        memo.id,
        UpdateMemoRequest {
            user_id: alice,
            is_public: Some(true),
            ..UpdateMemoRequest::default()
        },
    )
    .await
    .expect("publish");
    assert!(published.is_public);
    assert_eq!(published.user_name.as_deref(), Some("alice"));
    assert_eq!(list_public_memos(&ctx).await.expect("feed").len(), 1);

    let withdrawn = update_memo(
        &ctx,
        memo.id,
        UpdateMemoRequest {
            user_id: alice,
            is_public: Some(false),
            ..UpdateMemoRequest::default()
        },
    )
    .await
    .expect("withdraw");
    assert_eq!(withdrawn.user_name, None);
    assert!(list_public_memos(&ctx).await.expect("feed").is_empty());
}

#[tokio::test]
async fn list_applies_keyword_and_tag_filters() {
    let (ctx, alice) = setup().await;
    create_memo(&ctx, request(alice, "Zoo", false)).await.expect("one");
    let mut plain = request(alice, "公園", false);
    plain.record_mode = RecordMode::Custom;
    plain.blocks = vec![block("気づいたこと", "晴れ", &["#アイデア"], 0)];
    create_memo(&ctx, plain).await.expect("two");

    let all = list_memos(&ctx, alice, None, None).await.expect("all");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].title, "公園");

    let zoo = list_memos(&ctx, alice, Some("zoo"), None).await.expect("zoo");
    assert_eq!(zoo.len(), 1);
    let reflections = list_memos(&ctx, alice, Some(""), Some(REFLECTION_TAG))
        .await
        .expect("tag");
    assert_eq!(reflections.len(), 1);
    assert_eq!(reflections[0].title, "Zoo");
}

#[tokio::test]
async fn stats_count_the_owners_memos() {
    let (ctx, alice) = setup().await;
    create_memo(&ctx, request(alice, "一", false)).await.expect("one");
    create_memo(&ctx, request(alice, "二", true)).await.expect("two");

    let stats = stats(&ctx, alice, Some(540)).await.expect("stats");
    assert_eq!(stats.total_count, 2);
    assert_eq!(stats.reflection_count, 2);
    assert_eq!(stats.monthly_counts.len(), 6);
    assert_eq!(stats.top_tags[0].count, 2);

    let err = super::stats(&ctx, alice, Some(100_000)).await.expect_err("offset");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn export_renders_csv_for_visible_memos() {
    let (ctx, alice) = setup().await;
    let memo = create_memo(&ctx, request(alice, "水族館", false))
        .await
        .expect("create");
    let export = export_csv(&ctx, alice, memo.id, None).await.expect("export");
    assert_eq!(export.file_name, "水族館.csv");
    assert!(export.content.contains("\"施設の概要\",\"駅から近い\",\"#気づき\""));
}

#[tokio::test]
async fn image_uploads_are_validated_and_scoped() {
    let (ctx, alice) = setup().await;
    let bob = login(&ctx, "bob").await.expect("bob").user_id;
    let memo = create_memo(&ctx, request(alice, "写真", false))
        .await
        .expect("create");
    let png = |len: usize| ImageUpload {
        bytes: vec![7; len],
        mime_type: "image/png".into(),
        filename: None,
    };

    let uploaded = upload_image(&ctx, alice, Some(memo.id), png(16))
        .await
        .expect("upload");
    assert_eq!(uploaded.size_bytes, 16);
    assert_eq!(
        uploaded.url,
        format!("http://memo.test/images/{}", uploaded.image_id)
    );
    let stored = load_image(&ctx, uploaded.image_id).await.expect("load");
    assert_eq!(stored.memo_id, Some(memo.id));

    let err = upload_image(&ctx, bob, Some(memo.id), png(16))
        .await
        .expect_err("someone else's memo");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = upload_image(
        &ctx,
        alice,
        None,
        png(memo_core::image::MAX_IMAGE_BYTES + 1),
    )
    .await
    .expect_err("too large");
    assert_eq!(err.code, ErrorCode::PayloadTooLarge);

    let err = upload_image(
        &ctx,
        alice,
        None,
        ImageUpload {
            bytes: vec![1],
            mime_type: "image/svg+xml".into(),
            filename: None,
        },
    )
    .await
    .expect_err("svg");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn catalog_view_lists_tags_and_categories() {
    let (ctx, _) = setup().await;
    let view = catalog(&ctx, RecordType::Activity, RecordMode::Custom);
    assert_eq!(view.categories.len(), MAX_CUSTOM_CATEGORIES);
    assert!(view
        .categories
        .iter()
        .all(|c| c.hint.is_none() && c.templates.is_empty()));
    assert!(view.common_tags.iter().any(|t| t == REFLECTION_TAG));

    let defaults = catalog(&ctx, RecordType::Building, RecordMode::Default);
    assert_eq!(defaults.categories.len(), 7);
    assert!(!hint_templates(&ctx, "施設の概要").is_empty());
    assert!(hint_templates(&ctx, "存在しない").is_empty());
}

#[test]
fn internal_errors_keep_their_cause_out_of_the_response() {
    let err = internal(anyhow::anyhow!("sqlx: no such table: memos"));
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(err.message, INTERNAL_ERROR_MESSAGE);
    assert!(!err.message.contains("sqlx"));
}
