use std::sync::Arc;

use chrono::Utc;
use memo_core::{
    aggregate::{compute_stats, filter_by_tag},
    collaborator::MemoStore,
    image::ImageUpload,
    CategoryCatalog, Session, WizardController, WizardStep,
};
use shared::domain::{RecordMode, RecordType, REFLECTION_TAG};
use storage::Storage;

#[tokio::test]
async fn composed_memo_is_persisted_and_revisable() {
    let storage = Storage::new("sqlite::memory:")
        .await
        .expect("db")
        .with_public_base_url("http://memo.test");
    let user = storage.create_user("hanako").await.expect("user");
    let session = Session::new(user).with_email("hanako@example.com");
    let catalog = Arc::new(CategoryCatalog::builtin());

    let mut wizard = WizardController::new(session.clone(), catalog.clone());
    wizard.choose_type(RecordType::Activity).expect("type");
    wizard.choose_mode(RecordMode::Custom).expect("mode");
    wizard.toggle_custom_category("集合時間").expect("first");
    wizard.toggle_custom_category("反省点").expect_err("not a custom option");
    wizard.toggle_custom_category("危険予測").expect("second");
    wizard.confirm_custom_categories().expect("confirm");

    wizard.set_title("川遊び").expect("title");
    wizard.set_block_text("9時 駅前").expect("text");
    wizard.next().expect("next");
    wizard.set_block_text("滑りやすい岩").expect("text");
    wizard.toggle_block_tag(REFLECTION_TAG).expect("tag");
    let url = wizard
        .attach_image(
            &storage,
            ImageUpload {
                bytes: vec![0xFF, 0xD8, 0xFF],
                mime_type: "image/jpeg".into(),
                filename: Some("rock.jpg".into()),
            },
        )
        .await
        .expect("upload");
    wizard.to_review().expect("review");
    wizard.toggle_public().expect("public");
    let memo_id = wizard.save(&storage).await.expect("save");
    assert_eq!(wizard.step(), WizardStep::Saved { memo_id });

    let memo = storage
        .get_memo(memo_id)
        .await
        .expect("get")
        .expect("stored");
    assert_eq!(memo.user_name.as_deref(), Some("hanako"));
    assert_eq!(memo.blocks[1].image_url.as_deref(), Some(url.as_str()));
    assert_eq!(memo.record_mode, RecordMode::Custom);

    let mut edit = WizardController::edit_existing(session, catalog, &memo).expect("edit");
    edit.toggle_public().expect("make private");
    edit.next().expect("last block");
    edit.save(&storage).await.expect("update");

    let memos = storage.list_memos_by_owner(user).await.expect("list");
    assert_eq!(memos.len(), 1);
    assert!(!memos[0].is_public);
    assert_eq!(memos[0].user_name, None);
    assert!(storage.list_public_memos().await.expect("public").is_empty());

    let stats = compute_stats(&memos, &Utc::now());
    assert_eq!(stats.total_count, 1);
    assert_eq!(stats.current_month_count, 1);
    assert_eq!(
        filter_by_tag(&memos, REFLECTION_TAG).len(),
        stats.reflection_count
    );
}
