//! Attachment relocation and privacy policy tests against the full app state.

mod helpers;

use axum::http::StatusCode;
use helpers::TestApp;
use pm_server::permissions::PermissionSet;

#[tokio::test]
async fn test_policy_round_trip_restores_private_files() {
    let app = TestApp::new().await;
    let mut attachment = app
        .add_attachment(1, "2024/05/a.jpg", b"a", Some(PermissionSet::for_roles(["editor"])))
        .await;
    attachment.sizes = vec!["a-300x200.jpg".into()];
    app.store.insert_attachment(attachment);
    app.write_file(true, "2024/05/a-300x200.jpg", b"variant").await;
    app.add_attachment(2, "2024/05/b.jpg", b"b", None).await;

    let report = app.state.media.apply_policy(false).await.unwrap();
    assert_eq!(report.attachments, 1);
    assert_eq!(report.moved, 2);
    assert!(report.failed.is_empty());
    assert!(app.file_exists(false, "2024/05/a.jpg").await);
    assert!(app.file_exists(false, "2024/05/a-300x200.jpg").await);
    assert!(app.state.media.is_private(1).await.unwrap());

    let report = app.state.media.apply_policy(true).await.unwrap();
    assert_eq!(report.moved, 2);
    assert!(app.file_exists(true, "2024/05/a.jpg").await);
    assert!(app.file_exists(true, "2024/05/a-300x200.jpg").await);
    assert!(app.file_exists(false, "2024/05/b.jpg").await);

    let editor = app.login("tok", &["editor"]);
    let resp = app.get(&app.private_uri("2024/05/a-300x200.jpg"), Some(&editor)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_policy_is_idempotent() {
    let app = TestApp::new().await;
    app.add_attachment(1, "x.png", b"x", Some(PermissionSet::for_roles(["author"])))
        .await;

    let first = app.state.media.apply_policy(true).await.unwrap();
    let second = app.state.media.apply_policy(true).await.unwrap();
    assert_eq!(first.attachments, 1);
    assert_eq!(second.attachments, 1);
    assert!(second.failed.is_empty());
    assert!(app.file_exists(true, "x.png").await);
}

#[tokio::test]
async fn test_concurrent_updates_settle_on_one_location() {
    let app = TestApp::new().await;
    app.add_attachment(1, "race.png", b"r", None).await;
    let media = app.state.media.clone();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let media = media.clone();
            tokio::spawn(async move {
                let set = if i % 2 == 0 {
                    PermissionSet::for_roles(["editor"])
                } else {
                    PermissionSet::default()
                };
                media.set_permissions(1, set).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let private = media.is_private(1).await.unwrap();
    assert!(app.file_exists(private, "race.png").await);
    assert!(!app.file_exists(!private, "race.png").await);
}

#[tokio::test]
async fn test_permissions_only_change_keeps_files_in_place() {
    let app = TestApp::new().await;
    app.add_attachment(1, "keep.png", b"k", Some(PermissionSet::for_roles(["editor"])))
        .await;

    let relocated = app
        .state
        .media
        .set_permissions(1, PermissionSet::for_roles(["author", "editor"]))
        .await
        .unwrap();
    assert!(!relocated);
    assert!(app.file_exists(true, "keep.png").await);

    let stored = app.state.media.get_permissions(1).await.unwrap().unwrap();
    assert!(stored.roles.contains("author"));
}
