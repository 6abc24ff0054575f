use std::sync::Arc;

use page_engine::error::AppError;
use page_engine::infrastructure::{
    InMemoryRegistry, NewPageRow, PageStore, SqlitePageStore, WidgetTypeRegistry,
};
use page_engine::models::{CreatePage, SlugConflictMode};
use page_engine::PageEngine;

async fn engine() -> PageEngine {
    page_engine::init_tracing();
    PageEngine::in_memory(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(WidgetTypeRegistry::permissive()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn sibling_slugs_auto_rename_deterministically() {
    let engine = engine().await;
    let root = engine
        .pages
        .create_page(CreatePage::new(None, "site"))
        .await
        .unwrap();

    let first = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "about"))
        .await
        .unwrap();
    let second = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "about"))
        .await
        .unwrap();
    let third = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "about"))
        .await
        .unwrap();

    assert_eq!(first.page.slug, "about");
    assert!(!first.renamed);
    assert_eq!(second.page.slug, "about-2");
    assert!(second.renamed);
    assert_eq!(second.requested_slug, "about");
    assert_eq!(third.page.slug, "about-3");
}

#[tokio::test]
async fn reject_mode_fails_on_conflict() {
    let engine = engine().await;
    engine
        .pages
        .create_page(CreatePage::new(None, "home"))
        .await
        .unwrap();

    let err = engine
        .pages
        .create_page(CreatePage::new(None, "home").with_slug_mode(SlugConflictMode::Reject))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SlugConflict { .. }));
}

#[tokio::test]
async fn reserved_slugs_count_as_taken() {
    let engine = engine().await;
    let created = engine
        .pages
        .create_page(CreatePage::new(None, "news").with_reserved_slugs(vec!["news".to_string()]))
        .await
        .unwrap();
    assert_eq!(created.page.slug, "news-2");
    assert!(created.renamed);
}

#[tokio::test]
async fn same_slug_allowed_under_different_parents() {
    let engine = engine().await;
    let a = engine
        .pages
        .create_page(CreatePage::new(None, "a"))
        .await
        .unwrap();
    let b = engine
        .pages
        .create_page(CreatePage::new(None, "b"))
        .await
        .unwrap();

    let under_a = engine
        .pages
        .create_page(CreatePage::new(Some(a.page.id), "team"))
        .await
        .unwrap();
    let under_b = engine
        .pages
        .create_page(CreatePage::new(Some(b.page.id), "team"))
        .await
        .unwrap();
    assert_eq!(under_a.page.slug, "team");
    assert_eq!(under_b.page.slug, "team");
}

#[tokio::test]
async fn soft_deleted_sibling_frees_its_slug() {
    let engine = engine().await;
    let first = engine
        .pages
        .create_page(CreatePage::new(None, "legal"))
        .await
        .unwrap();
    engine.pages.soft_delete(first.page.id).await.unwrap();

    let second = engine
        .pages
        .create_page(CreatePage::new(None, "legal"))
        .await
        .unwrap();
    assert_eq!(second.page.slug, "legal");
    assert!(!second.renamed);
}

#[tokio::test]
async fn slugs_are_normalized() {
    let engine = engine().await;
    let created = engine
        .pages
        .create_page(CreatePage::new(None, "  About Us!  "))
        .await
        .unwrap();
    assert_eq!(created.page.slug, "about-us");
}

#[tokio::test]
async fn reparent_to_descendant_is_rejected_and_tree_unchanged() {
    let engine = engine().await;
    let root = engine
        .pages
        .create_page(CreatePage::new(None, "root"))
        .await
        .unwrap();
    let child = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "child"))
        .await
        .unwrap();
    let grandchild = engine
        .pages
        .create_page(CreatePage::new(Some(child.page.id), "grandchild"))
        .await
        .unwrap();

    let err = engine
        .pages
        .reparent(root.page.id, Some(grandchild.page.id), SlugConflictMode::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CyclicParent { .. }));

    let err = engine
        .pages
        .reparent(root.page.id, Some(root.page.id), SlugConflictMode::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CyclicParent { .. }));

    // Nothing moved.
    let root_after = engine.pages.get_page(root.page.id).await.unwrap();
    assert_eq!(root_after.parent_id, None);
    let ancestors = engine.pages.ancestors(grandchild.page.id).await.unwrap();
    let ids: Vec<_> = ancestors.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![root.page.id, child.page.id]);
}

#[tokio::test]
async fn reparent_moves_subtree() {
    let engine = engine().await;
    let root = engine
        .pages
        .create_page(CreatePage::new(None, "root"))
        .await
        .unwrap();
    let left = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "left"))
        .await
        .unwrap();
    let right = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "right"))
        .await
        .unwrap();
    let leaf = engine
        .pages
        .create_page(CreatePage::new(Some(left.page.id), "leaf"))
        .await
        .unwrap();

    engine
        .pages
        .reparent(leaf.page.id, Some(right.page.id), SlugConflictMode::Reject)
        .await
        .unwrap();

    let ancestors = engine.pages.ancestors(leaf.page.id).await.unwrap();
    let ids: Vec<_> = ancestors.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![root.page.id, right.page.id]);
}

#[tokio::test]
async fn hard_delete_requires_soft_deleted_leaf() {
    let engine = engine().await;
    let root = engine
        .pages
        .create_page(CreatePage::new(None, "root"))
        .await
        .unwrap();
    let child = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "child"))
        .await
        .unwrap();

    // Not soft-deleted yet.
    assert!(engine.pages.hard_delete(child.page.id).await.is_err());

    // Soft-deleted but has a child.
    engine.pages.soft_delete(root.page.id).await.unwrap();
    assert!(engine.pages.hard_delete(root.page.id).await.is_err());

    engine.pages.soft_delete(child.page.id).await.unwrap();
    engine.pages.hard_delete(child.page.id).await.unwrap();
    assert!(engine.pages.get_page(child.page.id).await.is_err());
}

#[tokio::test]
async fn path_and_hostname_lookup() {
    let engine = engine().await;
    let root = engine
        .pages
        .create_page(
            CreatePage::new(None, "docs").with_hostnames(vec!["docs.example.com".to_string()]),
        )
        .await
        .unwrap();
    let guide = engine
        .pages
        .create_page(CreatePage::new(Some(root.page.id), "guide"))
        .await
        .unwrap();

    let found = engine.pages.page_by_path("/docs/guide").await.unwrap();
    assert_eq!(found.id, guide.page.id);
    assert!(engine.pages.page_by_path("/docs/missing").await.is_err());

    let by_host = engine
        .pages
        .find_root_by_hostname("docs.example.com")
        .await
        .unwrap();
    assert_eq!(by_host.map(|p| p.id), Some(root.page.id));
    assert!(engine
        .pages
        .find_root_by_hostname("other.example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn file_backed_store_persists_across_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("pages.db").display());

    let page_id = {
        let store = SqlitePageStore::new(&url).await.unwrap();
        store
            .insert_page(NewPageRow {
                parent_id: None,
                slug: "home".to_string(),
                sort_order: 0,
                hostnames: vec![],
                code_layout: None,
                theme: None,
            })
            .await
            .unwrap()
            .id
    };

    let store = SqlitePageStore::new(&url).await.unwrap();
    let page = store.get_page(page_id).await.unwrap().unwrap();
    assert_eq!(page.slug, "home");
}
