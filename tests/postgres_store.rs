//! PostgreSQL backend tests. Ignored by default; run with
//! `cargo test -- --ignored` against a database in `DATABASE_URL`.

mod support;

use chrono::Duration;
use sqlx::postgres::PgPoolOptions;

use shelfsync::database::run_migrations;
use shelfsync::events::{ChangeFilter, ChangeOp};
use shelfsync::models::{Domain, ItemId, ItemStatus};
use shelfsync::store::{DurableStore, PgCollectionStore};

use support::item;

async fn store() -> PgCollectionStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    PgCollectionStore::new(pool, "collection_changes")
}

fn unique_user(tag: &str) -> String {
    format!("test-{}-{}", tag, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
#[ignore]
async fn test_upsert_is_last_writer_wins() {
    let store = store().await;
    let user = unique_user("lww");

    let newer = item(Domain::Games, "1", "Newer").with_status(ItemStatus::Completed);
    let mut older = item(Domain::Games, "1", "Older");
    older.updated_at = newer.updated_at - Duration::minutes(5);

    store.upsert(&user, &newer).await.unwrap();
    store.upsert(&user, &older).await.unwrap();

    let collection = store.get_all(&user).await.unwrap();
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.items()[0].title, "Newer");

    let mut replacement = newer.clone();
    replacement.added_at = newer.added_at + Duration::days(30);
    replacement.updated_at = newer.updated_at + Duration::minutes(5);
    store.upsert(&user, &replacement).await.unwrap();
    let collection = store.get_all(&user).await.unwrap();
    assert_eq!(collection.items()[0].added_at, newer.added_at);

    assert!(store.delete(&user, &ItemId::new(Domain::Games, "1")).await.unwrap());
    assert!(!store.delete(&user, &ItemId::new(Domain::Games, "1")).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_notify_reaches_subscriber() {
    let store = store().await;
    let user = unique_user("notify");
    let mut changes = store.subscribe(ChangeFilter::for_user(user.clone())).await.unwrap();

    store
        .upsert(&user, &item(Domain::Books, "dune", "Dune"))
        .await
        .unwrap();

    let notification = tokio::time::timeout(std::time::Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.user_id, user);
    assert_eq!(notification.op, ChangeOp::Insert);
    assert_eq!(notification.item_id.as_deref(), Some("book:dune"));
}
