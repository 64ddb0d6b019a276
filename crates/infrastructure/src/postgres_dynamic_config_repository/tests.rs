use rolegate_application::{DynamicConfigRepository, StoredDynamicConfig};
use rolegate_domain::{DYNAMIC_CONFIG_MASTER_ID, DynamicConfigDocument};
use serde_json::json;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{PostgresDynamicConfigRepository, compress_document, decompress_document};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres dynamic config tests: {error}");
    }

    Some(pool)
}

fn version(id: &str, admins: &[&str]) -> StoredDynamicConfig {
    let Ok(document) = DynamicConfigDocument::from_value(json!({ "admins": admins })) else {
        panic!("document should be an object");
    };
    let Ok(checksum) = document.checksum() else {
        panic!("checksum should compute");
    };

    StoredDynamicConfig {
        id: id.to_owned(),
        document,
        checksum,
        updated_by: "alice@example.com".to_owned(),
        updated_at: 1_700_000_000,
    }
}

#[test]
fn compression_preserves_the_document() {
    let original = version("1", &["admins@example.com"]).document;
    let Ok(compressed) = compress_document(&original) else {
        panic!("document should compress");
    };
    assert_eq!(decompress_document(compressed.as_slice()).ok(), Some(original));
}

#[test]
fn corrupt_bytes_are_reported() {
    assert!(decompress_document(b"not zlib").is_err());
}

#[tokio::test]
async fn compare_and_swap_master_honors_the_expected_checksum() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let cleanup = sqlx::query("DELETE FROM dynamic_config WHERE id = $1")
        .bind(DYNAMIC_CONFIG_MASTER_ID)
        .execute(&pool)
        .await;
    assert!(cleanup.is_ok());

    let repository = PostgresDynamicConfigRepository::new(pool);
    let first = version(DYNAMIC_CONFIG_MASTER_ID, &["a@example.com"]);
    let second = version(DYNAMIC_CONFIG_MASTER_ID, &["b@example.com"]);

    assert_eq!(
        repository.compare_and_swap_master(None, first.clone()).await.ok(),
        Some(true)
    );
    assert_eq!(
        repository.compare_and_swap_master(None, second.clone()).await.ok(),
        Some(false)
    );
    assert_eq!(
        repository
            .compare_and_swap_master(Some("stale"), second.clone())
            .await
            .ok(),
        Some(false)
    );
    assert_eq!(
        repository
            .compare_and_swap_master(Some(first.checksum.as_str()), second.clone())
            .await
            .ok(),
        Some(true)
    );

    let stored = repository.find_version(DYNAMIC_CONFIG_MASTER_ID).await;
    assert_eq!(stored.ok().flatten(), Some(second));
}

#[tokio::test]
async fn archived_ids_are_unique_and_listed_newest_first() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let cleanup = sqlx::query("DELETE FROM dynamic_config WHERE id LIKE '9%' AND length(id) = 19")
        .execute(&pool)
        .await;
    assert!(cleanup.is_ok());

    let repository = PostgresDynamicConfigRepository::new(pool);
    let base =9_000_000_000_000_000_u64 + u64::from(Uuid::new_v4().as_fields().1);
    let older = version(base.to_string().as_str(), &["a@example.com"]);
    let newer = version((base + 1).to_string().as_str(), &["b@example.com"]);

    assert!(repository.insert_archive(older.clone()).await.is_ok());
    assert!(repository.insert_archive(newer.clone()).await.is_ok());
    assert!(matches!(
        repository.insert_archive(older.clone()).await,
        Err(rolegate_core::AppError::Conflict(_))
    ));

    let Ok(ids) = repository.list_archive_ids(500).await else {
        panic!("archive ids should list");
    };
    let newer_position = ids.iter().position(|id| *id == newer.id);
    let older_position = ids.iter().position(|id| *id == older.id);
    assert!(matches!(
        (newer_position, older_position),
        (Some(newer), Some(older)) if newer < older
    ));
    assert!(!ids.iter().any(|id| id == DYNAMIC_CONFIG_MASTER_ID));
}
