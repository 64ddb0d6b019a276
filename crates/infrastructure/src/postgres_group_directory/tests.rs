use rolegate_application::{GroupAttributes, GroupDirectory, MembershipChange, MembershipRemoval};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::PostgresGroupDirectory;

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
        panic!("failed to run migrations for postgres group directory tests: {error}");
    }

    Some(pool)
}

fn unique_group() -> String {
    format!("group-{}@example.com", Uuid::new_v4())
}

#[tokio::test]
async fn memberships_follow_insert_and_delete_outcomes() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let directory = PostgresGroupDirectory::new(pool);
    let group_name = unique_group();
    let attributes = GroupAttributes {
        secondary_approvers: vec!["leads@example.com".to_owned()],
        requestable: true,
        ..GroupAttributes::default()
    };
    assert!(
        directory
            .put_group_attributes(group_name.as_str(), &attributes)
            .await
            .is_ok()
    );

    let upper = group_name.to_uppercase();
    let first = directory.add_member(upper.as_str(), "U1@example.com").await;
    let second = directory.add_member(group_name.as_str(), "u1@example.com").await;
    assert_eq!(first.ok(), Some(MembershipChange::Added));
    assert_eq!(second.ok(), Some(MembershipChange::AlreadyMember));
    assert_eq!(
        directory.members(group_name.as_str()).await.ok(),
        Some(vec!["u1@example.com".to_owned()])
    );

    let removed = directory.remove_member(group_name.as_str(), "u1@example.com").await;
    let again = directory.remove_member(group_name.as_str(), "u1@example.com").await;
    assert_eq!(removed.ok(), Some(MembershipRemoval::Removed));
    assert_eq!(again.ok(), Some(MembershipRemoval::NotMember));
}

#[tokio::test]
async fn unknown_groups_deny_additions_and_have_no_attributes() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let directory = PostgresGroupDirectory::new(pool);
    let group_name = unique_group();

    let added = directory.add_member(group_name.as_str(), "u1@example.com").await;
    assert!(matches!(added, Ok(MembershipChange::Denied(_))));
    assert_eq!(
        directory.group_attributes(group_name.as_str()).await.ok(),
        Some(None)
    );
}

#[tokio::test]
async fn attribute_updates_replace_attributes_and_keep_members() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let directory = PostgresGroupDirectory::new(pool);
    let group_name = unique_group();
    let open = GroupAttributes {
        requestable: true,
        ..GroupAttributes::default()
    };
    assert!(directory.put_group_attributes(group_name.as_str(), &open).await.is_ok());
    assert!(directory.add_member(group_name.as_str(), "u1@example.com").await.is_ok());

    let locked = GroupAttributes {
        self_approval_groups: vec!["sre@example.com".to_owned()],
        restricted: true,
        requestable: false,
        ..GroupAttributes::default()
    };
    assert!(directory.put_group_attributes(group_name.as_str(), &locked).await.is_ok());

    assert_eq!(
        directory.group_attributes(group_name.as_str()).await.ok().flatten(),
        Some(locked)
    );
    assert_eq!(
        directory.members(group_name.as_str()).await.ok().map(|members| members.len()),
        Some(1)
    );
}
