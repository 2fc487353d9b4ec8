//! Repository tests against a live Postgres database.
//!
//! Each test gets its own database with the schema applied, so the
//! conditional check-in insert and the guarded checkout update are
//! exercised against the real partial unique index.

use salestrackr_common::{
    auth::Role,
    db::{DbPool, Repository},
    errors::AppError,
};
use sea_orm::SqlxPostgresConnector;
use uuid::Uuid;

fn repo_from(pool: sqlx::PgPool) -> Repository {
    let primary = SqlxPostgresConnector::from_sqlx_postgres_pool(pool);
    Repository::new(DbPool {
        primary,
        replica: None,
    })
}

async fn seed_agent(repo: &Repository, email: &str) -> Uuid {
    repo.create_user(
        "Test Agent".to_string(),
        email.to_string(),
        "unused-hash".to_string(),
        Role::Agent,
    )
    .await
    .unwrap()
    .id
}

async fn seed_client(repo: &Repository) -> Uuid {
    repo.create_client(
        "Acme Foods".to_string(),
        "1 Main St".to_string(),
        40.7,
        -74.0,
        "North".to_string(),
        false,
        None,
        false,
    )
    .await
    .unwrap()
    .id
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_email_is_rejected_case_insensitively(pool: sqlx::PgPool) {
    let repo = repo_from(pool);

    seed_agent(&repo, "alice@x.com").await;

    let err = repo
        .create_user(
            "Impostor".to_string(),
            "ALICE@X.COM".to_string(),
            "unused-hash".to_string(),
            Role::Agent,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DuplicateEmail));

    let found = repo.find_user_by_email("Alice@X.Com").await.unwrap();
    assert!(found.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_check_in_has_exactly_one_winner(pool: sqlx::PgPool) {
    let repo = repo_from(pool);
    let agent = seed_agent(&repo, "alice@x.com").await;
    let client = seed_client(&repo).await;

    let (first, second) = tokio::join!(
        repo.check_in_visit(agent, client),
        repo.check_in_visit(agent, client)
    );

    let winners = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(winners, 1);

    let active = repo.find_active_visit(agent).await.unwrap();
    assert!(active.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn check_in_resolves_references(pool: sqlx::PgPool) {
    let repo = repo_from(pool);
    let agent = seed_agent(&repo, "alice@x.com").await;
    let client = seed_client(&repo).await;

    let record = repo.check_in_visit(agent, client).await.unwrap().unwrap();
    assert_eq!(record.client_name, "Acme Foods");
    assert_eq!(record.client_address, "1 Main St");
    assert_eq!(record.agent_email, "alice@x.com");
    assert!(record.check_out_time.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn double_checkout_has_exactly_one_winner(pool: sqlx::PgPool) {
    let repo = repo_from(pool);
    let agent = seed_agent(&repo, "alice@x.com").await;
    let client = seed_client(&repo).await;

    let record = repo.check_in_visit(agent, client).await.unwrap().unwrap();

    let closed = repo.close_visit(record.id).await.unwrap();
    assert!(closed.is_some());
    assert!(closed.unwrap().check_out_time.is_some());

    // Already closed: the guarded update matches no row
    let again = repo.close_visit(record.id).await.unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn check_in_allowed_again_after_checkout(pool: sqlx::PgPool) {
    let repo = repo_from(pool);
    let agent = seed_agent(&repo, "alice@x.com").await;
    let client = seed_client(&repo).await;

    let first = repo.check_in_visit(agent, client).await.unwrap().unwrap();

    // Blocked while the first is open
    assert!(repo.check_in_visit(agent, client).await.unwrap().is_none());

    repo.close_visit(first.id).await.unwrap().unwrap();

    let second = repo.check_in_visit(agent, client).await.unwrap();
    assert!(second.is_some());
    assert_ne!(second.unwrap().id, first.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn open_visits_do_not_block_other_agents(pool: sqlx::PgPool) {
    let repo = repo_from(pool);
    let alice = seed_agent(&repo, "alice@x.com").await;
    let bob = seed_agent(&repo, "bob@x.com").await;
    let client = seed_client(&repo).await;

    assert!(repo.check_in_visit(alice, client).await.unwrap().is_some());
    assert!(repo.check_in_visit(bob, client).await.unwrap().is_some());

    assert!(repo.find_active_visit(alice).await.unwrap().is_some());
    assert!(repo.find_active_visit(bob).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn expired_sessions_are_purged(pool: sqlx::PgPool) {
    let repo = repo_from(pool);
    let agent = seed_agent(&repo, "alice@x.com").await;

    repo.create_session(
        "hash-live".to_string(),
        agent,
        Role::Agent,
        chrono::Duration::days(7),
    )
    .await
    .unwrap();

    let expired = repo
        .create_session(
            "hash-expired".to_string(),
            agent,
            Role::Agent,
            chrono::Duration::hours(-1),
        )
        .await
        .unwrap();
    assert!(expired.is_expired());

    let deleted = repo.delete_expired_sessions().await.unwrap();
    assert_eq!(deleted, 1);

    assert!(repo.find_session("hash-live").await.unwrap().is_some());
    assert!(repo.find_session("hash-expired").await.unwrap().is_none());
}
