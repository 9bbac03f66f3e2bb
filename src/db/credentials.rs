//! # Credential Database Operations
//!
//! This module handles CRUD operations for passkey credentials.
//! Credentials contain the public keys used to verify user authentication.
//!
//! ## Security Note
//! Only public keys are stored - private keys never leave the user's device.

use crate::db::is_unique_violation;
use crate::db::models::PasskeyCredential;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqlitePool;

/// Save a new passkey credential to the database
///
/// Called once the attestation verified, before the identity provider is
/// touched. A credential id that is already stored is a `Conflict`.
pub async fn save_credential(pool: &SqlitePool, credential: &PasskeyCredential) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO passkey_credentials
         (credential_id, user_id, public_key, signature_count, friendly_name, created_at, last_used_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&credential.credential_id)
    .bind(&credential.user_id)
    .bind(&credential.public_key) // Byte array stored as BLOB
    .bind(credential.signature_count)
    .bind(&credential.friendly_name)
    .bind(&credential.created_at)
    .bind(&credential.last_used_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Credential is already registered".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    Ok(())
}

/// Get all credentials for a user
///
/// ## Returns
/// - Empty vector if user has no credentials
/// - Error only if database operation fails
pub async fn find_by_user_id(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<PasskeyCredential>> {
    let credentials = sqlx::query_as::<_, PasskeyCredential>(
        "SELECT * FROM passkey_credentials WHERE user_id = ? ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(credentials)
}

pub async fn find_by_credential_id(
    pool: &SqlitePool,
    credential_id: &[u8],
) -> AppResult<PasskeyCredential> {
    sqlx::query_as::<_, PasskeyCredential>(
        "SELECT * FROM passkey_credentials WHERE credential_id = ?",
    )
    .bind(credential_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Credential not found".to_string()))
}

/// Remove one credential; used to roll back a registration
pub async fn delete_credential(pool: &SqlitePool, credential_id: &[u8]) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM passkey_credentials WHERE credential_id = ?")
        .bind(credential_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Credential not found".to_string()));
    }

    Ok(())
}

/// Record a successful authentication with this credential
///
/// ## Security: Signature Counter
/// - Each authentication reports a counter from the authenticator
/// - If counter goes backwards → credential may be cloned → verification rejects it
/// - Also updates last_used_at timestamp for auditing
///
/// `public_key` is the re-serialized passkey when verification changed any
/// of its stored state; `None` keeps the stored blob.
pub async fn record_assertion(
    pool: &SqlitePool,
    credential_id: &[u8],
    signature_count: u32,
    public_key: Option<&[u8]>,
) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        "UPDATE passkey_credentials
         SET signature_count = ?, public_key = COALESCE(?, public_key), last_used_at = ?
         WHERE credential_id = ?",
    )
    .bind(i64::from(signature_count))
    .bind(public_key)
    .bind(now)
    .bind(credential_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Credential not found".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, users};

    async fn pool_with_user() -> (SqlitePool, String) {
        let pool = connect_in_memory().await.expect("db");
        let user = users::create_user(&pool, "alice", "Alice").await.expect("user");
        (pool, user.id)
    }

    #[tokio::test]
    async fn saved_credentials_are_listed_per_user() {
        let (pool, user_id) = pool_with_user().await;
        let credential =
            PasskeyCredential::new(vec![1, 2, 3], user_id.clone(), vec![9; 8], 0, Some("key".into()));

        save_credential(&pool, &credential).await.expect("saved");

        let listed = find_by_user_id(&pool, &user_id).await.expect("listed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].credential_id, vec![1, 2, 3]);
        assert_eq!(listed[0].friendly_name.as_deref(), Some("key"));
        assert!(find_by_user_id(&pool, "someone-else").await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn duplicate_credential_id_is_a_conflict() {
        let (pool, user_id) = pool_with_user().await;
        let credential = PasskeyCredential::new(vec![7], user_id, vec![1], 0, None);

        save_credential(&pool, &credential).await.expect("saved");
        let err = save_credential(&pool, &credential).await.expect_err("duplicate");
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn assertion_updates_counter_and_last_use() {
        let (pool, user_id) = pool_with_user().await;
        let credential = PasskeyCredential::new(vec![7], user_id, vec![1, 1], 0, None);
        save_credential(&pool, &credential).await.expect("saved");

        record_assertion(&pool, &[7], 5, None).await.expect("recorded");
        let stored = find_by_credential_id(&pool, &[7]).await.expect("stored");
        assert_eq!(stored.signature_count, 5);
        assert_eq!(stored.public_key, vec![1, 1]);
        assert!(stored.last_used_at.is_some());

        record_assertion(&pool, &[7], 6, Some(&[2, 2])).await.expect("recorded");
        let stored = find_by_credential_id(&pool, &[7]).await.expect("stored");
        assert_eq!(stored.public_key, vec![2, 2]);
    }

    #[tokio::test]
    async fn credentials_are_removed_with_their_user() {
        let (pool, user_id) = pool_with_user().await;
        let credential = PasskeyCredential::new(vec![7], user_id.clone(), vec![1], 0, None);
        save_credential(&pool, &credential).await.expect("saved");

        users::delete_user(&pool, &user_id).await.expect("deleted");
        assert!(matches!(
            find_by_credential_id(&pool, &[7]).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_missing_credential_is_not_found() {
        let (pool, _) = pool_with_user().await;
        assert!(matches!(
            delete_credential(&pool, &[42]).await,
            Err(AppError::NotFound(_))
        ));
    }
}
