use crate::db::is_unique_violation;
use crate::db::models::{RegistrationStatus, User};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqlitePool;

/// Trim and lowercase a username the way the identity provider stores it
///
/// Every flow keyed by username goes through this first, so "Alice" and
/// "alice" are one user locally, in the challenge caches and in the
/// identity provider.
pub fn normalize_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("username must not be blank".to_string()));
    }
    Ok(username.to_lowercase())
}

pub async fn create_user(pool: &SqlitePool, username: &str, display_name: &str) -> AppResult<User> {
    let user = User::new(username.to_string(), display_name.to_string());

    sqlx::query(
        "INSERT INTO users
         (id, username, display_name, handle, external_identity_id, registration_status,
          registered_at, completed_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.display_name)
    .bind(&user.handle)
    .bind(&user.external_identity_id)
    .bind(user.registration_status)
    .bind(&user.registered_at)
    .bind(&user.completed_at)
    .bind(&user.updated_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("User '{}' already exists", username))
        } else {
            AppError::Database(e)
        }
    })?;

    Ok(user)
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", username)))
}

pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id '{}' not found", user_id)))
}

pub async fn find_by_handle(pool: &SqlitePool, handle: &[u8]) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE handle = ?")
        .bind(handle)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User handle not found".to_string()))
}

pub async fn username_exists(pool: &SqlitePool, username: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Mark a pending user as registered with its identity provider account
pub async fn complete_registration(
    pool: &SqlitePool,
    user_id: &str,
    external_identity_id: &str,
) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        "UPDATE users
         SET external_identity_id = ?, registration_status = ?, completed_at = ?, updated_at = ?
         WHERE id = ? AND registration_status = ?",
    )
    .bind(external_identity_id)
    .bind(RegistrationStatus::Completed)
    .bind(&now)
    .bind(&now)
    .bind(user_id)
    .bind(RegistrationStatus::Pending)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Pending user with id '{}' not found",
            user_id
        )));
    }

    Ok(())
}

/// Delete a user; their credentials go with them (ON DELETE CASCADE)
pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id '{}' not found", user_id)));
    }

    Ok(())
}
