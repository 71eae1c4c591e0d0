//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | duplicate email or token |
//! | Database (foreign key violation) | `23503` | `NotFound` | token saved for a deleted principal |
//! | Database (other) | Any other | `Backend` | check constraints, etc. |
//! | PoolClosed / other | N/A | `Backend` | connection failures |
//!
//! ## Atomicity
//!
//! Multi-statement operations run in one transaction. `rotate` additionally
//! takes a row lock on the principal (`SELECT ... FOR UPDATE`) so concurrent
//! logins for the same principal serialize and at most one token stays valid.
//! `reset_password` consumes the reset token with a conditional `UPDATE` first,
//! so a second transaction racing on the same token affects zero rows.
//!
//! Single-column changes to a principal (failure counter, lock, enabled flag)
//! are single `UPDATE ... RETURNING` statements computed in SQL; no method
//! writes back a row read earlier.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use gatekeeper_auth::{IssuedToken, NewPrincipal, Principal, Role};
use gatekeeper_core::{PrincipalId, TokenId};

use super::{LockFilter, PrincipalStore, TokenStore};
use crate::error::StoreError;

const SCHEMA: &str = include_str!("schema.sql");

const PRINCIPAL_COLUMNS: &str = "id, first_name, last_name, email, password_hash, role, \
    enabled, account_non_locked, failed_attempts, created_at";

const TOKEN_COLUMNS: &str = "id, token, revoked, expired, principal_id";

#[derive(Debug, Clone)]
pub struct PostgresAuthStore {
    pool: Arc<PgPool>,
}

impl PostgresAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn insert_principal_tx(
        tx: &mut Transaction<'_, Postgres>,
        principal: &NewPrincipal,
    ) -> Result<Principal, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO principals
                (first_name, last_name, email, password_hash, role, enabled, account_non_locked)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(&principal.first_name)
        .bind(&principal.last_name)
        .bind(&principal.email)
        .bind(&principal.password_hash)
        .bind(principal.role.as_str())
        .bind(principal.enabled)
        .bind(principal.account_non_locked)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_principal", e))?;

        principal_from_row(&row)
    }

    async fn insert_token_tx(
        tx: &mut Transaction<'_, Postgres>,
        principal_id: PrincipalId,
        token: &str,
    ) -> Result<IssuedToken, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO issued_tokens (token, revoked, expired, principal_id)
            VALUES ($1, FALSE, FALSE, $2)
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(principal_id.as_i64())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_token", e))?;

        token_from_row(&row)
    }

    async fn revoke_valid_tx(
        tx: &mut Transaction<'_, Postgres>,
        principal_id: PrincipalId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE issued_tokens
            SET revoked = TRUE, expired = TRUE
            WHERE principal_id = $1 AND NOT revoked AND NOT expired
            "#,
        )
        .bind(principal_id.as_i64())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("revoke_all_valid", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PrincipalStore for PostgresAuthStore {
    #[instrument(skip(self), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_email", e))?;

        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_id", e))?;

        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM principals WHERE email = $1)")
            .bind(email)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists_by_email", e))
    }

    #[instrument(skip(self, principal), fields(email = %principal.email), err)]
    async fn insert(&self, principal: NewPrincipal) -> Result<Principal, StoreError> {
        let mut tx = self.begin("insert").await?;
        let created = Self::insert_principal_tx(&mut tx, &principal).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("insert", e))?;
        Ok(created)
    }

    #[instrument(skip(self, principal, activation_token), fields(email = %principal.email), err)]
    async fn register(
        &self,
        principal: NewPrincipal,
        activation_token: &str,
    ) -> Result<Principal, StoreError> {
        let mut tx = self.begin("register").await?;
        let created = Self::insert_principal_tx(&mut tx, &principal).await?;
        Self::insert_token_tx(&mut tx, created.id, activation_token).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("register", e))?;
        Ok(created)
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn record_failed_attempt(
        &self,
        id: PrincipalId,
        threshold: u32,
    ) -> Result<Principal, StoreError> {
        let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);
        // SET expressions read the pre-update row.
        let sql = format!(
            r#"
            UPDATE principals
            SET failed_attempts = failed_attempts + 1,
                account_non_locked = account_non_locked AND failed_attempts + 1 < $2
            WHERE id = $1
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(threshold)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_failed_attempt", e))?;

        updated_principal(row, id)
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn reset_failed_attempts(&self, id: PrincipalId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE principals SET failed_attempts = 0 WHERE id = $1")
            .bind(id.as_i64())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("reset_failed_attempts", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("principal {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn set_enabled(&self, id: PrincipalId, enabled: bool) -> Result<Principal, StoreError> {
        let sql = format!(
            "UPDATE principals SET enabled = $2 WHERE id = $1 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(enabled)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_enabled", e))?;

        updated_principal(row, id)
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn lock_and_revoke_tokens(&self, id: PrincipalId) -> Result<(Principal, u64), StoreError> {
        let mut tx = self.begin("lock_and_revoke_tokens").await?;
        let sql = format!(
            "UPDATE principals SET account_non_locked = FALSE WHERE id = $1 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_and_revoke_tokens", e))?;
        let locked = updated_principal(row, id)?;
        let revoked = Self::revoke_valid_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("lock_and_revoke_tokens", e))?;
        Ok((locked, revoked))
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn unlock(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        let sql = format!(
            r#"
            UPDATE principals
            SET account_non_locked = TRUE, failed_attempts = 0
            WHERE id = $1
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("unlock", e))?;

        updated_principal(row, id)
    }

    #[instrument(skip(self, password_hash, reset_token), fields(principal_id = %id), err)]
    async fn reset_password(
        &self,
        id: PrincipalId,
        password_hash: &str,
        reset_token: &str,
    ) -> Result<Option<u64>, StoreError> {
        let mut tx = self.begin("reset_password").await?;

        // The row lock makes a concurrent consumer wait, then see `revoked`.
        let consumed = sqlx::query(
            r#"
            UPDATE issued_tokens
            SET revoked = TRUE, expired = TRUE
            WHERE token = $1 AND principal_id = $2 AND NOT revoked AND NOT expired
            "#,
        )
        .bind(reset_token)
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reset_password", e))?;
        if consumed.rows_affected() == 0 {
            return Ok(None);
        }

        let updated = sqlx::query("UPDATE principals SET password_hash = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(password_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reset_password", e))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("principal {id}")));
        }

        let revoked = Self::revoke_valid_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("reset_password", e))?;
        Ok(Some(consumed.rows_affected() + revoked))
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: LockFilter) -> Result<Vec<Principal>, StoreError> {
        let predicate = match filter {
            LockFilter::All => "TRUE",
            LockFilter::Locked => "NOT account_non_locked",
            LockFilter::Unlocked => "account_non_locked",
        };
        let rows = sqlx::query(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE {predicate} ORDER BY id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(principal_from_row).collect()
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn delete(&self, id: PrincipalId) -> Result<bool, StoreError> {
        let mut tx = self.begin("delete").await?;
        sqlx::query("DELETE FROM issued_tokens WHERE principal_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        let result = sqlx::query("DELETE FROM principals WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn delete_unconfirmed(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.begin("delete_unconfirmed").await?;
        sqlx::query(
            r#"
            DELETE FROM issued_tokens
            WHERE principal_id IN (
                SELECT id FROM principals WHERE NOT enabled AND created_at <= $1
            )
            "#,
        )
        .bind(created_before)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_unconfirmed", e))?;
        let result = sqlx::query("DELETE FROM principals WHERE NOT enabled AND created_at <= $1")
            .bind(created_before)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_unconfirmed", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("delete_unconfirmed", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TokenStore for PostgresAuthStore {
    #[instrument(skip(self, token), fields(principal_id = %principal_id), err)]
    async fn save(&self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError> {
        let mut tx = self.begin("save").await?;
        let record = Self::insert_token_tx(&mut tx, principal_id, token).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("save", e))?;
        Ok(record)
    }

    #[instrument(skip(self, token), err)]
    async fn find_token(&self, token: &str) -> Result<Option<IssuedToken>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM issued_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_token", e))?;

        row.as_ref().map(token_from_row).transpose()
    }

    #[instrument(skip(self, token), err)]
    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE issued_tokens SET revoked = TRUE, expired = TRUE WHERE token = $1")
            .bind(token)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn revoke_all_valid(&self, principal_id: PrincipalId) -> Result<u64, StoreError> {
        let mut tx = self.begin("revoke_all_valid").await?;
        let revoked = Self::revoke_valid_tx(&mut tx, principal_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("revoke_all_valid", e))?;
        Ok(revoked)
    }

    #[instrument(skip(self, token), fields(principal_id = %principal_id), err)]
    async fn rotate(&self, principal_id: PrincipalId, token: &str) -> Result<IssuedToken, StoreError> {
        let mut tx = self.begin("rotate").await?;

        let locked = sqlx::query("SELECT id FROM principals WHERE id = $1 FOR UPDATE")
            .bind(principal_id.as_i64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("rotate", e))?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("principal {principal_id}")));
        }

        Self::revoke_valid_tx(&mut tx, principal_id).await?;
        let record = Self::insert_token_tx(&mut tx, principal_id, token).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("rotate", e))?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    async fn purge_revoked_or_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM issued_tokens WHERE revoked OR expired")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_revoked_or_expired", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn tokens_for(&self, principal_id: PrincipalId) -> Result<Vec<IssuedToken>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM issued_tokens WHERE principal_id = $1 ORDER BY id ASC"
        ))
        .bind(principal_id.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tokens_for", e))?;

        rows.iter().map(token_from_row).collect()
    }
}

fn principal_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode principal row: {e}"));

    let role: String = row.try_get("role").map_err(decode)?;
    let role = Role::from_str(&role)
        .map_err(|e| StoreError::Backend(format!("failed to decode principal row: {e}")))?;
    let failed_attempts: i32 = row.try_get("failed_attempts").map_err(decode)?;

    Ok(Principal {
        id: PrincipalId::from_i64(row.try_get("id").map_err(decode)?),
        first_name: row.try_get("first_name").map_err(decode)?,
        last_name: row.try_get("last_name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        role,
        enabled: row.try_get("enabled").map_err(decode)?,
        account_non_locked: row.try_get("account_non_locked").map_err(decode)?,
        failed_attempts: u32::try_from(failed_attempts).unwrap_or(0),
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// Decode the row of an `UPDATE ... RETURNING`; no row means no such principal.
fn updated_principal(row: Option<PgRow>, id: PrincipalId) -> Result<Principal, StoreError> {
    let row = row.ok_or_else(|| StoreError::NotFound(format!("principal {id}")))?;
    principal_from_row(&row)
}

fn token_from_row(row: &PgRow) -> Result<IssuedToken, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode token row: {e}"));

    Ok(IssuedToken {
        id: TokenId::from_i64(row.try_get("id").map_err(decode)?),
        token: row.try_get("token").map_err(decode)?,
        revoked: row.try_get("revoked").map_err(decode)?,
        expired: row.try_get("expired").map_err(decode)?,
        principal_id: PrincipalId::from_i64(row.try_get("principal_id").map_err(decode)?),
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
