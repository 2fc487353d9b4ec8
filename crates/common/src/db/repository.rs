//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling. The visit check-in is the one place
//! where a multi-row invariant exists (at most one open visit per
//! agent), so it goes through a conditional raw SQL insert instead
//! of the query builder.

use crate::auth::Role;
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter for visit listing; supplied filters are AND-combined
#[derive(Debug, Clone, Copy, Default)]
pub struct VisitFilter {
    pub agent_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub active_only: bool,
}

/// A visit with its client and agent references resolved read-side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub agent_id: Uuid,
    pub check_in_time: chrono::DateTime<chrono::FixedOffset>,
    pub check_out_time: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub client_name: String,
    pub client_address: String,
    pub agent_name: String,
    pub agent_email: String,
}

const VISIT_RECORD_SELECT: &str = r#"
    SELECT v.id, v.client_id, v.agent_id, v.check_in_time, v.check_out_time,
           c.name AS client_name, c.address AS client_address,
           u.name AS agent_name, u.email AS agent_email
    FROM visits v
    JOIN clients c ON v.client_id = c.id
    JOIN users u ON v.agent_id = u.id
"#;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations (Identity Store)
    // ========================================================================

    /// Create a new user. The email is stored lowercased so the unique
    /// index enforces case-insensitive uniqueness.
    pub async fn create_user(
        &self,
        name: String,
        email: String,
        password_hash: String,
        role: Role,
    ) -> Result<User> {
        let now = chrono::Utc::now();

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email.to_lowercase()),
            password_hash: Set(password_hash),
            role: Set(role.as_str().to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        user.insert(self.write_conn()).await.map_err(|e| {
            // Two concurrent registrations can race past the existence
            // check; the unique index settles it.
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AppError::DuplicateEmail
            } else {
                e.into()
            }
        })
    }

    /// Find user by email (case-insensitive)
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email.to_lowercase()))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Session Operations (Auth Gate)
    // ========================================================================

    /// Persist a new session. The caller generates the token and passes
    /// only its hash here; login/register responses wait for this write
    /// to be acknowledged before emitting the cookie.
    pub async fn create_session(
        &self,
        token_hash: String,
        user_id: Uuid,
        role: Role,
        ttl: chrono::Duration,
    ) -> Result<Session> {
        let now = chrono::Utc::now();

        let session = SessionActiveModel {
            token_hash: Set(token_hash),
            user_id: Set(user_id),
            role: Set(role.as_str().to_string()),
            created_at: Set(now.into()),
            expires_at: Set((now + ttl).into()),
        };

        session.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a session by token hash
    pub async fn find_session(&self, token_hash: &str) -> Result<Option<Session>> {
        SessionEntity::find_by_id(token_hash.to_string())
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a session by token hash. Idempotent; returns whether a
    /// row was actually removed.
    pub async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let result = SessionEntity::delete_by_id(token_hash.to_string())
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Remove all expired sessions; returns the number deleted
    pub async fn delete_expired_sessions(&self) -> Result<u64> {
        let now: chrono::DateTime<chrono::FixedOffset> = chrono::Utc::now().into();
        let result = SessionEntity::delete_many()
            .filter(SessionColumn::ExpiresAt.lt(now))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Client Operations
    // ========================================================================

    /// Create a new client
    #[allow(clippy::too_many_arguments)]
    pub async fn create_client(
        &self,
        name: String,
        address: String,
        lat: f64,
        lng: f64,
        region: String,
        has_complaint: bool,
        complaint_note: Option<String>,
        requested_visit: bool,
    ) -> Result<Client> {
        let now = chrono::Utc::now();

        let client = ClientActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            address: Set(address),
            lat: Set(lat),
            lng: Set(lng),
            region: Set(region),
            has_complaint: Set(has_complaint),
            complaint_note: Set(complaint_note),
            requested_visit: Set(requested_visit),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        client.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find client by ID
    pub async fn find_client_by_id(&self, id: Uuid) -> Result<Option<Client>> {
        ClientEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List all clients ordered by name
    pub async fn list_clients(&self) -> Result<Vec<Client>> {
        ClientEntity::find()
            .order_by_asc(ClientColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Visit Operations (Visit Ledger)
    // ========================================================================

    /// Check in: insert a visit only if the agent has no open one.
    ///
    /// The check-and-insert is a single statement, so two concurrent
    /// check-ins by the same agent cannot both succeed; the partial
    /// unique index on (agent_id) WHERE check_out_time IS NULL backs
    /// the same invariant at the schema level. The client and agent
    /// references are joined in the same statement on the write
    /// connection, so a lagging replica cannot hide the new row.
    /// Returns None when an open visit already exists.
    pub async fn check_in_visit(
        &self,
        agent_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<VisitRecord>> {
        let now = chrono::Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            WITH inserted AS (
                INSERT INTO visits (id, client_id, agent_id, check_in_time, check_out_time, created_at)
                SELECT $1, $2, $3, $4, NULL, $4
                WHERE NOT EXISTS (
                    SELECT 1 FROM visits WHERE agent_id = $3 AND check_out_time IS NULL
                )
                RETURNING id, client_id, agent_id, check_in_time, check_out_time
            )
            SELECT v.id, v.client_id, v.agent_id, v.check_in_time, v.check_out_time,
                   c.name AS client_name, c.address AS client_address,
                   u.name AS agent_name, u.email AS agent_email
            FROM inserted v
            JOIN clients c ON v.client_id = c.id
            JOIN users u ON v.agent_id = u.id
            "#,
            vec![
                Uuid::new_v4().into(),
                client_id.into(),
                agent_id.into(),
                now.into(),
            ],
        );

        let row = match self.write_conn().query_one(stmt).await {
            Ok(row) => row,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Lost the race against another check-in for this agent
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match row {
            Some(row) => Ok(Some(row_to_visit_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Find visit by ID
    pub async fn find_visit_by_id(&self, id: Uuid) -> Result<Option<Visit>> {
        VisitEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Close a visit. Guarded on the open state, so a concurrent double
    /// checkout resolves to exactly one winner; returns None when the
    /// visit was already closed. Like check-in, the projection is
    /// resolved in the same statement on the write connection.
    pub async fn close_visit(&self, visit_id: Uuid) -> Result<Option<VisitRecord>> {
        let now = chrono::Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            WITH closed AS (
                UPDATE visits SET check_out_time = $2
                WHERE id = $1 AND check_out_time IS NULL
                RETURNING id, client_id, agent_id, check_in_time, check_out_time
            )
            SELECT v.id, v.client_id, v.agent_id, v.check_in_time, v.check_out_time,
                   c.name AS client_name, c.address AS client_address,
                   u.name AS agent_name, u.email AS agent_email
            FROM closed v
            JOIN clients c ON v.client_id = c.id
            JOIN users u ON v.agent_id = u.id
            "#,
            vec![visit_id.into(), now.into()],
        );

        match self.write_conn().query_one(stmt).await? {
            Some(row) => Ok(Some(row_to_visit_record(&row)?)),
            None => Ok(None),
        }
    }

    /// The agent's open visit with the client reference resolved, or None
    pub async fn find_active_visit(&self, agent_id: Uuid) -> Result<Option<VisitRecord>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "{} WHERE v.agent_id = $1 AND v.check_out_time IS NULL",
                VISIT_RECORD_SELECT
            ),
            vec![agent_id.into()],
        );

        match self.read_conn().query_one(stmt).await? {
            Some(row) => Ok(Some(row_to_visit_record(&row)?)),
            None => Ok(None),
        }
    }

    /// A single visit with references resolved
    pub async fn find_visit_record(&self, visit_id: Uuid) -> Result<Option<VisitRecord>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!("{} WHERE v.id = $1", VISIT_RECORD_SELECT),
            vec![visit_id.into()],
        );

        match self.read_conn().query_one(stmt).await? {
            Some(row) => Ok(Some(row_to_visit_record(&row)?)),
            None => Ok(None),
        }
    }

    /// List visits matching the filter, most recent check-in first,
    /// with client and agent references resolved read-side.
    pub async fn list_visits(&self, filter: VisitFilter) -> Result<Vec<VisitRecord>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<sea_orm::Value> = Vec::new();

        if let Some(agent_id) = filter.agent_id {
            values.push(agent_id.into());
            conditions.push(format!("v.agent_id = ${}", values.len()));
        }
        if let Some(client_id) = filter.client_id {
            values.push(client_id.into());
            conditions.push(format!("v.client_id = ${}", values.len()));
        }
        if filter.active_only {
            conditions.push("v.check_out_time IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "{} {} ORDER BY v.check_in_time DESC",
            VISIT_RECORD_SELECT, where_clause
        );

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);

        self.read_conn()
            .query_all(stmt)
            .await?
            .iter()
            .map(row_to_visit_record)
            .collect()
    }
}

fn row_to_visit_record(row: &sea_orm::QueryResult) -> Result<VisitRecord> {
    Ok(VisitRecord {
        id: row.try_get_by_index(0).map_err(DbErr::from)?,
        client_id: row.try_get_by_index(1).map_err(DbErr::from)?,
        agent_id: row.try_get_by_index(2).map_err(DbErr::from)?,
        check_in_time: row.try_get_by_index(3).map_err(DbErr::from)?,
        check_out_time: row.try_get_by_index(4).map_err(DbErr::from)?,
        client_name: row.try_get_by_index(5).map_err(DbErr::from)?,
        client_address: row.try_get_by_index(6).map_err(DbErr::from)?,
        agent_name: row.try_get_by_index(7).map_err(DbErr::from)?,
        agent_email: row.try_get_by_index(8).map_err(DbErr::from)?,
    })
}
