//! PostgreSQL adapter for LeadDesk storage.
//!
//! This is the transactional source-of-truth backend. Every multi-record
//! change runs inside one transaction and locks the rows it reads with
//! `SELECT ... FOR UPDATE`, always the lead before its quotes. Writers on the
//! same lead therefore serialize and plan against committed state. The
//! acceptance update is additionally guarded on the quote still being open and
//! unexpired, so a loser sees zero affected rows.

use crate::model::{
    AcceptQuote, AcceptedQuote, AuditFilter, CreatedQuote, LeadFilter, LeadTransition,
    NewQuoteVersion, QueryWindow,
};
use crate::records::{plan_acceptance, plan_intake, plan_quote, plan_transition};
use crate::traits::{
    AcceptanceStore, ActivityStore, AuditStore, LeadDeskStorage, LeadStore, QuoteStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leaddesk_types::{
    AcceptanceHash, Activity, AuditContext, AuditLogEntry, Lead, LeadId, LeadStatus, QuoteId,
    QuoteVersion,
};
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                id UUID PRIMARY KEY,
                reference TEXT NOT NULL,
                status TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS leads_status ON leads(status);"#,
            r#"CREATE INDEX IF NOT EXISTS leads_created_at ON leads(created_at DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS quote_versions (
                id UUID PRIMARY KEY,
                lead_id UUID NOT NULL REFERENCES leads(id),
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                acceptance_hash TEXT NOT NULL UNIQUE,
                hash_expires_at TIMESTAMPTZ NOT NULL,
                accepted_at TIMESTAMPTZ,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (lead_id, version)
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS quote_versions_lead_id ON quote_versions(lead_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                sequence BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL UNIQUE,
                lead_id UUID NOT NULL REFERENCES leads(id),
                kind TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS activities_lead_id ON activities(lead_id, created_at DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                sequence BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL UNIQUE,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS audit_log_entity ON audit_log(entity_type, entity_id);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }

        Ok(())
    }

    async fn begin(&self) -> StorageResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| StorageError::Serialization(format!("json serialize error: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> StorageResult<T> {
    serde_json::from_value(value)
        .map_err(|e| StorageError::Serialization(format!("json deserialize error: {e}")))
}

fn decode_data<T: serde::de::DeserializeOwned>(row: &PgRow) -> StorageResult<T> {
    let data: Value = row
        .try_get("data")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    from_json(data)
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

fn window_bounds(window: QueryWindow) -> StorageResult<(Option<i64>, i64)> {
    let limit = if window.limit == 0 {
        None
    } else {
        Some(to_i64(window.limit)?)
    };
    Ok((limit, to_i64(window.offset)?))
}

const SELECT_LEAD_SQL: &str = "SELECT data FROM leads WHERE id = $1";
const LOCK_LEAD_SQL: &str = "SELECT data FROM leads WHERE id = $1 FOR UPDATE";
const SELECT_QUOTE_SQL: &str = "SELECT data FROM quote_versions WHERE id = $1";
const LOCK_QUOTE_SQL: &str = "SELECT data FROM quote_versions WHERE id = $1 FOR UPDATE";
const SELECT_LEAD_QUOTES_SQL: &str =
    "SELECT data FROM quote_versions WHERE lead_id = $1 ORDER BY version ASC";
const LOCK_LEAD_QUOTES_SQL: &str =
    "SELECT data FROM quote_versions WHERE lead_id = $1 ORDER BY version ASC FOR UPDATE";

const ACCEPT_QUOTE_SQL: &str = r#"
    UPDATE quote_versions
       SET status = $2, accepted_at = $3, data = $4, updated_at = $3
     WHERE id = $1
       AND accepted_at IS NULL
       AND status IN ('draft', 'sent')
       AND hash_expires_at > $3
"#;

const SUPERSEDE_QUOTE_SQL: &str = r#"
    UPDATE quote_versions
       SET status = $2, hash_expires_at = $3, data = $4, updated_at = $5
     WHERE id = $1
       AND accepted_at IS NULL
       AND status IN ('draft', 'sent')
"#;

async fn fetch_one<T: serde::de::DeserializeOwned>(
    conn: &mut PgConnection,
    sql: &'static str,
    id: uuid::Uuid,
) -> StorageResult<Option<T>> {
    let row = sqlx::query(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    row.as_ref().map(decode_data).transpose()
}

async fn fetch_lead(conn: &mut PgConnection, id: &LeadId) -> StorageResult<Option<Lead>> {
    fetch_one(conn, SELECT_LEAD_SQL, *id.as_uuid()).await
}

/// Read a lead and hold its row lock until the transaction ends
async fn lock_lead(conn: &mut PgConnection, id: &LeadId) -> StorageResult<Lead> {
    fetch_one(conn, LOCK_LEAD_SQL, *id.as_uuid())
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("lead {}", id)))
}

async fn fetch_quote(conn: &mut PgConnection, id: &QuoteId) -> StorageResult<Option<QuoteVersion>> {
    fetch_one(conn, SELECT_QUOTE_SQL, *id.as_uuid()).await
}

async fn lock_quote(conn: &mut PgConnection, id: &QuoteId) -> StorageResult<QuoteVersion> {
    fetch_one(conn, LOCK_QUOTE_SQL, *id.as_uuid())
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("quote {}", id)))
}

async fn fetch_quotes_for_lead(
    conn: &mut PgConnection,
    lead_id: &LeadId,
    lock: bool,
) -> StorageResult<Vec<QuoteVersion>> {
    let sql = if lock {
        LOCK_LEAD_QUOTES_SQL
    } else {
        SELECT_LEAD_QUOTES_SQL
    };
    let rows = sqlx::query(sql)
        .bind(lead_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    rows.iter().map(decode_data).collect()
}

async fn insert_lead(conn: &mut PgConnection, lead: &Lead) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO leads (id, reference, status, data, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(lead.id.as_uuid())
    .bind(&lead.reference)
    .bind(lead.status.as_str())
    .bind(to_json(lead)?)
    .bind(lead.created_at)
    .bind(lead.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

async fn update_lead(conn: &mut PgConnection, lead: &Lead) -> StorageResult<()> {
    let result = sqlx::query(
        "UPDATE leads SET status = $2, data = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(lead.id.as_uuid())
    .bind(lead.status.as_str())
    .bind(to_json(lead)?)
    .bind(lead.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound(format!("lead {}", lead.id)));
    }
    Ok(())
}

async fn insert_quote(conn: &mut PgConnection, quote: &QuoteVersion) -> StorageResult<()> {
    let version = i32::try_from(quote.version)
        .map_err(|_| StorageError::InvalidInput("quote version too large".to_string()))?;
    sqlx::query(
        r#"
        INSERT INTO quote_versions
            (id, lead_id, version, status, acceptance_hash, hash_expires_at, accepted_at, data, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(quote.id.as_uuid())
    .bind(quote.lead_id.as_uuid())
    .bind(version)
    .bind(quote.status.as_str())
    .bind(quote.acceptance_hash.as_str())
    .bind(quote.hash_expires_at)
    .bind(quote.accepted_at)
    .bind(to_json(quote)?)
    .bind(quote.created_at)
    .bind(quote.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

async fn mark_accepted(
    conn: &mut PgConnection,
    quote: &QuoteVersion,
    at: DateTime<Utc>,
) -> StorageResult<()> {
    let result = sqlx::query(ACCEPT_QUOTE_SQL)
        .bind(quote.id.as_uuid())
        .bind(quote.status.as_str())
        .bind(at)
        .bind(to_json(quote)?)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::Conflict(format!(
            "quote {} is no longer open for acceptance",
            quote.id
        )));
    }
    Ok(())
}

async fn mark_superseded(conn: &mut PgConnection, quote: &QuoteVersion) -> StorageResult<()> {
    let result = sqlx::query(SUPERSEDE_QUOTE_SQL)
        .bind(quote.id.as_uuid())
        .bind(quote.status.as_str())
        .bind(quote.hash_expires_at)
        .bind(to_json(quote)?)
        .bind(quote.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::Conflict(format!(
            "quote {} changed while a new version was issued",
            quote.id
        )));
    }
    Ok(())
}

async fn insert_activity(conn: &mut PgConnection, activity: &Activity) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO activities (id, lead_id, kind, data, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(activity.id.as_uuid())
    .bind(activity.lead_id.as_uuid())
    .bind(activity.kind.as_str())
    .bind(to_json(activity)?)
    .bind(activity.created_at)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

async fn insert_audit(conn: &mut PgConnection, entry: &AuditLogEntry) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_type, entity_id, action, actor, data, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.entity_type.as_str())
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(to_json(entry)?)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

#[async_trait]
impl LeadStore for PostgresStorage {
    async fn create_lead(&self, lead: Lead, context: &AuditContext) -> StorageResult<Lead> {
        let plan = plan_intake(&lead, context);
        let mut tx = self.begin().await?;

        insert_lead(&mut tx, &lead).await?;
        insert_activity(&mut tx, &plan.activity).await?;
        insert_audit(&mut tx, &plan.audit).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(lead)
    }

    async fn get_lead(&self, id: &LeadId) -> StorageResult<Option<Lead>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        fetch_lead(&mut conn, id).await
    }

    async fn list_leads(&self, filter: LeadFilter) -> StorageResult<Vec<Lead>> {
        let (limit, offset) = window_bounds(filter.window)?;
        let rows = sqlx::query(
            r#"
            SELECT data FROM leads
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.status.map(|status| status.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(decode_data).collect()
    }

    async fn transition_lead(
        &self,
        id: &LeadId,
        to: LeadStatus,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> StorageResult<LeadTransition> {
        let mut tx = self.begin().await?;
        let current = lock_lead(&mut tx, id).await?;
        let plan = plan_transition(&current, to, context, now)?;

        update_lead(&mut tx, &plan.lead).await?;
        insert_activity(&mut tx, &plan.activity).await?;
        insert_audit(&mut tx, &plan.audit).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(LeadTransition {
            lead: plan.lead,
            from: plan.from,
        })
    }
}

#[async_trait]
impl QuoteStore for PostgresStorage {
    async fn create_quote_version(
        &self,
        input: NewQuoteVersion,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> StorageResult<CreatedQuote> {
        let mut tx = self.begin().await?;
        let lead = lock_lead(&mut tx, &input.lead_id).await?;
        let existing = fetch_quotes_for_lead(&mut tx, &lead.id, true).await?;
        let plan = plan_quote(&lead, &existing, input, context, now)?;

        for retired in &plan.superseded {
            mark_superseded(&mut tx, retired).await?;
        }
        // a concurrent issue for the same lead trips UNIQUE (lead_id, version)
        insert_quote(&mut tx, &plan.quote).await?;
        if plan.promoted_from.is_some() {
            update_lead(&mut tx, &plan.lead).await?;
        }
        insert_activity(&mut tx, &plan.activity).await?;
        for entry in &plan.audits {
            insert_audit(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(CreatedQuote {
            superseded: plan.superseded.iter().map(|quote| quote.id).collect(),
            quote: plan.quote,
            lead: plan.lead,
            promoted_from: plan.promoted_from,
        })
    }

    async fn get_quote(&self, id: &QuoteId) -> StorageResult<Option<QuoteVersion>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        fetch_quote(&mut conn, id).await
    }

    async fn get_quote_by_hash(
        &self,
        hash: &AcceptanceHash,
    ) -> StorageResult<Option<QuoteVersion>> {
        let row = sqlx::query("SELECT data FROM quote_versions WHERE acceptance_hash = $1")
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(decode_data).transpose()
    }

    async fn list_quotes_for_lead(&self, lead_id: &LeadId) -> StorageResult<Vec<QuoteVersion>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        fetch_quotes_for_lead(&mut conn, lead_id, false).await
    }

    async fn list_quotes(&self, window: QueryWindow) -> StorageResult<Vec<QuoteVersion>> {
        let (limit, offset) = window_bounds(window)?;
        let rows = sqlx::query(
            "SELECT data FROM quote_versions ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(decode_data).collect()
    }
}

#[async_trait]
impl AcceptanceStore for PostgresStorage {
    async fn accept_quote(&self, command: AcceptQuote) -> StorageResult<AcceptedQuote> {
        let mut tx = self.begin().await?;
        // lead_id never changes, so an unlocked read is enough to find the lead
        let lead_id = fetch_quote(&mut tx, &command.quote_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("quote {}", command.quote_id)))?
            .lead_id;
        let lead = lock_lead(&mut tx, &lead_id).await?;
        let quote = lock_quote(&mut tx, &command.quote_id).await?;
        let plan = plan_acceptance(&quote, &lead, &command)?;

        mark_accepted(&mut tx, &plan.quote, command.accepted_at).await?;
        update_lead(&mut tx, &plan.lead).await?;
        insert_activity(&mut tx, &plan.activity).await?;
        insert_audit(&mut tx, &plan.quote_audit).await?;
        insert_audit(&mut tx, &plan.lead_audit).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        tracing::debug!(quote_id = %plan.quote.id, lead_id = %plan.lead.id, "acceptance committed");

        Ok(AcceptedQuote {
            quote: plan.quote,
            lead: plan.lead,
            previous_lead_status: plan.previous_lead_status,
        })
    }
}

#[async_trait]
impl ActivityStore for PostgresStorage {
    async fn append_activity(&self, activity: Activity) -> StorageResult<Activity> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if fetch_lead(&mut conn, &activity.lead_id).await?.is_none() {
            return Err(StorageError::NotFound(format!("lead {}", activity.lead_id)));
        }
        insert_activity(&mut conn, &activity).await?;
        Ok(activity)
    }

    async fn list_activities(
        &self,
        lead_id: &LeadId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Activity>> {
        let (limit, offset) = window_bounds(window)?;
        let rows = sqlx::query(
            r#"
            SELECT data FROM activities
             WHERE lead_id = $1
             ORDER BY created_at DESC, sequence DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(lead_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(decode_data).collect()
    }
}

#[async_trait]
impl AuditStore for PostgresStorage {
    async fn list_audit(&self, filter: AuditFilter) -> StorageResult<Vec<AuditLogEntry>> {
        let (limit, offset) = window_bounds(filter.window)?;
        let rows = sqlx::query(
            r#"
            SELECT data FROM audit_log
             WHERE ($1::TEXT IS NULL OR entity_type = $1)
               AND ($2::TEXT IS NULL OR entity_id = $2)
             ORDER BY created_at DESC, sequence DESC
             LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.entity_type.map(|entity_type| entity_type.as_str()))
        .bind(filter.entity_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(decode_data).collect()
    }
}

impl LeadDeskStorage for PostgresStorage {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
