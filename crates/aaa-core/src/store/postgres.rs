//! PostgreSQL storage
//!
//! Implements every storage trait over a sqlx connection pool. Tables:
//! - `aaa_profile`: billing profiles
//! - `aaa_account`: accounts keyed by username
//! - `aaa_online`: online sessions keyed by Acct-Session-Id
//! - `aaa_accounting`: accounting history
//! - `aaa_setting`: runtime settings
//!
//! 64-bit byte counters are stored as `BIGINT`; values above `i64::MAX`
//! saturate and negative values read back as zero, both with a warning.

use super::{
    AccountStore, AccountingStore, ProfileLookup, ProfileStore, SessionStore, SettingsBackend,
};
use crate::config::PostgresConfig;
use crate::error::StoreError;
use crate::model::{Account, AccountingRecord, OnlineSession, Profile, ProfileLinkMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, warn};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, acct_session_id, username, nas_addr, nas_id, nas_port_id, \
     framed_ipaddr, mac_addr, acct_session_time, acct_input_total, acct_output_total, \
     acct_input_packets, acct_output_packets, acct_start_time, last_update";

const RECORD_COLUMNS: &str = "id, acct_session_id, username, nas_addr, nas_id, nas_port_id, \
     framed_ipaddr, mac_addr, acct_session_time, acct_input_total, acct_output_total, \
     acct_input_packets, acct_output_packets, acct_terminate_cause, acct_start_time, \
     acct_stop_time";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Connect using the configured URL and pool limits, creating tables
    /// when `migrate` is set.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await?;
        let store = Self::new(pool);
        if config.migrate {
            store.migrate().await?;
        }
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables and indexes if they don't exist
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS aaa_profile (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'enabled',
                addr_pool TEXT NOT NULL DEFAULT '',
                active_num INTEGER NOT NULL DEFAULT 0,
                up_rate BIGINT NOT NULL DEFAULT 0,
                down_rate BIGINT NOT NULL DEFAULT 0,
                domain TEXT NOT NULL DEFAULT '',
                ipv6_prefix_pool TEXT NOT NULL DEFAULT '',
                bind_mac INTEGER NOT NULL DEFAULT 0,
                bind_vlan INTEGER NOT NULL DEFAULT 0,
                remark TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS aaa_account (
                id BIGINT NOT NULL,
                username TEXT PRIMARY KEY,
                profile_id BIGINT NOT NULL,
                realname TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'enabled',
                profile_link_mode TEXT NOT NULL DEFAULT 'static',
                addr_pool TEXT NOT NULL DEFAULT '',
                active_num INTEGER NOT NULL DEFAULT 0,
                up_rate BIGINT NOT NULL DEFAULT 0,
                down_rate BIGINT NOT NULL DEFAULT 0,
                domain TEXT NOT NULL DEFAULT '',
                ipv6_prefix_pool TEXT NOT NULL DEFAULT '',
                vlan_id1 INTEGER NOT NULL DEFAULT 0,
                vlan_id2 INTEGER NOT NULL DEFAULT 0,
                mac_addr TEXT NOT NULL DEFAULT '',
                bind_mac INTEGER NOT NULL DEFAULT 0,
                bind_vlan INTEGER NOT NULL DEFAULT 0,
                expire_time TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS aaa_online (
                id UUID NOT NULL,
                acct_session_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                nas_addr TEXT NOT NULL DEFAULT '',
                nas_id TEXT NOT NULL DEFAULT '',
                nas_port_id TEXT NOT NULL DEFAULT '',
                framed_ipaddr TEXT NOT NULL DEFAULT '',
                mac_addr TEXT NOT NULL DEFAULT '',
                acct_session_time BIGINT NOT NULL DEFAULT 0,
                acct_input_total BIGINT NOT NULL DEFAULT 0,
                acct_output_total BIGINT NOT NULL DEFAULT 0,
                acct_input_packets BIGINT NOT NULL DEFAULT 0,
                acct_output_packets BIGINT NOT NULL DEFAULT 0,
                acct_start_time TIMESTAMPTZ NOT NULL,
                last_update TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_online_username ON aaa_online(username)",
            "CREATE INDEX IF NOT EXISTS idx_online_nas_addr ON aaa_online(nas_addr)",
            "CREATE INDEX IF NOT EXISTS idx_online_nas_id ON aaa_online(nas_id)",
            "CREATE INDEX IF NOT EXISTS idx_online_last_update ON aaa_online(last_update)",
            r#"
            CREATE TABLE IF NOT EXISTS aaa_accounting (
                id UUID PRIMARY KEY,
                acct_session_id TEXT NOT NULL,
                username TEXT NOT NULL,
                nas_addr TEXT NOT NULL DEFAULT '',
                nas_id TEXT NOT NULL DEFAULT '',
                nas_port_id TEXT NOT NULL DEFAULT '',
                framed_ipaddr TEXT NOT NULL DEFAULT '',
                mac_addr TEXT NOT NULL DEFAULT '',
                acct_session_time BIGINT NOT NULL DEFAULT 0,
                acct_input_total BIGINT NOT NULL DEFAULT 0,
                acct_output_total BIGINT NOT NULL DEFAULT 0,
                acct_input_packets BIGINT NOT NULL DEFAULT 0,
                acct_output_packets BIGINT NOT NULL DEFAULT 0,
                acct_terminate_cause INTEGER,
                acct_start_time TIMESTAMPTZ NOT NULL,
                acct_stop_time TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_accounting_session ON aaa_accounting(acct_session_id)",
            "CREATE INDEX IF NOT EXISTS idx_accounting_stop_time ON aaa_accounting(acct_stop_time)",
            r#"
            CREATE TABLE IF NOT EXISTS aaa_setting (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or_else(|_| {
        warn!(value, "Counter exceeds BIGINT range, stored as i64::MAX");
        i64::MAX
    })
}

fn counter_u64(row: &PgRow, column: &str) -> Result<u64, StoreError> {
    let value: i64 = row.try_get(column)?;
    Ok(u64::try_from(value).unwrap_or_else(|_| {
        warn!(column, value, "Negative counter in storage, read as 0");
        0
    }))
}

fn counter_u32(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let value: i64 = row.try_get(column)?;
    Ok(u32::try_from(value).unwrap_or_else(|_| {
        let clamped = if value < 0 { 0 } else { u32::MAX };
        warn!(column, value, clamped, "Counter outside 32-bit range, clamped");
        clamped
    }))
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: row.try_get("status")?,
        addr_pool: row.try_get("addr_pool")?,
        active_num: row.try_get("active_num")?,
        up_rate: row.try_get("up_rate")?,
        down_rate: row.try_get("down_rate")?,
        domain: row.try_get("domain")?,
        ipv6_prefix_pool: row.try_get("ipv6_prefix_pool")?,
        bind_mac: row.try_get("bind_mac")?,
        bind_vlan: row.try_get("bind_vlan")?,
        remark: row.try_get("remark")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let mode: String = row.try_get("profile_link_mode")?;
    let profile_link_mode = mode.parse::<ProfileLinkMode>().unwrap_or_else(|_| {
        warn!(mode = %mode, "Unknown profile link mode in database, using static");
        ProfileLinkMode::Static
    });

    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        profile_id: row.try_get("profile_id")?,
        realname: row.try_get("realname")?,
        status: row.try_get("status")?,
        profile_link_mode,
        addr_pool: row.try_get("addr_pool")?,
        active_num: row.try_get("active_num")?,
        up_rate: row.try_get("up_rate")?,
        down_rate: row.try_get("down_rate")?,
        domain: row.try_get("domain")?,
        ipv6_prefix_pool: row.try_get("ipv6_prefix_pool")?,
        vlan_id1: row.try_get("vlan_id1")?,
        vlan_id2: row.try_get("vlan_id2")?,
        mac_addr: row.try_get("mac_addr")?,
        bind_mac: row.try_get("bind_mac")?,
        bind_vlan: row.try_get("bind_vlan")?,
        expire_time: row.try_get("expire_time")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<OnlineSession, StoreError> {
    Ok(OnlineSession {
        id: row.try_get("id")?,
        acct_session_id: row.try_get("acct_session_id")?,
        username: row.try_get("username")?,
        nas_addr: row.try_get("nas_addr")?,
        nas_id: row.try_get("nas_id")?,
        nas_port_id: row.try_get("nas_port_id")?,
        framed_ipaddr: row.try_get("framed_ipaddr")?,
        mac_addr: row.try_get("mac_addr")?,
        acct_session_time: counter_u32(row, "acct_session_time")?,
        acct_input_total: counter_u64(row, "acct_input_total")?,
        acct_output_total: counter_u64(row, "acct_output_total")?,
        acct_input_packets: counter_u32(row, "acct_input_packets")?,
        acct_output_packets: counter_u32(row, "acct_output_packets")?,
        acct_start_time: row.try_get("acct_start_time")?,
        last_update: row.try_get("last_update")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<AccountingRecord, StoreError> {
    let cause: Option<i32> = row.try_get("acct_terminate_cause")?;
    Ok(AccountingRecord {
        id: row.try_get("id")?,
        acct_session_id: row.try_get("acct_session_id")?,
        username: row.try_get("username")?,
        nas_addr: row.try_get("nas_addr")?,
        nas_id: row.try_get("nas_id")?,
        nas_port_id: row.try_get("nas_port_id")?,
        framed_ipaddr: row.try_get("framed_ipaddr")?,
        mac_addr: row.try_get("mac_addr")?,
        acct_session_time: counter_u32(row, "acct_session_time")?,
        acct_input_total: counter_u64(row, "acct_input_total")?,
        acct_output_total: counter_u64(row, "acct_output_total")?,
        acct_input_packets: counter_u32(row, "acct_input_packets")?,
        acct_output_packets: counter_u32(row, "acct_output_packets")?,
        acct_terminate_cause: cause.and_then(|c| u32::try_from(c).ok()),
        acct_start_time: row.try_get("acct_start_time")?,
        acct_stop_time: row.try_get("acct_stop_time")?,
    })
}

#[async_trait]
impl ProfileLookup for PgStore {
    async fn get_profile(&self, id: i64) -> Result<Profile, StoreError> {
        let row = sqlx::query("SELECT * FROM aaa_profile WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("profile", id.to_string()))?;
        profile_from_row(&row)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO aaa_profile (
                id, name, status, addr_pool, active_num, up_rate, down_rate, domain,
                ipv6_prefix_pool, bind_mac, bind_vlan, remark, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                addr_pool = EXCLUDED.addr_pool,
                active_num = EXCLUDED.active_num,
                up_rate = EXCLUDED.up_rate,
                down_rate = EXCLUDED.down_rate,
                domain = EXCLUDED.domain,
                ipv6_prefix_pool = EXCLUDED.ipv6_prefix_pool,
                bind_mac = EXCLUDED.bind_mac,
                bind_vlan = EXCLUDED.bind_vlan,
                remark = EXCLUDED.remark,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.status)
        .bind(&profile.addr_pool)
        .bind(profile.active_num)
        .bind(profile.up_rate)
        .bind(profile.down_rate)
        .bind(&profile.domain)
        .bind(&profile.ipv6_prefix_pool)
        .bind(profile.bind_mac)
        .bind(profile.bind_vlan)
        .bind(&profile.remark)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_profile(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM aaa_profile WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("profile", id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn get_account(&self, username: &str) -> Result<Account, StoreError> {
        let row = sqlx::query("SELECT * FROM aaa_account WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("account", username))?;
        account_from_row(&row)
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO aaa_account (
                id, username, profile_id, realname, status, profile_link_mode, addr_pool,
                active_num, up_rate, down_rate, domain, ipv6_prefix_pool, vlan_id1, vlan_id2,
                mac_addr, bind_mac, bind_vlan, expire_time, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            ON CONFLICT (username) DO UPDATE SET
                id = EXCLUDED.id,
                profile_id = EXCLUDED.profile_id,
                realname = EXCLUDED.realname,
                status = EXCLUDED.status,
                profile_link_mode = EXCLUDED.profile_link_mode,
                addr_pool = EXCLUDED.addr_pool,
                active_num = EXCLUDED.active_num,
                up_rate = EXCLUDED.up_rate,
                down_rate = EXCLUDED.down_rate,
                domain = EXCLUDED.domain,
                ipv6_prefix_pool = EXCLUDED.ipv6_prefix_pool,
                vlan_id1 = EXCLUDED.vlan_id1,
                vlan_id2 = EXCLUDED.vlan_id2,
                mac_addr = EXCLUDED.mac_addr,
                bind_mac = EXCLUDED.bind_mac,
                bind_vlan = EXCLUDED.bind_vlan,
                expire_time = EXCLUDED.expire_time,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(account.profile_id)
        .bind(&account.realname)
        .bind(&account.status)
        .bind(account.profile_link_mode.to_string())
        .bind(&account.addr_pool)
        .bind(account.active_num)
        .bind(account.up_rate)
        .bind(account.down_rate)
        .bind(&account.domain)
        .bind(&account.ipv6_prefix_pool)
        .bind(account.vlan_id1)
        .bind(account.vlan_id2)
        .bind(&account.mac_addr)
        .bind(account.bind_mac)
        .bind(account.bind_vlan)
        .bind(account.expire_time)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &OnlineSession) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO aaa_online ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            SESSION_COLUMNS
        );
        sqlx::query(&query)
            .bind(session.id.unwrap_or_else(Uuid::new_v4))
            .bind(&session.acct_session_id)
            .bind(&session.username)
            .bind(&session.nas_addr)
            .bind(&session.nas_id)
            .bind(&session.nas_port_id)
            .bind(&session.framed_ipaddr)
            .bind(&session.mac_addr)
            .bind(i64::from(session.acct_session_time))
            .bind(to_db(session.acct_input_total))
            .bind(to_db(session.acct_output_total))
            .bind(i64::from(session.acct_input_packets))
            .bind(i64::from(session.acct_output_packets))
            .bind(session.acct_start_time)
            .bind(session.last_update)
            .execute(&self.pool)
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict { .. } => StoreError::Conflict {
                    entity: "online session",
                    key: session.acct_session_id.clone(),
                },
                other => other,
            })?;
        Ok(())
    }

    async fn update_session(&self, session: &OnlineSession) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE aaa_online SET
                acct_session_time = $2,
                acct_input_total = $3,
                acct_output_total = $4,
                acct_input_packets = $5,
                acct_output_packets = $6,
                last_update = $7
            WHERE acct_session_id = $1
            "#,
        )
        .bind(&session.acct_session_id)
        .bind(i64::from(session.acct_session_time))
        .bind(to_db(session.acct_input_total))
        .bind(to_db(session.acct_output_total))
        .bind(i64::from(session.acct_input_packets))
        .bind(i64::from(session.acct_output_packets))
        .bind(session.last_update)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_session(&self, acct_session_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM aaa_online WHERE acct_session_id = $1")
            .bind(acct_session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_session(&self, acct_session_id: &str) -> Result<OnlineSession, StoreError> {
        let query = format!(
            "SELECT {} FROM aaa_online WHERE acct_session_id = $1",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(acct_session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("online session", acct_session_id))?;
        session_from_row(&row)
    }

    async fn session_exists(&self, acct_session_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM aaa_online WHERE acct_session_id = $1) AS present",
        )
        .bind(acct_session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("present")?)
    }

    async fn count_sessions(&self, username: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM aaa_online WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn list_sessions(&self, username: &str) -> Result<Vec<OnlineSession>, StoreError> {
        let query = format!(
            "SELECT {} FROM aaa_online WHERE username = $1 ORDER BY acct_start_time",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(session_from_row).collect()
    }

    async fn delete_sessions_by_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM aaa_online WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_sessions_by_nas(
        &self,
        nas_addr: &str,
        nas_id: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM aaa_online
            WHERE ($1 <> '' AND nas_addr = $1) OR ($2 <> '' AND nas_id = $2)
            "#,
        )
        .bind(nas_addr)
        .bind(nas_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_sessions_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM aaa_online WHERE last_update < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AccountingStore for PgStore {
    async fn insert_record(&self, record: &AccountingRecord) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO aaa_accounting ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            RECORD_COLUMNS
        );
        sqlx::query(&query)
            .bind(record.id.unwrap_or_else(Uuid::new_v4))
            .bind(&record.acct_session_id)
            .bind(&record.username)
            .bind(&record.nas_addr)
            .bind(&record.nas_id)
            .bind(&record.nas_port_id)
            .bind(&record.framed_ipaddr)
            .bind(&record.mac_addr)
            .bind(i64::from(record.acct_session_time))
            .bind(to_db(record.acct_input_total))
            .bind(to_db(record.acct_output_total))
            .bind(i64::from(record.acct_input_packets))
            .bind(i64::from(record.acct_output_packets))
            .bind(record.acct_terminate_cause.and_then(|c| i32::try_from(c).ok()))
            .bind(record.acct_start_time)
            .bind(record.acct_stop_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close_record(
        &self,
        acct_session_id: &str,
        record: &AccountingRecord,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE aaa_accounting SET
                acct_stop_time = $2,
                acct_session_time = $3,
                acct_input_total = $4,
                acct_output_total = $5,
                acct_input_packets = $6,
                acct_output_packets = $7,
                acct_terminate_cause = $8
            WHERE acct_session_id = $1 AND acct_stop_time IS NULL
            "#,
        )
        .bind(acct_session_id)
        .bind(record.acct_stop_time)
        .bind(i64::from(record.acct_session_time))
        .bind(to_db(record.acct_input_total))
        .bind(to_db(record.acct_output_total))
        .bind(i64::from(record.acct_input_packets))
        .bind(i64::from(record.acct_output_packets))
        .bind(record.acct_terminate_cause.and_then(|c| i32::try_from(c).ok()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_records(
        &self,
        acct_session_id: &str,
    ) -> Result<Vec<AccountingRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM aaa_accounting WHERE acct_session_id = $1 ORDER BY acct_start_time",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(acct_session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM aaa_accounting WHERE acct_stop_time IS NOT NULL AND acct_stop_time < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SettingsBackend for PgStore {
    async fn load_settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query("SELECT name, value FROM aaa_setting")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, String), StoreError> {
                Ok((row.try_get("name")?, row.try_get("value")?))
            })
            .collect()
    }

    async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO aaa_setting (name, value, updated_at) VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
