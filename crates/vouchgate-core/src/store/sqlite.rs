// SQLite voucher store
//
// One connection behind a mutex; every call runs on the blocking pool.
// Timestamps are stored as RFC 3339 UTC text. Rows written by older
// tooling without an offset are read back as UTC.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use tracing::debug;

use super::{ListFilter, StatusCounts, VoucherStore, apply_filter};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{self, Activation};
use crate::model::{MacAddress, NewVoucher, Price, Voucher, VoucherCode};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vouchers (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    code          TEXT    NOT NULL UNIQUE,
    duration_secs INTEGER NOT NULL,
    price_cents   INTEGER NOT NULL DEFAULT 0,
    plan          TEXT,
    is_developer  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT    NOT NULL,
    activated_at  TEXT,
    expires_at    TEXT,
    bound_mac     TEXT,
    authorized_at TEXT,
    CHECK ((activated_at IS NULL) = (expires_at IS NULL)),
    CHECK (bound_mac IS NULL OR activated_at IS NOT NULL)
);
CREATE INDEX IF NOT EXISTS idx_vouchers_bound_mac ON vouchers (bound_mac);
";

const COLUMNS: &str = "id, code, duration_secs, price_cents, plan, is_developer, \
                       created_at, activated_at, expires_at, bound_mac, authorized_at";

/// SQLite-backed [`VoucherStore`].
#[derive(Clone)]
pub struct SqliteVoucherStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVoucherStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| CoreError::Storage {
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        debug!(journal_mode = %mode, "voucher store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Write a consistent copy of the database to `dest`.
    ///
    /// Uses `VACUUM INTO`, which reads through WAL and compacts the copy.
    /// Refuses to overwrite an existing file.
    pub async fn backup_to(&self, dest: &Path) -> CoreResult<()> {
        if dest.exists() {
            return Err(CoreError::validation(format!(
                "backup target {} already exists",
                dest.display()
            )));
        }
        let target = dest
            .to_str()
            .ok_or_else(|| {
                CoreError::validation(format!("backup target {} is not valid UTF-8", dest.display()))
            })?
            .to_owned();
        self.with_conn(move |conn| {
            conn.execute("VACUUM INTO ?1", [&target])?;
            debug!(target = %target, "voucher database backed up");
            Ok(())
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Connection) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CoreError::Internal("voucher store lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("voucher store task failed: {e}")))?
    }

    async fn select_where(&self, clause: &'static str, arg: Option<String>) -> CoreResult<Vec<Voucher>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM vouchers WHERE {clause}");
            let mut stmt = conn.prepare(&sql)?;
            let rows = match arg {
                Some(arg) => stmt.query_map([arg], voucher_from_row)?,
                None => stmt.query_map([], voucher_from_row)?,
            };
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("unrecognized timestamp: {raw:?}"))
}

struct Timestamp(DateTime<Utc>);

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        decode_timestamp(value.as_str()?)
            .map(Timestamp)
            .map_err(|e| FromSqlError::Other(e.into()))
    }
}

impl FromSql for VoucherCode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl FromSql for MacAddress {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl FromSql for Price {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::from_cents(value.as_i64()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn voucher_from_row(row: &Row<'_>) -> rusqlite::Result<Voucher> {
    Ok(Voucher {
        id: row.get("id")?,
        code: row.get("code")?,
        duration_secs: row.get("duration_secs")?,
        price: row.get("price_cents")?,
        plan: row.get("plan")?,
        is_developer: row.get("is_developer")?,
        created_at: row.get::<_, Timestamp>("created_at")?.0,
        activated_at: row.get::<_, Option<Timestamp>>("activated_at")?.map(|t| t.0),
        expires_at: row.get::<_, Option<Timestamp>>("expires_at")?.map(|t| t.0),
        bound_mac: row.get("bound_mac")?,
        authorized_at: row.get::<_, Option<Timestamp>>("authorized_at")?.map(|t| t.0),
    })
}

fn load_by_code(conn: &Connection, code: &VoucherCode) -> CoreResult<Option<Voucher>> {
    let sql = format!("SELECT {COLUMNS} FROM vouchers WHERE code = ?1");
    Ok(conn
        .query_row(&sql, [code.as_str()], voucher_from_row)
        .optional()?)
}

fn load_by_id(conn: &Connection, id: i64) -> CoreResult<Option<Voucher>> {
    let sql = format!("SELECT {COLUMNS} FROM vouchers WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], voucher_from_row).optional()?)
}

fn load_existing(conn: &Connection, code: &VoucherCode) -> CoreResult<Voucher> {
    load_by_code(conn, code)?.ok_or_else(|| CoreError::NotFound {
        code: code.to_string(),
    })
}

/// Persist the fields a lifecycle transition may change.
fn write_mutable(tx: &Transaction<'_>, v: &Voucher) -> CoreResult<()> {
    tx.execute(
        "UPDATE vouchers
            SET activated_at = ?1, expires_at = ?2, bound_mac = ?3, authorized_at = ?4
          WHERE id = ?5",
        params![
            v.activated_at.map(encode_timestamp),
            v.expires_at.map(encode_timestamp),
            v.bound_mac.as_ref().map(MacAddress::as_str),
            v.authorized_at.map(encode_timestamp),
            v.id,
        ],
    )?;
    Ok(())
}

fn reload(conn: &Connection, id: i64) -> CoreResult<Voucher> {
    load_by_id(conn, id)?.ok_or_else(|| CoreError::Internal(format!("voucher {id} vanished")))
}

// ── VoucherStore ────────────────────────────────────────────────────

impl VoucherStore for SqliteVoucherStore {
    async fn insert(&self, new: NewVoucher) -> CoreResult<Voucher> {
        self.with_conn(move |conn| {
            let created_at = Utc::now().trunc_subsecs(6);
            let result = conn.execute(
                "INSERT INTO vouchers (code, duration_secs, price_cents, plan, is_developer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.code.as_str(),
                    new.duration_secs,
                    new.price.cents(),
                    new.plan,
                    new.is_developer,
                    encode_timestamp(created_at),
                ],
            );
            match result {
                Ok(_) => reload(conn, conn.last_insert_rowid()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(CoreError::DuplicateCode {
                        code: new.code.to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get(&self, id: i64) -> CoreResult<Option<Voucher>> {
        self.with_conn(move |conn| load_by_id(conn, id)).await
    }

    async fn find_by_code(&self, code: &VoucherCode) -> CoreResult<Option<Voucher>> {
        let code = code.clone();
        self.with_conn(move |conn| load_by_code(conn, &code)).await
    }

    async fn find_bound_to_mac(&self, mac: &MacAddress) -> CoreResult<Vec<Voucher>> {
        self.select_where("bound_mac = ?1", Some(mac.to_string()))
            .await
    }

    async fn find_expired_still_bound(&self, now: DateTime<Utc>) -> CoreResult<Vec<Voucher>> {
        let mut rows = self
            .select_where("bound_mac IS NOT NULL AND is_developer = 0", None)
            .await?;
        rows.retain(|v| lifecycle::needs_revocation(v, now));
        Ok(rows)
    }

    async fn find_pending_authorization(&self, now: DateTime<Utc>) -> CoreResult<Vec<Voucher>> {
        let mut rows = self
            .select_where("bound_mac IS NOT NULL AND authorized_at IS NULL", None)
            .await?;
        rows.retain(|v| lifecycle::needs_authorization(v, now));
        Ok(rows)
    }

    async fn find_bound(&self) -> CoreResult<Vec<Voucher>> {
        self.select_where("bound_mac IS NOT NULL", None).await
    }

    async fn list(&self, filter: ListFilter, now: DateTime<Utc>) -> CoreResult<Vec<Voucher>> {
        let rows = self.select_where("1 = 1", None).await?;
        Ok(apply_filter(rows, filter, now))
    }

    async fn count_by_status(&self, now: DateTime<Utc>) -> CoreResult<StatusCounts> {
        let rows = self.select_where("1 = 1", None).await?;
        Ok(StatusCounts::tally(&rows, now))
    }

    async fn activate(
        &self,
        code: &VoucherCode,
        mac: &MacAddress,
        now: DateTime<Utc>,
    ) -> CoreResult<(Activation, Voucher)> {
        let code = code.clone();
        let mac = mac.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut voucher = load_existing(&tx, &code)?;
            let bound_to_mac = {
                let sql = format!("SELECT {COLUMNS} FROM vouchers WHERE bound_mac = ?1");
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map([mac.as_str()], voucher_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            let activation = lifecycle::activate(&mut voucher, &mac, now, &bound_to_mac)?;
            if activation == Activation::Activated {
                write_mutable(&tx, &voucher)?;
            }
            let stored = reload(&tx, voucher.id)?;
            tx.commit()?;
            Ok((activation, stored))
        })
        .await
    }

    async fn update_atomically<T, F>(&self, code: &VoucherCode, f: F) -> CoreResult<(T, Voucher)>
    where
        F: FnOnce(&mut Voucher) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let code = code.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut voucher = load_existing(&tx, &code)?;
            let out = f(&mut voucher)?;
            write_mutable(&tx, &voucher)?;
            let stored = reload(&tx, voucher.id)?;
            tx.commit()?;
            Ok((out, stored))
        })
        .await
    }

    async fn mark_authorized(&self, id: i64, mac: &MacAddress, at: DateTime<Utc>) -> CoreResult<bool> {
        let mac = mac.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE vouchers SET authorized_at = ?1 WHERE id = ?2 AND bound_mac = ?3",
                params![encode_timestamp(at), id, mac],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn clear_authorization(&self, id: i64, mac: &MacAddress) -> CoreResult<bool> {
        let mac = mac.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE vouchers SET authorized_at = NULL WHERE id = ?1 AND bound_mac = ?2",
                params![id, mac],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn clear_binding(&self, id: i64, mac: &MacAddress) -> CoreResult<bool> {
        let mac = mac.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE vouchers SET bound_mac = NULL, authorized_at = NULL
                  WHERE id = ?1 AND bound_mac = ?2",
                params![id, mac],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn delete_all(&self) -> CoreResult<u64> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM vouchers", [])?;
            Ok(u64::try_from(removed).unwrap_or(u64::MAX))
        })
        .await
    }
}
