//! SQLite-backed license record store.
//!
//! All lifecycle mutations for a license key run inside a single
//! `BEGIN IMMEDIATE` transaction, so the seat-quota check-then-insert is
//! atomic even with multiple server processes writing to the same
//! database file. Contention surfaces as a retryable [`StoreError::Busy`]
//! after the busy timeout instead of hanging.

use crate::error::{StoreError, StoreResult};
use crate::records::*;
use chrono::{DateTime, Utc};
use giro_license::{LicenseStatus, PlanTier};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// How long a connection waits on a competing writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the license database. Cheap to clone.
#[derive(Clone)]
pub struct LicenseStore {
    conn: Arc<Mutex<Connection>>,
}

impl LicenseStore {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS licenses (
                key TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                plan TEXT NOT NULL,
                max_seats INTEGER NOT NULL,
                status TEXT NOT NULL,
                expires_at INTEGER,
                last_validated INTEGER,
                validation_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_licenses_owner ON licenses(owner);

            CREATE TABLE IF NOT EXISTS bindings (
                id TEXT PRIMARY KEY,
                license_key TEXT NOT NULL REFERENCES licenses(key),
                fingerprint TEXT NOT NULL,
                hostname TEXT,
                os_descriptor TEXT,
                first_seen INTEGER NOT NULL,
                last_seen INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                UNIQUE(license_key, fingerprint)
            );

            CREATE INDEX IF NOT EXISTS idx_bindings_license_active
                ON bindings(license_key, active);

            CREATE TABLE IF NOT EXISTS validation_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                license_key TEXT NOT NULL,
                fingerprint TEXT,
                action TEXT NOT NULL,
                client_time INTEGER,
                server_time INTEGER NOT NULL,
                drift_secs INTEGER,
                origin TEXT,
                detail TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_fingerprint_time
                ON validation_audit(fingerprint, server_time);

            CREATE TABLE IF NOT EXISTS admins (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS admin_sessions (
                token_hash TEXT PRIMARY KEY,
                admin_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_keys (
                key_hash TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ── Licenses ─────────────────────────────────────────────────

    /// Inserts a new license, enforcing the per-owner quota.
    pub fn create_license(
        &self,
        new: &NewLicense,
        max_per_owner: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<CreateOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM licenses WHERE key = ?1",
                params![new.key],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Ok(CreateOutcome::DuplicateKey);
        }

        let current: u32 = tx.query_row(
            "SELECT COUNT(*) FROM licenses WHERE owner = ?1 AND status != 'revoked'",
            params![new.owner],
            |row| row.get(0),
        )?;
        if current >= max_per_owner {
            return Ok(CreateOutcome::OwnerQuotaExceeded { current });
        }

        tx.execute(
            "INSERT INTO licenses (key, owner, plan, max_seats, status, expires_at,
                                   validation_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, 0, ?6, ?6)",
            params![
                new.key,
                new.owner,
                new.plan.as_str(),
                new.max_seats,
                new.expires_at.map(|t| t.timestamp()),
                now.timestamp(),
            ],
        )?;

        let record = find_license_tx(&tx, &new.key)?
            .ok_or_else(|| StoreError::Corrupt("license vanished after insert".into()))?;
        tx.commit()?;
        Ok(CreateOutcome::Created(record))
    }

    /// Fetches a license row by key.
    pub fn find_license(&self, key: &str) -> StoreResult<Option<LicenseRecord>> {
        let conn = self.lock();
        find_license_conn(&conn, key)
    }

    /// Fetches a license with all of its binding rows.
    pub fn license_with_bindings(
        &self,
        key: &str,
    ) -> StoreResult<Option<(LicenseRecord, Vec<BindingRecord>)>> {
        let conn = self.lock();
        let Some(license) = find_license_conn(&conn, key)? else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT id, license_key, fingerprint, hostname, os_descriptor,
                    first_seen, last_seen, active
             FROM bindings WHERE license_key = ?1 ORDER BY first_seen",
        )?;
        let rows = stmt.query_map(params![key], binding_from_row)?;
        let mut bindings = Vec::new();
        for row in rows {
            bindings.push(row?);
        }
        Ok(Some((license, bindings)))
    }

    /// Applies a status transition if the transition rules allow it.
    ///
    /// Returns the updated record, or None when the license does not
    /// exist or the transition is not allowed.
    pub fn set_status(
        &self,
        key: &str,
        next: LicenseStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<LicenseRecord>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(license) = find_license_tx(&tx, key)? else {
            return Ok(None);
        };
        if !license.status.can_transition_to(next) {
            return Ok(None);
        }
        update_status_tx(&tx, key, next, now)?;
        let updated = find_license_tx(&tx, key)?
            .ok_or_else(|| StoreError::Corrupt("license vanished during update".into()))?;
        tx.commit()?;
        Ok(Some(updated))
    }

    /// Per-owner license counts by status.
    pub fn owner_stats(&self, owner: &str) -> StoreResult<LicenseStats> {
        let conn = self.lock();
        conn.query_row(
            "SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'active'),
                COUNT(*) FILTER (WHERE status = 'pending'),
                COUNT(*) FILTER (WHERE status = 'suspended'),
                COUNT(*) FILTER (WHERE status = 'expired'),
                COUNT(*) FILTER (WHERE status = 'revoked')
             FROM licenses WHERE owner = ?1",
            params![owner],
            |row| {
                Ok(LicenseStats {
                    total: row.get(0)?,
                    active: row.get(1)?,
                    pending: row.get(2)?,
                    suspended: row.get(3)?,
                    expired: row.get(4)?,
                    revoked: row.get(5)?,
                })
            },
        )
        .map_err(Into::into)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Binds a fingerprint to a seat, atomically with the quota check.
    ///
    /// Re-activating an already-bound fingerprint is idempotent and
    /// refreshes its `last_seen`. A fingerprint whose seat was moved
    /// away by a transfer is never implicitly rebound.
    pub fn activate_seat(
        &self,
        key: &str,
        fingerprint: &str,
        hostname: &str,
        os_descriptor: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ActivateOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut license) = find_license_tx(&tx, key)? else {
            return Ok(ActivateOutcome::NotFound);
        };
        license = expire_if_due_tx(&tx, license, now)?;

        match license.status {
            LicenseStatus::Pending | LicenseStatus::Active => {}
            status => {
                // Keep the lazy expiry write even though activation fails.
                tx.commit()?;
                return Ok(ActivateOutcome::Rejected { status });
            }
        }

        if let Some(binding) = find_binding_tx(&tx, key, fingerprint)? {
            if !binding.active {
                return Ok(ActivateOutcome::SeatRetired);
            }
            tx.execute(
                "UPDATE bindings SET last_seen = ?1,
                        hostname = COALESCE(?2, hostname),
                        os_descriptor = COALESCE(?3, os_descriptor)
                 WHERE id = ?4",
                params![now.timestamp(), hostname, os_descriptor, binding.id],
            )?;
            let binding = find_binding_tx(&tx, key, fingerprint)?
                .ok_or_else(|| StoreError::Corrupt("binding vanished during update".into()))?;
            tx.commit()?;
            return Ok(ActivateOutcome::Bound {
                license,
                binding,
                already_bound: true,
            });
        }

        let active = active_fingerprints_tx(&tx, key)?;
        if active.len() as u32 >= license.max_seats {
            return Ok(ActivateOutcome::QuotaExceeded {
                active_fingerprints: active,
            });
        }

        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO bindings (id, license_key, fingerprint, hostname, os_descriptor,
                                   first_seen, last_seen, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1)",
            params![id, key, fingerprint, hostname, os_descriptor, now.timestamp()],
        )?;

        if license.status == LicenseStatus::Pending {
            update_status_tx(&tx, key, LicenseStatus::Active, now)?;
            license.status = LicenseStatus::Active;
        }

        let binding = find_binding_tx(&tx, key, fingerprint)?
            .ok_or_else(|| StoreError::Corrupt("binding vanished after insert".into()))?;
        tx.commit()?;
        tracing::debug!(key, fingerprint, "seat bound");
        Ok(ActivateOutcome::Bound {
            license,
            binding,
            already_bound: false,
        })
    }

    /// Checks status, expiry, and seat membership for a validation call,
    /// updating `last_seen` / `last_validated` bookkeeping on success.
    pub fn validate_seat(
        &self,
        key: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ValidateOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let Some(mut license) = find_license_tx(&tx, key)? else {
            return Ok(ValidateOutcome::NotFound);
        };
        license = expire_if_due_tx(&tx, license, now)?;

        if license.status != LicenseStatus::Active {
            tx.commit()?;
            return Ok(ValidateOutcome::Rejected { license });
        }

        let holds_seat = find_binding_tx(&tx, key, fingerprint)?
            .map(|b| b.active)
            .unwrap_or(false);
        if !holds_seat {
            tx.commit()?;
            return Ok(ValidateOutcome::HardwareMismatch { license });
        }

        tx.execute(
            "UPDATE bindings SET last_seen = ?1
             WHERE license_key = ?2 AND fingerprint = ?3",
            params![now.timestamp(), key, fingerprint],
        )?;
        tx.execute(
            "UPDATE licenses SET last_validated = ?1,
                    validation_count = validation_count + 1
             WHERE key = ?2",
            params![now.timestamp(), key],
        )?;

        license.last_validated = Some(now);
        license.validation_count += 1;
        tx.commit()?;
        Ok(ValidateOutcome::Ok { license })
    }

    /// Moves a seat from one fingerprint to another in one transaction.
    /// The only sanctioned way to rebind a fingerprint.
    pub fn transfer_seat(
        &self,
        key: &str,
        old_fingerprint: &str,
        new_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<TransferOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut license) = find_license_tx(&tx, key)? else {
            return Ok(TransferOutcome::NotFound);
        };
        license = expire_if_due_tx(&tx, license, now)?;

        if license.status != LicenseStatus::Active {
            tx.commit()?;
            return Ok(TransferOutcome::Rejected {
                status: license.status,
            });
        }

        let old_holds_seat = find_binding_tx(&tx, key, old_fingerprint)?
            .map(|b| b.active)
            .unwrap_or(false);
        if !old_holds_seat {
            let active = active_fingerprints_tx(&tx, key)?;
            return Ok(TransferOutcome::OldNotBound {
                active_fingerprints: active,
            });
        }

        tx.execute(
            "UPDATE bindings SET active = 0, last_seen = ?1
             WHERE license_key = ?2 AND fingerprint = ?3",
            params![now.timestamp(), key, old_fingerprint],
        )?;

        if find_binding_tx(&tx, key, new_fingerprint)?.is_some() {
            tx.execute(
                "UPDATE bindings SET active = 1, last_seen = ?1
                 WHERE license_key = ?2 AND fingerprint = ?3",
                params![now.timestamp(), key, new_fingerprint],
            )?;
        } else {
            tx.execute(
                "INSERT INTO bindings (id, license_key, fingerprint, first_seen, last_seen, active)
                 VALUES (?1, ?2, ?3, ?4, ?4, 1)",
                params![
                    Uuid::new_v4().to_string(),
                    key,
                    new_fingerprint,
                    now.timestamp()
                ],
            )?;
        }

        let binding = find_binding_tx(&tx, key, new_fingerprint)?
            .ok_or_else(|| StoreError::Corrupt("binding vanished during transfer".into()))?;
        tx.commit()?;
        tracing::info!(key, old_fingerprint, new_fingerprint, "seat transferred");
        Ok(TransferOutcome::Done {
            license,
            released: old_fingerprint.to_string(),
            binding,
        })
    }

    /// Revokes a license and releases all of its seats. Irreversible.
    pub fn revoke(&self, key: &str, now: DateTime<Utc>) -> StoreResult<RevokeOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(license) = find_license_tx(&tx, key)? else {
            return Ok(RevokeOutcome::NotFound);
        };
        match license.status {
            LicenseStatus::Revoked => return Ok(RevokeOutcome::AlreadyRevoked),
            LicenseStatus::Expired => {
                return Ok(RevokeOutcome::Rejected {
                    status: license.status,
                })
            }
            _ => {}
        }

        update_status_tx(&tx, key, LicenseStatus::Revoked, now)?;
        let seats_released = tx.execute(
            "UPDATE bindings SET active = 0, last_seen = ?1
             WHERE license_key = ?2 AND active = 1",
            params![now.timestamp(), key],
        )?;
        tx.commit()?;
        tracing::info!(key, seats_released, "license revoked");
        Ok(RevokeOutcome::Done { seats_released })
    }

    // ── Audit ────────────────────────────────────────────────────

    /// Appends an audit row. The audit table is append-only; nothing in
    /// this crate updates or deletes from it.
    pub fn append_audit(&self, entry: &NewAudit) -> StoreResult<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO validation_audit
                 (license_key, fingerprint, action, client_time, server_time,
                  drift_secs, origin, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.license_key,
                entry.fingerprint,
                entry.action.as_str(),
                entry.client_time.map(|t| t.timestamp()),
                entry.server_time.timestamp(),
                entry.drift_secs,
                entry.origin,
                entry.detail.as_ref().map(|d| d.to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Counts fraud-flag audit rows for a fingerprint since `since`.
    pub fn flagged_count_since(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM validation_audit
             WHERE fingerprint = ?1
               AND action IN ('drift_flagged', 'origin_flagged')
               AND server_time >= ?2",
            params![fingerprint, since.timestamp()],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    /// Returns the server time and origin of the most recent validation
    /// attempt from a fingerprint, for the origin-shift heuristic.
    pub fn last_validation_origin(
        &self,
        fingerprint: &str,
    ) -> StoreResult<Option<(DateTime<Utc>, Option<String>)>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT server_time, origin FROM validation_audit
             WHERE fingerprint = ?1
               AND action IN ('validated', 'validation_failed')
             ORDER BY id DESC LIMIT 1",
            params![fingerprint],
            |row| {
                let secs: i64 = row.get(0)?;
                let origin: Option<String> = row.get(1)?;
                Ok((from_secs(secs), origin))
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Most recent audit rows for a license, newest first.
    pub fn audit_for_license(&self, key: &str, limit: u32) -> StoreResult<Vec<AuditRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, license_key, fingerprint, action, client_time, server_time,
                    drift_secs, origin, detail
             FROM validation_audit WHERE license_key = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![key, limit], audit_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    // ── Auth ─────────────────────────────────────────────────────

    /// Creates an admin account if the email is not taken. Returns the
    /// admin id either way.
    pub fn ensure_admin(
        &self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<String> {
        let conn = self.lock();
        if let Some(existing) = conn
            .query_row(
                "SELECT id FROM admins WHERE email = ?1",
                params![email],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            return Ok(existing);
        }
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO admins (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, password_hash, now.timestamp()],
        )?;
        Ok(id)
    }

    /// Looks up an admin account by email.
    pub fn find_admin(&self, email: &str) -> StoreResult<Option<AdminRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, email, password_hash, created_at FROM admins WHERE email = ?1",
            params![email],
            |row| {
                Ok(AdminRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: from_secs(row.get(3)?),
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Stores a session token hash with its expiry.
    pub fn insert_session(
        &self,
        token_hash: &str,
        admin_id: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO admin_sessions (token_hash, admin_id, expires_at)
             VALUES (?1, ?2, ?3)",
            params![token_hash, admin_id, expires_at.timestamp()],
        )?;
        Ok(())
    }

    /// Resolves a session token hash to an admin id, if unexpired.
    pub fn session_admin(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<Option<String>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT admin_id FROM admin_sessions WHERE token_hash = ?1 AND expires_at > ?2",
            params![token_hash, now.timestamp()],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Deletes expired sessions, returning how many were removed.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM admin_sessions WHERE expires_at <= ?1",
            params![now.timestamp()],
        )?;
        Ok(n)
    }

    /// Registers a deployment API key hash if not present.
    pub fn ensure_api_key(
        &self,
        key_hash: &str,
        label: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO api_keys (key_hash, label, revoked, created_at)
             VALUES (?1, ?2, 0, ?3)",
            params![key_hash, label, now.timestamp()],
        )?;
        Ok(())
    }

    /// Resolves an API key hash to its label, unless revoked.
    pub fn api_key_label(&self, key_hash: &str) -> StoreResult<Option<String>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT label FROM api_keys WHERE key_hash = ?1 AND revoked = 0",
            params![key_hash],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Revokes an API key. Returns false when the hash is unknown.
    pub fn revoke_api_key(&self, key_hash: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE api_keys SET revoked = 1 WHERE key_hash = ?1",
            params![key_hash],
        )?;
        Ok(n > 0)
    }
}

// ── Row helpers ──────────────────────────────────────────────────

fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn find_license_conn(conn: &Connection, key: &str) -> StoreResult<Option<LicenseRecord>> {
    let raw = conn
        .query_row(
            "SELECT key, owner, plan, max_seats, status, expires_at, last_validated,
                    validation_count, created_at, updated_at
             FROM licenses WHERE key = ?1",
            params![key],
            raw_license_from_row,
        )
        .optional()?;
    raw.map(RawLicense::into_record).transpose()
}

fn find_license_tx(tx: &Transaction<'_>, key: &str) -> StoreResult<Option<LicenseRecord>> {
    find_license_conn(tx, key)
}

fn find_binding_tx(
    tx: &Transaction<'_>,
    key: &str,
    fingerprint: &str,
) -> StoreResult<Option<BindingRecord>> {
    tx.query_row(
        "SELECT id, license_key, fingerprint, hostname, os_descriptor,
                first_seen, last_seen, active
         FROM bindings WHERE license_key = ?1 AND fingerprint = ?2",
        params![key, fingerprint],
        binding_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn active_fingerprints_tx(tx: &Transaction<'_>, key: &str) -> StoreResult<Vec<String>> {
    let mut stmt = tx.prepare(
        "SELECT fingerprint FROM bindings
         WHERE license_key = ?1 AND active = 1 ORDER BY first_seen",
    )?;
    let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn update_status_tx(
    tx: &Transaction<'_>,
    key: &str,
    status: LicenseStatus,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    tx.execute(
        "UPDATE licenses SET status = ?1, updated_at = ?2 WHERE key = ?3",
        params![status.as_str(), now.timestamp(), key],
    )?;
    Ok(())
}

/// Lazily transitions a license past its expiry to Expired. Applies to
/// Pending and Active; Suspended licenses keep their status so the
/// administrative review outcome stays visible.
fn expire_if_due_tx(
    tx: &Transaction<'_>,
    mut license: LicenseRecord,
    now: DateTime<Utc>,
) -> StoreResult<LicenseRecord> {
    if matches!(license.status, LicenseStatus::Pending | LicenseStatus::Active) {
        if let Some(expires_at) = license.expires_at {
            if expires_at <= now {
                update_status_tx(tx, &license.key, LicenseStatus::Expired, now)?;
                license.status = LicenseStatus::Expired;
                tracing::debug!(key = %license.key, "license lazily expired");
            }
        }
    }
    Ok(license)
}

struct RawLicense {
    key: String,
    owner: String,
    plan: String,
    max_seats: i64,
    status: String,
    expires_at: Option<i64>,
    last_validated: Option<i64>,
    validation_count: i64,
    created_at: i64,
    updated_at: i64,
}

fn raw_license_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLicense> {
    Ok(RawLicense {
        key: row.get(0)?,
        owner: row.get(1)?,
        plan: row.get(2)?,
        max_seats: row.get(3)?,
        status: row.get(4)?,
        expires_at: row.get(5)?,
        last_validated: row.get(6)?,
        validation_count: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl RawLicense {
    fn into_record(self) -> StoreResult<LicenseRecord> {
        let plan = PlanTier::from_str_opt(&self.plan)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown plan '{}'", self.plan)))?;
        let status = LicenseStatus::from_str_opt(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{}'", self.status)))?;
        Ok(LicenseRecord {
            key: self.key,
            owner: self.owner,
            plan,
            max_seats: self.max_seats as u32,
            status,
            expires_at: self.expires_at.map(from_secs),
            last_validated: self.last_validated.map(from_secs),
            validation_count: self.validation_count,
            created_at: from_secs(self.created_at),
            updated_at: from_secs(self.updated_at),
        })
    }
}

fn binding_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BindingRecord> {
    Ok(BindingRecord {
        id: row.get(0)?,
        license_key: row.get(1)?,
        fingerprint: row.get(2)?,
        hostname: row.get(3)?,
        os_descriptor: row.get(4)?,
        first_seen: from_secs(row.get(5)?),
        last_seen: from_secs(row.get(6)?),
        active: row.get::<_, i64>(7)? != 0,
    })
}

fn audit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<AuditRecord>> {
    let action_str: String = row.get(3)?;
    let detail_str: Option<String> = row.get(8)?;
    let client_time: Option<i64> = row.get(4)?;

    Ok((|| {
        let action = AuditAction::from_str_opt(&action_str)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown audit action '{action_str}'")))?;
        let detail = detail_str
            .map(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| StoreError::Corrupt(format!("bad audit detail: {e}")))
            })
            .transpose()?;
        Ok(AuditRecord {
            id: row.get(0).map_err(StoreError::from)?,
            license_key: row.get(1).map_err(StoreError::from)?,
            fingerprint: row.get(2).map_err(StoreError::from)?,
            action,
            client_time: client_time.map(from_secs),
            server_time: from_secs(row.get(5).map_err(StoreError::from)?),
            drift_secs: row.get(6).map_err(StoreError::from)?,
            origin: row.get(7).map_err(StoreError::from)?,
            detail,
        })
    })())
}
