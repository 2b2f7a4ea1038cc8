use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use pact_core::{
    promise_fingerprint, CommentId, FriendRequestId, NotificationId, NotificationKind, PromiseId,
    PromiseKind, PromiseStatus, Recurrence, UserId, Visibility,
};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  display_name TEXT,
  email TEXT NOT NULL,
  created_at TEXT NOT NULL,
  last_login_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS promises (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  kind TEXT NOT NULL CHECK (kind IN ('self','others','world')),
  content TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  deadline_at INTEGER NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('ACTIVE','MISSED','COMPLETED')),
  hash_value TEXT NOT NULL,
  category TEXT,
  recurrence TEXT CHECK (recurrence IN ('daily','weekly','monthly')),
  visibility TEXT NOT NULL DEFAULT 'private' CHECK (visibility IN ('private','friends','public')),
  target_value INTEGER,
  current_value INTEGER,
  reminder_at INTEGER,
  reminder_sent INTEGER NOT NULL DEFAULT 0,
  FOREIGN KEY (user_id) REFERENCES users(id),
  CHECK (target_value IS NULL OR current_value IS NULL OR current_value <= target_value)
);

CREATE TABLE IF NOT EXISTS promise_participants (
  promise_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  completed_at INTEGER,
  PRIMARY KEY (promise_id, user_id),
  FOREIGN KEY (promise_id) REFERENCES promises(id),
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS promise_completions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  promise_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  completed_at INTEGER NOT NULL,
  FOREIGN KEY (promise_id) REFERENCES promises(id),
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS promise_comments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  promise_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  body TEXT NOT NULL,
  parent_comment_id INTEGER,
  created_at INTEGER NOT NULL,
  FOREIGN KEY (promise_id) REFERENCES promises(id),
  FOREIGN KEY (user_id) REFERENCES users(id),
  FOREIGN KEY (parent_comment_id) REFERENCES promise_comments(id)
);

CREATE TABLE IF NOT EXISTS promise_comment_likes (
  comment_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  created_at INTEGER NOT NULL,
  PRIMARY KEY (comment_id, user_id),
  FOREIGN KEY (comment_id) REFERENCES promise_comments(id),
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS friend_requests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  from_user_id INTEGER NOT NULL,
  to_user_id INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  UNIQUE (from_user_id, to_user_id),
  FOREIGN KEY (from_user_id) REFERENCES users(id),
  FOREIGN KEY (to_user_id) REFERENCES users(id),
  CHECK (from_user_id != to_user_id)
);

CREATE TABLE IF NOT EXISTS friendships (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  friend_id INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  UNIQUE (user_id, friend_id),
  FOREIGN KEY (user_id) REFERENCES users(id),
  FOREIGN KEY (friend_id) REFERENCES users(id),
  CHECK (user_id != friend_id)
);

CREATE TABLE IF NOT EXISTS notifications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  type TEXT NOT NULL CHECK (type IN (
    'friend_request','friend_accepted','shared_promise_complete',
    'shared_promise_pending','shared_promise_reneged','system_corrupt_promise','reminder')),
  from_user_id INTEGER,
  related_id INTEGER,
  message TEXT,
  read_at INTEGER,
  created_at INTEGER NOT NULL,
  FOREIGN KEY (user_id) REFERENCES users(id),
  FOREIGN KEY (from_user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_promises_user ON promises(user_id);
CREATE INDEX IF NOT EXISTS idx_promises_status ON promises(status, deadline_at);
CREATE INDEX IF NOT EXISTS idx_promise_participants_promise ON promise_participants(promise_id);
CREATE INDEX IF NOT EXISTS idx_promise_participants_user ON promise_participants(user_id);
CREATE INDEX IF NOT EXISTS idx_promise_completions_promise ON promise_completions(promise_id, user_id);
CREATE INDEX IF NOT EXISTS idx_promise_comments_promise ON promise_comments(promise_id);
CREATE INDEX IF NOT EXISTS idx_promise_comment_likes_comment ON promise_comment_likes(comment_id);
CREATE INDEX IF NOT EXISTS idx_friend_requests_to ON friend_requests(to_user_id);
CREATE INDEX IF NOT EXISTS idx_friend_requests_from ON friend_requests(from_user_id);
CREATE INDEX IF NOT EXISTS idx_friendships_user ON friendships(user_id);
CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
CREATE INDEX IF NOT EXISTS idx_notifications_read ON notifications(user_id, read_at);
";

const PROMISE_COLUMNS: &str = "id, user_id, name, kind, content, created_at, deadline_at, status, \
     hash_value, category, recurrence, visibility, target_value, current_value, reminder_at, \
     reminder_sent";

// Visible = owned by the user, or the user holds a participant row.
const VISIBLE_IDS_SQL: &str = "SELECT id FROM promises WHERE user_id = ?1
     UNION SELECT promise_id FROM promise_participants WHERE user_id = ?1";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: i64,
    pub parent: String,
    pub fk_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
    pub schema_status: SchemaStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRow {
    pub id: UserId,
    pub name: String,
    pub display_name: Option<String>,
    pub email: String,
    pub created_at: String,
    pub last_login_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromiseRow {
    pub id: PromiseId,
    pub user_id: UserId,
    pub name: String,
    pub kind: PromiseKind,
    pub content: String,
    pub created_at: i64,
    pub deadline_at: i64,
    pub status: PromiseStatus,
    pub hash_value: String,
    pub category: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub visibility: Visibility,
    pub target_value: Option<i64>,
    pub current_value: Option<i64>,
    pub reminder_at: Option<i64>,
    pub reminder_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantRow {
    pub user_id: UserId,
    pub completed_at: Option<i64>,
    pub name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentRow {
    pub id: CommentId,
    pub promise_id: PromiseId,
    pub user_id: UserId,
    pub body: String,
    pub parent_comment_id: Option<CommentId>,
    pub created_at: i64,
    pub author_name: String,
    pub author_display_name: Option<String>,
    pub like_count: i64,
    pub liked_by_me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequestRow {
    pub id: FriendRequestId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRow {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub from_user_id: Option<UserId>,
    pub from_name: Option<String>,
    pub related_id: Option<i64>,
    pub message: Option<String>,
    pub read_at: Option<i64>,
    pub created_at: i64,
}

/// Everything needed to persist one promise row plus its participant set.
#[derive(Debug, Clone)]
pub struct NewPromise {
    pub owner: UserId,
    pub name: String,
    pub kind: PromiseKind,
    pub content: String,
    pub created_at: i64,
    pub deadline_at: i64,
    pub category: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub visibility: Visibility,
    pub target_value: Option<i64>,
    pub current_value: Option<i64>,
    pub reminder_at: Option<i64>,
    pub participants: Vec<UserId>,
}

#[derive(Debug)]
struct RawPromise {
    id: i64,
    user_id: i64,
    name: String,
    kind: String,
    content: String,
    created_at: i64,
    deadline_at: i64,
    status: String,
    hash_value: String,
    category: Option<String>,
    recurrence: Option<String>,
    visibility: String,
    target_value: Option<i64>,
    current_value: Option<i64>,
    reminder_at: Option<i64>,
    reminder_sent: i64,
}

impl RawPromise {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            content: row.get(4)?,
            created_at: row.get(5)?,
            deadline_at: row.get(6)?,
            status: row.get(7)?,
            hash_value: row.get(8)?,
            category: row.get(9)?,
            recurrence: row.get(10)?,
            visibility: row.get(11)?,
            target_value: row.get(12)?,
            current_value: row.get(13)?,
            reminder_at: row.get(14)?,
            reminder_sent: row.get(15)?,
        })
    }

    fn into_promise(self) -> Result<PromiseRow> {
        let kind = PromiseKind::parse(&self.kind)
            .ok_or_else(|| anyhow!("unknown promise kind: {}", self.kind))?;
        let status = PromiseStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("unknown promise status: {}", self.status))?;
        let recurrence = match &self.recurrence {
            Some(raw) => Some(
                Recurrence::parse(raw).ok_or_else(|| anyhow!("unknown recurrence: {raw}"))?,
            ),
            None => None,
        };
        let visibility = Visibility::parse(&self.visibility)
            .ok_or_else(|| anyhow!("unknown visibility: {}", self.visibility))?;

        Ok(PromiseRow {
            id: PromiseId(self.id),
            user_id: UserId(self.user_id),
            name: self.name,
            kind,
            content: self.content,
            created_at: self.created_at,
            deadline_at: self.deadline_at,
            status,
            hash_value: self.hash_value,
            category: self.category,
            recurrence,
            visibility,
            target_value: self.target_value,
            current_value: self.current_value,
            reminder_at: self.reminder_at,
            reminder_sent: self.reminder_sent != 0,
        })
    }
}

impl SqliteStore {
    /// Open the promise database and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot
    /// be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step
    /// fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;
        if version == 0 {
            self.conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            record_schema_version(&self.conn, 1)?;
            version = 1;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Run quick-check, foreign-key-check, and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
                fk_index: row.get(3)?,
            })
        })?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row?);
        }

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
            schema_status,
        })
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup
    /// fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Restore this database from a `SQLite` backup file, then migrate.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing, restore fails, or
    /// migrations fail.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<()> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| {
                format!("failed to restore sqlite backup from {}", in_file.display())
            })?;

        self.migrate()?;
        Ok(())
    }

    // ---- users ----

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn create_user(
        &self,
        name: &str,
        display_name: Option<&str>,
        email: &str,
    ) -> Result<UserId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO users (name, display_name, email, created_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, display_name, email, now, now],
            )
            .context("failed to insert user")?;
        Ok(UserId(self.conn.last_insert_rowid()))
    }

    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn get_user(&self, id: UserId) -> Result<Option<UserRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, display_name, email, created_at, last_login_at
             FROM users WHERE id = ?1",
        )?;
        let row = stmt.query_row(params![id.0], user_from_row).optional()?;
        Ok(row)
    }

    /// # Errors
    /// Returns an error when the existence probe fails.
    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![id.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }

    /// Substring search over name, display name, and email, excluding the
    /// searching user.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn search_users(&self, query: &str, exclude: UserId) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", query.trim());
        let mut stmt = self.conn.prepare(
            "SELECT id, name, display_name, email, created_at, last_login_at
             FROM users
             WHERE id != ?1 AND (name LIKE ?2 OR display_name LIKE ?2 OR email LIKE ?2)
             ORDER BY name, display_name
             LIMIT 25",
        )?;
        let rows = stmt.query_map(params![exclude.0, pattern], user_from_row)?;
        collect_rows(rows)
    }

    // ---- promises ----

    /// Persist one promise row, rewrite its fingerprint with the assigned id,
    /// and insert its participant set, all in one transaction.
    ///
    /// # Errors
    /// Returns an error when any write in the transaction fails.
    pub fn insert_promise(&mut self, new: &NewPromise) -> Result<PromiseId> {
        let tx = self.conn.transaction().context("failed to start transaction")?;

        let provisional =
            promise_fingerprint(0, new.created_at, &new.name, new.kind, &new.content);
        tx.execute(
            "INSERT INTO promises (
                user_id, name, kind, content, created_at, deadline_at, status, hash_value,
                category, recurrence, visibility, target_value, current_value, reminder_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'ACTIVE', ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                new.owner.0,
                new.name,
                new.kind.as_str(),
                new.content,
                new.created_at,
                new.deadline_at,
                provisional,
                new.category,
                new.recurrence.map(Recurrence::as_str),
                new.visibility.as_str(),
                new.target_value,
                new.current_value,
                new.reminder_at,
            ],
        )
        .context("failed to insert promise")?;
        let id = tx.last_insert_rowid();

        // The fingerprint covers the assigned id, so it is rewritten here.
        let fingerprint =
            promise_fingerprint(id, new.created_at, &new.name, new.kind, &new.content);
        tx.execute(
            "UPDATE promises SET hash_value = ?1 WHERE id = ?2",
            params![fingerprint, id],
        )
        .context("failed to finalize promise fingerprint")?;

        insert_participants(&tx, id, &new.participants)?;

        tx.commit().context("failed to commit promise insert")?;
        Ok(PromiseId(id))
    }

    /// # Errors
    /// Returns an error when the lookup fails or the row cannot be decoded.
    pub fn get_promise(&self, id: PromiseId) -> Result<Option<PromiseRow>> {
        let query = format!("SELECT {PROMISE_COLUMNS} FROM promises WHERE id = ?1");
        let mut stmt = self.conn.prepare(&query)?;
        let raw = stmt.query_row(params![id.0], RawPromise::from_row).optional()?;
        raw.map(RawPromise::into_promise).transpose()
    }

    /// Flip every expired ACTIVE promise visible to the user to MISSED.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub fn sweep_missed(&self, user: UserId, now: i64) -> Result<usize> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE promises SET status = 'MISSED'
                     WHERE status = 'ACTIVE' AND deadline_at <= ?2 AND id IN ({VISIBLE_IDS_SQL})"
                ),
                params![user.0, now],
            )
            .context("failed to sweep missed promises")?;
        Ok(changed)
    }

    /// All still-ACTIVE visible promises, earliest deadline first.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn active_promises(&self, user: UserId) -> Result<Vec<PromiseRow>> {
        let query = format!(
            "SELECT {PROMISE_COLUMNS} FROM promises
             WHERE status = 'ACTIVE' AND id IN ({VISIBLE_IDS_SQL})
             ORDER BY deadline_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![user.0], RawPromise::from_row)?;
        let mut promises = Vec::new();
        for row in rows {
            promises.push(row?.into_promise()?);
        }
        Ok(promises)
    }

    /// The single MISSED visible promise surfaced for the reframe flow:
    /// earliest deadline, id as the deterministic tie-break.
    ///
    /// # Errors
    /// Returns an error when the query fails or the row cannot be decoded.
    pub fn earliest_missed(&self, user: UserId) -> Result<Option<PromiseRow>> {
        let query = format!(
            "SELECT {PROMISE_COLUMNS} FROM promises
             WHERE status = 'MISSED' AND id IN ({VISIBLE_IDS_SQL})
             ORDER BY deadline_at ASC, id ASC
             LIMIT 1"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let raw = stmt.query_row(params![user.0], RawPromise::from_row).optional()?;
        raw.map(RawPromise::into_promise).transpose()
    }

    /// # Errors
    /// Returns an error when the update fails.
    pub fn set_status(&self, id: PromiseId, status: PromiseStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE promises SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.0],
            )
            .context("failed to update promise status")?;
        Ok(())
    }

    /// Partial update; None keeps the stored value. The fingerprint covers
    /// name and content, so it is recomputed in the same transaction.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub fn update_promise_fields(
        &mut self,
        id: PromiseId,
        name: Option<&str>,
        content: Option<&str>,
        deadline_at: Option<i64>,
    ) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start update transaction")?;
        tx.execute(
            "UPDATE promises SET
                name = COALESCE(?1, name),
                content = COALESCE(?2, content),
                deadline_at = COALESCE(?3, deadline_at)
             WHERE id = ?4",
            params![name, content, deadline_at, id.0],
        )
        .context("failed to update promise fields")?;

        let updated = tx
            .query_row(
                "SELECT created_at, name, kind, content FROM promises WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        if let Some((created_at, name, kind_raw, content)) = updated {
            let kind = PromiseKind::parse(&kind_raw)
                .ok_or_else(|| anyhow!("unknown promise kind: {kind_raw}"))?;
            let fingerprint = promise_fingerprint(id.0, created_at, &name, kind, &content);
            tx.execute(
                "UPDATE promises SET hash_value = ?1 WHERE id = ?2",
                params![fingerprint, id.0],
            )
            .context("failed to refresh promise fingerprint")?;
        }

        tx.commit().context("failed to commit update transaction")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when the update fails.
    pub fn set_current_value(&self, id: PromiseId, value: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE promises SET current_value = ?1 WHERE id = ?2",
                params![value, id.0],
            )
            .context("failed to update promise progress")?;
        Ok(())
    }

    /// Reframe: insert the replacement promise carrying the old shape, copy
    /// the participant roster, and delete the old promise with everything it
    /// owns. One transaction; the old and new promise are never both visible.
    ///
    /// # Errors
    /// Returns an error when any step of the replacement transaction fails.
    pub fn replace_promise(
        &mut self,
        old_id: PromiseId,
        name: &str,
        content: &str,
        created_at: i64,
        deadline_at: i64,
    ) -> Result<Option<PromiseId>> {
        let tx = self.conn.transaction().context("failed to start reframe transaction")?;

        let query = format!("SELECT {PROMISE_COLUMNS} FROM promises WHERE id = ?1");
        let raw = tx
            .prepare(&query)?
            .query_row(params![old_id.0], RawPromise::from_row)
            .optional()?;
        let Some(old) = raw.map(RawPromise::into_promise).transpose()? else {
            return Ok(None);
        };

        let provisional = promise_fingerprint(0, created_at, name, old.kind, content);
        tx.execute(
            "INSERT INTO promises (
                user_id, name, kind, content, created_at, deadline_at, status, hash_value,
                category, recurrence, visibility, target_value, current_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'ACTIVE', ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                old.user_id.0,
                name,
                old.kind.as_str(),
                content,
                created_at,
                deadline_at,
                provisional,
                old.category,
                old.recurrence.map(Recurrence::as_str),
                old.visibility.as_str(),
                old.target_value,
                old.target_value.map(|_| 0_i64),
            ],
        )
        .context("failed to insert replacement promise")?;
        let new_id = tx.last_insert_rowid();

        let fingerprint = promise_fingerprint(new_id, created_at, name, old.kind, content);
        tx.execute(
            "UPDATE promises SET hash_value = ?1 WHERE id = ?2",
            params![fingerprint, new_id],
        )
        .context("failed to finalize replacement fingerprint")?;

        let roster = {
            let mut stmt = tx.prepare(
                "SELECT user_id FROM promise_participants WHERE promise_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![old_id.0], |row| row.get::<_, i64>(0))?;
            let mut roster = Vec::new();
            for row in rows {
                roster.push(UserId(row?));
            }
            roster
        };
        insert_participants(&tx, new_id, &roster)?;

        tx.execute(
            "DELETE FROM promise_comment_likes WHERE comment_id IN
                (SELECT id FROM promise_comments WHERE promise_id = ?1)",
            params![old_id.0],
        )
        .context("failed to delete old comment likes")?;
        tx.execute("DELETE FROM promise_comments WHERE promise_id = ?1", params![old_id.0])
            .context("failed to delete old comments")?;
        tx.execute("DELETE FROM promise_completions WHERE promise_id = ?1", params![old_id.0])
            .context("failed to delete old completion log")?;
        tx.execute("DELETE FROM promise_participants WHERE promise_id = ?1", params![old_id.0])
            .context("failed to delete old participants")?;
        tx.execute("DELETE FROM promises WHERE id = ?1", params![old_id.0])
            .context("failed to delete old promise")?;

        tx.commit().context("failed to commit reframe transaction")?;
        Ok(Some(PromiseId(new_id)))
    }

    // ---- participants ----

    /// Roster with display fields, incomplete participants first.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn participants(&self, promise: PromiseId) -> Result<Vec<ParticipantRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT pp.user_id, pp.completed_at, u.name, u.display_name
             FROM promise_participants pp
             JOIN users u ON u.id = pp.user_id
             WHERE pp.promise_id = ?1
             ORDER BY pp.completed_at IS NULL DESC, pp.user_id",
        )?;
        let rows = stmt.query_map(params![promise.0], |row| {
            Ok(ParticipantRow {
                user_id: UserId(row.get(0)?),
                completed_at: row.get(1)?,
                name: row.get(2)?,
                display_name: row.get(3)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Outer None: the user is not a participant. Inner Option: their
    /// completion marker.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn participant_completed_at(
        &self,
        promise: PromiseId,
        user: UserId,
    ) -> Result<Option<Option<i64>>> {
        let row = self
            .conn
            .query_row(
                "SELECT completed_at FROM promise_participants
                 WHERE promise_id = ?1 AND user_id = ?2",
                params![promise.0, user.0],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(row)
    }

    /// # Errors
    /// Returns an error when the existence probe fails.
    pub fn is_shared(&self, promise: PromiseId) -> Result<bool> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM promise_participants WHERE promise_id = ?1",
            params![promise.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count > 0)
    }

    /// # Errors
    /// Returns an error when the update fails.
    pub fn set_participant_completed(
        &self,
        promise: PromiseId,
        user: UserId,
        now: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE promise_participants SET completed_at = ?1
                 WHERE promise_id = ?2 AND user_id = ?3",
                params![now, promise.0, user.0],
            )
            .context("failed to mark participant completed")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when the update fails.
    pub fn clear_participant_completed(&self, promise: PromiseId, user: UserId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE promise_participants SET completed_at = NULL
                 WHERE promise_id = ?1 AND user_id = ?2",
                params![promise.0, user.0],
            )
            .context("failed to clear participant completion")?;
        Ok(())
    }

    // ---- completion log ----

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn log_completion(&self, promise: PromiseId, user: UserId, now: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO promise_completions (promise_id, user_id, completed_at)
                 VALUES (?1, ?2, ?3)",
                params![promise.0, user.0, now],
            )
            .context("failed to log completion")?;
        Ok(())
    }

    /// Delete exactly the newest completion-log row for this user.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn remove_latest_completion(&self, promise: PromiseId, user: UserId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM promise_completions
                 WHERE id = (
                    SELECT id FROM promise_completions
                    WHERE promise_id = ?1 AND user_id = ?2
                    ORDER BY completed_at DESC, id DESC
                    LIMIT 1
                 )",
                params![promise.0, user.0],
            )
            .context("failed to remove latest completion")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn streak_count(&self, promise: PromiseId, user: UserId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM promise_completions WHERE promise_id = ?1 AND user_id = ?2",
            params![promise.0, user.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    // ---- comments ----

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn add_comment(
        &self,
        promise: PromiseId,
        user: UserId,
        body: &str,
        parent: Option<CommentId>,
        now: i64,
    ) -> Result<CommentId> {
        self.conn
            .execute(
                "INSERT INTO promise_comments (promise_id, user_id, body, parent_comment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![promise.0, user.0, body.trim(), parent.map(|p| p.0), now],
            )
            .context("failed to insert comment")?;
        Ok(CommentId(self.conn.last_insert_rowid()))
    }

    /// Comments oldest-first with like counts and the viewer's like state.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn comments(&self, promise: PromiseId, viewer: UserId) -> Result<Vec<CommentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.promise_id, c.user_id, c.body, c.parent_comment_id, c.created_at,
                    u.name, u.display_name,
                    (SELECT COUNT(*) FROM promise_comment_likes l
                     WHERE l.comment_id = c.id) AS like_count,
                    EXISTS(SELECT 1 FROM promise_comment_likes l2
                     WHERE l2.comment_id = c.id AND l2.user_id = ?1) AS liked_by_me
             FROM promise_comments c
             JOIN users u ON u.id = c.user_id
             WHERE c.promise_id = ?2
             ORDER BY c.created_at ASC, c.id ASC",
        )?;
        let rows = stmt.query_map(params![viewer.0, promise.0], |row| {
            Ok(CommentRow {
                id: CommentId(row.get(0)?),
                promise_id: PromiseId(row.get(1)?),
                user_id: UserId(row.get(2)?),
                body: row.get(3)?,
                parent_comment_id: row.get::<_, Option<i64>>(4)?.map(CommentId),
                created_at: row.get(5)?,
                author_name: row.get(6)?,
                author_display_name: row.get(7)?,
                like_count: row.get(8)?,
                liked_by_me: row.get::<_, i64>(9)? != 0,
            })
        })?;
        collect_rows(rows)
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn comment_count(&self, promise: PromiseId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM promise_comments WHERE promise_id = ?1",
            params![promise.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    /// # Errors
    /// Returns an error when the existence probe fails.
    pub fn comment_exists(&self, comment: CommentId, promise: PromiseId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM promise_comments WHERE id = ?1 AND promise_id = ?2)",
            params![comment.0, promise.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }

    /// Returns the resulting like state: true when the toggle inserted a like.
    ///
    /// # Errors
    /// Returns an error when the toggle write fails.
    pub fn toggle_comment_like(&self, comment: CommentId, user: UserId, now: i64) -> Result<bool> {
        let existing = self
            .conn
            .query_row(
                "SELECT 1 FROM promise_comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                params![comment.0, user.0],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if existing.is_some() {
            self.conn
                .execute(
                    "DELETE FROM promise_comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                    params![comment.0, user.0],
                )
                .context("failed to delete comment like")?;
            return Ok(false);
        }
        self.conn
            .execute(
                "INSERT INTO promise_comment_likes (comment_id, user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![comment.0, user.0, now],
            )
            .context("failed to insert comment like")?;
        Ok(true)
    }

    // ---- activity, score, reminders ----

    /// The user's completion-log entries over visible promises, newest first:
    /// (promise id, promise name, completed at).
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn completion_activity(
        &self,
        user: UserId,
        limit: i64,
    ) -> Result<Vec<(PromiseId, String, i64)>> {
        let query = format!(
            "SELECT p.id, p.name, pc.completed_at
             FROM promise_completions pc
             JOIN promises p ON p.id = pc.promise_id
             WHERE pc.user_id = ?1 AND p.id IN ({VISIBLE_IDS_SQL})
             ORDER BY pc.completed_at DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![user.0, limit], |row| {
            Ok((PromiseId(row.get(0)?), row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        collect_rows(rows)
    }

    /// Promises created by the user, newest first: (id, name, created at).
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn creation_activity(
        &self,
        user: UserId,
        limit: i64,
    ) -> Result<Vec<(PromiseId, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, created_at FROM promises
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user.0, limit], |row| {
            Ok((PromiseId(row.get(0)?), row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        collect_rows(rows)
    }

    /// (completed, missed) counts over the user's own promises.
    ///
    /// # Errors
    /// Returns an error when the count query fails.
    pub fn status_counts(&self, owner: UserId) -> Result<(i64, i64)> {
        let counts = self.conn.query_row(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'COMPLETED'),
                COUNT(*) FILTER (WHERE status = 'MISSED')
             FROM promises WHERE user_id = ?1",
            params![owner.0],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(counts)
    }

    /// ACTIVE promises owned by the user whose reminder is due and unsent:
    /// (id, name).
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn due_reminders(&self, owner: UserId, now: i64) -> Result<Vec<(PromiseId, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name FROM promises
             WHERE status = 'ACTIVE' AND user_id = ?1
               AND reminder_at IS NOT NULL AND reminder_sent = 0 AND reminder_at <= ?2",
        )?;
        let rows = stmt.query_map(params![owner.0, now], |row| {
            Ok((PromiseId(row.get(0)?), row.get::<_, String>(1)?))
        })?;
        collect_rows(rows)
    }

    /// # Errors
    /// Returns an error when the update fails.
    pub fn mark_reminder_sent(&self, id: PromiseId) -> Result<()> {
        self.conn
            .execute("UPDATE promises SET reminder_sent = 1 WHERE id = ?1", params![id.0])
            .context("failed to mark reminder sent")?;
        Ok(())
    }

    // ---- friends ----

    /// # Errors
    /// Returns an error when the existence probe fails.
    pub fn friend_request_exists(&self, from: UserId, to: UserId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM friend_requests
             WHERE from_user_id = ?1 AND to_user_id = ?2)",
            params![from.0, to.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }

    /// # Errors
    /// Returns an error when the insert fails (including the unique-pair
    /// constraint).
    pub fn insert_friend_request(&self, from: UserId, to: UserId) -> Result<FriendRequestId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO friend_requests (from_user_id, to_user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![from.0, to.0, now],
            )
            .context("failed to insert friend request")?;
        Ok(FriendRequestId(self.conn.last_insert_rowid()))
    }

    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn get_friend_request(&self, id: FriendRequestId) -> Result<Option<FriendRequestRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_user_id, to_user_id, created_at FROM friend_requests WHERE id = ?1",
        )?;
        let row = stmt.query_row(params![id.0], friend_request_from_row).optional()?;
        Ok(row)
    }

    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_friend_request(&self, id: FriendRequestId) -> Result<()> {
        self.conn
            .execute("DELETE FROM friend_requests WHERE id = ?1", params![id.0])
            .context("failed to delete friend request")?;
        Ok(())
    }

    /// Accept: insert both friendship directions and delete the request row
    /// as one indivisible step. Returns the accepted request, or None when it
    /// no longer exists.
    ///
    /// # Errors
    /// Returns an error when any write in the transaction fails.
    pub fn accept_friend_request(
        &mut self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequestRow>> {
        let tx = self.conn.transaction().context("failed to start accept transaction")?;

        let request = tx
            .prepare(
                "SELECT id, from_user_id, to_user_id, created_at
                 FROM friend_requests WHERE id = ?1",
            )?
            .query_row(params![id.0], friend_request_from_row)
            .optional()?;
        let Some(request) = request else {
            return Ok(None);
        };

        let now = now_rfc3339()?;
        tx.execute(
            "INSERT INTO friendships (user_id, friend_id, created_at)
             VALUES (?1, ?2, ?3), (?2, ?1, ?3)",
            params![request.from_user_id.0, request.to_user_id.0, now],
        )
        .context("failed to insert friendship rows")?;
        tx.execute("DELETE FROM friend_requests WHERE id = ?1", params![id.0])
            .context("failed to delete accepted request")?;

        tx.commit().context("failed to commit accept transaction")?;
        Ok(Some(request))
    }

    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn is_friend(&self, user: UserId, friend: UserId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2)",
            params![user.0, friend.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }

    /// # Errors
    /// Returns an error when the query fails.
    pub fn friends_of(&self, user: UserId) -> Result<Vec<UserRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.display_name, u.email, u.created_at, u.last_login_at
             FROM users u
             JOIN friendships f ON f.friend_id = u.id
             WHERE f.user_id = ?1
             ORDER BY u.display_name, u.name",
        )?;
        let rows = stmt.query_map(params![user.0], user_from_row)?;
        collect_rows(rows)
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn mutual_friend_count(&self, user: UserId, friend: UserId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM friendships a
             JOIN friendships b ON a.friend_id = b.friend_id
             WHERE a.user_id = ?1 AND b.user_id = ?2
               AND a.friend_id != ?1 AND a.friend_id != ?2",
            params![user.0, friend.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    /// Delete both directional rows in one statement.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn remove_friendship(&self, user: UserId, friend: UserId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                params![user.0, friend.0],
            )
            .context("failed to remove friendship")?;
        Ok(())
    }

    /// Requests addressed to the user, newest first, with the sender row.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn incoming_requests(&self, user: UserId) -> Result<Vec<(FriendRequestRow, UserRow)>> {
        self.requests_with_counterpart(
            "SELECT fr.id, fr.from_user_id, fr.to_user_id, fr.created_at,
                    u.id, u.name, u.display_name, u.email, u.created_at, u.last_login_at
             FROM friend_requests fr
             JOIN users u ON u.id = fr.from_user_id
             WHERE fr.to_user_id = ?1
             ORDER BY fr.created_at DESC, fr.id DESC",
            user,
        )
    }

    /// Requests sent by the user, newest first, with the recipient row.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn outgoing_requests(&self, user: UserId) -> Result<Vec<(FriendRequestRow, UserRow)>> {
        self.requests_with_counterpart(
            "SELECT fr.id, fr.from_user_id, fr.to_user_id, fr.created_at,
                    u.id, u.name, u.display_name, u.email, u.created_at, u.last_login_at
             FROM friend_requests fr
             JOIN users u ON u.id = fr.to_user_id
             WHERE fr.from_user_id = ?1
             ORDER BY fr.created_at DESC, fr.id DESC",
            user,
        )
    }

    fn requests_with_counterpart(
        &self,
        query: &str,
        user: UserId,
    ) -> Result<Vec<(FriendRequestRow, UserRow)>> {
        let mut stmt = self.conn.prepare(query)?;
        let rows = stmt.query_map(params![user.0], |row| {
            Ok((
                FriendRequestRow {
                    id: FriendRequestId(row.get(0)?),
                    from_user_id: UserId(row.get(1)?),
                    to_user_id: UserId(row.get(2)?),
                    created_at: row.get(3)?,
                },
                UserRow {
                    id: UserId(row.get(4)?),
                    name: row.get(5)?,
                    display_name: row.get(6)?,
                    email: row.get(7)?,
                    created_at: row.get(8)?,
                    last_login_at: row.get(9)?,
                },
            ))
        })?;
        collect_rows(rows)
    }

    // ---- notifications ----

    /// Append one unread notification row.
    ///
    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_notification(
        &self,
        recipient: UserId,
        kind: NotificationKind,
        from_user: Option<UserId>,
        related_id: Option<i64>,
        message: Option<&str>,
        now: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO notifications
                    (user_id, type, from_user_id, related_id, message, read_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
                params![recipient.0, kind.as_str(), from_user.map(|u| u.0), related_id, message, now],
            )
            .context("failed to insert notification")?;
        Ok(())
    }

    /// Newest-first notifications with the sender's name when present.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn notifications(&self, user: UserId, limit: i64) -> Result<Vec<NotificationRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT n.id, n.user_id, n.type, n.from_user_id,
                    COALESCE(u.display_name, u.name),
                    n.related_id, n.message, n.read_at, n.created_at
             FROM notifications n
             LEFT JOIN users u ON u.id = n.from_user_id
             WHERE n.user_id = ?1
             ORDER BY n.created_at DESC, n.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user.0, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<i64>>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            let (id, user_id, kind_raw, from_user_id, from_name, related_id, message, read_at, created_at) =
                row?;
            let kind = NotificationKind::parse(&kind_raw)
                .ok_or_else(|| anyhow!("unknown notification type: {kind_raw}"))?;
            notifications.push(NotificationRow {
                id: NotificationId(id),
                user_id: UserId(user_id),
                kind,
                from_user_id: from_user_id.map(UserId),
                from_name,
                related_id,
                message,
                read_at,
                created_at,
            });
        }
        Ok(notifications)
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn unread_notification_count(&self, user: UserId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read_at IS NULL",
            params![user.0],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }

    /// Returns false when the notification does not exist or belongs to
    /// someone else.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub fn mark_notification_read(
        &self,
        id: NotificationId,
        user: UserId,
        now: i64,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE notifications SET read_at = ?1 WHERE id = ?2 AND user_id = ?3",
                params![now, id.0, user.0],
            )
            .context("failed to mark notification read")?;
        Ok(changed > 0)
    }

    /// # Errors
    /// Returns an error when the update fails.
    pub fn mark_all_notifications_read(&self, user: UserId, now: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE notifications SET read_at = ?1 WHERE user_id = ?2 AND read_at IS NULL",
                params![now, user.0],
            )
            .context("failed to mark notifications read")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when the existence probe fails.
    pub fn has_unread_notification(
        &self,
        user: UserId,
        kind: NotificationKind,
        related_id: i64,
    ) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM notifications
             WHERE user_id = ?1 AND type = ?2 AND related_id = ?3 AND read_at IS NULL)",
            params![user.0, kind.as_str(), related_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(exists == 1)
    }
}

fn insert_participants(
    tx: &rusqlite::Transaction<'_>,
    promise_id: i64,
    participants: &[UserId],
) -> Result<()> {
    for participant in participants {
        tx.execute(
            "INSERT OR IGNORE INTO promise_participants (promise_id, user_id, completed_at)
             VALUES (?1, ?2, NULL)",
            params![promise_id, participant.0],
        )
        .context("failed to insert promise participant")?;
    }
    Ok(())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
        last_login_at: row.get(5)?,
    })
}

fn friend_request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: FriendRequestId(row.get(0)?),
        from_user_id: UserId(row.get(1)?),
        to_user_id: UserId(row.get(2)?),
        created_at: row.get(3)?,
    })
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}
