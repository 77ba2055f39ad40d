//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `tenancy` - Organizations, departments and users
//! - `invoices` - Invoice bundle writes, detail and export reads
//! - `invoice_filter` - Dynamic WHERE/ORDER BY builder for the invoice list
//! - `reports` - Read models for the aggregation engine

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{Error, Result};

mod invoice_filter;
mod invoices;
mod reports;
mod tenancy;

#[cfg(test)]
mod tests;

pub use invoice_filter::{FilterResult, InvoiceFilter};

/// SQL name of the Unicode lower-case function used by invoice search
pub(crate) const LOWER_FN: &str = "tally_lower";

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Render a timestamp in the sortable form stored in every DATETIME column
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a stored timestamp
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

pub(crate) fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Decimals are stored as TEXT so they round-trip exactly
pub(crate) fn parse_decimal(s: Option<String>) -> Option<Decimal> {
    s.and_then(|s| Decimal::from_str(&s).ok())
}

pub(crate) fn decimal_text(d: &Option<Decimal>) -> Option<String> {
    d.map(|d| d.to_string())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open an encrypted database
    ///
    /// Requires `TALLY_DB_KEY`; the SQLCipher key is derived from it with Argon2.
    /// Use `new_unencrypted()` for development databases.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases.",
                DB_KEY_ENV
            ))),
        }
    }

    /// Open an unencrypted database (development and tests)
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Open a database with an explicit encryption passphrase
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Pragmas are per-connection, so every pooled connection gets them
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(ref pragma) = key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            register_functions(conn)
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Remove all data in reverse dependency order
    pub fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            r#"
            DELETE FROM payments;
            DELETE FROM line_items;
            DELETE FROM validated_data;
            DELETE FROM extracted_data;
            DELETE FROM invoice_metadata;
            DELETE FROM invoices;
            DELETE FROM users;
            DELETE FROM departments;
            DELETE FROM organizations;
            "#,
        )?;
        tx.commit()?;

        info!("Database cleared");
        Ok(())
    }

    /// Count invoices (used by status output)
    pub fn invoice_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS departments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_departments_org ON departments(organization_id);

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',      -- admin, user
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_users_org ON users(organization_id);

            CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL DEFAULT '',
                file_size INTEGER NOT NULL DEFAULT 0,
                file_type TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,                   -- PENDING, PROCESSING, COMPLETED, FAILED or upper-cased source value
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                department_id TEXT NOT NULL REFERENCES departments(id),
                uploaded_by_id TEXT NOT NULL REFERENCES users(id),
                assigned_to_id TEXT REFERENCES users(id),
                assigned_at DATETIME,
                is_validated_by_human BOOLEAN NOT NULL DEFAULT 0,
                analytics_id TEXT,
                processed_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);
            CREATE INDEX IF NOT EXISTS idx_invoices_created ON invoices(created_at);
            CREATE INDEX IF NOT EXISTS idx_invoices_org ON invoices(organization_id);
            CREATE INDEX IF NOT EXISTS idx_invoices_uploader ON invoices(uploaded_by_id);

            CREATE TABLE IF NOT EXISTS invoice_metadata (
                id INTEGER PRIMARY KEY,
                invoice_id TEXT NOT NULL UNIQUE REFERENCES invoices(id) ON DELETE CASCADE,
                model_used TEXT,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER,
                processing_time REAL,
                confidence REAL,
                ai_response_base_url TEXT
            );

            -- Monetary columns are decimal TEXT
            CREATE TABLE IF NOT EXISTS extracted_data (
                id INTEGER PRIMARY KEY,
                invoice_id TEXT NOT NULL UNIQUE REFERENCES invoices(id) ON DELETE CASCADE,
                vendor_name TEXT,
                vendor_address TEXT,
                vendor_email TEXT,
                vendor_phone TEXT,
                vendor_tax_id TEXT,
                customer_name TEXT,
                customer_address TEXT,
                invoice_number TEXT,
                invoice_date DATE,
                due_date DATE,
                subtotal TEXT,
                tax_amount TEXT,
                total_amount TEXT,
                is_credit BOOLEAN NOT NULL DEFAULT 0,   -- source total was negative
                currency TEXT NOT NULL DEFAULT 'EUR',
                payment_terms TEXT,
                payment_method TEXT,
                category TEXT,
                validated_by TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_extracted_vendor ON extracted_data(vendor_name);
            CREATE INDEX IF NOT EXISTS idx_extracted_invoice_date ON extracted_data(invoice_date);
            CREATE INDEX IF NOT EXISTS idx_extracted_due_date ON extracted_data(due_date);

            CREATE TABLE IF NOT EXISTS validated_data (
                id INTEGER PRIMARY KEY,
                invoice_id TEXT NOT NULL UNIQUE REFERENCES invoices(id) ON DELETE CASCADE,
                vendor_name TEXT,
                vendor_address TEXT,
                invoice_number TEXT,
                invoice_date DATE,
                due_date DATE,
                subtotal TEXT,
                tax_amount TEXT,
                total_amount TEXT,
                currency TEXT NOT NULL DEFAULT 'EUR',
                category TEXT,
                status TEXT NOT NULL DEFAULT 'validated'
            );

            CREATE TABLE IF NOT EXISTS line_items (
                id INTEGER PRIMARY KEY,
                invoice_id TEXT NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                description TEXT NOT NULL,
                quantity TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                amount TEXT NOT NULL,
                tax_rate TEXT,
                tax_amount TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_line_items_invoice ON line_items(invoice_id);

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY,
                invoice_id TEXT NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
                amount TEXT NOT NULL,
                payment_date DATE,
                method TEXT,
                reference TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id);
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}

/// SQLite's built-in `lower()` and `LIKE` only fold ASCII letters
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        LOWER_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}
