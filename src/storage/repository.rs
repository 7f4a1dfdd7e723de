use anyhow::{Context, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::domain::{
    Invoice, InvoiceId, InvoiceLine, InvoiceStatus, Membership, MembershipState, User, UserId,
};

use super::MIGRATION_001_INITIAL;
use super::rows::{
    row_to_invoice, row_to_line, row_to_membership, row_to_user, DATE_FORMAT, INVOICE_COLUMNS,
    LINE_COLUMNS, MEMBERSHIP_COLUMNS, USER_COLUMNS,
};

/// Repository for persisting and querying users, memberships and invoices.
///
/// Attendance writes don't go through here: they open a transaction with
/// [`Repository::begin`] and use [`super::Ledger`] and [`super::InvoiceStore`].
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a write transaction. Dropping it without `commit` rolls back.
    ///
    /// `BEGIN IMMEDIATE` takes the database write lock before the first read,
    /// so concurrent writers queue on the busy timeout instead of failing when
    /// they try to upgrade a stale read snapshot.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin transaction")
    }

    // ========================
    // User operations
    // ========================

    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.iter().map(row_to_user).collect()
    }

    // ========================
    // Membership operations
    // ========================

    /// Save a new membership. Fails if the user already has one.
    pub async fn save_membership(&self, membership: &Membership) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO memberships (id, user_id, state, credits, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(membership.id.to_string())
        .bind(membership.user_id.to_string())
        .bind(membership.state.as_str())
        .bind(membership.credits)
        .bind(membership.start_date.format(DATE_FORMAT).to_string())
        .bind(membership.end_date.format(DATE_FORMAT).to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save membership")?;
        Ok(())
    }

    pub async fn get_membership_for_user(&self, user_id: UserId) -> Result<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memberships WHERE user_id = ?",
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch membership")?;

        row.as_ref().map(row_to_membership).transpose()
    }

    pub async fn list_memberships(&self) -> Result<Vec<Membership>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM memberships ORDER BY user_id",
            MEMBERSHIP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list memberships")?;

        rows.iter().map(row_to_membership).collect()
    }

    /// Change only the lifecycle state of a membership.
    pub async fn set_membership_state(&self, user_id: UserId, state: MembershipState) -> Result<()> {
        sqlx::query("UPDATE memberships SET state = ? WHERE user_id = ?")
            .bind(state.as_str())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update membership state")?;
        Ok(())
    }

    pub async fn delete_membership(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM memberships WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete membership")?;
        Ok(())
    }

    // ========================
    // Invoice reads
    // ========================

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!("SELECT {} FROM invoices WHERE id = ?", INVOICE_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch invoice")?;

        row.as_ref().map(row_to_invoice).transpose()
    }

    /// List invoices, newest month first, optionally for a single user.
    pub async fn list_invoices(&self, user_id: Option<UserId>) -> Result<Vec<Invoice>> {
        let rows = match user_id {
            Some(id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM invoices WHERE user_id = ? ORDER BY month DESC, created_at",
                    INVOICE_COLUMNS
                ))
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM invoices ORDER BY month DESC, created_at",
                    INVOICE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list invoices")?;

        rows.iter().map(row_to_invoice).collect()
    }

    /// List invoice lines in creation order, optionally for a single invoice.
    pub async fn list_invoice_lines(&self, invoice_id: Option<InvoiceId>) -> Result<Vec<InvoiceLine>> {
        let rows = match invoice_id {
            Some(id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM invoice_lines WHERE invoice_id = ? ORDER BY created_at, rowid",
                    LINE_COLUMNS
                ))
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM invoice_lines ORDER BY created_at, rowid",
                    LINE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list invoice lines")?;

        rows.iter().map(row_to_line).collect()
    }

    /// Change only the status of an invoice. Amount and lines are untouched.
    pub async fn set_invoice_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<()> {
        sqlx::query("UPDATE invoices SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update invoice status")?;
        Ok(())
    }
}
