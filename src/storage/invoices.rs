use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};
use thiserror::Error;

use crate::domain::{Amount, BillingMonth, Invoice, InvoiceId, InvoiceLine, UserId};

use super::rows::{row_to_invoice, row_to_line, INVOICE_COLUMNS, LINE_COLUMNS};

#[derive(Error, Debug)]
pub enum InvoiceStoreError {
    #[error("No invoice for user {user_id} in {month}")]
    NoInvoice { user_id: UserId, month: BillingMonth },

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Monthly invoices and their lines, bound to one connection.
///
/// `add_line` is the only way lines are written, which is what keeps
/// `invoice.amount` equal to the sum of the invoice's lines. Run it inside a
/// transaction so the insert and the amount update commit together.
pub struct InvoiceStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> InvoiceStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Find the user's invoice for `month`, if one was opened.
    pub async fn current_invoice_for(
        &mut self,
        user_id: UserId,
        month: BillingMonth,
    ) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE user_id = ? AND month = ?",
            INVOICE_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(month.label())
        .fetch_optional(&mut *self.conn)
        .await
        .context("Failed to fetch invoice for month")?;

        row.as_ref().map(row_to_invoice).transpose()
    }

    /// Find the user's invoice for `month`, opening an empty one if needed.
    pub async fn get_or_create_current_invoice(
        &mut self,
        user_id: UserId,
        month: BillingMonth,
    ) -> Result<Invoice> {
        if let Some(invoice) = self.current_invoice_for(user_id, month).await? {
            return Ok(invoice);
        }

        let invoice = Invoice::open(user_id, month);

        // Another writer may have opened the month in between; the unique
        // (user_id, month) key makes this insert a no-op in that case.
        let inserted = sqlx::query(
            r#"
            INSERT INTO invoices (id, user_id, month, description, status, amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, month) DO NOTHING
            "#,
        )
        .bind(invoice.id.to_string())
        .bind(invoice.user_id.to_string())
        .bind(invoice.month.label())
        .bind(&invoice.description)
        .bind(invoice.status.as_str())
        .bind(invoice.amount)
        .bind(invoice.created_at.to_rfc3339())
        .execute(&mut *self.conn)
        .await
        .context("Failed to create invoice")?
        .rows_affected();

        if inserted == 1 {
            tracing::info!(invoice = %invoice.id, user = %user_id, %month, "opened monthly invoice");
            return Ok(invoice);
        }

        self.current_invoice_for(user_id, month)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Invoice for {} vanished after conflict", month))
    }

    /// Like `current_invoice_for`, but a missing invoice is an error.
    pub async fn require_current_invoice(
        &mut self,
        user_id: UserId,
        month: BillingMonth,
    ) -> Result<Invoice, InvoiceStoreError> {
        self.current_invoice_for(user_id, month)
            .await?
            .ok_or(InvoiceStoreError::NoInvoice { user_id, month })
    }

    /// Append a line and fold its amount into the invoice total.
    /// `invoice.amount` is refreshed from the stored total.
    pub async fn add_line(
        &mut self,
        invoice: &mut Invoice,
        amount: Amount,
        description: &str,
    ) -> Result<InvoiceLine> {
        let line = InvoiceLine::new(invoice.id, amount, description);

        sqlx::query(
            r#"
            INSERT INTO invoice_lines (id, invoice_id, amount, description, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(line.id.to_string())
        .bind(line.invoice_id.to_string())
        .bind(line.amount)
        .bind(&line.description)
        .bind(line.created_at.to_rfc3339())
        .execute(&mut *self.conn)
        .await
        .context("Failed to save invoice line")?;

        let row = sqlx::query(
            r#"
            UPDATE invoices
            SET amount = amount + ?
            WHERE id = ?
            RETURNING amount
            "#,
        )
        .bind(line.amount)
        .bind(invoice.id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .context("Failed to update invoice amount")?
        .ok_or_else(|| anyhow::anyhow!("Invoice {} not found", invoice.id))?;

        // An overflowing total comes back as a REAL and fails to decode,
        // which rolls the line back with the transaction.
        invoice.amount = row
            .try_get("amount")
            .context("Invoice amount out of range")?;
        tracing::debug!(invoice = %invoice.id, line = %line.id, amount, total = invoice.amount, "line added");
        Ok(line)
    }

    /// Lines of one invoice, oldest first.
    pub async fn lines(&mut self, invoice_id: InvoiceId) -> Result<Vec<InvoiceLine>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoice_lines WHERE invoice_id = ? ORDER BY created_at, rowid",
            LINE_COLUMNS
        ))
        .bind(invoice_id.to_string())
        .fetch_all(&mut *self.conn)
        .await
        .context("Failed to list invoice lines")?;

        rows.iter().map(row_to_line).collect()
    }
}
