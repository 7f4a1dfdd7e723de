use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::domain::{
    BillingMonth, Invoice, InvoiceLine, InvoiceStatus, Membership, MembershipState, User,
};

pub(super) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(super) const USER_COLUMNS: &str = "id, email, name, created_at";
pub(super) const MEMBERSHIP_COLUMNS: &str = "id, user_id, state, credits, start_date, end_date";
pub(super) const INVOICE_COLUMNS: &str =
    "id, user_id, month, description, status, amount, created_at";
pub(super) const LINE_COLUMNS: &str = "id, invoice_id, amount, description, created_at";

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.get(column);
    Uuid::parse_str(&raw).with_context(|| format!("Invalid {}: {}", column, raw))
}

fn parse_date(row: &SqliteRow, column: &str) -> Result<NaiveDate> {
    let raw: String = row.get(column);
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .with_context(|| format!("Invalid {}: {}", column, raw))
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("Invalid {} timestamp: {}", column, raw))?
        .with_timezone(&Utc))
}

pub(super) fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(row, "id")?,
        email: row.get("email"),
        name: row.get("name"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

pub(super) fn row_to_membership(row: &SqliteRow) -> Result<Membership> {
    let state_str: String = row.get("state");

    Ok(Membership {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        state: MembershipState::from_str(&state_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid membership state: {}", state_str))?,
        credits: row.get("credits"),
        start_date: parse_date(row, "start_date")?,
        end_date: parse_date(row, "end_date")?,
    })
}

pub(super) fn row_to_invoice(row: &SqliteRow) -> Result<Invoice> {
    let month_str: String = row.get("month");
    let status_str: String = row.get("status");

    Ok(Invoice {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        month: BillingMonth::parse(&month_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid invoice month: {}", month_str))?,
        description: row.get("description"),
        status: InvoiceStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid invoice status: {}", status_str))?,
        amount: row.get("amount"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

pub(super) fn row_to_line(row: &SqliteRow) -> Result<InvoiceLine> {
    Ok(InvoiceLine {
        id: parse_uuid(row, "id")?,
        invoice_id: parse_uuid(row, "invoice_id")?,
        amount: row.get("amount"),
        description: row.get("description"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}
