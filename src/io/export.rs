use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

use crate::application::AttendanceService;
use crate::domain::{Invoice, InvoiceId, InvoiceLine, Membership, User, UserId};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub memberships: Vec<Membership>,
    pub invoices: Vec<Invoice>,
    pub invoice_lines: Vec<InvoiceLine>,
}

/// Exporter for converting invoice data to various formats
pub struct Exporter<'a> {
    service: &'a AttendanceService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a AttendanceService) -> Self {
        Self { service }
    }

    async fn emails(&self) -> Result<HashMap<UserId, String>> {
        let users = self.service.list_users().await?;
        Ok(users.into_iter().map(|u| (u.id, u.email)).collect())
    }

    /// Export invoices to CSV format
    pub async fn export_invoices_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let invoices = self.service.list_invoices(None).await?;
        let emails = self.emails().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "user",
            "month",
            "status",
            "description",
            "amount",
        ])?;

        for invoice in &invoices {
            csv_writer.write_record([
                invoice.id.to_string(),
                emails.get(&invoice.user_id).cloned().unwrap_or_default(),
                invoice.month.label(),
                invoice.status.as_str().to_string(),
                invoice.description.clone(),
                invoice.amount.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(invoices.len())
    }

    /// Export invoice lines to CSV format, optionally for one invoice
    pub async fn export_lines_csv<W: Write>(
        &self,
        writer: W,
        invoice_id: Option<InvoiceId>,
    ) -> Result<usize> {
        let lines = self.service.list_invoice_lines(invoice_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "invoice_id", "amount", "description", "created_at"])?;

        for line in &lines {
            csv_writer.write_record([
                line.id.to_string(),
                line.invoice_id.to_string(),
                line.amount.to_string(),
                line.description.clone(),
                line.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(lines.len())
    }

    /// Export full database as JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            users: self.service.list_users().await?,
            memberships: self.service.list_memberships().await?,
            invoices: self.service.list_invoices(None).await?,
            invoice_lines: self.service.list_invoice_lines(None).await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
