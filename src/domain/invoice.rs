use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type InvoiceId = Uuid;
pub type InvoiceLineId = Uuid;

/// Invoice amounts are plain integer units; one attendance event is worth 1.
pub type Amount = i64;

/// Calendar month an invoice is scoped to, stored as `YYYY-MM`.
///
/// The year is part of the key: April 2023 and April 2024 are different months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month number, 1 to 12.
    pub fn number(&self) -> u32 {
        self.month
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.trim().split_once('-')?;
        if month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl std::fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for BillingMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for BillingMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BillingMonth::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid billing month: {}", s)))
    }
}

/// Default description of a freshly opened monthly invoice.
pub fn invoice_description(month: BillingMonth) -> String {
    format!("Invoice for month number {}", month.number())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Outstanding,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Outstanding => "outstanding",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "outstanding" => Some(InvoiceStatus::Outstanding),
            "paid" => Some(InvoiceStatus::Paid),
            "void" => Some(InvoiceStatus::Void),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monthly invoice for one user. `amount` is the denormalized sum of its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub user_id: UserId,
    pub month: BillingMonth,
    pub description: String,
    pub status: InvoiceStatus,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Open an empty outstanding invoice for `month`.
    pub fn open(user_id: UserId, month: BillingMonth) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            month,
            description: invoice_description(month),
            status: InvoiceStatus::Outstanding,
            amount: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub invoice_id: InvoiceId,
    pub amount: Amount,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl InvoiceLine {
    pub fn new(invoice_id: InvoiceId, amount: Amount, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            amount,
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// An invoice whose stored amount disagrees with the sum of its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountMismatch {
    pub invoice_id: InvoiceId,
    pub stored: Amount,
    pub line_total: Amount,
}

/// Compare an invoice's stored amount with its lines.
pub fn reconcile(invoice: &Invoice, lines: &[InvoiceLine]) -> Option<AmountMismatch> {
    let line_total: Amount = lines
        .iter()
        .filter(|line| line.invoice_id == invoice.id)
        .map(|line| line.amount)
        .sum();

    if line_total == invoice.amount {
        None
    } else {
        Some(AmountMismatch {
            invoice_id: invoice.id,
            stored: invoice.amount,
            line_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_month_label() {
        let month = BillingMonth::new(2024, 4).unwrap();
        assert_eq!(month.label(), "2024-04");
        assert_eq!(BillingMonth::parse("2024-04"), Some(month));
        assert_eq!(BillingMonth::parse("2024-13"), None);
        assert_eq!(BillingMonth::parse("2024-4"), None);
        assert_eq!(BillingMonth::parse("april"), None);
    }

    #[test]
    fn test_same_month_number_different_years_differ() {
        let a = BillingMonth::containing(NaiveDate::from_ymd_opt(2023, 4, 30).unwrap());
        let b = BillingMonth::containing(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(a.number(), b.number());
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_open_invoice_defaults() {
        let month = BillingMonth::new(2024, 4).unwrap();
        let invoice = Invoice::open(Uuid::new_v4(), month);

        assert_eq!(invoice.status, InvoiceStatus::Outstanding);
        assert_eq!(invoice.amount, 0);
        assert_eq!(invoice.description, "Invoice for month number 4");
        assert_eq!(invoice.month, month);
    }

    #[test]
    fn test_reconcile() {
        let month = BillingMonth::new(2024, 4).unwrap();
        let mut invoice = Invoice::open(Uuid::new_v4(), month);
        let lines = vec![
            InvoiceLine::new(invoice.id, 1, "Check-in"),
            InvoiceLine::new(invoice.id, 1, "Check-out"),
            InvoiceLine::new(Uuid::new_v4(), 7, "Other invoice"),
        ];

        invoice.amount = 2;
        assert_eq!(reconcile(&invoice, &lines), None);

        invoice.amount = 3;
        assert_eq!(
            reconcile(&invoice, &lines),
            Some(AmountMismatch {
                invoice_id: invoice.id,
                stored: 3,
                line_total: 2,
            })
        );
    }

    #[test]
    fn test_billing_month_serde() {
        let month = BillingMonth::new(2025, 12).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"2025-12\"");
        let parsed: BillingMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, month);
    }
}
