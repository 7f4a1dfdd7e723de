use std::collections::HashMap;

use serde::Serialize;

use super::{reconcile, AmountMismatch, BillingMonth, Invoice, InvoiceLine, UserId};

/// Result of checking every invoice against its lines.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub invoice_count: usize,
    pub line_count: usize,
    pub mismatches: Vec<AmountMismatch>,
    /// (user, month) pairs holding more than one invoice
    pub duplicate_months: Vec<(UserId, BillingMonth)>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(invoices: &[Invoice], lines: &[InvoiceLine]) -> IntegrityReport {
    let mut lines_by_invoice: HashMap<_, Vec<InvoiceLine>> = HashMap::new();
    for line in lines {
        lines_by_invoice
            .entry(line.invoice_id)
            .or_default()
            .push(line.clone());
    }

    let mismatches: Vec<AmountMismatch> = invoices
        .iter()
        .filter_map(|invoice| {
            let own = lines_by_invoice
                .get(&invoice.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            reconcile(invoice, own)
        })
        .collect();

    let mut per_month: HashMap<(UserId, BillingMonth), usize> = HashMap::new();
    for invoice in invoices {
        *per_month.entry((invoice.user_id, invoice.month)).or_insert(0) += 1;
    }
    let mut duplicate_months: Vec<_> = per_month
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect();
    duplicate_months.sort();

    let mut issues = Vec::new();
    for m in &mismatches {
        issues.push(format!(
            "Invoice {} amount is {} but its lines sum to {}",
            m.invoice_id, m.stored, m.line_total
        ));
    }
    for (user_id, month) in &duplicate_months {
        issues.push(format!("User {} has more than one invoice for {}", user_id, month));
    }

    IntegrityReport {
        invoice_count: invoices.len(),
        line_count: lines.len(),
        mismatches,
        duplicate_months,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_consistent_invoices_are_healthy() {
        let month = BillingMonth::new(2024, 4).unwrap();
        let mut invoice = Invoice::open(Uuid::new_v4(), month);
        invoice.amount = 2;
        let lines = vec![
            InvoiceLine::new(invoice.id, 1, "Check-in"),
            InvoiceLine::new(invoice.id, 1, "Check-in"),
        ];

        let report = build_integrity_report(&[invoice], &lines);
        assert!(report.is_healthy());
        assert_eq!(report.invoice_count, 1);
        assert_eq!(report.line_count, 2);
    }

    #[test]
    fn test_empty_invoice_with_stale_amount_is_reported() {
        let month = BillingMonth::new(2024, 4).unwrap();
        let mut invoice = Invoice::open(Uuid::new_v4(), month);
        invoice.amount = 5;

        let report = build_integrity_report(&[invoice], &[]);
        assert!(!report.is_healthy());
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].line_total, 0);
    }

    #[test]
    fn test_duplicate_month_is_reported() {
        let user = Uuid::new_v4();
        let month = BillingMonth::new(2024, 4).unwrap();
        let invoices = vec![Invoice::open(user, month), Invoice::open(user, month)];

        let report = build_integrity_report(&invoices, &[]);
        assert_eq!(report.duplicate_months, vec![(user, month)]);
        assert_eq!(report.issues.len(), 1);
    }
}
