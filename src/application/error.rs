use thiserror::Error;

use crate::domain::{Amount, BillingMonth, InvoiceId, MembershipInvalid, UserId};
use crate::storage::InvoiceStoreError;

/// Stable classification of an [`AppError`], for callers that map failures
/// to their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UserNotFound,
    MembershipNotFound,
    MembershipInvalid,
    NoInvoiceForMonth,
    NotFound,
    Conflict,
    InvalidInput,
    Storage,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("User {0} has no membership")]
    MembershipNotFound(UserId),

    #[error("User {0} already has a membership")]
    MembershipAlreadyExists(UserId),

    #[error("Membership invalid: {0}")]
    MembershipInvalid(#[from] MembershipInvalid),

    #[error("No invoice for user {user_id} in {month}")]
    NoInvoiceForMonth { user_id: UserId, month: BillingMonth },

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(Amount),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::UserNotFound(_) => ErrorKind::UserNotFound,
            AppError::MembershipNotFound(_) => ErrorKind::MembershipNotFound,
            AppError::MembershipInvalid(_) => ErrorKind::MembershipInvalid,
            AppError::NoInvoiceForMonth { .. } => ErrorKind::NoInvoiceForMonth,
            AppError::InvoiceNotFound(_) => ErrorKind::NotFound,
            AppError::UserAlreadyExists(_) | AppError::MembershipAlreadyExists(_) => {
                ErrorKind::Conflict
            }
            AppError::InvalidAmount(_) | AppError::InvalidDateRange(_) => ErrorKind::InvalidInput,
            AppError::Database(_) => ErrorKind::Storage,
        }
    }
}

impl From<InvoiceStoreError> for AppError {
    fn from(err: InvoiceStoreError) -> Self {
        match err {
            InvoiceStoreError::NoInvoice { user_id, month } => {
                AppError::NoInvoiceForMonth { user_id, month }
            }
            InvoiceStoreError::Database(e) => AppError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_store_error_maps_to_no_invoice_for_month() {
        let user_id = Uuid::new_v4();
        let month = BillingMonth::new(2024, 4).unwrap();
        let err: AppError = InvoiceStoreError::NoInvoice { user_id, month }.into();

        assert_eq!(err.kind(), ErrorKind::NoInvoiceForMonth);
        assert_eq!(
            err.to_string(),
            format!("No invoice for user {} in 2024-04", user_id)
        );
    }

    #[test]
    fn test_membership_invalid_kind() {
        let err = AppError::from(MembershipInvalid::NoCredits);
        assert_eq!(err.kind(), ErrorKind::MembershipInvalid);
        assert_eq!(err.to_string(), "Membership invalid: membership has no credits left");
    }
}
