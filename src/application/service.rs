use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{
    build_integrity_report, Amount, BillingMonth, Clock, Credits, IntegrityReport, Invoice,
    InvoiceId, InvoiceLine, InvoiceLineId, InvoiceStatus, Membership, MembershipInvalid,
    MembershipState, SystemClock, User, UserId,
};
use crate::storage::{InvoiceStore, Ledger, Repository};

use super::AppError;

/// Amount billed for a single check-in or check-out.
pub const ATTENDANCE_AMOUNT: Amount = 1;

/// The two attendance events a member can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attendance {
    CheckIn,
    CheckOut,
}

impl Attendance {
    /// Description written on the invoice line.
    pub fn line_description(&self) -> &'static str {
        match self {
            Attendance::CheckIn => "Check-in",
            Attendance::CheckOut => "Check-out",
        }
    }

    fn validate(
        &self,
        ledger: &Ledger<'_>,
        membership: &Membership,
        today: NaiveDate,
    ) -> Result<(), MembershipInvalid> {
        match self {
            Attendance::CheckIn => ledger.validate_for_check_in(membership, today),
            Attendance::CheckOut => ledger.validate_for_check_out(membership, today),
        }
    }
}

impl std::fmt::Display for Attendance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attendance::CheckIn => write!(f, "check-in"),
            Attendance::CheckOut => write!(f, "check-out"),
        }
    }
}

/// Result of a committed check-in or check-out
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReceipt {
    pub invoice_id: InvoiceId,
    pub invoice_line_id: InvoiceLineId,
    pub month: BillingMonth,
    /// Invoice total after the new line
    pub invoice_amount: Amount,
    /// Membership balance after the event
    pub credits: Credits,
}

/// An invoice together with its lines
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
}

/// Application service for attendance and monthly invoicing.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct AttendanceService {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    /// Create a new service with the given repository, using the system clock.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for "today" and the current month.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn current_month(&self) -> BillingMonth {
        self.clock.current_month()
    }

    // ========================
    // Attendance operations
    // ========================

    /// Check a member in: takes one credit and bills one unit on this month's
    /// invoice, opening the invoice if needed.
    pub async fn check_in(&self, user_id: UserId) -> Result<AttendanceReceipt, AppError> {
        self.record(user_id, Attendance::CheckIn).await
    }

    /// Check a member out: gives one credit back and bills one unit on this
    /// month's invoice. Never opens an invoice.
    pub async fn check_out(&self, user_id: UserId) -> Result<AttendanceReceipt, AppError> {
        self.record(user_id, Attendance::CheckOut).await
    }

    async fn record(&self, user_id: UserId, event: Attendance) -> Result<AttendanceReceipt, AppError> {
        let today = self.clock.today();
        let month = BillingMonth::containing(today);

        let result = self.record_in_transaction(user_id, event, today, month).await;
        match &result {
            Ok(receipt) => tracing::info!(
                user = %user_id,
                %event,
                invoice = %receipt.invoice_id,
                line = %receipt.invoice_line_id,
                credits = receipt.credits,
                "attendance recorded"
            ),
            Err(err) => tracing::warn!(user = %user_id, %event, kind = ?err.kind(), "attendance rejected: {}", err),
        }
        result
    }

    async fn record_in_transaction(
        &self,
        user_id: UserId,
        event: Attendance,
        today: NaiveDate,
        month: BillingMonth,
    ) -> Result<AttendanceReceipt, AppError> {
        let user = self.get_user(user_id).await?;

        // Nothing below is visible to other connections until commit; any early
        // return drops `tx` and rolls everything back.
        let mut tx = self.repo.begin().await?;

        let mut ledger = Ledger::new(&mut tx);
        let mut membership = ledger
            .membership_for_user(user.id)
            .await?
            .ok_or(AppError::MembershipNotFound(user.id))?;
        event.validate(&ledger, &membership, today)?;

        let mut store = InvoiceStore::new(&mut tx);
        let mut invoice = match event {
            Attendance::CheckIn => store.get_or_create_current_invoice(user.id, month).await?,
            Attendance::CheckOut => store.require_current_invoice(user.id, month).await?,
        };
        let line = store
            .add_line(&mut invoice, ATTENDANCE_AMOUNT, event.line_description())
            .await?;

        let mut ledger = Ledger::new(&mut tx);
        let credits = match event {
            Attendance::CheckIn => ledger.debit(&mut membership).await?,
            Attendance::CheckOut => ledger.credit(&mut membership).await?,
        };

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit {}", event))?;

        Ok(AttendanceReceipt {
            invoice_id: invoice.id,
            invoice_line_id: line.id,
            month,
            invoice_amount: invoice.amount,
            credits,
        })
    }

    // ========================
    // User operations
    // ========================

    /// Register a new user. Emails are unique.
    pub async fn register_user(&self, email: &str, name: &str) -> Result<User, AppError> {
        let user = User::new(email, name);
        if self.repo.get_user_by_email(&user.email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(user.email));
        }

        self.repo.save_user(&user).await?;
        tracing::info!(user = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::UserNotFound(email.to_string()))
    }

    /// Look a user up by UUID, falling back to email.
    pub async fn resolve_user(&self, reference: &str) -> Result<User, AppError> {
        match uuid::Uuid::parse_str(reference.trim()) {
            Ok(id) => self.get_user(id).await,
            Err(_) => self.find_user_by_email(reference).await,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    // ========================
    // Membership operations
    // ========================

    /// Give a user a membership. A user holds at most one.
    pub async fn create_membership(
        &self,
        user_id: UserId,
        credits: Credits,
        start_date: NaiveDate,
        end_date: NaiveDate,
        state: MembershipState,
    ) -> Result<Membership, AppError> {
        let user = self.get_user(user_id).await?;

        if end_date < start_date {
            return Err(AppError::InvalidDateRange(format!(
                "end date {} is before start date {}",
                end_date, start_date
            )));
        }
        if self.repo.get_membership_for_user(user.id).await?.is_some() {
            return Err(AppError::MembershipAlreadyExists(user.id));
        }

        let membership = Membership::new(user.id, credits, start_date, end_date).with_state(state);
        self.repo.save_membership(&membership).await?;
        tracing::info!(user = %user.id, membership = %membership.id, credits, "membership created");
        Ok(membership)
    }

    pub async fn get_membership(&self, user_id: UserId) -> Result<Membership, AppError> {
        self.repo
            .get_membership_for_user(user_id)
            .await?
            .ok_or(AppError::MembershipNotFound(user_id))
    }

    /// Like `get_membership`, but a user without one is `None`. Storage
    /// failures are still errors.
    pub async fn find_membership(&self, user_id: UserId) -> Result<Option<Membership>, AppError> {
        match self.get_membership(user_id).await {
            Ok(membership) => Ok(Some(membership)),
            Err(AppError::MembershipNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn list_memberships(&self) -> Result<Vec<Membership>, AppError> {
        Ok(self.repo.list_memberships().await?)
    }

    /// Cancel a membership. Credits and dates are left as they are.
    pub async fn cancel_membership(&self, user_id: UserId) -> Result<Membership, AppError> {
        let mut membership = self.get_membership(user_id).await?;
        self.repo
            .set_membership_state(user_id, MembershipState::Cancelled)
            .await?;
        membership.state = MembershipState::Cancelled;
        tracing::info!(user = %user_id, membership = %membership.id, "membership cancelled");
        Ok(membership)
    }

    pub async fn delete_membership(&self, user_id: UserId) -> Result<Membership, AppError> {
        let membership = self.get_membership(user_id).await?;
        self.repo.delete_membership(user_id).await?;
        tracing::info!(user = %user_id, membership = %membership.id, "membership deleted");
        Ok(membership)
    }

    // ========================
    // Invoice operations
    // ========================

    /// This month's invoice for a user, if one was opened.
    pub async fn current_invoice(&self, user_id: UserId) -> Result<Option<Invoice>, AppError> {
        let month = self.current_month();
        let mut tx = self.repo.begin().await?;
        let invoice = InvoiceStore::new(&mut tx)
            .current_invoice_for(user_id, month)
            .await?;
        tx.commit().await.context("Failed to commit invoice lookup")?;
        Ok(invoice)
    }

    /// This month's invoice for a user, opening it if needed.
    pub async fn open_current_invoice(&self, user_id: UserId) -> Result<Invoice, AppError> {
        let user = self.get_user(user_id).await?;
        let month = self.current_month();

        let mut tx = self.repo.begin().await?;
        let invoice = InvoiceStore::new(&mut tx)
            .get_or_create_current_invoice(user.id, month)
            .await?;
        tx.commit().await.context("Failed to commit invoice")?;
        Ok(invoice)
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, AppError> {
        self.repo
            .get_invoice(id)
            .await?
            .ok_or(AppError::InvoiceNotFound(id))
    }

    pub async fn get_invoice_detail(&self, id: InvoiceId) -> Result<InvoiceDetail, AppError> {
        let invoice = self.get_invoice(id).await?;
        let lines = self.repo.list_invoice_lines(Some(id)).await?;
        Ok(InvoiceDetail { invoice, lines })
    }

    pub async fn list_invoices(&self, user_id: Option<UserId>) -> Result<Vec<Invoice>, AppError> {
        Ok(self.repo.list_invoices(user_id).await?)
    }

    pub async fn list_invoice_lines(
        &self,
        invoice_id: Option<InvoiceId>,
    ) -> Result<Vec<InvoiceLine>, AppError> {
        Ok(self.repo.list_invoice_lines(invoice_id).await?)
    }

    /// Add a line to an invoice by hand. The amount is folded into the invoice
    /// total exactly like attendance lines.
    pub async fn add_invoice_line(
        &self,
        invoice_id: InvoiceId,
        amount: Amount,
        description: &str,
    ) -> Result<InvoiceLine, AppError> {
        if amount < 0 {
            return Err(AppError::InvalidAmount(amount));
        }
        let mut invoice = self.get_invoice(invoice_id).await?;

        let mut tx = self.repo.begin().await?;
        let line = InvoiceStore::new(&mut tx)
            .add_line(&mut invoice, amount, description)
            .await?;
        tx.commit().await.context("Failed to commit invoice line")?;

        tracing::info!(invoice = %invoice.id, line = %line.id, amount, total = invoice.amount, "invoice line added");
        Ok(line)
    }

    pub async fn set_invoice_status(
        &self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<Invoice, AppError> {
        let mut invoice = self.get_invoice(invoice_id).await?;
        self.repo.set_invoice_status(invoice_id, status).await?;
        invoice.status = status;
        tracing::info!(invoice = %invoice.id, %status, "invoice status changed");
        Ok(invoice)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Recompute every invoice total from its lines and report disagreements.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let invoices = self.repo.list_invoices(None).await?;
        let lines = self.repo.list_invoice_lines(None).await?;
        Ok(build_integrity_report(&invoices, &lines))
    }
}
