use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{Row, SqliteConnection};

use crate::domain::{self, Credits, Membership, MembershipInvalid, UserId};

use super::rows::{row_to_membership, MEMBERSHIP_COLUMNS};

/// Membership credit ledger bound to one connection, normally an open transaction.
///
/// Credit changes are relative updates (`credits = credits - 1`), so they never
/// overwrite a balance read earlier in the request.
pub struct Ledger<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> Ledger<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Get the membership belonging to a user.
    pub async fn membership_for_user(&mut self, user_id: UserId) -> Result<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memberships WHERE user_id = ?",
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .context("Failed to fetch membership")?;

        row.as_ref().map(row_to_membership).transpose()
    }

    pub fn validate_for_check_in(
        &self,
        membership: &Membership,
        today: NaiveDate,
    ) -> Result<(), MembershipInvalid> {
        domain::validate_for_check_in(membership, today)
    }

    pub fn validate_for_check_out(
        &self,
        membership: &Membership,
        today: NaiveDate,
    ) -> Result<(), MembershipInvalid> {
        domain::validate_for_check_out(membership, today)
    }

    /// Take one credit. Returns the new balance and mirrors it into `membership`.
    pub async fn debit(&mut self, membership: &mut Membership) -> Result<Credits> {
        self.adjust(membership, -1).await
    }

    /// Give one credit back. Returns the new balance and mirrors it into `membership`.
    pub async fn credit(&mut self, membership: &mut Membership) -> Result<Credits> {
        self.adjust(membership, 1).await
    }

    async fn adjust(&mut self, membership: &mut Membership, delta: Credits) -> Result<Credits> {
        // SQLite would silently turn an overflowing sum into a REAL.
        membership.credits.checked_add(delta).ok_or_else(|| {
            anyhow::anyhow!(
                "Credit balance of membership {} out of range ({} {:+})",
                membership.id,
                membership.credits,
                delta
            )
        })?;

        let row = sqlx::query(
            r#"
            UPDATE memberships
            SET credits = credits + ?
            WHERE id = ?
            RETURNING credits
            "#,
        )
        .bind(delta)
        .bind(membership.id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .context("Failed to update membership credits")?
        .ok_or_else(|| anyhow::anyhow!("Membership {} disappeared", membership.id))?;

        let credits: Credits = row
            .try_get("credits")
            .context("Membership credits are not an integer")?;
        tracing::debug!(membership = %membership.id, delta, credits, "credits adjusted");
        membership.credits = credits;
        Ok(credits)
    }
}
