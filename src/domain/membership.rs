use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type MembershipId = Uuid;

/// Credits are attendance units, not money. They can go negative.
pub type Credits = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Active,
    Cancelled,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Active => "active",
            MembershipState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(MembershipState::Active),
            "cancelled" | "canceled" => Some(MembershipState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for MembershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub state: MembershipState,
    pub credits: Credits,
    pub start_date: NaiveDate,
    /// First day on which the membership is no longer valid
    pub end_date: NaiveDate,
}

impl Membership {
    pub fn new(user_id: UserId, credits: Credits, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            state: MembershipState::Active,
            credits,
            start_date,
            end_date,
        }
    }

    pub fn with_state(mut self, state: MembershipState) -> Self {
        self.state = state;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == MembershipState::Cancelled
    }

    pub fn has_expired(&self, today: NaiveDate) -> bool {
        self.end_date <= today
    }
}

/// Why a membership cannot be used for an attendance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipInvalid {
    Cancelled,
    /// Check-in needs a non-zero credit balance
    NoCredits,
    /// Check-out needs a non-negative credit balance
    NegativeCredits(Credits),
    Expired { end_date: NaiveDate },
}

impl std::fmt::Display for MembershipInvalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipInvalid::Cancelled => write!(f, "membership is cancelled"),
            MembershipInvalid::NoCredits => write!(f, "membership has no credits left"),
            MembershipInvalid::NegativeCredits(credits) => {
                write!(f, "membership credit balance is negative ({})", credits)
            }
            MembershipInvalid::Expired { end_date } => {
                write!(f, "membership expired on {}", end_date)
            }
        }
    }
}

impl std::error::Error for MembershipInvalid {}

fn validate_window(membership: &Membership, today: NaiveDate) -> Result<(), MembershipInvalid> {
    if membership.is_cancelled() {
        return Err(MembershipInvalid::Cancelled);
    }
    if membership.has_expired(today) {
        return Err(MembershipInvalid::Expired {
            end_date: membership.end_date,
        });
    }
    Ok(())
}

/// Check whether a membership may be used to check in on `today`.
///
/// Only an exact zero balance blocks check-in; a negative balance left behind
/// by earlier events does not.
pub fn validate_for_check_in(
    membership: &Membership,
    today: NaiveDate,
) -> Result<(), MembershipInvalid> {
    validate_window(membership, today)?;
    if membership.credits == 0 {
        return Err(MembershipInvalid::NoCredits);
    }
    Ok(())
}

/// Check whether a membership may be used to check out on `today`.
///
/// Unlike check-in, a zero balance is accepted so a member can check out
/// after their last credit was consumed.
pub fn validate_for_check_out(
    membership: &Membership,
    today: NaiveDate,
) -> Result<(), MembershipInvalid> {
    validate_window(membership, today)?;
    if membership.credits < 0 {
        return Err(MembershipInvalid::NegativeCredits(membership.credits));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 15).unwrap()
    }

    fn valid_membership(credits: Credits) -> Membership {
        Membership::new(
            Uuid::new_v4(),
            credits,
            today() - Duration::days(10),
            today() + Duration::days(30),
        )
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [MembershipState::Active, MembershipState::Cancelled] {
            assert_eq!(MembershipState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(MembershipState::from_str("frozen"), None);
    }

    #[test]
    fn test_valid_membership_passes_both_checks() {
        let membership = valid_membership(4);
        assert!(validate_for_check_in(&membership, today()).is_ok());
        assert!(validate_for_check_out(&membership, today()).is_ok());
    }

    #[test]
    fn test_cancelled_membership_is_rejected() {
        let membership = valid_membership(4).with_state(MembershipState::Cancelled);
        assert_eq!(
            validate_for_check_in(&membership, today()),
            Err(MembershipInvalid::Cancelled)
        );
        assert_eq!(
            validate_for_check_out(&membership, today()),
            Err(MembershipInvalid::Cancelled)
        );
    }

    #[test]
    fn test_membership_ending_today_is_expired() {
        let mut membership = valid_membership(4);
        membership.end_date = today();

        assert!(matches!(
            validate_for_check_in(&membership, today()),
            Err(MembershipInvalid::Expired { .. })
        ));
        assert!(matches!(
            validate_for_check_out(&membership, today()),
            Err(MembershipInvalid::Expired { .. })
        ));

        // One more day and it's fine again
        membership.end_date = today() + Duration::days(1);
        assert!(validate_for_check_in(&membership, today()).is_ok());
    }

    #[test]
    fn test_zero_credits_blocks_check_in_only() {
        let membership = valid_membership(0);
        assert_eq!(
            validate_for_check_in(&membership, today()),
            Err(MembershipInvalid::NoCredits)
        );
        assert!(validate_for_check_out(&membership, today()).is_ok());
    }

    #[test]
    fn test_negative_credits_blocks_check_out_only() {
        let membership = valid_membership(-1);
        assert!(validate_for_check_in(&membership, today()).is_ok());
        assert_eq!(
            validate_for_check_out(&membership, today()),
            Err(MembershipInvalid::NegativeCredits(-1))
        );
    }

    #[test]
    fn test_cancellation_reported_before_expiry() {
        let mut membership = valid_membership(0).with_state(MembershipState::Cancelled);
        membership.end_date = today() - Duration::days(1);
        assert_eq!(
            validate_for_check_in(&membership, today()),
            Err(MembershipInvalid::Cancelled)
        );
    }
}
