// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use palestra::application::AttendanceService;
use palestra::domain::{FixedClock, Membership, MembershipState, User};
use tempfile::TempDir;

/// Day the fixed clock reports unless a test says otherwise
pub fn today() -> NaiveDate {
    parse_date("2024-04-15")
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Helper to create a test service with a temporary database, pinned to `today()`
pub async fn test_service() -> Result<(AttendanceService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = AttendanceService::init(db_path(&temp_dir).as_str())
        .await?
        .with_clock(FixedClock(today()));
    Ok((service, temp_dir))
}

/// Open another service on the same database with a different "today"
pub async fn service_at(temp_dir: &TempDir, date: &str) -> Result<AttendanceService> {
    let service = AttendanceService::connect(db_path(temp_dir).as_str())
        .await?
        .with_clock(FixedClock(parse_date(date)));
    Ok(service)
}

pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

/// Test fixture: members with memberships
pub struct GymFixtures;

impl GymFixtures {
    /// Register a user with an active membership valid for 30 more days
    pub async fn member(
        service: &AttendanceService,
        email: &str,
        credits: i64,
    ) -> Result<(User, Membership)> {
        Self::member_with(service, email, credits, MembershipState::Active, 30).await
    }

    pub async fn member_with(
        service: &AttendanceService,
        email: &str,
        credits: i64,
        state: MembershipState,
        days_left: i64,
    ) -> Result<(User, Membership)> {
        let user = service.register_user(email, "Test Member").await?;
        let today = service.today();
        let membership = service
            .create_membership(
                user.id,
                credits,
                today - Duration::days(10),
                today + Duration::days(days_left),
                state,
            )
            .await?;
        Ok((user, membership))
    }
}
