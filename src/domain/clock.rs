use chrono::{NaiveDate, Utc};

use super::BillingMonth;

/// Source of "today" for membership validity and invoice month resolution.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn current_month(&self) -> BillingMonth {
        BillingMonth::containing(self.today())
    }
}

/// Reads the current UTC date from the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_month() {
        let clock = FixedClock(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(clock.current_month().label(), "2023-12");
    }
}
