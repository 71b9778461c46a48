use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::BillingPeriod;

/// Move-in days on or after this day of the month are billed as half a month.
pub const HALF_MONTH_THRESHOLD_DAY: u32 = 15;

/// Fraction of the monthly rate charged for a single billed month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coefficient {
    Full,
    Half,
}

impl Coefficient {
    pub fn value(self) -> Decimal {
        match self {
            Self::Full => Decimal::new(10, 1),
            Self::Half => Decimal::new(5, 1),
        }
    }

    /// Charge in whole VND; an odd rate halves with the remaining half-VND rounded up.
    pub const fn apply(self, monthly_rate: u64) -> u64 {
        match self {
            Self::Full => monthly_rate,
            Self::Half => monthly_rate / 2 + monthly_rate % 2,
        }
    }
}

/// One row of the rent breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCharge {
    pub month: BillingPeriod,
    /// First occupied day within the month.
    pub start_day: u32,
    pub day_threshold: u32,
    pub coefficient: Decimal,
    pub formula: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentBreakdown {
    pub months: Vec<MonthCharge>,
    /// Sum of the coefficients, e.g. `2.5` for a half first month followed by two full ones.
    pub total_months: Decimal,
    pub total_amount: u64,
}

impl RentBreakdown {
    /// Amount billed for the three consecutive months starting at row `first`.
    pub fn quarter_amount(&self, first: usize) -> Option<u64> {
        let end = first.checked_add(3)?;
        self.months
            .get(first..end)
            .and_then(sum_amounts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProrationError {
    #[error("occupancy ends on {end} before it starts on {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("rent total for a monthly rate of {monthly_rate} exceeds the representable amount")]
    AmountOverflow { monthly_rate: u64 },
}

/// Splits an occupancy window into calendar months and prices each month.
///
/// Only the first month is ever prorated: a move-in before the threshold day pays the full
/// month, a move-in on or after it pays half. Every following month, including the month that
/// contains the end date, is charged in full. An open-ended window yields the first month only.
#[derive(Debug, Clone, Copy)]
pub struct ProrationCalculator {
    threshold_day: u32,
}

impl Default for ProrationCalculator {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProrationCalculator {
    pub const fn standard() -> Self {
        Self {
            threshold_day: HALF_MONTH_THRESHOLD_DAY,
        }
    }

    pub fn first_month_coefficient(&self, start: NaiveDate) -> Coefficient {
        if start.day() < self.threshold_day {
            Coefficient::Full
        } else {
            Coefficient::Half
        }
    }

    pub fn compute_rent(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
        monthly_rate: u64,
    ) -> Result<RentBreakdown, ProrationError> {
        if let Some(end) = end {
            if end < start {
                return Err(ProrationError::InvalidRange { start, end });
            }
        }

        let first = BillingPeriod::containing(start);
        let mut months = vec![self.charge(
            first,
            start.day(),
            self.first_month_coefficient(start),
            monthly_rate,
        )];

        if let Some(end) = end {
            let last = BillingPeriod::containing(end);
            let mut cursor = first.next();
            while let Some(period) = cursor.filter(|period| *period <= last) {
                months.push(self.charge(period, 1, Coefficient::Full, monthly_rate));
                cursor = period.next();
            }
        }

        let total_months = months.iter().map(|row| row.coefficient).sum();
        let total_amount =
            sum_amounts(&months).ok_or(ProrationError::AmountOverflow { monthly_rate })?;

        Ok(RentBreakdown {
            months,
            total_months,
            total_amount,
        })
    }

    fn charge(
        &self,
        month: BillingPeriod,
        start_day: u32,
        coefficient: Coefficient,
        monthly_rate: u64,
    ) -> MonthCharge {
        let amount = coefficient.apply(monthly_rate);
        let value = coefficient.value();
        MonthCharge {
            month,
            start_day,
            day_threshold: self.threshold_day,
            coefficient: value,
            formula: format!("{value} x {monthly_rate} = {amount}"),
            amount,
        }
    }
}

fn sum_amounts(rows: &[MonthCharge]) -> Option<u64> {
    rows.iter()
        .try_fold(0u64, |total, row| total.checked_add(row.amount))
}
