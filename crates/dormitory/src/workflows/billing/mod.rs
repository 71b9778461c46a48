//! Rent proration, utility price schedules, and metered utility bills.

pub mod import;
pub mod period;
pub mod pricing;
pub mod proration;
pub mod utility;

pub use import::{MeterImportError, MeterReadingImporter};
pub use period::{BillingPeriod, ParsePeriodError};
pub use pricing::{
    NoPriceDefined, PriceDraft, PriceEntryId, PriceSchedule, PriceScheduleEntry, ResolvedPrice,
    ScheduleError, ScheduleUsage,
};
pub use proration::{
    Coefficient, MonthCharge, ProrationCalculator, ProrationError, RentBreakdown,
    HALF_MONTH_THRESHOLD_DAY,
};
pub use utility::{compute_bill, split_evenly, InvalidReading, MeterReading, UtilityBill};
