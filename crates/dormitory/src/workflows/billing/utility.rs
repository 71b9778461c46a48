use serde::{Deserialize, Serialize};

use super::period::BillingPeriod;
use super::pricing::ResolvedPrice;
use crate::workflows::housing::domain::RoomId;

/// Prior and new meter values recorded for a room in a billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub room_id: RoomId,
    pub period: BillingPeriod,
    pub prior_electricity: u64,
    pub new_electricity: u64,
    pub prior_water: u64,
    pub new_water: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityBill {
    pub electricity_consumed: u64,
    pub water_consumed: u64,
    pub electricity_cost: u64,
    pub water_cost: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReading {
    #[error("electricity reading went backwards ({prior} -> {new})")]
    ElectricityRegressed { prior: u64, new: u64 },
    #[error("water reading went backwards ({prior} -> {new})")]
    WaterRegressed { prior: u64, new: u64 },
    #[error("utility cost exceeds the representable amount")]
    CostOverflow,
}

impl MeterReading {
    pub fn validate(&self) -> Result<(), InvalidReading> {
        if self.new_electricity < self.prior_electricity {
            return Err(InvalidReading::ElectricityRegressed {
                prior: self.prior_electricity,
                new: self.new_electricity,
            });
        }
        if self.new_water < self.prior_water {
            return Err(InvalidReading::WaterRegressed {
                prior: self.prior_water,
                new: self.new_water,
            });
        }
        Ok(())
    }
}

/// Consumption times unit price for both meters, in whole VND.
pub fn compute_bill(
    reading: &MeterReading,
    price: &ResolvedPrice,
) -> Result<UtilityBill, InvalidReading> {
    reading.validate()?;

    let electricity_consumed = reading.new_electricity - reading.prior_electricity;
    let water_consumed = reading.new_water - reading.prior_water;
    let electricity_cost = electricity_consumed
        .checked_mul(price.electricity_unit_price)
        .ok_or(InvalidReading::CostOverflow)?;
    let water_cost = water_consumed
        .checked_mul(price.water_unit_price)
        .ok_or(InvalidReading::CostOverflow)?;
    let total = electricity_cost
        .checked_add(water_cost)
        .ok_or(InvalidReading::CostOverflow)?;

    Ok(UtilityBill {
        electricity_consumed,
        water_consumed,
        electricity_cost,
        water_cost,
        total,
    })
}

/// Split `total` into `parts` shares that differ by at most one VND, larger shares first.
pub fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    let Ok(count) = u64::try_from(parts) else {
        return Vec::new();
    };
    if count == 0 {
        return Vec::new();
    }

    let base = total / count;
    let remainder = total % count;
    (0..count)
        .map(|index| if index < remainder { base + 1 } else { base })
        .collect()
}
