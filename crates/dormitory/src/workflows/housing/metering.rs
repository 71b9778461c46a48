use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::workflows::billing::{
    compute_bill, split_evenly, MeterReading, PriceDraft, PriceEntryId, PriceScheduleEntry,
};

use super::domain::{Actor, CostShare, Payment, PaymentKind, UtilityBillDetail};
use super::error::HousingError;
use super::ledger::{require_staff, HousingLedger};
use super::payments::PaymentPublisher;
use super::storage::SnapshotStore;

/// One administrative edit of the price schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PriceScheduleChange {
    Add(PriceDraft),
    Update { id: PriceEntryId, draft: PriceDraft },
    Remove { id: PriceEntryId },
}

/// Bill generated from a meter reading plus the utility payments issued for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedBill {
    pub detail: UtilityBillDetail,
    pub payments: Vec<Payment>,
}

impl<S, P> HousingLedger<S, P>
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    /// Apply a schedule edit. `today` decides which entries are already effective; edits to
    /// effective or billed entries are refused. Returns the added, updated or removed entry.
    pub fn upsert_price_schedule(
        &self,
        actor: &Actor,
        today: NaiveDate,
        change: PriceScheduleChange,
    ) -> Result<PriceScheduleEntry, HousingError> {
        match change {
            PriceScheduleChange::Add(draft) => self.add_price_entry(actor, draft),
            PriceScheduleChange::Update { id, draft } => {
                self.update_price_entry(actor, today, &id, draft)
            }
            PriceScheduleChange::Remove { id } => self.remove_price_entry(actor, today, &id),
        }
    }

    pub fn add_price_entry(
        &self,
        actor: &Actor,
        draft: PriceDraft,
    ) -> Result<PriceScheduleEntry, HousingError> {
        require_staff(actor, "edit the price schedule")?;
        let entry = self.transact(|state| {
            let usage = state.schedule_usage();
            let id = state.next_price_id();
            Ok(state.schedule_mut().add(id, draft, &usage)?.clone())
        })?;
        info!(
            entry = %entry.id,
            from = %entry.effective_from,
            open_ended = entry.is_open_ended(),
            "price entry added"
        );
        Ok(entry)
    }

    pub fn update_price_entry(
        &self,
        actor: &Actor,
        today: NaiveDate,
        id: &PriceEntryId,
        draft: PriceDraft,
    ) -> Result<PriceScheduleEntry, HousingError> {
        require_staff(actor, "edit the price schedule")?;
        let entry = self.transact(|state| {
            let usage = state.schedule_usage();
            Ok(state.schedule_mut().update(id, draft, today, &usage)?.clone())
        })?;
        info!(entry = %entry.id, "price entry updated");
        Ok(entry)
    }

    pub fn remove_price_entry(
        &self,
        actor: &Actor,
        today: NaiveDate,
        id: &PriceEntryId,
    ) -> Result<PriceScheduleEntry, HousingError> {
        require_staff(actor, "edit the price schedule")?;
        let entry = self.transact(|state| {
            let usage = state.schedule_usage();
            Ok(state.schedule_mut().remove(id, today, &usage)?)
        })?;
        info!(entry = %entry.id, "price entry removed");
        Ok(entry)
    }

    /// Bill a room for one period and split the cost across the students housed there now. A room
    /// without occupants is refused, since nobody could be charged.
    pub fn record_meter_reading(
        &self,
        actor: &Actor,
        reading: MeterReading,
    ) -> Result<RecordedBill, HousingError> {
        require_staff(actor, "record meter readings")?;

        let recorded = self
            .transact(|state| {
                let duplicate = state
                    .readings()
                    .iter()
                    .any(|known| known.room_id == reading.room_id && known.period == reading.period);
                if duplicate {
                    return Err(HousingError::DuplicateReading {
                        room: reading.room_id.clone(),
                        period: reading.period,
                    });
                }

                let occupants: Vec<_> = state
                    .room(&reading.room_id)
                    .ok_or_else(|| HousingError::not_found("room", &reading.room_id))?
                    .occupants()
                    .cloned()
                    .collect();

                reading.validate()?;
                if occupants.is_empty() {
                    return Err(HousingError::NoOccupants {
                        room: reading.room_id.clone(),
                        period: reading.period,
                    });
                }
                let price = state.schedule().resolve(reading.period)?;
                let bill = compute_bill(&reading, &price)?;

                let amounts = split_evenly(bill.total, occupants.len());
                let shares: Vec<CostShare> = occupants
                    .into_iter()
                    .zip(amounts)
                    .map(|(student_id, amount)| CostShare { student_id, amount })
                    .collect();

                let detail = UtilityBillDetail {
                    id: state.next_bill_id(),
                    room_id: reading.room_id.clone(),
                    period: reading.period,
                    price_entry_id: price.entry_id,
                    bill,
                    shares,
                };

                let period_start = reading.period.first_day();
                let period_end = reading.period.last_day_after(1);
                let mut payments = Vec::with_capacity(detail.shares.len());
                for share in &detail.shares {
                    let payment = Payment {
                        id: state.next_payment_id(),
                        kind: PaymentKind::Utility,
                        student_id: share.student_id.clone(),
                        amount: share.amount,
                        period_start,
                        period_end,
                        source_id: detail.id.to_string(),
                        rent: None,
                    };
                    state.push_payment(payment.clone());
                    payments.push(payment);
                }

                state.push_reading(reading.clone());
                state.insert_bill(detail.clone());
                Ok(RecordedBill { detail, payments })
            })
            .inspect_err(|err| {
                match err {
                    HousingError::NoPriceDefined(missing) => {
                        warn!(period = %missing.period, "utility billing blocked by price gap");
                    }
                    HousingError::NoOccupants { room, period } => {
                        warn!(%room, %period, "meter reading refused for an empty room");
                    }
                    _ => {}
                }
            })?;

        info!(
            bill = %recorded.detail.id,
            room = %recorded.detail.room_id,
            period = %recorded.detail.period,
            total = recorded.detail.bill.total,
            shares = recorded.detail.shares.len(),
            "utility bill generated"
        );
        self.publish(&recorded.payments);
        Ok(recorded)
    }
}
