use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::workflows::billing::{
    BillingPeriod, MeterReading, PriceEntryId, PriceSchedule, PriceScheduleEntry,
    ProrationCalculator, RentBreakdown, ResolvedPrice, ScheduleUsage,
};

use super::allocation::{AvailableRoom, RoomAllocationFinder};
use super::domain::{
    Actor, BedId, BillId, Payment, PaymentId, Registration, RegistrationId, Room, RoomId,
    RoomSpec, RoomStatus, RoomTransferRequest, RoomType, StudentId, TransferId,
    UtilityBillDetail,
};
use super::error::HousingError;
use super::payments::PaymentPublisher;
use super::registration::ContractPolicy;
use super::storage::{SnapshotStore, StorageError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sequences {
    registration: u64,
    transfer: u64,
    payment: u64,
    bill: u64,
    price: u64,
}

fn next_id(counter: &mut u64, prefix: &str) -> String {
    *counter += 1;
    format!("{prefix}-{:06}", *counter)
}

/// Every durable record the engine owns, persisted as one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    rooms: BTreeMap<RoomId, Room>,
    registrations: BTreeMap<RegistrationId, Registration>,
    transfers: BTreeMap<TransferId, RoomTransferRequest>,
    schedule: PriceSchedule,
    readings: Vec<MeterReading>,
    bills: BTreeMap<BillId, UtilityBillDetail>,
    payments: Vec<Payment>,
    sequences: Sequences,
}

impl LedgerSnapshot {
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub(crate) fn room_mut(&mut self, id: &RoomId) -> Result<&mut Room, HousingError> {
        self.rooms
            .get_mut(id)
            .ok_or_else(|| HousingError::not_found("room", id))
    }

    pub(crate) fn insert_room(&mut self, spec: RoomSpec) -> Result<&Room, HousingError> {
        if self.rooms.contains_key(&spec.id) {
            return Err(HousingError::RoomExists(spec.id));
        }
        let room = spec.into_room();
        let id = room.id.clone();
        Ok(self.rooms.entry(id).or_insert(room))
    }

    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.values()
    }

    pub fn registration(&self, id: &RegistrationId) -> Option<&Registration> {
        self.registrations.get(id)
    }

    pub(crate) fn registration_mut(
        &mut self,
        id: &RegistrationId,
    ) -> Result<&mut Registration, HousingError> {
        self.registrations
            .get_mut(id)
            .ok_or_else(|| HousingError::not_found("registration", id))
    }

    pub(crate) fn insert_registration(&mut self, registration: Registration) {
        self.registrations
            .insert(registration.id.clone(), registration);
    }

    pub fn transfers(&self) -> impl Iterator<Item = &RoomTransferRequest> {
        self.transfers.values()
    }

    pub fn transfer(&self, id: &TransferId) -> Option<&RoomTransferRequest> {
        self.transfers.get(id)
    }

    pub(crate) fn transfer_mut(
        &mut self,
        id: &TransferId,
    ) -> Result<&mut RoomTransferRequest, HousingError> {
        self.transfers
            .get_mut(id)
            .ok_or_else(|| HousingError::not_found("transfer", id))
    }

    pub(crate) fn insert_transfer(&mut self, transfer: RoomTransferRequest) {
        self.transfers.insert(transfer.id.clone(), transfer);
    }

    pub fn schedule(&self) -> &PriceSchedule {
        &self.schedule
    }

    pub(crate) fn schedule_mut(&mut self) -> &mut PriceSchedule {
        &mut self.schedule
    }

    pub fn readings(&self) -> &[MeterReading] {
        &self.readings
    }

    pub(crate) fn push_reading(&mut self, reading: MeterReading) {
        self.readings.push(reading);
    }

    pub fn bills(&self) -> impl Iterator<Item = &UtilityBillDetail> {
        self.bills.values()
    }

    pub(crate) fn insert_bill(&mut self, bill: UtilityBillDetail) {
        self.bills.insert(bill.id.clone(), bill);
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub(crate) fn push_payment(&mut self, payment: Payment) {
        self.payments.push(payment);
    }

    /// Price entries referenced by generated bills, with the periods they were used for.
    pub fn schedule_usage(&self) -> ScheduleUsage {
        let mut usage = ScheduleUsage::default();
        for bill in self.bills.values() {
            usage.record(bill.price_entry_id.clone(), bill.period);
        }
        usage
    }

    /// Room and bed currently held by `student`.
    pub fn locate_student(&self, student: &StudentId) -> Option<(RoomId, BedId)> {
        self.rooms.values().find_map(|room| {
            room.beds
                .iter()
                .find(|bed| bed.occupant.as_ref() == Some(student))
                .map(|bed| (room.id.clone(), bed.id.clone()))
        })
    }

    pub(crate) fn next_registration_id(&mut self) -> RegistrationId {
        RegistrationId(next_id(&mut self.sequences.registration, "reg"))
    }

    pub(crate) fn next_transfer_id(&mut self) -> TransferId {
        TransferId(next_id(&mut self.sequences.transfer, "trf"))
    }

    pub(crate) fn next_payment_id(&mut self) -> PaymentId {
        PaymentId(next_id(&mut self.sequences.payment, "pay"))
    }

    pub(crate) fn next_bill_id(&mut self) -> BillId {
        BillId(next_id(&mut self.sequences.bill, "bill"))
    }

    pub(crate) fn next_price_id(&mut self) -> PriceEntryId {
        PriceEntryId(next_id(&mut self.sequences.price, "price"))
    }
}

/// Shared, durable state behind every workflow.
///
/// Transitions run against a scratch copy of the snapshot while holding the write lock; the copy
/// replaces the live state only after the store accepted it. Readers therefore observe either the
/// old or the new state in full, and two transitions racing for the same bed are serialized.
pub struct HousingLedger<S, P> {
    state: RwLock<LedgerSnapshot>,
    store: Arc<S>,
    publisher: Arc<P>,
    pub(crate) policy: ContractPolicy,
    pub(crate) proration: ProrationCalculator,
}

impl<S, P> HousingLedger<S, P>
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    /// Open the ledger, restoring the last persisted snapshot if there is one.
    pub fn open(
        store: Arc<S>,
        publisher: Arc<P>,
        policy: ContractPolicy,
    ) -> Result<Self, HousingError> {
        let snapshot = store.load()?.unwrap_or_default();
        info!(
            rooms = snapshot.rooms.len(),
            registrations = snapshot.registrations.len(),
            "housing ledger opened"
        );

        Ok(Self {
            state: RwLock::new(snapshot),
            store,
            publisher,
            policy,
            proration: ProrationCalculator::standard(),
        })
    }

    pub fn policy(&self) -> ContractPolicy {
        self.policy
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&LedgerSnapshot) -> T) -> Result<T, HousingError> {
        let guard = self.state.read().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&guard))
    }

    pub(crate) fn transact<T>(
        &self,
        f: impl FnOnce(&mut LedgerSnapshot) -> Result<T, HousingError>,
    ) -> Result<T, HousingError> {
        let mut guard = self.state.write().map_err(|_| StorageError::Poisoned)?;
        let mut draft = guard.clone();
        let value = f(&mut draft)?;
        self.store.save(&draft)?;
        *guard = draft;
        Ok(value)
    }

    /// Hand committed payments to the payment collaborator. The payments are already durable,
    /// so a delivery failure is logged rather than undoing the transition.
    pub(crate) fn publish(&self, payments: &[Payment]) {
        for payment in payments {
            if let Err(err) = self.publisher.publish(payment) {
                warn!(payment = %payment.id, error = %err, "payment delivery failed");
            }
        }
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, HousingError> {
        self.read(LedgerSnapshot::clone)
    }

    pub fn add_room(&self, actor: &Actor, spec: RoomSpec) -> Result<Room, HousingError> {
        require_staff(actor, "register rooms")?;
        let room = self.transact(|state| state.insert_room(spec).cloned())?;
        info!(room = %room.id, beds = room.beds.len(), "room registered");
        Ok(room)
    }

    /// Lock or reopen a room for new allocations. Current occupants are unaffected.
    pub fn set_room_status(
        &self,
        actor: &Actor,
        room_id: &RoomId,
        status: RoomStatus,
    ) -> Result<Room, HousingError> {
        require_staff(actor, "change room status")?;
        self.transact(|state| {
            let room = state.room_mut(room_id)?;
            room.status = status;
            Ok(room.clone())
        })
    }

    pub fn room(&self, room_id: &RoomId) -> Result<Room, HousingError> {
        self.read(|state| state.room(room_id).cloned())?
            .ok_or_else(|| HousingError::not_found("room", room_id))
    }

    pub fn find_available(
        &self,
        room_type: RoomType,
        as_of: NaiveDate,
    ) -> Result<Vec<AvailableRoom>, HousingError> {
        self.read(|state| RoomAllocationFinder::new(state).find_available(room_type, as_of))
    }

    pub fn registration(&self, id: &RegistrationId) -> Result<Registration, HousingError> {
        self.read(|state| state.registration(id).cloned())?
            .ok_or_else(|| HousingError::not_found("registration", id))
    }

    pub fn transfer(&self, id: &TransferId) -> Result<RoomTransferRequest, HousingError> {
        self.read(|state| state.transfer(id).cloned())?
            .ok_or_else(|| HousingError::not_found("transfer", id))
    }

    pub fn payments_for(&self, student: &StudentId) -> Result<Vec<Payment>, HousingError> {
        self.read(|state| {
            state
                .payments()
                .iter()
                .filter(|payment| &payment.student_id == student)
                .cloned()
                .collect()
        })
    }

    pub fn price_schedule(&self) -> Result<Vec<PriceScheduleEntry>, HousingError> {
        self.read(|state| state.schedule().entries().to_vec())
    }

    pub fn resolve_price(&self, period: BillingPeriod) -> Result<ResolvedPrice, HousingError> {
        Ok(self.read(|state| state.schedule().resolve(period))??)
    }

    /// Rent for an arbitrary window, without touching any record.
    pub fn quote_rent(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
        monthly_rate: u64,
    ) -> Result<RentBreakdown, HousingError> {
        Ok(self.proration.compute_rent(start, end, monthly_rate)?)
    }
}

pub(crate) fn require_staff(actor: &Actor, action: &'static str) -> Result<(), HousingError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(HousingError::Forbidden {
            actor: actor.id.clone(),
            action,
        })
    }
}
