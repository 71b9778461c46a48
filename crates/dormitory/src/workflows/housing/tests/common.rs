use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::billing::{BillingPeriod, MeterReading, PriceDraft};
use crate::workflows::housing::domain::{
    Actor, BedId, Payment, Registration, RegistrationRequest, Role, RoomId, RoomSpec, RoomType,
    StudentId,
};
use crate::workflows::housing::ledger::{HousingLedger, LedgerSnapshot};
use crate::workflows::housing::payments::{
    InMemoryPaymentPublisher, PaymentPublisher, PublishError,
};
use crate::workflows::housing::registration::ContractPolicy;
use crate::workflows::housing::storage::{MemorySnapshotStore, SnapshotStore, StorageError};

pub(super) type MemoryLedger = HousingLedger<MemorySnapshotStore, InMemoryPaymentPublisher>;

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn period(y: i32, m: u32) -> BillingPeriod {
    BillingPeriod::new(y, m).expect("valid period")
}

pub(super) fn staff() -> Actor {
    Actor::new("nv-01", Role::Staff)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin", Role::Admin)
}

pub(super) fn student(id: &str) -> Actor {
    Actor::new(id, Role::Student)
}

pub(super) fn room_id(id: &str) -> RoomId {
    RoomId(id.to_string())
}

pub(super) fn bed_id(id: &str) -> BedId {
    BedId(id.to_string())
}

pub(super) fn student_id(id: &str) -> StudentId {
    StudentId(id.to_string())
}

fn room(id: &str, room_type: RoomType, capacity: u32, beds: u32, rate: u64) -> RoomSpec {
    RoomSpec {
        id: room_id(id),
        room_type,
        capacity,
        monthly_rate: rate,
        bed_ids: (1..=beds).map(|n| bed_id(&format!("{id}-{n}"))).collect(),
    }
}

/// Two female rooms and one male room.
pub(super) fn seed_rooms<S, P>(ledger: &HousingLedger<S, P>)
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    for spec in [
        room("A101", RoomType::Female, 4, 4, 1_000_000),
        room("A102", RoomType::Female, 2, 2, 1_200_000),
        room("B201", RoomType::Male, 3, 3, 800_000),
    ] {
        ledger.add_room(&admin(), spec).expect("room registered");
    }
}

pub(super) fn build_ledger() -> (MemoryLedger, InMemoryPaymentPublisher) {
    build_ledger_with_policy(ContractPolicy::new(3))
}

pub(super) fn build_ledger_with_policy(
    policy: ContractPolicy,
) -> (MemoryLedger, InMemoryPaymentPublisher) {
    let publisher = InMemoryPaymentPublisher::default();
    let ledger = HousingLedger::open(
        Arc::new(MemorySnapshotStore::default()),
        Arc::new(publisher.clone()),
        policy,
    )
    .expect("ledger opens");
    seed_rooms(&ledger);
    (ledger, publisher)
}

pub(super) fn submit<S, P>(
    ledger: &HousingLedger<S, P>,
    student: &str,
    room_type: RoomType,
    move_in: NaiveDate,
) -> Registration
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    ledger
        .submit_registration(
            &self::student(student),
            RegistrationRequest {
                student_id: student_id(student),
                room_type,
                requested_move_in: move_in,
            },
        )
        .expect("registration submitted")
}

/// Submit and approve a registration so the student occupies `bed`.
pub(super) fn house<S, P>(ledger: &HousingLedger<S, P>, student: &str, room: &str, bed: &str)
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    let room_type = ledger.room(&room_id(room)).expect("room exists").room_type;
    let registration = submit(ledger, student, room_type, date(2024, 3, 4));
    ledger
        .approve_registration(&staff(), &registration.id, &room_id(room), &bed_id(bed))
        .expect("approval succeeds");
}

pub(super) fn open_price(from: NaiveDate, electricity: u64, water: u64) -> PriceDraft {
    PriceDraft {
        effective_from: from,
        effective_to: None,
        electricity_unit_price: electricity,
        water_unit_price: water,
    }
}

pub(super) fn reading(
    room: &str,
    period: BillingPeriod,
    electricity: (u64, u64),
    water: (u64, u64),
) -> MeterReading {
    MeterReading {
        room_id: room_id(room),
        period,
        prior_electricity: electricity.0,
        new_electricity: electricity.1,
        prior_water: water.0,
        new_water: water.1,
    }
}

/// Store whose saves can be switched to fail, to observe rollback.
#[derive(Default)]
pub(super) struct FlakyStore {
    inner: MemorySnapshotStore,
    pub(super) failing: AtomicBool,
}

impl FlakyStore {
    pub(super) fn fail_saves(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl SnapshotStore for FlakyStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        self.inner.load()
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk detached".to_string()));
        }
        self.inner.save(snapshot)
    }
}

pub(super) struct OfflinePublisher;

impl PaymentPublisher for OfflinePublisher {
    fn publish(&self, _payment: &Payment) -> Result<(), PublishError> {
        Err(PublishError::Transport("payment gateway offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
