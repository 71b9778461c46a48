use std::sync::Arc;

use rust_decimal::Decimal;

use super::common::*;
use crate::workflows::housing::domain::{
    PaymentKind, Registration, RegistrationRequest, RegistrationStatus, RoomStatus, RoomType,
};
use crate::workflows::housing::error::{AllocationConflict, HousingError};
use crate::workflows::housing::ledger::HousingLedger;
use crate::workflows::housing::payments::InMemoryPaymentPublisher;
use crate::workflows::housing::registration::ContractPolicy;
use crate::workflows::housing::storage::{MemorySnapshotStore, SnapshotStore};

#[test]
fn approval_claims_bed_and_issues_prorated_rent() {
    let (ledger, publisher) = build_ledger();
    let registration = submit(&ledger, "sv-100", RoomType::Female, date(2024, 3, 20));

    let outcome = ledger
        .approve_registration(
            &staff(),
            &registration.id,
            &room_id("A101"),
            &bed_id("A101-2"),
        )
        .expect("approval succeeds");

    assert_eq!(outcome.registration.status, RegistrationStatus::Approved);
    assert_eq!(outcome.registration.contract_end, Some(date(2024, 5, 31)));
    assert_eq!(outcome.registration.assigned_bed_id, Some(bed_id("A101-2")));
    assert_eq!(outcome.registration.resolved_by.as_deref(), Some("nv-01"));

    let payment = &outcome.payment;
    assert_eq!(payment.kind, PaymentKind::Rent);
    assert_eq!(payment.amount, 2_500_000);
    assert_eq!(payment.period_start, date(2024, 3, 20));
    assert_eq!(payment.period_end, Some(date(2024, 5, 31)));
    let rent = payment.rent.as_ref().expect("rent breakdown attached");
    let coefficients: Vec<Decimal> = rent.months.iter().map(|row| row.coefficient).collect();
    assert_eq!(
        coefficients,
        vec![Decimal::new(5, 1), Decimal::ONE, Decimal::ONE]
    );
    assert_eq!(rent.total_months, Decimal::new(25, 1));

    let room = ledger.room(&room_id("A101")).expect("room exists");
    assert_eq!(room.occupied_count, 1);
    assert_eq!(
        room.bed(&bed_id("A101-2")).and_then(|bed| bed.occupant.clone()),
        Some(student_id("sv-100"))
    );

    assert_eq!(publisher.events(), vec![payment.clone()]);
    assert_eq!(
        ledger.payments_for(&student_id("sv-100")).expect("payments"),
        vec![payment.clone()]
    );
}

#[test]
fn default_policy_bills_five_full_months_for_early_move_in() {
    let (ledger, _) = build_ledger_with_policy(ContractPolicy::default());
    let registration = submit(&ledger, "sv-101", RoomType::Male, date(2024, 9, 5));

    let outcome = ledger
        .approve_registration(
            &staff(),
            &registration.id,
            &room_id("B201"),
            &bed_id("B201-1"),
        )
        .expect("approval succeeds");

    assert_eq!(outcome.registration.contract_end, Some(date(2025, 1, 31)));
    assert_eq!(outcome.payment.amount, 5 * 800_000);
}

#[test]
fn rejecting_twice_fails_and_keeps_first_decision() {
    let (ledger, publisher) = build_ledger();
    let registration = submit(&ledger, "sv-102", RoomType::Female, date(2024, 8, 1));

    let rejected = ledger
        .reject_registration(&staff(), &registration.id, " documents missing ")
        .expect("first rejection succeeds");
    assert_eq!(rejected.status, RegistrationStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("documents missing"));

    let err = ledger
        .reject_registration(&admin(), &registration.id, "second reason")
        .expect_err("second rejection fails");
    assert!(matches!(
        err,
        HousingError::InvalidState {
            status: "rejected",
            ..
        }
    ));

    let stored = ledger.registration(&registration.id).expect("stored");
    assert_eq!(stored, rejected);
    assert!(publisher.events().is_empty());
}

#[test]
fn terminal_registrations_cannot_be_approved() {
    let (ledger, _) = build_ledger();
    let registration = submit(&ledger, "sv-103", RoomType::Female, date(2024, 8, 1));
    ledger
        .reject_registration(&staff(), &registration.id, "late")
        .expect("rejected");

    let err = ledger
        .approve_registration(
            &staff(),
            &registration.id,
            &room_id("A101"),
            &bed_id("A101-1"),
        )
        .expect_err("approval fails");
    assert!(matches!(err, HousingError::InvalidState { .. }));

    let room = ledger.room(&room_id("A101")).expect("room exists");
    assert_eq!(room.occupied_count, 0);
    assert!(ledger.snapshot().expect("snapshot").payments().is_empty());
}

#[test]
fn mismatched_room_type_is_an_allocation_conflict_without_side_effects() {
    let (ledger, publisher) = build_ledger();
    let registration = submit(&ledger, "sv-104", RoomType::Female, date(2024, 8, 1));

    let err = ledger
        .approve_registration(
            &staff(),
            &registration.id,
            &room_id("B201"),
            &bed_id("B201-1"),
        )
        .expect_err("male room refused");
    assert!(matches!(
        err,
        HousingError::AllocationConflict(AllocationConflict::RoomTypeMismatch(_))
    ));

    let stored = ledger.registration(&registration.id).expect("stored");
    assert_eq!(stored.status, RegistrationStatus::Pending);
    assert!(stored.assigned_bed_id.is_none());
    assert!(publisher.events().is_empty());
}

#[test]
fn second_claim_on_a_bed_loses() {
    let (ledger, _) = build_ledger();
    let first = submit(&ledger, "sv-105", RoomType::Female, date(2024, 8, 1));
    let second = submit(&ledger, "sv-106", RoomType::Female, date(2024, 8, 1));

    ledger
        .approve_registration(&staff(), &first.id, &room_id("A102"), &bed_id("A102-1"))
        .expect("first claim wins");
    let err = ledger
        .approve_registration(&staff(), &second.id, &room_id("A102"), &bed_id("A102-1"))
        .expect_err("second claim loses");
    assert!(matches!(
        err,
        HousingError::AllocationConflict(AllocationConflict::BedOccupied(_))
    ));

    let available = ledger
        .find_available(RoomType::Female, date(2024, 8, 1))
        .expect("query");
    let a102 = available
        .iter()
        .find(|entry| entry.room.id == room_id("A102"))
        .expect("A102 still has a free bed");
    assert_eq!(a102.free_beds.len(), 1);
    assert_eq!(a102.free_beds[0].id, bed_id("A102-2"));
}

#[test]
fn duplicate_active_registration_is_refused_until_rejected() {
    let (ledger, _) = build_ledger();
    let first = submit(&ledger, "sv-107", RoomType::Female, date(2024, 8, 1));

    let request = RegistrationRequest {
        student_id: student_id("sv-107"),
        room_type: RoomType::Female,
        requested_move_in: date(2024, 9, 1),
    };
    let err = ledger
        .submit_registration(&student("sv-107"), request.clone())
        .expect_err("duplicate refused");
    assert!(matches!(err, HousingError::Duplicate { .. }));

    ledger
        .reject_registration(&staff(), &first.id, "resubmit with new date")
        .expect("rejected");
    let again = ledger
        .submit_registration(&student("sv-107"), request)
        .expect("resubmission accepted");
    assert_ne!(again.id, first.id);
}

#[test]
fn students_cannot_act_for_others_or_approve() {
    let (ledger, _) = build_ledger();
    let err = ledger
        .submit_registration(
            &student("sv-108"),
            RegistrationRequest {
                student_id: student_id("sv-109"),
                room_type: RoomType::Female,
                requested_move_in: date(2024, 8, 1),
            },
        )
        .expect_err("forbidden");
    assert!(matches!(err, HousingError::Forbidden { .. }));

    let registration = submit(&ledger, "sv-108", RoomType::Female, date(2024, 8, 1));
    let err = ledger
        .approve_registration(
            &student("sv-108"),
            &registration.id,
            &room_id("A101"),
            &bed_id("A101-1"),
        )
        .expect_err("students cannot approve");
    assert!(matches!(err, HousingError::Forbidden { .. }));
}

#[test]
fn failed_persist_rolls_back_the_claim_and_invoice() {
    let store = Arc::new(FlakyStore::default());
    let publisher = InMemoryPaymentPublisher::default();
    let ledger = HousingLedger::open(
        store.clone(),
        Arc::new(publisher.clone()),
        ContractPolicy::new(3),
    )
    .expect("ledger opens");
    seed_rooms(&ledger);
    let registration = submit(&ledger, "sv-110", RoomType::Female, date(2024, 8, 20));

    store.fail_saves();
    let err = ledger
        .approve_registration(
            &staff(),
            &registration.id,
            &room_id("A101"),
            &bed_id("A101-1"),
        )
        .expect_err("persist fails");
    assert!(matches!(err, HousingError::Storage(_)));

    let snapshot = ledger.snapshot().expect("snapshot");
    let room = snapshot.room(&room_id("A101")).expect("room exists");
    assert_eq!(room.occupied_count, 0);
    assert!(room.beds.iter().all(|bed| !bed.is_occupied()));
    assert_eq!(
        snapshot
            .registration(&registration.id)
            .map(|stored| stored.status),
        Some(RegistrationStatus::Pending)
    );
    assert!(snapshot.payments().is_empty());
    assert!(publisher.events().is_empty());
}

#[test]
fn delivery_failure_does_not_undo_approval() {
    let ledger = HousingLedger::open(
        Arc::new(crate::workflows::housing::storage::MemorySnapshotStore::default()),
        Arc::new(OfflinePublisher),
        ContractPolicy::new(3),
    )
    .expect("ledger opens");
    seed_rooms(&ledger);
    let registration = submit(&ledger, "sv-111", RoomType::Male, date(2024, 8, 2));

    let outcome = ledger
        .approve_registration(
            &staff(),
            &registration.id,
            &room_id("B201"),
            &bed_id("B201-3"),
        )
        .expect("approval commits");
    assert_eq!(
        ledger.payments_for(&student_id("sv-111")).expect("payments"),
        vec![outcome.payment]
    );
}

#[test]
fn housed_student_cannot_be_approved_into_a_second_bed() {
    let (ledger, _) = build_ledger();
    house(&ledger, "sv-120", "A101", "A101-1");

    // Imported records can carry a stale pending registration next to an approved one.
    let mut snapshot = ledger.snapshot().expect("snapshot");
    let stale_id = snapshot.next_registration_id();
    snapshot.insert_registration(Registration {
        id: stale_id.clone(),
        student_id: student_id("sv-120"),
        room_type: RoomType::Female,
        requested_move_in: date(2024, 9, 1),
        status: RegistrationStatus::Pending,
        assigned_room_id: None,
        assigned_bed_id: None,
        contract_end: None,
        rejection_reason: None,
        submitted_at: chrono::Utc::now(),
        resolved_by: None,
    });
    let store = MemorySnapshotStore::default();
    store.save(&snapshot).expect("seed store");
    let reopened = HousingLedger::open(
        Arc::new(store),
        Arc::new(InMemoryPaymentPublisher::default()),
        ContractPolicy::new(3),
    )
    .expect("ledger reopens");
    let payments_before = snapshot.payments().len();

    let err = reopened
        .approve_registration(&staff(), &stale_id, &room_id("A102"), &bed_id("A102-1"))
        .expect_err("already housed");
    assert!(matches!(
        err,
        HousingError::AlreadyHoused(student) if student == student_id("sv-120")
    ));

    assert_eq!(
        reopened.room(&room_id("A102")).expect("room").occupied_count,
        0
    );
    let after = reopened.snapshot().expect("snapshot");
    assert_eq!(after.payments().len(), payments_before);
    assert_eq!(
        after.registration(&stale_id).map(|record| record.status),
        Some(RegistrationStatus::Pending)
    );
}

#[test]
fn locked_rooms_are_neither_offered_nor_assignable() {
    let (ledger, _) = build_ledger();
    let registration = submit(&ledger, "sv-121", RoomType::Female, date(2024, 8, 1));
    ledger
        .set_room_status(&staff(), &room_id("A102"), RoomStatus::Locked)
        .expect("room locked");

    let offered: Vec<_> = ledger
        .find_available(RoomType::Female, date(2024, 8, 1))
        .expect("query")
        .into_iter()
        .map(|entry| entry.room.id)
        .collect();
    assert_eq!(offered, vec![room_id("A101")]);

    let err = ledger
        .approve_registration(&staff(), &registration.id, &room_id("A102"), &bed_id("A102-1"))
        .expect_err("locked room refused");
    assert!(matches!(
        err,
        HousingError::AllocationConflict(AllocationConflict::RoomLocked(_))
    ));
    assert_eq!(
        ledger.room(&room_id("A102")).expect("room").occupied_count,
        0
    );

    ledger
        .set_room_status(&staff(), &room_id("A102"), RoomStatus::Active)
        .expect("room reopened");
    ledger
        .approve_registration(&staff(), &registration.id, &room_id("A102"), &bed_id("A102-1"))
        .expect("reopened room accepts the claim");
}

#[test]
fn room_status_changes_require_staff() {
    let (ledger, _) = build_ledger();
    let err = ledger
        .set_room_status(&student("sv-122"), &room_id("A101"), RoomStatus::Locked)
        .expect_err("students cannot lock rooms");
    assert!(matches!(err, HousingError::Forbidden { .. }));
}
