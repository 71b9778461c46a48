use std::thread;

use super::common::*;
use crate::workflows::housing::domain::{TransferStatus, TransferSubmission};
use crate::workflows::housing::error::{AllocationConflict, HousingError};

fn request(student: &str, room: &str) -> TransferSubmission {
    TransferSubmission {
        student_id: student_id(student),
        requested_room_id: room_id(room),
        reason: "closer to the library".to_string(),
    }
}

#[test]
fn approval_moves_occupancy_without_new_rent() {
    let (ledger, publisher) = build_ledger();
    house(&ledger, "sv-200", "A101", "A101-1");
    let payments_before = ledger.snapshot().expect("snapshot").payments().len();

    let transfer = ledger
        .submit_transfer(&student("sv-200"), request("sv-200", "A102"))
        .expect("transfer submitted");
    assert_eq!(transfer.current_room_id, room_id("A101"));
    assert_eq!(transfer.status, TransferStatus::Pending);

    let approved = ledger
        .approve_transfer(&staff(), &transfer.id, &bed_id("A102-2"))
        .expect("transfer approved");
    assert_eq!(approved.status, TransferStatus::Approved);
    assert_eq!(approved.assigned_bed_id, Some(bed_id("A102-2")));

    let old_room = ledger.room(&room_id("A101")).expect("room exists");
    let new_room = ledger.room(&room_id("A102")).expect("room exists");
    assert_eq!(old_room.occupied_count, 0);
    assert_eq!(new_room.occupied_count, 1);
    assert_eq!(
        new_room
            .bed(&bed_id("A102-2"))
            .and_then(|bed| bed.occupant.clone()),
        Some(student_id("sv-200"))
    );

    let snapshot = ledger.snapshot().expect("snapshot");
    assert_eq!(snapshot.payments().len(), payments_before);
    assert_eq!(publisher.events().len(), payments_before);
}

#[test]
fn unhoused_students_cannot_request_transfers() {
    let (ledger, _) = build_ledger();
    let err = ledger
        .submit_transfer(&student("sv-201"), request("sv-201", "A102"))
        .expect_err("not housed");
    assert!(matches!(err, HousingError::NotHoused(_)));
}

#[test]
fn transfer_to_current_room_is_refused() {
    let (ledger, _) = build_ledger();
    house(&ledger, "sv-202", "A101", "A101-2");
    let err = ledger
        .submit_transfer(&student("sv-202"), request("sv-202", "A101"))
        .expect_err("same room");
    assert!(matches!(
        err,
        HousingError::AllocationConflict(AllocationConflict::SameRoom(_))
    ));
}

#[test]
fn only_one_pending_transfer_per_student() {
    let (ledger, _) = build_ledger();
    house(&ledger, "sv-203", "A101", "A101-3");
    ledger
        .submit_transfer(&student("sv-203"), request("sv-203", "A102"))
        .expect("first request");
    let err = ledger
        .submit_transfer(&student("sv-203"), request("sv-203", "A102"))
        .expect_err("second request refused");
    assert!(matches!(err, HousingError::Duplicate { .. }));
}

#[test]
fn target_room_must_match_current_room_type() {
    let (ledger, _) = build_ledger();
    house(&ledger, "sv-204", "A101", "A101-4");
    let transfer = ledger
        .submit_transfer(&student("sv-204"), request("sv-204", "B201"))
        .expect("submitted");

    let err = ledger
        .approve_transfer(&staff(), &transfer.id, &bed_id("B201-1"))
        .expect_err("type mismatch");
    assert!(matches!(
        err,
        HousingError::AllocationConflict(AllocationConflict::RoomTypeMismatch(_))
    ));

    let room = ledger.room(&room_id("A101")).expect("room exists");
    assert_eq!(
        room.bed(&bed_id("A101-4")).and_then(|bed| bed.occupant.clone()),
        Some(student_id("sv-204"))
    );
    assert_eq!(
        ledger.transfer(&transfer.id).expect("stored").status,
        TransferStatus::Pending
    );
}

#[test]
fn rejected_transfer_is_terminal() {
    let (ledger, _) = build_ledger();
    house(&ledger, "sv-205", "A101", "A101-1");
    let transfer = ledger
        .submit_transfer(&student("sv-205"), request("sv-205", "A102"))
        .expect("submitted");

    let rejected = ledger
        .reject_transfer(&staff(), &transfer.id, "A102 reserved for exchange students")
        .expect("rejected");
    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert_eq!(
        rejected.resolver_note.as_deref(),
        Some("A102 reserved for exchange students")
    );

    let err = ledger
        .approve_transfer(&staff(), &transfer.id, &bed_id("A102-1"))
        .expect_err("terminal");
    assert!(matches!(err, HousingError::InvalidState { .. }));
    let err = ledger
        .reject_transfer(&staff(), &transfer.id, "again")
        .expect_err("terminal");
    assert!(matches!(err, HousingError::InvalidState { .. }));
}

#[test]
fn concurrent_transfer_approvals_on_one_bed_have_a_single_winner() {
    let (ledger, _) = build_ledger();
    house(&ledger, "sv-220", "A101", "A101-1");
    house(&ledger, "sv-221", "A101", "A101-2");
    let first = ledger
        .submit_transfer(&student("sv-220"), request("sv-220", "A102"))
        .expect("first transfer");
    let second = ledger
        .submit_transfer(&student("sv-221"), request("sv-221", "A102"))
        .expect("second transfer");

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = [&first.id, &second.id]
            .into_iter()
            .map(|id| {
                let ledger = &ledger;
                scope.spawn(move || ledger.approve_transfer(&staff(), id, &bed_id("A102-1")))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("approval thread"))
            .collect()
    });

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(HousingError::AllocationConflict(AllocationConflict::BedOccupied(_)))
    )));

    let a101 = ledger.room(&room_id("A101")).expect("room exists");
    let a102 = ledger.room(&room_id("A102")).expect("room exists");
    assert_eq!(a101.occupied_count, 1);
    assert_eq!(a102.occupied_count, 1);

    let statuses = [
        ledger.transfer(&first.id).expect("first").status,
        ledger.transfer(&second.id).expect("second").status,
    ];
    assert!(statuses.contains(&TransferStatus::Approved));
    assert!(statuses.contains(&TransferStatus::Pending));
}
