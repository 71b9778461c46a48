use chrono::Utc;
use tracing::{info, warn};

use super::allocation::RoomAllocationFinder;
use super::domain::{
    Actor, BedId, RoomTransferRequest, TransferId, TransferStatus, TransferSubmission,
};
use super::error::{AllocationConflict, HousingError};
use super::ledger::{require_staff, HousingLedger};
use super::payments::PaymentPublisher;
use super::storage::SnapshotStore;

fn ensure_pending(transfer: &RoomTransferRequest) -> Result<(), HousingError> {
    match transfer.status {
        TransferStatus::Pending => Ok(()),
        status => Err(HousingError::InvalidState {
            entity: "transfer",
            id: transfer.id.to_string(),
            status: status.label(),
        }),
    }
}

impl<S, P> HousingLedger<S, P>
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    /// File a request to move a housed student to another room. The current room is taken from
    /// the student's bed at submission time.
    pub fn submit_transfer(
        &self,
        actor: &Actor,
        submission: TransferSubmission,
    ) -> Result<RoomTransferRequest, HousingError> {
        if !actor.may_act_for(&submission.student_id) {
            return Err(HousingError::Forbidden {
                actor: actor.id.clone(),
                action: "request a transfer for another student",
            });
        }

        let transfer = self.transact(|state| {
            let (current_room_id, _) = state
                .locate_student(&submission.student_id)
                .ok_or_else(|| HousingError::NotHoused(submission.student_id.clone()))?;
            if current_room_id == submission.requested_room_id {
                return Err(AllocationConflict::SameRoom(current_room_id).into());
            }
            if state.room(&submission.requested_room_id).is_none() {
                return Err(HousingError::not_found("room", &submission.requested_room_id));
            }
            let pending = state.transfers().any(|existing| {
                existing.student_id == submission.student_id
                    && existing.status == TransferStatus::Pending
            });
            if pending {
                return Err(HousingError::Duplicate {
                    student: submission.student_id.clone(),
                    what: "transfer request",
                });
            }

            let transfer = RoomTransferRequest {
                id: state.next_transfer_id(),
                student_id: submission.student_id,
                current_room_id,
                requested_room_id: submission.requested_room_id,
                status: TransferStatus::Pending,
                reason: submission.reason.trim().to_string(),
                resolver_note: None,
                assigned_bed_id: None,
                submitted_at: Utc::now(),
                resolved_by: None,
            };
            state.insert_transfer(transfer.clone());
            Ok(transfer)
        })?;

        info!(
            transfer = %transfer.id,
            student = %transfer.student_id,
            from = %transfer.current_room_id,
            to = %transfer.requested_room_id,
            "transfer requested"
        );
        Ok(transfer)
    }

    /// Move the student into `bed_id` of the requested room, releasing the bed they hold now.
    /// Rent already issued is left untouched.
    pub fn approve_transfer(
        &self,
        actor: &Actor,
        id: &TransferId,
        bed_id: &BedId,
    ) -> Result<RoomTransferRequest, HousingError> {
        require_staff(actor, "approve transfers")?;

        let transfer = self
            .transact(|state| {
                let transfer = state
                    .transfer(id)
                    .cloned()
                    .ok_or_else(|| HousingError::not_found("transfer", id))?;
                ensure_pending(&transfer)?;

                let student = &transfer.student_id;
                let (current_room_id, current_bed_id) = state
                    .locate_student(student)
                    .ok_or_else(|| HousingError::NotHoused(student.clone()))?;
                if current_room_id == transfer.requested_room_id {
                    return Err(AllocationConflict::SameRoom(current_room_id).into());
                }
                let room_type = state
                    .room(&current_room_id)
                    .map(|room| room.room_type)
                    .ok_or_else(|| HousingError::not_found("room", &current_room_id))?;
                RoomAllocationFinder::new(state).check_candidate(
                    &transfer.requested_room_id,
                    bed_id,
                    room_type,
                )?;

                state.room_mut(&current_room_id)?.vacate(&current_bed_id);
                if !state
                    .room_mut(&transfer.requested_room_id)?
                    .occupy(bed_id, student)
                {
                    return Err(AllocationConflict::BedOccupied(bed_id.clone()).into());
                }

                let record = state.transfer_mut(id)?;
                record.status = TransferStatus::Approved;
                record.assigned_bed_id = Some(bed_id.clone());
                record.resolved_by = Some(actor.id.clone());
                Ok(record.clone())
            })
            .inspect_err(|err| {
                if let HousingError::AllocationConflict(conflict) = err {
                    warn!(transfer = %id, bed = %bed_id, %conflict, "transfer bed claim lost");
                }
            })?;

        info!(
            transfer = %id,
            student = %transfer.student_id,
            room = %transfer.requested_room_id,
            bed = %bed_id,
            "transfer approved"
        );
        Ok(transfer)
    }

    pub fn reject_transfer(
        &self,
        actor: &Actor,
        id: &TransferId,
        note: &str,
    ) -> Result<RoomTransferRequest, HousingError> {
        require_staff(actor, "reject transfers")?;

        let transfer = self.transact(|state| {
            let record = state.transfer_mut(id)?;
            ensure_pending(record)?;
            record.status = TransferStatus::Rejected;
            record.resolver_note = Some(note.trim().to_string());
            record.resolved_by = Some(actor.id.clone());
            Ok(record.clone())
        })?;

        info!(transfer = %id, "transfer rejected");
        Ok(transfer)
    }
}
