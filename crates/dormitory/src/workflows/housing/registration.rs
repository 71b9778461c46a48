use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::workflows::billing::BillingPeriod;

use super::allocation::RoomAllocationFinder;
use super::domain::{
    Actor, BedId, Payment, PaymentKind, Registration, RegistrationId, RegistrationRequest,
    RegistrationStatus, RoomId,
};
use super::error::{AllocationConflict, HousingError};
use super::ledger::{require_staff, HousingLedger};
use super::payments::PaymentPublisher;
use super::storage::SnapshotStore;

/// Contract length policy: a contract covers `contract_months` calendar months starting with
/// the move-in month and ends on the last day of the final month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPolicy {
    pub contract_months: u32,
}

impl ContractPolicy {
    pub const DEFAULT_MONTHS: u32 = 5;

    pub const fn new(contract_months: u32) -> Self {
        Self { contract_months }
    }

    pub fn contract_end(&self, move_in: NaiveDate) -> Option<NaiveDate> {
        BillingPeriod::containing(move_in).last_day_after(self.contract_months)
    }
}

impl Default for ContractPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MONTHS)
    }
}

/// Result of an approval: the updated registration and the first rent invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub registration: Registration,
    pub payment: Payment,
}

fn ensure_pending(registration: &Registration) -> Result<(), HousingError> {
    if registration.status == RegistrationStatus::Pending {
        Ok(())
    } else {
        Err(HousingError::InvalidState {
            entity: "registration",
            id: registration.id.to_string(),
            status: registration.status.label(),
        })
    }
}

impl<S, P> HousingLedger<S, P>
where
    S: SnapshotStore + 'static,
    P: PaymentPublisher + 'static,
{
    pub fn submit_registration(
        &self,
        actor: &Actor,
        request: RegistrationRequest,
    ) -> Result<Registration, HousingError> {
        if !actor.may_act_for(&request.student_id) {
            return Err(HousingError::Forbidden {
                actor: actor.id.clone(),
                action: "submit a registration for another student",
            });
        }

        let registration = self.transact(|state| {
            let active = state.registrations().any(|existing| {
                existing.student_id == request.student_id
                    && existing.status != RegistrationStatus::Rejected
            });
            if active {
                return Err(HousingError::Duplicate {
                    student: request.student_id.clone(),
                    what: "registration",
                });
            }

            let registration = Registration {
                id: state.next_registration_id(),
                student_id: request.student_id,
                room_type: request.room_type,
                requested_move_in: request.requested_move_in,
                status: RegistrationStatus::Pending,
                assigned_room_id: None,
                assigned_bed_id: None,
                contract_end: None,
                rejection_reason: None,
                submitted_at: Utc::now(),
                resolved_by: None,
            };
            state.insert_registration(registration.clone());
            Ok(registration)
        })?;

        info!(
            registration = %registration.id,
            student = %registration.student_id,
            "registration submitted"
        );
        Ok(registration)
    }

    /// Approve a pending registration into `bed_id`.
    ///
    /// Claiming the bed, fixing the contract end, and generating the first rent payment happen
    /// in one transaction: either all of them are persisted or none is.
    pub fn approve_registration(
        &self,
        actor: &Actor,
        id: &RegistrationId,
        room_id: &RoomId,
        bed_id: &BedId,
    ) -> Result<ApprovalOutcome, HousingError> {
        require_staff(actor, "approve registrations")?;
        let policy = self.policy;
        let proration = self.proration;

        let outcome = self
            .transact(|state| {
                let registration = state
                    .registration(id)
                    .cloned()
                    .ok_or_else(|| HousingError::not_found("registration", id))?;
                ensure_pending(&registration)?;
                if state.locate_student(&registration.student_id).is_some() {
                    return Err(HousingError::AlreadyHoused(registration.student_id));
                }

                let monthly_rate = RoomAllocationFinder::new(state)
                    .check_candidate(room_id, bed_id, registration.room_type)?
                    .monthly_rate;
                let move_in = registration.requested_move_in;
                let contract_end = policy
                    .contract_end(move_in)
                    .ok_or(HousingError::ContractOutOfRange(move_in))?;
                let rent = proration.compute_rent(move_in, Some(contract_end), monthly_rate)?;

                if !state
                    .room_mut(room_id)?
                    .occupy(bed_id, &registration.student_id)
                {
                    return Err(AllocationConflict::BedOccupied(bed_id.clone()).into());
                }

                let payment = Payment {
                    id: state.next_payment_id(),
                    kind: PaymentKind::Rent,
                    student_id: registration.student_id.clone(),
                    amount: rent.total_amount,
                    period_start: move_in,
                    period_end: Some(contract_end),
                    source_id: id.to_string(),
                    rent: Some(rent),
                };
                state.push_payment(payment.clone());

                let record = state.registration_mut(id)?;
                record.status = RegistrationStatus::Approved;
                record.assigned_room_id = Some(room_id.clone());
                record.assigned_bed_id = Some(bed_id.clone());
                record.contract_end = Some(contract_end);
                record.resolved_by = Some(actor.id.clone());

                Ok(ApprovalOutcome {
                    registration: record.clone(),
                    payment,
                })
            })
            .inspect_err(|err| {
                if let HousingError::AllocationConflict(conflict) = err {
                    warn!(registration = %id, bed = %bed_id, %conflict, "bed claim lost");
                }
            })?;

        info!(
            registration = %id,
            room = %room_id,
            bed = %bed_id,
            amount = outcome.payment.amount,
            "registration approved"
        );
        self.publish(std::slice::from_ref(&outcome.payment));
        Ok(outcome)
    }

    pub fn reject_registration(
        &self,
        actor: &Actor,
        id: &RegistrationId,
        reason: &str,
    ) -> Result<Registration, HousingError> {
        require_staff(actor, "reject registrations")?;

        let registration = self.transact(|state| {
            let record = state.registration_mut(id)?;
            ensure_pending(record)?;
            record.status = RegistrationStatus::Rejected;
            record.rejection_reason = Some(reason.trim().to_string());
            record.resolved_by = Some(actor.id.clone());
            Ok(record.clone())
        })?;

        info!(registration = %id, "registration rejected");
        Ok(registration)
    }
}
