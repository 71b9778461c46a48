use crate::workflows::billing::{
    BillingPeriod, InvalidReading, NoPriceDefined, ProrationError, ScheduleError,
};

use super::domain::{BedId, RoomId, StudentId};
use super::storage::StorageError;

/// Why a bed could not be claimed. Callers should re-query candidates rather than retry the
/// same bed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationConflict {
    #[error("bed {bed} does not belong to room {room}")]
    BedNotInRoom { room: RoomId, bed: BedId },
    #[error("bed {0} is already occupied")]
    BedOccupied(BedId),
    #[error("room {0} is locked")]
    RoomLocked(RoomId),
    #[error("room {0} does not match the required room type")]
    RoomTypeMismatch(RoomId),
    #[error("room {0} is at capacity")]
    RoomFull(RoomId),
    #[error("student is already in room {0}")]
    SameRoom(RoomId),
}

/// Errors returned by the housing workflows. No variant is returned after a partial mutation.
#[derive(Debug, thiserror::Error)]
pub enum HousingError {
    #[error("{entity} {id} is {status}, expected pending")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: &'static str,
    },
    #[error("allocation conflict: {0}")]
    AllocationConflict(#[from] AllocationConflict),
    #[error("cannot price occupancy: {0}")]
    InvalidRange(#[from] ProrationError),
    #[error("invalid meter reading: {0}")]
    InvalidReading(#[from] InvalidReading),
    #[error(transparent)]
    NoPriceDefined(#[from] NoPriceDefined),
    #[error("price schedule rejected change: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{actor} is not allowed to {action}")]
    Forbidden { actor: String, action: &'static str },
    #[error("student {student} already has an active {what}")]
    Duplicate { student: StudentId, what: &'static str },
    #[error("student {0} does not occupy a bed")]
    NotHoused(StudentId),
    #[error("student {0} already occupies a bed")]
    AlreadyHoused(StudentId),
    #[error("room {room} already has a meter reading for {period}")]
    DuplicateReading { room: RoomId, period: BillingPeriod },
    #[error("room {room} has no occupants to bill for {period}")]
    NoOccupants { room: RoomId, period: BillingPeriod },
    #[error("room {0} already exists")]
    RoomExists(RoomId),
    #[error("contract end date for move-in {0} is out of range")]
    ContractOutOfRange(chrono::NaiveDate),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HousingError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
