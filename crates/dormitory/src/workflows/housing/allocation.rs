use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Bed, BedId, Room, RoomId, RoomStatus, RoomType};
use super::error::{AllocationConflict, HousingError};
use super::ledger::LedgerSnapshot;

/// Candidate room with the beds that can still be assigned in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableRoom {
    pub room: Room,
    pub free_beds: Vec<Bed>,
    pub as_of: NaiveDate,
}

/// Read-only view over the room inventory used to pick and validate beds.
pub struct RoomAllocationFinder<'a> {
    state: &'a LedgerSnapshot,
}

impl<'a> RoomAllocationFinder<'a> {
    pub fn new(state: &'a LedgerSnapshot) -> Self {
        Self { state }
    }

    /// Active rooms of `room_type` with at least one assignable bed, least utilized first and
    /// then by room id.
    pub fn find_available(&self, room_type: RoomType, as_of: NaiveDate) -> Vec<AvailableRoom> {
        let mut rooms: Vec<&Room> = self
            .state
            .rooms()
            .filter(|room| room.room_type == room_type && room.status == RoomStatus::Active)
            .filter(|room| room.has_capacity() && room.free_beds().next().is_some())
            .collect();

        rooms.sort_by(|a, b| a.cmp_utilization(b).then_with(|| a.id.cmp(&b.id)));

        rooms
            .into_iter()
            .map(|room| AvailableRoom {
                room: room.clone(),
                free_beds: room.free_beds().cloned().collect(),
                as_of,
            })
            .collect()
    }

    /// Validate that `bed_id` in `room_id` may be given to a student needing `room_type`.
    pub fn check_candidate(
        &self,
        room_id: &RoomId,
        bed_id: &BedId,
        room_type: RoomType,
    ) -> Result<&'a Room, HousingError> {
        let room = self
            .state
            .room(room_id)
            .ok_or_else(|| HousingError::not_found("room", room_id))?;

        let bed = room
            .bed(bed_id)
            .ok_or_else(|| AllocationConflict::BedNotInRoom {
                room: room_id.clone(),
                bed: bed_id.clone(),
            })?;

        if room.status == RoomStatus::Locked {
            return Err(AllocationConflict::RoomLocked(room_id.clone()).into());
        }
        if room.room_type != room_type {
            return Err(AllocationConflict::RoomTypeMismatch(room_id.clone()).into());
        }
        if bed.is_occupied() {
            return Err(AllocationConflict::BedOccupied(bed_id.clone()).into());
        }
        if !room.has_capacity() {
            return Err(AllocationConflict::RoomFull(room_id.clone()).into());
        }

        Ok(room)
    }
}
