use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::billing::{BillingPeriod, PriceEntryId, RentBreakdown, UtilityBill};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(StudentId);
string_id!(RoomId);
string_id!(BedId);
string_id!(RegistrationId);
string_id!(TransferId);
string_id!(PaymentId);
string_id!(BillId);

/// Deserialize a label through its `FromStr` impl so legacy spellings are accepted on input
/// while output stays snake_case.
macro_rules! parse_label_on_input {
    ($($name:ident),+ $(,)?) => {
        $(
            impl TryFrom<String> for $name {
                type Error = ParseLabelError;

                fn try_from(raw: String) -> Result<Self, Self::Error> {
                    raw.parse()
                }
            }
        )+
    };
}

parse_label_on_input!(RoomType, Role, RegistrationStatus, TransferStatus);

/// Gender a room is reserved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RoomType {
    Male,
    Female,
}

impl RoomType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised {kind} '{value}'")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for RoomType {
    type Err = ParseLabelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "male" | "nam" => Ok(Self::Male),
            "female" | "nữ" | "nu" => Ok(Self::Female),
            _ => Err(ParseLabelError {
                kind: "room type",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bed {
    pub id: BedId,
    pub room_id: RoomId,
    pub occupant: Option<StudentId>,
}

impl Bed {
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Room with its beds. `occupied_count` is maintained by the workflows and always equals the
/// number of occupied beds; it never exceeds `capacity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_type: RoomType,
    pub capacity: u32,
    pub monthly_rate: u64,
    pub status: RoomStatus,
    pub occupied_count: u32,
    pub beds: Vec<Bed>,
}

impl Room {
    pub fn bed(&self, bed_id: &BedId) -> Option<&Bed> {
        self.beds.iter().find(|bed| &bed.id == bed_id)
    }

    pub fn free_beds(&self) -> impl Iterator<Item = &Bed> {
        self.beds.iter().filter(|bed| !bed.is_occupied())
    }

    pub fn has_capacity(&self) -> bool {
        self.occupied_count < self.capacity
    }

    pub fn occupants(&self) -> impl Iterator<Item = &StudentId> {
        self.beds.iter().filter_map(|bed| bed.occupant.as_ref())
    }

    /// Compare `occupied / capacity` exactly, treating a zero-capacity room as full.
    pub fn cmp_utilization(&self, other: &Self) -> Ordering {
        match (self.capacity, other.capacity) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Greater,
            (_, 0) => Ordering::Less,
            (left_cap, right_cap) => {
                let left = u64::from(self.occupied_count) * u64::from(right_cap);
                let right = u64::from(other.occupied_count) * u64::from(left_cap);
                left.cmp(&right)
            }
        }
    }

    pub(crate) fn occupy(&mut self, bed_id: &BedId, student: &StudentId) -> bool {
        let Some(bed) = self
            .beds
            .iter_mut()
            .find(|bed| &bed.id == bed_id && !bed.is_occupied())
        else {
            return false;
        };
        bed.occupant = Some(student.clone());
        self.occupied_count += 1;
        true
    }

    pub(crate) fn vacate(&mut self, bed_id: &BedId) -> Option<StudentId> {
        let released = self
            .beds
            .iter_mut()
            .find(|bed| &bed.id == bed_id)
            .and_then(|bed| bed.occupant.take());
        if released.is_some() {
            self.occupied_count = self.occupied_count.saturating_sub(1);
        }
        released
    }
}

/// Inventory description used to register a room and its beds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub id: RoomId,
    pub room_type: RoomType,
    pub capacity: u32,
    pub monthly_rate: u64,
    pub bed_ids: Vec<BedId>,
}

impl RoomSpec {
    pub(crate) fn into_room(self) -> Room {
        let beds = self
            .bed_ids
            .into_iter()
            .map(|id| Bed {
                id,
                room_id: self.id.clone(),
                occupant: None,
            })
            .collect();
        Room {
            id: self.id,
            room_type: self.room_type,
            capacity: self.capacity,
            monthly_rate: self.monthly_rate,
            status: RoomStatus::Active,
            occupied_count: 0,
            beds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl FromStr for Role {
    type Err = ParseLabelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "student" | "sinh_vien" => Ok(Self::Student),
            "staff" | "employee" | "nhan_vien" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseLabelError {
                kind: "role",
                value: raw.to_string(),
            }),
        }
    }
}

/// The authenticated user performing a transition, supplied by the caller on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }

    /// Students may only act for themselves; staff may act for anyone.
    pub fn may_act_for(&self, student: &StudentId) -> bool {
        self.is_staff() || (self.role == Role::Student && self.id == student.0)
    }
}

/// Parse a workflow status from either the canonical label or one of the legacy spellings
/// still emitted by older clients.
fn parse_status(raw: &str) -> Option<RequestStatus> {
    match raw.trim().to_lowercase().as_str() {
        "pending" | "cho_duyet" | "chờ duyệt" => Some(RequestStatus::Pending),
        "approved" | "da_duyet" | "đã duyệt" => Some(RequestStatus::Approved),
        "rejected" | "tu_choi" | "từ chối" => Some(RequestStatus::Rejected),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for RegistrationStatus {
    type Err = ParseLabelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match parse_status(raw) {
            Some(RequestStatus::Pending) => Ok(Self::Pending),
            Some(RequestStatus::Approved) => Ok(Self::Approved),
            Some(RequestStatus::Rejected) => Ok(Self::Rejected),
            None => Err(ParseLabelError {
                kind: "registration status",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for TransferStatus {
    type Err = ParseLabelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match parse_status(raw) {
            Some(RequestStatus::Pending) => Ok(Self::Pending),
            Some(RequestStatus::Approved) => Ok(Self::Approved),
            Some(RequestStatus::Rejected) => Ok(Self::Rejected),
            None => Err(ParseLabelError {
                kind: "transfer status",
                value: raw.to_string(),
            }),
        }
    }
}

/// A student's request to move into the dormitory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub student_id: StudentId,
    pub room_type: RoomType,
    pub requested_move_in: NaiveDate,
    pub status: RegistrationStatus,
    pub assigned_room_id: Option<RoomId>,
    pub assigned_bed_id: Option<BedId>,
    pub contract_end: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub student_id: StudentId,
    pub room_type: RoomType,
    pub requested_move_in: NaiveDate,
}

/// An in-residence request to move to another room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTransferRequest {
    pub id: TransferId,
    pub student_id: StudentId,
    pub current_room_id: RoomId,
    pub requested_room_id: RoomId,
    pub status: TransferStatus,
    pub reason: String,
    pub resolver_note: Option<String>,
    pub assigned_bed_id: Option<BedId>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSubmission {
    pub student_id: StudentId,
    pub requested_room_id: RoomId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Rent,
    Utility,
}

/// Amount owed by a student, handed to the payment-processing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub kind: PaymentKind,
    pub student_id: StudentId,
    pub amount: u64,
    pub period_start: NaiveDate,
    pub period_end: Option<NaiveDate>,
    /// Registration id for rent, bill id for utilities.
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent: Option<RentBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostShare {
    pub student_id: StudentId,
    pub amount: u64,
}

/// Immutable record of a computed room utility bill and how it was split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityBillDetail {
    pub id: BillId,
    pub room_id: RoomId,
    pub period: BillingPeriod,
    pub price_entry_id: PriceEntryId,
    pub bill: UtilityBill,
    pub shares: Vec<CostShare>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(capacity: u32, occupied: u32) -> Room {
        Room {
            id: RoomId(format!("R{capacity}-{occupied}")),
            room_type: RoomType::Female,
            capacity,
            monthly_rate: 1_000_000,
            status: RoomStatus::Active,
            occupied_count: occupied,
            beds: Vec::new(),
        }
    }

    #[test]
    fn legacy_status_spellings_map_to_one_variant() {
        for raw in ["pending", "CHO_DUYET", "Chờ duyệt"] {
            assert_eq!(
                raw.parse::<RegistrationStatus>().expect("parses"),
                RegistrationStatus::Pending
            );
        }
        assert_eq!(
            "Đã duyệt".parse::<TransferStatus>().expect("parses"),
            TransferStatus::Approved
        );
        assert_eq!(
            "TU_CHOI".parse::<RegistrationStatus>().expect("parses"),
            RegistrationStatus::Rejected
        );
        assert!("maybe".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn statuses_serialize_canonically() {
        let json = serde_json::to_string(&RegistrationStatus::Approved).expect("serializes");
        assert_eq!(json, "\"approved\"");
    }

    #[test]
    fn legacy_labels_deserialize_and_serialize_back_canonically() {
        let status: TransferStatus = serde_json::from_str("\"Chờ duyệt\"").expect("legacy status");
        assert_eq!(status, TransferStatus::Pending);

        let room_type: RoomType = serde_json::from_str("\"Nữ\"").expect("legacy room type");
        assert_eq!(room_type, RoomType::Female);
        assert_eq!(
            serde_json::to_string(&room_type).expect("serializes"),
            "\"female\""
        );

        let role: Role = serde_json::from_str("\"nhan_vien\"").expect("legacy role");
        assert_eq!(role, Role::Staff);
        assert!(serde_json::from_str::<RoomType>("\"mixed\"").is_err());
    }

    #[test]
    fn utilization_compares_fractions_exactly() {
        assert_eq!(room(4, 1).cmp_utilization(&room(6, 2)), Ordering::Less);
        assert_eq!(room(2, 1).cmp_utilization(&room(4, 2)), Ordering::Equal);
        assert_eq!(room(0, 0).cmp_utilization(&room(8, 7)), Ordering::Greater);
    }

    #[test]
    fn occupy_and_vacate_maintain_the_count() {
        let mut room = RoomSpec {
            id: RoomId("A101".to_string()),
            room_type: RoomType::Male,
            capacity: 2,
            monthly_rate: 900_000,
            bed_ids: vec![BedId("A101-1".to_string()), BedId("A101-2".to_string())],
        }
        .into_room();
        let student = StudentId("sv-1".to_string());

        assert!(room.occupy(&BedId("A101-1".to_string()), &student));
        assert!(!room.occupy(&BedId("A101-1".to_string()), &student));
        assert_eq!(room.occupied_count, 1);
        assert_eq!(room.free_beds().count(), 1);

        assert_eq!(room.vacate(&BedId("A101-1".to_string())), Some(student));
        assert_eq!(room.occupied_count, 0);
        assert_eq!(room.vacate(&BedId("A101-1".to_string())), None);
    }

    #[test]
    fn students_only_act_for_themselves() {
        let student = Actor::new("sv-9", Role::Student);
        assert!(student.may_act_for(&StudentId("sv-9".to_string())));
        assert!(!student.may_act_for(&StudentId("sv-1".to_string())));
        assert!(Actor::new("nv-1", Role::Staff).may_act_for(&StudentId("sv-1".to_string())));
        assert_eq!("Nam".parse::<RoomType>().expect("parses"), RoomType::Male);
    }
}
