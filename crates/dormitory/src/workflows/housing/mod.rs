//! Room allocation, registration and transfer approvals, and utility billing over one durable
//! ledger.
//!
//! Every transition takes the acting user explicitly and either commits completely (state,
//! persisted snapshot, generated payments) or leaves the ledger untouched.

pub mod allocation;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod metering;
pub mod payments;
pub mod registration;
pub mod router;
pub mod storage;
mod transfer;

#[cfg(test)]
mod tests;

pub use allocation::{AvailableRoom, RoomAllocationFinder};
pub use domain::{
    Actor, Bed, BedId, BillId, CostShare, ParseLabelError, Payment, PaymentId, PaymentKind,
    Registration, RegistrationId, RegistrationRequest, RegistrationStatus, Role, Room, RoomId,
    RoomSpec, RoomStatus, RoomTransferRequest, RoomType, StudentId, TransferId, TransferStatus,
    TransferSubmission, UtilityBillDetail,
};
pub use error::{AllocationConflict, HousingError};
pub use ledger::{HousingLedger, LedgerSnapshot};
pub use metering::{PriceScheduleChange, RecordedBill};
pub use payments::{InMemoryPaymentPublisher, PaymentPublisher, PublishError};
pub use registration::{ApprovalOutcome, ContractPolicy};
pub use router::{housing_router, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use storage::{JsonFileSnapshotStore, MemorySnapshotStore, SnapshotStore, StorageError};
