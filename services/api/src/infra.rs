use chrono::NaiveDate;
use dormitory::config::HousingConfig;
use dormitory::workflows::billing::BillingPeriod;
use dormitory::workflows::housing::{
    HousingLedger, HousingError, JsonFileSnapshotStore, LedgerSnapshot, MemorySnapshotStore,
    Payment, PaymentPublisher, PublishError, SnapshotStore, StorageError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ServiceLedger = HousingLedger<ConfiguredStore, LoggingPaymentPublisher>;

/// Snapshot store selected by `DORM_DATA_PATH`.
#[derive(Debug)]
pub(crate) enum ConfiguredStore {
    File(JsonFileSnapshotStore),
    Memory(MemorySnapshotStore),
}

impl ConfiguredStore {
    pub(crate) fn from_config(config: &HousingConfig) -> Self {
        match &config.data_path {
            Some(path) => Self::File(JsonFileSnapshotStore::new(path.clone())),
            None => Self::Memory(MemorySnapshotStore::default()),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::File(store) => store.path().display().to_string(),
            Self::Memory(_) => "in-memory".to_string(),
        }
    }
}

impl SnapshotStore for ConfiguredStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        match self {
            Self::File(store) => store.load(),
            Self::Memory(store) => store.load(),
        }
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        match self {
            Self::File(store) => store.save(snapshot),
            Self::Memory(store) => store.save(snapshot),
        }
    }
}

/// Hands generated payments to the log stream consumed by the payment processor.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingPaymentPublisher;

impl PaymentPublisher for LoggingPaymentPublisher {
    fn publish(&self, payment: &Payment) -> Result<(), PublishError> {
        info!(
            payment = %payment.id,
            kind = ?payment.kind,
            student = %payment.student_id,
            amount = payment.amount,
            source = %payment.source_id,
            "payment issued"
        );
        Ok(())
    }
}

pub(crate) fn open_ledger(config: &HousingConfig) -> Result<ServiceLedger, HousingError> {
    let store = ConfiguredStore::from_config(config);
    info!(store = %store.describe(), contract_months = config.contract_months, "opening ledger");
    HousingLedger::open(
        Arc::new(store),
        Arc::new(LoggingPaymentPublisher),
        config.contract_policy(),
    )
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_period(raw: &str) -> Result<BillingPeriod, String> {
    raw.parse::<BillingPeriod>().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dormitory::workflows::housing::{Actor, Role, RoomId, RoomSpec, RoomType};

    #[test]
    fn configured_file_store_persists_between_opens() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = HousingConfig {
            data_path: Some(dir.path().join("ledger.json")),
            contract_months: 5,
        };

        let ledger = open_ledger(&config).expect("ledger opens");
        ledger
            .add_room(
                &Actor::new("admin", Role::Admin),
                RoomSpec {
                    id: RoomId("F1".to_string()),
                    room_type: RoomType::Male,
                    capacity: 1,
                    monthly_rate: 700_000,
                    bed_ids: Vec::new(),
                },
            )
            .expect("room added");

        let reopened = open_ledger(&config).expect("ledger reopens");
        assert!(reopened.room(&RoomId("F1".to_string())).is_ok());
    }

    #[test]
    fn period_and_date_arguments_parse() {
        assert_eq!(
            parse_period("2024-11").map(|period| period.month()),
            Ok(11)
        );
        assert!(parse_period("11/2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }
}
