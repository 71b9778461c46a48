use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use super::period::BillingPeriod;
use super::utility::MeterReading;
use crate::workflows::housing::domain::RoomId;

#[derive(Debug, thiserror::Error)]
pub enum MeterImportError {
    #[error("failed to read meter export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid meter CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {detail}")]
    Row { row: usize, detail: String },
}

/// Loads monthly meter readings from the spreadsheet export used by building staff.
///
/// Expected headers: `Room`, `Period` (YYYY-MM), `Prior Electricity`, `New Electricity`,
/// `Prior Water`, `New Water`. Readings are returned in file order; validation of the values
/// happens when each one is recorded.
pub struct MeterReadingImporter;

impl MeterReadingImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<MeterReading>, MeterImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<MeterReading>, MeterImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut readings = Vec::new();

        for (index, record) in csv_reader.deserialize::<MeterRow>().enumerate() {
            let row = record?;
            // header is line 1
            let line = index + 2;
            let room = row.room.trim();
            if room.is_empty() {
                return Err(MeterImportError::Row {
                    row: line,
                    detail: "room is empty".to_string(),
                });
            }
            let period = row
                .period
                .parse::<BillingPeriod>()
                .map_err(|err| MeterImportError::Row {
                    row: line,
                    detail: err.to_string(),
                })?;

            readings.push(MeterReading {
                room_id: RoomId(room.to_string()),
                period,
                prior_electricity: row.prior_electricity,
                new_electricity: row.new_electricity,
                prior_water: row.prior_water,
                new_water: row.new_water,
            });
        }

        Ok(readings)
    }
}

#[derive(Debug, Deserialize)]
struct MeterRow {
    #[serde(rename = "Room")]
    room: String,
    #[serde(rename = "Period")]
    period: String,
    #[serde(rename = "Prior Electricity")]
    prior_electricity: u64,
    #[serde(rename = "New Electricity")]
    new_electricity: u64,
    #[serde(rename = "Prior Water")]
    prior_water: u64,
    #[serde(rename = "New Water")]
    new_water: u64,
}
