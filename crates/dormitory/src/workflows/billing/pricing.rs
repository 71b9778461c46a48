use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::period::BillingPeriod;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceEntryId(pub String);

impl fmt::Display for PriceEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A time-bounded pair of utility unit prices, valid on `[effective_from, effective_to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceScheduleEntry {
    pub id: PriceEntryId,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub electricity_unit_price: u64,
    pub water_unit_price: u64,
}

impl PriceScheduleEntry {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.map_or(true, |to| to > date)
    }

    pub fn is_open_ended(&self) -> bool {
        self.effective_to.is_none()
    }
}

/// Price values submitted by an administrator, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDraft {
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    pub electricity_unit_price: u64,
    pub water_unit_price: u64,
}

impl PriceDraft {
    fn into_entry(self, id: PriceEntryId) -> PriceScheduleEntry {
        PriceScheduleEntry {
            id,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            electricity_unit_price: self.electricity_unit_price,
            water_unit_price: self.water_unit_price,
        }
    }
}

/// Prices resolved for a billing period, carrying the entry they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub entry_id: PriceEntryId,
    pub electricity_unit_price: u64,
    pub water_unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no price schedule entry covers billing period {period}")]
pub struct NoPriceDefined {
    pub period: BillingPeriod,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("price entry must end after it starts ({from} -> {to})")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("price entry overlaps existing entry {0}")]
    Overlap(PriceEntryId),
    #[error("only one open-ended price entry may exist")]
    MultipleOpenEnded,
    #[error("price entry {0} is already effective or billed and cannot change")]
    Immutable(PriceEntryId),
    #[error("price entry {0} not found")]
    NotFound(PriceEntryId),
    #[error("closing {entry} on {closing_on} would cut into billed period {billed}")]
    BilledPeriodConflict {
        entry: PriceEntryId,
        closing_on: NaiveDate,
        billed: BillingPeriod,
    },
}

/// Which entries are referenced by generated utility bills, and for which periods.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUsage {
    billed: BTreeMap<PriceEntryId, BTreeSet<BillingPeriod>>,
}

impl ScheduleUsage {
    pub fn record(&mut self, entry: PriceEntryId, period: BillingPeriod) {
        self.billed.entry(entry).or_default().insert(period);
    }

    pub fn is_referenced(&self, entry: &PriceEntryId) -> bool {
        self.billed.get(entry).is_some_and(|periods| !periods.is_empty())
    }

    fn latest_period(&self, entry: &PriceEntryId) -> Option<BillingPeriod> {
        self.billed
            .get(entry)
            .and_then(|periods| periods.iter().next_back().copied())
    }
}

/// Time-versioned utility price table.
///
/// Entries never overlap and at most one of them is open-ended. Once an entry is effective or
/// referenced by a bill it can only be closed by a superseding entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSchedule {
    entries: Vec<PriceScheduleEntry>,
}

impl PriceSchedule {
    pub fn entries(&self) -> &[PriceScheduleEntry] {
        &self.entries
    }

    pub fn get(&self, id: &PriceEntryId) -> Option<&PriceScheduleEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Latest entry whose `[effective_from, effective_to)` window contains the period's
    /// reference date.
    pub fn resolve(&self, period: BillingPeriod) -> Result<ResolvedPrice, NoPriceDefined> {
        let date = period.reference_date();
        self.entries
            .iter()
            .filter(|entry| entry.covers(date))
            .max_by_key(|entry| entry.effective_from)
            .map(|entry| ResolvedPrice {
                entry_id: entry.id.clone(),
                electricity_unit_price: entry.electricity_unit_price,
                water_unit_price: entry.water_unit_price,
            })
            .ok_or(NoPriceDefined { period })
    }

    pub fn is_mutable(
        &self,
        entry: &PriceScheduleEntry,
        today: NaiveDate,
        usage: &ScheduleUsage,
    ) -> bool {
        entry.effective_from > today && !usage.is_referenced(&entry.id)
    }

    /// Add a new entry. An open-ended draft supersedes the currently open-ended entry, which is
    /// closed on the draft's start date.
    pub fn add(
        &mut self,
        id: PriceEntryId,
        draft: PriceDraft,
        usage: &ScheduleUsage,
    ) -> Result<&PriceScheduleEntry, ScheduleError> {
        check_range(&draft)?;

        let mut entries = self.entries.clone();
        let supersedes = draft.effective_to.is_none();
        if let Some(open) = entries.iter_mut().find(|entry| {
            supersedes && entry.is_open_ended() && entry.effective_from < draft.effective_from
        }) {
            if let Some(billed) = usage
                .latest_period(&open.id)
                .filter(|period| period.reference_date() >= draft.effective_from)
            {
                return Err(ScheduleError::BilledPeriodConflict {
                    entry: open.id.clone(),
                    closing_on: draft.effective_from,
                    billed,
                });
            }
            open.effective_to = Some(draft.effective_from);
        }

        entries.push(draft.into_entry(id.clone()));
        self.commit(entries)?;
        self.get(&id).ok_or(ScheduleError::NotFound(id))
    }

    /// Replace the values of an entry that has not yet taken effect. The entry closed on the
    /// old start date follows the new start date.
    pub fn update(
        &mut self,
        id: &PriceEntryId,
        draft: PriceDraft,
        today: NaiveDate,
        usage: &ScheduleUsage,
    ) -> Result<&PriceScheduleEntry, ScheduleError> {
        check_range(&draft)?;
        let position = self.mutable_position(id, today, usage)?;
        if draft.effective_from <= today {
            return Err(ScheduleError::Immutable(id.clone()));
        }

        let mut entries = self.entries.clone();
        let old_start = entries[position].effective_from;
        if let Some(before) = entries
            .iter_mut()
            .find(|entry| &entry.id != id && entry.effective_to == Some(old_start))
        {
            if draft.effective_from <= before.effective_from {
                return Err(ScheduleError::Overlap(before.id.clone()));
            }
            if let Some(billed) = usage
                .latest_period(&before.id)
                .filter(|period| period.reference_date() >= draft.effective_from)
            {
                return Err(ScheduleError::BilledPeriodConflict {
                    entry: before.id.clone(),
                    closing_on: draft.effective_from,
                    billed,
                });
            }
            before.effective_to = Some(draft.effective_from);
        }
        entries[position] = draft.into_entry(id.clone());
        self.commit(entries)?;
        self.get(id)
            .ok_or_else(|| ScheduleError::NotFound(id.clone()))
    }

    /// Drop an entry that has not yet taken effect. The entry it closed takes over its window.
    pub fn remove(
        &mut self,
        id: &PriceEntryId,
        today: NaiveDate,
        usage: &ScheduleUsage,
    ) -> Result<PriceScheduleEntry, ScheduleError> {
        let position = self.mutable_position(id, today, usage)?;

        let mut entries = self.entries.clone();
        let removed = entries.remove(position);
        if let Some(before) = entries
            .iter_mut()
            .find(|entry| entry.effective_to == Some(removed.effective_from))
        {
            before.effective_to = removed.effective_to;
        }
        self.commit(entries)?;
        Ok(removed)
    }

    fn mutable_position(
        &self,
        id: &PriceEntryId,
        today: NaiveDate,
        usage: &ScheduleUsage,
    ) -> Result<usize, ScheduleError> {
        let position = self
            .entries
            .iter()
            .position(|entry| &entry.id == id)
            .ok_or_else(|| ScheduleError::NotFound(id.clone()))?;
        if self.is_mutable(&self.entries[position], today, usage) {
            Ok(position)
        } else {
            Err(ScheduleError::Immutable(id.clone()))
        }
    }

    fn commit(&mut self, mut entries: Vec<PriceScheduleEntry>) -> Result<(), ScheduleError> {
        entries.sort_by(|a, b| a.effective_from.cmp(&b.effective_from).then(a.id.cmp(&b.id)));

        if entries.iter().filter(|entry| entry.is_open_ended()).count() > 1 {
            return Err(ScheduleError::MultipleOpenEnded);
        }

        for pair in entries.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            let overlaps = earlier
                .effective_to
                .map_or(true, |to| to > later.effective_from);
            if overlaps {
                return Err(ScheduleError::Overlap(earlier.id.clone()));
            }
        }

        self.entries = entries;
        Ok(())
    }
}

fn check_range(draft: &PriceDraft) -> Result<(), ScheduleError> {
    match draft.effective_to {
        Some(to) if to <= draft.effective_from => Err(ScheduleError::InvalidRange {
            from: draft.effective_from,
            to,
        }),
        _ => Ok(()),
    }
}
