//! Sweep/seed aggregation of stored results.
//!
//! Records are grouped by `(sweep, seed)`; each group becomes one
//! [`SampleSet`] holding every `(signal, time) -> value` sample of that Monte
//! Carlo trial. Named [`Filter`]s then count the trials they accept, e.g. the
//! number of sweeps whose output flipped at a given plot time.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::{Result, SimError};
use crate::record::{ResultRecord, StoredRecord};

/// All samples of one `(sweep, seed)` trial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSet {
    samples: BTreeMap<(String, Decimal), Decimal>,
}

impl SampleSet {
    pub fn value_at(&self, signal: &str, time: Decimal) -> Option<Decimal> {
        self.samples.get(&(signal.to_string(), time)).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples of `signal` in time order.
    pub fn series<'a>(&'a self, signal: &'a str) -> impl Iterator<Item = (Decimal, Decimal)> + 'a {
        self.samples
            .iter()
            .filter(move |((name, _), _)| name == signal)
            .map(|((_, time), value)| (*time, *value))
    }
}

/// A named predicate over one trial.
pub struct Filter {
    pub name: String,
    predicate: Box<dyn Fn(&SampleSet) -> bool + Send + Sync>,
}

impl Filter {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&SampleSet) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn accepts(&self, set: &SampleSet) -> bool {
        (self.predicate)(set)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter").field("name", &self.name).finish()
    }
}

/// Group records accepted by `predicate` into one sample set per `(sweep, seed)`.
pub fn group<'a, I>(
    records: I,
    predicate: &dyn Fn(&ResultRecord) -> bool,
) -> Result<BTreeMap<(u64, u64), SampleSet>>
where
    I: IntoIterator<Item = &'a ResultRecord>,
{
    let mut groups: BTreeMap<(u64, u64), SampleSet> = BTreeMap::new();
    for record in records.into_iter().filter(|r| predicate(*r)) {
        let set = groups.entry((record.sweep, record.seed)).or_default();
        for (signal, value) in &record.values {
            let key = (signal.clone(), record.time);
            if set.samples.insert(key, *value).is_some() {
                return Err(SimError::DuplicateSample {
                    sweep: record.sweep,
                    seed: record.seed,
                    signal: signal.clone(),
                    time: record.time,
                });
            }
        }
    }
    Ok(groups)
}

/// Count, per filter in list order, the trials the filter accepts.
pub fn count<'a, I>(
    records: I,
    predicate: &dyn Fn(&ResultRecord) -> bool,
    filters: &[Filter],
) -> Result<Vec<(String, u64)>>
where
    I: IntoIterator<Item = &'a ResultRecord>,
{
    let groups = group(records, predicate)?;
    Ok(filters
        .iter()
        .map(|f| {
            let n = groups.values().filter(|set| f.accepts(set)).count() as u64;
            (f.name.clone(), n)
        })
        .collect())
}

/// Storage capability the engine hands results to.
pub trait ResultStore {
    /// Select the database subsequent calls operate on.
    fn use_database(&mut self, name: &str) -> Result<()>;

    /// Insert records, replacing any with the same id.
    fn bulk_upsert(&mut self, records: &[StoredRecord]) -> Result<()>;

    fn grouped_count(
        &self,
        predicate: &dyn Fn(&ResultRecord) -> bool,
        filters: &[Filter],
    ) -> Result<Vec<(String, u64)>>;
}

/// In-process store keyed by database name and record id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: Option<String>,
    databases: BTreeMap<String, BTreeMap<uuid::Uuid, ResultRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<&BTreeMap<uuid::Uuid, ResultRecord>> {
        let name = self.current_name()?;
        self.databases
            .get(name)
            .ok_or_else(|| SimError::Config(format!("database `{name}` does not exist")))
    }

    fn current_name(&self) -> Result<&str> {
        self.current
            .as_deref()
            .ok_or_else(|| SimError::Config("no database selected".to_string()))
    }

    pub fn len(&self) -> usize {
        self.table().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upsert several batches, logging the running total after each.
    pub fn bulk_upsert_batches(&mut self, batches: &[Vec<StoredRecord>]) -> Result<()> {
        let mut total = 0;
        for batch in batches {
            self.bulk_upsert(batch)?;
            total += batch.len();
            tracing::info!(records = batch.len(), total, "bulk upsert");
        }
        Ok(())
    }
}

impl ResultStore for MemoryStore {
    fn use_database(&mut self, name: &str) -> Result<()> {
        self.databases.entry(name.to_string()).or_default();
        self.current = Some(name.to_string());
        Ok(())
    }

    fn bulk_upsert(&mut self, records: &[StoredRecord]) -> Result<()> {
        let name = self.current_name()?.to_string();
        let table = self.databases.entry(name).or_default();
        for stored in records {
            table.insert(stored.id, stored.record.clone());
        }
        Ok(())
    }

    fn grouped_count(
        &self,
        predicate: &dyn Fn(&ResultRecord) -> bool,
        filters: &[Filter],
    ) -> Result<Vec<(String, u64)>> {
        count(self.table()?.values(), predicate, filters)
    }
}
