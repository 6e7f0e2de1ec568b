//! Result records extracted from simulator output.

use rust_decimal::Decimal;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted data line: a time point and the probed signal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub time: Decimal,
    pub seed: u64,
    pub sweep: u64,
    /// (signal_name, value) pairs in the request's signal order.
    pub values: Vec<(String, Decimal)>,
}

impl ResultRecord {
    pub fn get(&self, signal: &str) -> Option<Decimal> {
        self.values
            .iter()
            .find(|(name, _)| name == signal)
            .map(|(_, v)| *v)
    }
}

/// A record as handed to a result store, with its unique id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub record: ResultRecord,
}

impl From<ResultRecord> for StoredRecord {
    fn from(record: ResultRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            record,
        }
    }
}
