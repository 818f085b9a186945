//! Output batching.

use crate::error::{Result, ToolError};

/// Partitions `records` into consecutive batches of at most `max` records.
///
/// Order is preserved and no record is split across batches, so
/// concatenating the batches gives back the input. An empty input gives no
/// batches.
pub fn split_batches<T>(records: Vec<T>, max: usize) -> Result<Vec<Vec<T>>> {
    if max == 0 {
        return Err(ToolError::InvalidBatchSize(max));
    }

    let mut batches = Vec::with_capacity(records.len().div_ceil(max));
    let mut current = Vec::with_capacity(max.min(records.len()));

    for record in records {
        current.push(record);
        if current.len() == max {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    Ok(batches)
}
