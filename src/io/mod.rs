//! CSV output for the key-usage audit trail
//!
//! Centralizes the audit export format: one row per usage record with
//! columns owner, bundle, request, keys_spent, spent_at. Rows are sorted by
//! spend time (bundle id as a tiebreaker) for deterministic output.

use std::io::Write;

use crate::types::KeyUsageRecord;

/// Write usage records to CSV format
///
/// # Arguments
///
/// * `records` - Usage records to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_usage_csv(records: &[KeyUsageRecord], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["owner", "bundle", "request", "keys_spent", "spent_at"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| (record.spent_at, record.bundle_id));

    for record in sorted {
        writer
            .write_record(&[
                record.owner_id.clone(),
                record.bundle_id.to_string(),
                record.request_id.to_string(),
                record.keys_spent.to_string(),
                record.spent_at.to_rfc3339(),
            ])
            .map_err(|e| format!("Failed to write usage record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
