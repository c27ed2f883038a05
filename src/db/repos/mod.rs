pub mod alerts;
pub mod planning;
pub mod reference;
pub mod spend;

/// Collect rows from a listing query, logging any row-mapping errors instead of silently dropping them.
///
/// Only used for display listings. Reads that feed calculations collect with `?`.
pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    context: &str,
) -> Vec<T> {
    let mut results = Vec::new();
    for (idx, row_result) in rows.enumerate() {
        match row_result {
            Ok(item) => results.push(item),
            Err(e) => {
                tracing::warn!(
                    context = context,
                    row_index = idx,
                    error = %e,
                    "Failed to map database row, possible data corruption"
                );
            }
        }
    }
    results
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
