pub mod occurrences;
pub mod transactions;
