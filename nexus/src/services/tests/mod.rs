//! Service-specific tests
//!
//! HTTP collaborators run against a wiremock server, file-backed ones
//! against a temporary directory.

#[cfg(test)]
mod query_store;

#[cfg(test)]
pub mod common {
    use serde_json::json;

    use crate::core::data::{AlgorithmData, DataTable};

    pub fn sample_table() -> DataTable {
        let mut table = DataTable::new(vec!["sku".to_string(), "qty".to_string()]);
        table.push_row(vec![json!("A-1"), json!(3)]).expect("row matches columns");
        table.push_row(vec![json!("B-2"), json!(5)]).expect("row matches columns");
        table
    }

    pub fn sample_document() -> AlgorithmData {
        AlgorithmData::Document(json!({"score": 0.91, "model": "baseline"}))
    }
}
