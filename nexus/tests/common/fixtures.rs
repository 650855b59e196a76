//! Test fixtures and data for run harness tests

use nexus::{DataTable, NexusConfig};
use serde_json::json;
use shared::RunArguments;
use std::collections::HashMap;

pub struct TestFixtures;

impl TestFixtures {
    pub const REQUEST_ID: &'static str = "run-1";
    pub const ALGORITHM_NAME: &'static str = "scorer";
    pub const RESULTS_RECEIVER: &'static str = "http://crystal.local";
    pub const PAYLOAD_URI: &'static str = "https://blob.local/payloads/run-1.json";
    pub const OUTPUT_PATH: &'static str = "file:///results";
    pub const TELEMETRY_PATH: &'static str = "file:///telemetry";

    pub fn run_arguments() -> RunArguments {
        RunArguments::new(Self::PAYLOAD_URI, Self::REQUEST_ID, Self::RESULTS_RECEIVER)
    }

    pub fn environment() -> HashMap<String, String> {
        HashMap::from([
            ("NEXUS__ALGORITHM_OUTPUT_PATH".to_string(), Self::OUTPUT_PATH.to_string()),
            ("NEXUS__TELEMETRY_PATH".to_string(), Self::TELEMETRY_PATH.to_string()),
            ("NEXUS__STORAGE_CLIENT_CLASS".to_string(), "local".to_string()),
            ("CRYSTAL__ALGORITHM_NAME".to_string(), Self::ALGORITHM_NAME.to_string()),
            ("NEXUS__FORK_DRAIN_TIMEOUT_SECONDS".to_string(), "5".to_string()),
        ])
    }

    pub fn config_with(overrides: &[(&str, &str)]) -> NexusConfig {
        let mut env = Self::environment();
        for (key, value) in overrides {
            env.insert(key.to_string(), value.to_string());
        }
        NexusConfig::from_lookup(|key| env.get(key).cloned()).expect("fixture configuration is valid")
    }

    pub fn config() -> NexusConfig {
        Self::config_with(&[])
    }

    /// Result blob location for `REQUEST_ID` as a JSON document
    pub fn result_path() -> String {
        "/results/run-1.json".to_string()
    }

    pub fn orders_table() -> DataTable {
        let mut table = DataTable::new(vec!["sku".to_string(), "qty".to_string()]);
        table.push_row(vec![json!("A-1"), json!(3)]).unwrap();
        table.push_row(vec![json!("B-2"), json!(5)]).unwrap();
        table.push_row(vec![json!("C-3"), json!(1)]).unwrap();
        table
    }
}
