//! Typed run payloads and configuration sections

use serde::de::DeserializeOwned;

use crate::error::{NexusError, NexusResult};

/// Run payload fetched once from the payload URI and deserialized into the user type
pub trait AlgorithmPayload: DeserializeOwned + Send + Sync + 'static {
    /// Post-deserialization checks
    fn validate(&self) -> NexusResult<()> {
        Ok(())
    }

    fn from_value(value: serde_json::Value) -> NexusResult<Self> {
        let payload: Self = serde_json::from_value(value).map_err(|e| NexusError::InvalidPayload {
            message: e.to_string(),
        })?;
        payload.validate()?;
        Ok(payload)
    }
}

/// Configuration section read from the process environment
pub trait NexusConfiguration: Sized + Send + Sync + 'static {
    fn from_lookup<F>(lookup: F) -> NexusResult<Self>
    where
        F: Fn(&str) -> Option<String>;

    fn from_environment() -> NexusResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug)]
    struct ScoringPayload {
        threshold: f64,
    }

    impl AlgorithmPayload for ScoringPayload {
        fn validate(&self) -> NexusResult<()> {
            if !(0.0..=1.0).contains(&self.threshold) {
                return Err(NexusError::InvalidPayload {
                    message: format!("threshold {} is outside [0, 1]", self.threshold),
                });
            }
            Ok(())
        }
    }

    struct Limits {
        max_rows: usize,
    }

    impl NexusConfiguration for Limits {
        fn from_lookup<F>(lookup: F) -> NexusResult<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let raw = lookup("LIMITS__MAX_ROWS").ok_or_else(|| NexusError::config("LIMITS__MAX_ROWS"))?;
            let max_rows = raw.parse().map_err(|_| NexusError::config("LIMITS__MAX_ROWS"))?;
            Ok(Self { max_rows })
        }
    }

    #[test]
    fn test_payload_is_validated() {
        assert_eq!(ScoringPayload::from_value(json!({"threshold": 0.4})).unwrap().threshold, 0.4);
        assert!(ScoringPayload::from_value(json!({"threshold": 4.0})).is_err());
        assert!(matches!(
            ScoringPayload::from_value(json!({"limit": 1})),
            Err(NexusError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_configuration_from_lookup() {
        let limits = Limits::from_lookup(|key| (key == "LIMITS__MAX_ROWS").then(|| "25".to_string())).unwrap();
        assert_eq!(limits.max_rows, 25);

        let missing = Limits::from_lookup(|_| None);
        assert!(matches!(missing, Err(NexusError::StartupConfiguration { .. })));
    }
}
