//! Shared serde helpers for configuration durations
//!
//! Timeouts are written as whole seconds, poll intervals as milliseconds,
//! both as plain integers so TOML files stay easy to edit.

/// Serialize a `Duration` as whole seconds (u64)
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Timeouts {
///     #[serde(with = "vdut_core::config::serde_utils::duration_secs")]
///     ready_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serialize a `Duration` as milliseconds (u64)
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timings {
        #[serde(with = "duration_secs")]
        ready_timeout: Duration,
        #[serde(with = "duration_millis")]
        poll_interval: Duration,
    }

    #[test]
    fn test_serialize_as_integers() {
        let timings = Timings {
            ready_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(5000),
        };
        let toml = toml::to_string(&timings).unwrap();
        assert!(toml.contains("ready_timeout = 300"));
        assert!(toml.contains("poll_interval = 5000"));
    }

    #[test]
    fn test_deserialize_from_integers() {
        let timings: Timings = toml::from_str("ready_timeout = 60\npoll_interval = 250\n").unwrap();
        assert_eq!(timings.ready_timeout, Duration::from_secs(60));
        assert_eq!(timings.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_subsecond_timeout_truncates() {
        let timings = Timings {
            ready_timeout: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(10),
        };
        let json = serde_json::to_string(&timings).unwrap();
        assert_eq!(json, r#"{"ready_timeout":1,"poll_interval":10}"#);
    }
}
