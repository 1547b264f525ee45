// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Option JSON handling.
//!
//! Instances and flows accept a small JSON object of namespaced option keys.
//! Unknown keys are ignored; absent keys fall back to defaults. The effective
//! options (after defaults) are persisted next to each flow as
//! `options.json`.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default ring history: at least one second of media.
pub const DEFAULT_HISTORY_DURATION_NS: u64 = 1_000_000_000;

/// Default producer commit batch hint.
pub const DEFAULT_MAX_COMMIT_BATCH_SIZE: u32 = 1;

/// Default writer heartbeat freshness window for `is_flow_active`.
pub const DEFAULT_LIVENESS_THRESHOLD_NS: u64 = 1_000_000_000;

/// Options accepted by `create_flow`.
///
/// # Recognized keys
///
/// - `"urn:x-mxl:option:history_duration/v1.0"`: u64 nanoseconds; the ring is
///   sized to hold at least this much media.
/// - `"urn:x-mxl:option:max_commit_batch_size/v1.0"`: u32; the largest batch,
///   in slices or samples, in which the producer commits data.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FlowOptions {
    /// Ring history in nanoseconds.
    #[serde(
        rename = "urn:x-mxl:option:history_duration/v1.0",
        skip_serializing_if = "Option::is_none"
    )]
    pub history_duration: Option<u64>,

    /// Producer commit batch hint in slices or samples.
    #[serde(
        rename = "urn:x-mxl:option:max_commit_batch_size/v1.0",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_commit_batch_size: Option<u32>,
}

impl FlowOptions {
    /// Parses flow options from JSON. `None` or an empty string yields the
    /// defaults.
    pub fn from_json(json: Option<&str>) -> Result<Self> {
        parse_options(json)
    }

    /// History duration after defaults.
    pub fn history_duration_ns(&self) -> u64 {
        self.history_duration.unwrap_or(DEFAULT_HISTORY_DURATION_NS)
    }

    /// Commit batch hint after defaults.
    pub fn max_commit_batch_size(&self) -> u32 {
        self.max_commit_batch_size
            .unwrap_or(DEFAULT_MAX_COMMIT_BATCH_SIZE)
            .max(1)
    }

    /// Returns a copy with every field resolved to its effective value, for
    /// persisting as `options.json`.
    pub fn effective(&self) -> Self {
        Self {
            history_duration: Some(self.history_duration_ns()),
            max_commit_batch_size: Some(self.max_commit_batch_size()),
        }
    }
}

/// Options accepted by `MxlInstance::new`.
///
/// # Recognized keys
///
/// - `"urn:x-mxl:option:history_duration/v1.0"`: default ring history applied
///   to flows created without their own value.
/// - `"urn:x-mxl:option:liveness_threshold/v1.0"`: u64 nanoseconds; how fresh
///   a writer heartbeat must be for `is_flow_active` to report `true`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct InstanceOptions {
    /// Default ring history in nanoseconds for flows created through this
    /// instance.
    #[serde(
        rename = "urn:x-mxl:option:history_duration/v1.0",
        skip_serializing_if = "Option::is_none"
    )]
    pub history_duration: Option<u64>,

    /// Heartbeat freshness window in nanoseconds.
    #[serde(
        rename = "urn:x-mxl:option:liveness_threshold/v1.0",
        skip_serializing_if = "Option::is_none"
    )]
    pub liveness_threshold: Option<u64>,
}

impl InstanceOptions {
    /// Parses instance options from JSON. `None` or an empty string yields
    /// the defaults.
    pub fn from_json(json: Option<&str>) -> Result<Self> {
        parse_options(json)
    }

    /// Liveness threshold after defaults.
    pub fn liveness_threshold_ns(&self) -> u64 {
        self.liveness_threshold
            .unwrap_or(DEFAULT_LIVENESS_THRESHOLD_NS)
    }

    /// Merges instance-level defaults into flow options: a flow value wins,
    /// the instance default fills the gap.
    pub fn merge_into(&self, flow: FlowOptions) -> FlowOptions {
        FlowOptions {
            history_duration: flow.history_duration.or(self.history_duration),
            max_commit_batch_size: flow.max_commit_batch_size,
        }
    }
}

fn parse_options<T: Default + for<'de> Deserialize<'de>>(json: Option<&str>) -> Result<T> {
    match json {
        None => Ok(T::default()),
        Some(text) if text.trim().is_empty() => Ok(T::default()),
        Some(text) => serde_json::from_str(text)
            .map_err(|error| Error::InvalidFlowDef(format!("invalid options JSON: {error}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_use_defaults() {
        let options = FlowOptions::from_json(Some("{}")).unwrap();
        assert_eq!(options.history_duration_ns(), DEFAULT_HISTORY_DURATION_NS);
        assert_eq!(options.max_commit_batch_size(), 1);

        let options = FlowOptions::from_json(None).unwrap();
        assert_eq!(options.history_duration_ns(), DEFAULT_HISTORY_DURATION_NS);
    }

    #[test]
    fn history_duration_key_is_recognized() {
        let options = FlowOptions::from_json(Some(
            r#"{"urn:x-mxl:option:history_duration/v1.0": 250000000}"#,
        ))
        .unwrap();
        assert_eq!(options.history_duration_ns(), 250_000_000);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let options =
            FlowOptions::from_json(Some(r#"{"urn:x-mxl:option:future/v9.9": true}"#)).unwrap();
        assert_eq!(options, FlowOptions::default());
    }

    #[test]
    fn malformed_options_are_rejected() {
        assert!(FlowOptions::from_json(Some("{ not json")).is_err());
    }

    #[test]
    fn effective_options_round_trip_as_json() {
        let options = FlowOptions {
            history_duration: None,
            max_commit_batch_size: Some(270),
        };
        let json = serde_json::to_string(&options.effective()).unwrap();
        let parsed = FlowOptions::from_json(Some(&json)).unwrap();
        assert_eq!(parsed.history_duration_ns(), DEFAULT_HISTORY_DURATION_NS);
        assert_eq!(parsed.max_commit_batch_size(), 270);
    }

    #[test]
    fn instance_defaults_fill_flow_gaps() {
        let instance = InstanceOptions {
            history_duration: Some(2_000_000_000),
            liveness_threshold: None,
        };
        let merged = instance.merge_into(FlowOptions::default());
        assert_eq!(merged.history_duration_ns(), 2_000_000_000);

        let explicit = instance.merge_into(FlowOptions {
            history_duration: Some(500_000_000),
            max_commit_batch_size: None,
        });
        assert_eq!(explicit.history_duration_ns(), 500_000_000);
    }
}
