// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! JSON flow definition schema types.
//!
//! This module defines Rust structures for parsing and validating MXL flow
//! definitions, which follow the NMOS IS-04 flow schema format, and the
//! derived payload geometry (slice lengths, slice counts, grain sizes) the
//! shared-memory engine is built from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layout::{DATA_GRAIN_PAYLOAD_SIZE, MAX_PLANES_PER_GRAIN};
use crate::time::Rational;
use crate::{DataFormat, Error, Result};

/// Maximum supported frame dimensions (8K UHD).
pub const MAX_FRAME_WIDTH: u32 = 7680;
pub const MAX_FRAME_HEIGHT: u32 = 4320;

/// The tag key under which NMOS group hints are stored.
pub const GROUP_HINT_TAG: &str = "urn:x-nmos:tag:grouphint/v1.0";

/// Complete flow definition structure following the NMOS IS-04 schema.
///
/// This represents the JSON flow definition passed to
/// [`crate::MxlInstance::create_flow`]. It contains both common metadata
/// (ID, label, tags) and format-specific details (video dimensions, audio
/// rates). Unknown JSON fields are ignored; an unknown `format` URN is
/// rejected.
///
/// # Examples
///
/// ```
/// use mxl::flowdef::FlowDef;
///
/// let json = r#"{
///     "id": "5fbec3b1-1b0f-417d-9059-8b94a47197ed",
///     "format": "urn:x-nmos:format:video",
///     "label": "Camera 1",
///     "description": "1080p60 video",
///     "tags": {"urn:x-nmos:tag:grouphint/v1.0": ["cam1:video"]},
///     "media_type": "video/v210",
///     "grain_rate": {"numerator": 60000, "denominator": 1001},
///     "frame_width": 1920,
///     "frame_height": 1080,
///     "interlace_mode": "progressive",
///     "colorspace": "BT709",
///     "components": []
/// }"#;
///
/// let flow_def = FlowDef::from_json(json).unwrap();
/// assert_eq!(flow_def.total_slices(), 1080);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDef {
    /// Unique identifier for this flow (UUID).
    pub id: Uuid,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Tag map; must carry at least one group hint.
    pub tags: HashMap<String, Vec<String>>,
    /// Short human-readable label. Must not be empty.
    pub label: String,
    /// List of parent flow IDs (for derived flows).
    #[serde(default)]
    pub parents: Vec<String>,
    /// MIME media type (e.g., "video/v210").
    pub media_type: String,
    /// Format-specific details (flattened into this struct via serde).
    #[serde(flatten)]
    pub details: FlowDefDetails,
}

/// Format-specific flow definition details, tagged on the NMOS `format` URN.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "format")]
pub enum FlowDefDetails {
    /// Video flow definition (discrete, grain-based).
    #[serde(rename = "urn:x-nmos:format:video")]
    Video(FlowDefVideo),
    /// Audio flow definition (continuous, sample-based).
    #[serde(rename = "urn:x-nmos:format:audio")]
    Audio(FlowDefAudio),
    /// Ancillary data flow definition (discrete, grain-based).
    #[serde(rename = "urn:x-nmos:format:data")]
    Data(FlowDefData),
}

/// Video flow definition details.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDefVideo {
    /// Frame rate as a rational number (e.g., 60000/1001 for 59.94 fps).
    pub grain_rate: Rational,
    /// Frame width in pixels.
    pub frame_width: u32,
    /// Frame height in pixels (full frame, even for interlaced flows).
    pub frame_height: u32,
    /// Interlacing mode.
    #[serde(default)]
    pub interlace_mode: InterlaceMode,
    /// Colorspace identifier (e.g., "BT709", "BT2020").
    pub colorspace: String,
    /// Video component descriptions (Y, Cb, Cr, A, ...).
    #[serde(default)]
    pub components: Vec<Component>,
}

/// Video interlacing mode.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InterlaceMode {
    /// Progressive scan (non-interlaced).
    #[default]
    #[serde(rename = "progressive")]
    Progressive,
    /// Interlaced with top field first.
    #[serde(rename = "interlaced_tff")]
    InterlacedTff,
    /// Interlaced with bottom field first.
    #[serde(rename = "interlaced_bff")]
    InterlacedBff,
}

/// Audio flow definition details.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDefAudio {
    /// Sample rate as a rational number (typically 48000/1 Hz).
    pub sample_rate: Rational,
    /// Number of audio channels.
    pub channel_count: u32,
    /// Bit depth per sample. Must be 32 or 64.
    pub bit_depth: u32,
    /// Source this flow originates from.
    pub source_id: Uuid,
    /// Device the source belongs to.
    pub device_id: Uuid,
}

/// Ancillary data flow definition details.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDefData {
    /// Grain rate as a rational number; ANC grains track the video rate.
    pub grain_rate: Rational,
}

/// Video component description (Y, Cb, Cr, alpha, ...).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Component {
    /// Component name (e.g., "Y", "Cb", "Cr", "A").
    pub name: String,
    /// Component width in pixels.
    pub width: u32,
    /// Component height in pixels.
    pub height: u32,
    /// Bit depth of this component.
    pub bit_depth: u32,
}

/// Byte length of one v210 line, including padding.
pub fn v210_line_length(width: u32) -> u32 {
    (width + 47) / 48 * 128
}

/// Byte length of one alpha (key) line for v210+alpha flows.
pub fn alpha_line_length(width: u32) -> u32 {
    (width + 2) / 3 * 4
}

impl FlowDef {
    /// Parses and validates a flow definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFlowDef`] on malformed JSON, missing required
    /// fields, an empty label, missing or malformed group hints, unsupported
    /// media types, out-of-range dimensions, interlaced flows with an odd
    /// height or a non-permitted grain rate, or an unsupported audio bit
    /// depth.
    pub fn from_json(json: &str) -> Result<Self> {
        let flow_def: FlowDef = serde_json::from_str(json)
            .map_err(|error| Error::InvalidFlowDef(format!("failed to parse flow JSON: {error}")))?;
        flow_def.validate()?;
        Ok(flow_def)
    }

    /// Serializes this definition back to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|error| Error::InvalidFlowDef(format!("failed to serialize flow: {error}")))
    }

    /// The media data format of this flow.
    pub fn data_format(&self) -> DataFormat {
        match &self.details {
            FlowDefDetails::Video(_) => DataFormat::Video,
            FlowDefDetails::Audio(_) => DataFormat::Audio,
            FlowDefDetails::Data(_) => DataFormat::Data,
        }
    }

    /// Returns `true` if this flow is discrete (grain-based).
    pub fn is_discrete(&self) -> bool {
        self.data_format() != DataFormat::Audio
    }

    /// The effective grain rate for discrete flows.
    ///
    /// Interlaced media is handled as separate fields, so the grain rate of
    /// an interlaced video flow is twice the declared frame rate. The result
    /// is normalized.
    ///
    /// # Errors
    ///
    /// Returns an error for audio flows.
    pub fn grain_rate(&self) -> Result<Rational> {
        match &self.details {
            FlowDefDetails::Video(video) => {
                let mut rate = video.grain_rate;
                if video.interlace_mode != InterlaceMode::Progressive {
                    rate.numerator *= 2;
                }
                Ok(rate.normalized())
            }
            FlowDefDetails::Data(data) => Ok(data.grain_rate.normalized()),
            FlowDefDetails::Audio(_) => Err(Error::Other(
                "Flow is audio, grain rate is only relevant for discrete flows.".to_string(),
            )),
        }
    }

    /// The normalized sample rate for continuous flows.
    ///
    /// # Errors
    ///
    /// Returns an error for video and data flows.
    pub fn sample_rate(&self) -> Result<Rational> {
        match &self.details {
            FlowDefDetails::Audio(audio) => Ok(audio.sample_rate.normalized()),
            _ => Err(Error::Other(
                "Flow is discrete, sample rate is only relevant for audio flows.".to_string(),
            )),
        }
    }

    /// Number of audio channels.
    ///
    /// # Errors
    ///
    /// Returns an error for video and data flows.
    pub fn channel_count(&self) -> Result<u32> {
        match &self.details {
            FlowDefDetails::Audio(audio) => Ok(audio.channel_count),
            _ => Err(Error::Other(
                "Flow is discrete, channel count is only relevant for audio flows.".to_string(),
            )),
        }
    }

    /// Bytes per audio sample (`bit_depth / 8`).
    ///
    /// # Errors
    ///
    /// Returns an error for video and data flows.
    pub fn sample_word_size(&self) -> Result<u32> {
        match &self.details {
            FlowDefDetails::Audio(audio) => Ok(audio.bit_depth / 8),
            _ => Err(Error::Other(
                "Flow is discrete, sample size is only relevant for audio flows.".to_string(),
            )),
        }
    }

    /// Per-plane slice (line) lengths in bytes.
    ///
    /// Video v210 flows have one plane; v210+alpha flows add a key plane.
    /// Data flows use single-byte slices. Audio flows have no slices.
    pub fn slice_sizes(&self) -> [u32; MAX_PLANES_PER_GRAIN] {
        let mut sizes = [0u32; MAX_PLANES_PER_GRAIN];
        match &self.details {
            FlowDefDetails::Video(video) => {
                sizes[0] = v210_line_length(video.frame_width);
                if self.media_type == "video/v210+alpha" {
                    sizes[1] = alpha_line_length(video.frame_width);
                }
            }
            FlowDefDetails::Data(_) => {
                sizes[0] = 1;
            }
            FlowDefDetails::Audio(_) => {}
        }
        sizes
    }

    /// Bytes of one slice across all planes.
    pub fn slice_length(&self) -> u32 {
        self.slice_sizes().iter().sum()
    }

    /// Number of independently committable slices per grain.
    ///
    /// For video this is the number of lines (halved for interlaced fields);
    /// for data flows every payload byte is a slice.
    pub fn total_slices(&self) -> u32 {
        match &self.details {
            FlowDefDetails::Video(video) => {
                if video.interlace_mode == InterlaceMode::Progressive {
                    video.frame_height
                } else {
                    video.frame_height / 2
                }
            }
            FlowDefDetails::Data(_) => DATA_GRAIN_PAYLOAD_SIZE,
            FlowDefDetails::Audio(_) => 0,
        }
    }

    /// Total payload bytes per grain (discrete) or per sample (continuous).
    pub fn payload_size(&self) -> u32 {
        match &self.details {
            FlowDefDetails::Video(_) => self.slice_length() * self.total_slices(),
            FlowDefDetails::Data(_) => DATA_GRAIN_PAYLOAD_SIZE,
            FlowDefDetails::Audio(audio) => audio.bit_depth / 8,
        }
    }

    /// Validates the definition beyond what the schema enforces.
    fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(Error::InvalidFlowDef("label must not be empty".to_string()));
        }
        self.validate_group_hints()?;
        match &self.details {
            FlowDefDetails::Video(video) => self.validate_video(video),
            FlowDefDetails::Audio(audio) => validate_audio(audio),
            FlowDefDetails::Data(data) => self.validate_data(data),
        }
    }

    /// Validates that the group hint tag is present and well formed.
    ///
    /// See <https://specs.amwa.tv/nmos-parameter-registers/branches/main/tags/grouphint.html>.
    /// Each hint is `"<group-name>:<role-in-group>[:<group-scope>]"` where the
    /// scope, if present, is either `device` or `node`.
    fn validate_group_hints(&self) -> Result<()> {
        let hints = self
            .tags
            .get(GROUP_HINT_TAG)
            .ok_or_else(|| Error::InvalidFlowDef("group hint tag not found".to_string()))?;
        if hints.is_empty() {
            return Err(Error::InvalidFlowDef(
                "group hint tag found but empty".to_string(),
            ));
        }
        for hint in hints {
            let parts: Vec<&str> = hint.split(':').collect();
            if parts.len() < 2 || parts.len() > 3 {
                return Err(Error::InvalidFlowDef(format!(
                    "invalid group hint value '{hint}', expected \
                     '<group-name>:<role-in-group>[:<group-scope>]'"
                )));
            }
            if parts[0].is_empty() || parts[1].is_empty() {
                return Err(Error::InvalidFlowDef(format!(
                    "invalid group hint value '{hint}', group name and role must not be empty"
                )));
            }
            if parts.len() == 3 && parts[2] != "device" && parts[2] != "node" {
                return Err(Error::InvalidFlowDef(format!(
                    "invalid group hint value '{hint}', group scope must be 'device' or 'node'"
                )));
            }
        }
        Ok(())
    }

    fn validate_video(&self, video: &FlowDefVideo) -> Result<()> {
        if self.media_type != "video/v210" && self.media_type != "video/v210+alpha" {
            return Err(Error::InvalidFlowDef(format!(
                "unsupported video media_type: {}",
                self.media_type
            )));
        }
        if !video.grain_rate.is_valid() {
            return Err(Error::InvalidFlowDef(format!(
                "invalid grain_rate {}",
                video.grain_rate
            )));
        }
        if video.frame_width == 0 || video.frame_width > MAX_FRAME_WIDTH {
            return Err(Error::InvalidFlowDef(format!(
                "frame_width {} out of range (1..={MAX_FRAME_WIDTH})",
                video.frame_width
            )));
        }
        if video.frame_height == 0 || video.frame_height > MAX_FRAME_HEIGHT {
            return Err(Error::InvalidFlowDef(format!(
                "frame_height {} out of range (1..={MAX_FRAME_HEIGHT})",
                video.frame_height
            )));
        }
        if video.interlace_mode != InterlaceMode::Progressive {
            if video.frame_height % 2 != 0 {
                return Err(Error::InvalidFlowDef(
                    "invalid video height for interlaced media, must be even".to_string(),
                ));
            }
            let rate = video.grain_rate.normalized();
            if rate != Rational::new(30000, 1001) && rate != Rational::new(25, 1) {
                return Err(Error::InvalidFlowDef(
                    "invalid grain_rate for interlaced video, expected 30000/1001 or 25/1"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }

    fn validate_data(&self, data: &FlowDefData) -> Result<()> {
        if self.media_type != "video/smpte291" {
            return Err(Error::InvalidFlowDef(format!(
                "unsupported data media_type: {}",
                self.media_type
            )));
        }
        if !data.grain_rate.is_valid() {
            return Err(Error::InvalidFlowDef(format!(
                "invalid grain_rate {}",
                data.grain_rate
            )));
        }
        Ok(())
    }
}

fn validate_audio(audio: &FlowDefAudio) -> Result<()> {
    if audio.bit_depth != 32 && audio.bit_depth != 64 {
        return Err(Error::InvalidFlowDef(format!(
            "unsupported bit depth: {}",
            audio.bit_depth
        )));
    }
    if audio.channel_count == 0 {
        return Err(Error::InvalidFlowDef(
            "channel_count must be at least 1".to_string(),
        ));
    }
    if !audio.sample_rate.is_valid() {
        return Err(Error::InvalidFlowDef(format!(
            "invalid sample_rate {}",
            audio.sample_rate
        )));
    }
    Ok(())
}
