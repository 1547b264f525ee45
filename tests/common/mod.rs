#![allow(dead_code)]
// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the MXL integration tests.
//!
//! Each test creates an isolated temporary domain (on `/dev/shm` where
//! available) and cleans it up automatically through [`TestDomainGuard`].

use mxl::MxlInstance;

pub const VIDEO_FLOW_ID: &str = "5fbec3b1-1b0f-417d-9059-8b94a47197ed";
pub const AUDIO_FLOW_ID: &str = "b3bb5be7-9fe9-4324-a5bb-4c70e1084449";
pub const DATA_FLOW_ID: &str = "db3bd465-2772-484f-8fac-830b0471258b";

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// RAII guard for test domain directories.
///
/// Automatically creates a unique temporary domain directory and removes it
/// when dropped, ensuring test isolation and cleanup.
pub struct TestDomainGuard {
    dir: std::path::PathBuf,
}

impl TestDomainGuard {
    /// Creates a new test domain directory with a unique UUID suffix.
    pub fn new(test: &str) -> Self {
        let base = if std::path::Path::new("/dev/shm").is_dir() {
            std::path::PathBuf::from("/dev/shm")
        } else {
            std::env::temp_dir()
        };
        let dir = base.join(format!(
            "mxl_rust_unit_tests_domain_{}_{}",
            test,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(dir.as_path()).unwrap_or_else(|_| {
            panic!(
                "Failed to create test domain directory \"{}\".",
                dir.display()
            )
        });
        Self { dir }
    }

    /// Returns the domain path.
    pub fn path(&self) -> &std::path::Path {
        &self.dir
    }

    /// Returns the domain path as a string.
    pub fn domain(&self) -> String {
        self.dir.to_string_lossy().to_string()
    }
}

impl Drop for TestDomainGuard {
    /// Removes the test domain directory on drop.
    fn drop(&mut self) {
        // Permission tests may leave the directory read-only.
        let _ = std::fs::set_permissions(
            self.dir.as_path(),
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        );
        std::fs::remove_dir_all(self.dir.as_path()).unwrap_or_else(|_| {
            panic!(
                "Failed to remove test domain directory \"{}\".",
                self.dir.display()
            )
        });
    }
}

/// Sets up a test by initializing logging and creating an isolated MXL
/// instance bound to a fresh domain.
pub fn setup_test(test: &str) -> (MxlInstance, TestDomainGuard) {
    // Initialize logging once (respects RUST_LOG environment variable)
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });

    let domain_guard = TestDomainGuard::new(test);
    (
        MxlInstance::new(domain_guard.domain(), "").unwrap(),
        domain_guard,
    )
}

/// A 1080p59.94 v210 video flow definition.
pub fn video_flow_def(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "format": "urn:x-nmos:format:video",
        "label": "Camera 1",
        "description": "1080p59.94 v210",
        "tags": {"urn:x-nmos:tag:grouphint/v1.0": ["cam1:video"]},
        "media_type": "video/v210",
        "grain_rate": {"numerator": 60000, "denominator": 1001},
        "frame_width": 1920,
        "frame_height": 1080,
        "interlace_mode": "progressive",
        "colorspace": "BT709",
        "components": [
            {"name": "Y", "width": 1920, "height": 1080, "bit_depth": 10},
            {"name": "Cb", "width": 960, "height": 1080, "bit_depth": 10},
            {"name": "Cr", "width": 960, "height": 1080, "bit_depth": 10}
        ]
    })
}

/// A mono 48 kHz 32-bit audio flow definition.
pub fn audio_flow_def(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "format": "urn:x-nmos:format:audio",
        "label": "Mic 1",
        "description": "mono 48k float",
        "tags": {"urn:x-nmos:tag:grouphint/v1.0": ["cam1:audio"]},
        "media_type": "audio/float32",
        "sample_rate": {"numerator": 48000, "denominator": 1},
        "channel_count": 1,
        "bit_depth": 32,
        "source_id": "2aa143ac-0ab7-4d75-bc32-5c00c13e186f",
        "device_id": "0f175d7c-68e3-4b0c-8a62-40967a852a4f"
    })
}

/// An SMPTE 291 ancillary data flow definition.
pub fn data_flow_def(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "format": "urn:x-nmos:format:data",
        "label": "ANC",
        "description": "closed captions",
        "tags": {"urn:x-nmos:tag:grouphint/v1.0": ["cam1:anc"]},
        "media_type": "video/smpte291",
        "grain_rate": {"numerator": 60000, "denominator": 1001}
    })
}

/// One read or write batch of an audio test plan.
pub struct BatchIndexAndSize {
    pub index: u64,
    pub size: usize,
}

/// Splits `num_of_samples` samples ending at `last_batch_index` into
/// `num_of_batches` batches. The batch containing the oldest data comes
/// first.
pub fn plan_audio_batches(
    num_of_batches: usize,
    num_of_samples: usize,
    last_batch_index: u64,
) -> Vec<BatchIndexAndSize> {
    let batch_size = num_of_samples / num_of_batches;
    let remainder = num_of_samples % num_of_batches;

    let mut result = Vec::with_capacity(num_of_batches);
    let mut samples_so_far = 0usize;
    for i in 0..num_of_batches {
        let size = batch_size + usize::from(i < remainder);
        samples_so_far += size;
        result.push(BatchIndexAndSize {
            index: last_batch_index - num_of_samples as u64 + samples_so_far as u64,
            size,
        });
    }
    result
}
