// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests for flow lifecycle, discrete grain exchange, and
//! continuous sample exchange.
//!
//! Each test creates an isolated temporary domain and runs a real
//! writer/reader pair against it through the public API.

mod common;

use std::time::Duration;

use mxl::{Error, GRAIN_FLAG_INVALID, MxlInstance, Rational};

use common::{AUDIO_FLOW_ID, DATA_FLOW_ID, VIDEO_FLOW_ID};

/// Read timeout generous enough for a loaded CI machine.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Fills the two fragments of a channel with each sample's absolute index as
/// a native-endian u32.
fn fill_with_indices(fragments: (&mut [u8], &mut [u8]), mut index: u64) {
    for chunk in fragments.0.chunks_exact_mut(4) {
        chunk.copy_from_slice(&(index as u32).to_ne_bytes());
        index += 1;
    }
    for chunk in fragments.1.chunks_exact_mut(4) {
        chunk.copy_from_slice(&(index as u32).to_ne_bytes());
        index += 1;
    }
}

/// Asserts that the two fragments of a channel hold each sample's absolute
/// index as a native-endian u32.
fn assert_indices(fragments: (&[u8], &[u8]), mut index: u64) {
    for chunk in fragments.0.chunks_exact(4) {
        assert_eq!(u32::from_ne_bytes(chunk.try_into().unwrap()), index as u32);
        index += 1;
    }
    for chunk in fragments.1.chunks_exact(4) {
        assert_eq!(u32::from_ne_bytes(chunk.try_into().unwrap()), index as u32);
        index += 1;
    }
}

#[test]
fn video_flow_create_write_read() {
    let (instance, _domain_guard) = common::setup_test("video");
    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    let info = instance.create_flow(&flow_def, None).unwrap();

    // The flow exists but has no writer yet, so it must not be active.
    assert!(!instance.is_flow_active(VIDEO_FLOW_ID).unwrap());

    let reader = instance
        .create_flow_reader(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_reader()
        .unwrap();
    let mut writer = instance
        .create_flow_writer(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_writer()
        .unwrap();

    // The writer holds the lock now; the flow is active.
    assert!(instance.is_flow_active(VIDEO_FLOW_ID).unwrap());

    // 1920x1080 v210: one 5120-byte line per slice, 1080 slices.
    let discrete = info.discrete().unwrap();
    assert_eq!(discrete.slice_sizes, [5120, 0, 0, 0]);
    assert_eq!(discrete.grain_size, 5_529_600);
    assert_eq!(discrete.total_slices, 1080);

    let rate = info.common().grain_rate().unwrap();
    assert_eq!(rate, Rational::new(60000, 1001));
    let index = instance.get_current_index(&rate);
    assert_ne!(index, mxl::UNDEFINED_INDEX);

    // Nothing committed yet: the head is still at zero.
    let runtime_before = reader.get_runtime_info().unwrap();
    assert_eq!(runtime_before.head_index(), 0);

    let mut access = writer.open_grain(index).unwrap();
    assert_eq!(access.index(), index);
    assert_eq!(access.max_size(), 5_529_600);
    let payload = access.payload_mut();
    payload[0] = 0xCA;
    payload[5_529_600 - 1] = 0xFE;
    access.set_flags(GRAIN_FLAG_INVALID);
    access.commit().unwrap();

    let grain = reader.get_grain(index, READ_TIMEOUT).unwrap();
    assert_eq!(grain.flags, GRAIN_FLAG_INVALID);
    assert!(grain.is_complete());
    assert_eq!(grain.payload[0], 0xCA);
    assert_eq!(grain.payload[grain.total_size - 1], 0xFE);
    drop(grain);

    let runtime_after = reader.get_runtime_info().unwrap();
    assert_eq!(runtime_after.head_index(), index);
    assert!(runtime_after.last_write_time() > runtime_before.last_write_time());
    assert!(runtime_after.last_read_time() > runtime_before.last_read_time());

    reader.destroy().unwrap();

    // The writer is still usable after the reader is gone.
    let mut access = writer.open_grain(index + 1).unwrap();
    access.payload_mut()[0] = 0xCA;
    access.commit().unwrap();

    writer.destroy().unwrap();

    // The writer detached; the flow is inactive again.
    assert!(!instance.is_flow_active(VIDEO_FLOW_ID).unwrap());

    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
    assert!(matches!(
        instance.destroy_flow(VIDEO_FLOW_ID),
        Err(Error::FlowNotFound)
    ));
    instance.destroy().unwrap();
}

#[test]
fn video_flow_with_alpha_has_fill_and_key_planes() {
    let (instance, _domain_guard) = common::setup_test("video_alpha");
    let mut flow_def = common::video_flow_def(VIDEO_FLOW_ID);
    flow_def["media_type"] = "video/v210+alpha".into();
    let info = instance.create_flow(&flow_def.to_string(), None).unwrap();

    let discrete = info.discrete().unwrap();
    assert_eq!(discrete.slice_sizes[0], 5120);
    assert_eq!(discrete.slice_sizes[1], (1920 + 2) / 3 * 4);
    assert_eq!(discrete.slice_sizes[2], 0);
    assert_eq!(discrete.slice_sizes[3], 0);
    assert_eq!(discrete.grain_size, (5120 + (1920 + 2) / 3 * 4) * 1080);

    let mut writer = instance
        .create_flow_writer(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_writer()
        .unwrap();
    let reader = instance
        .create_flow_reader(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_reader()
        .unwrap();

    let rate = info.common().grain_rate().unwrap();
    let index = instance.get_current_index(&rate);
    let mut access = writer.open_grain(index).unwrap();
    assert_eq!(access.max_size(), 8_294_400);
    let payload = access.payload_mut();
    payload[0] = 0xCA;
    payload[8_294_400 - 1] = 0xFE;
    access.commit().unwrap();

    let grain = reader.get_grain(index, READ_TIMEOUT).unwrap();
    assert_eq!(grain.payload[0], 0xCA);
    assert_eq!(grain.payload[grain.total_size - 1], 0xFE);

    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
}

#[test]
fn recreated_flow_invalidates_old_readers() {
    let (instance, _domain_guard) = common::setup_test("invalid_discrete");
    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    instance.create_flow(&flow_def, None).unwrap();

    let reader = instance
        .create_flow_reader(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_reader()
        .unwrap();

    // Destroy and re-create the flow with the same UUID while the reader
    // still holds the old region.
    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
    let info = instance.create_flow(&flow_def, None).unwrap();

    let rate = info.common().grain_rate().unwrap();
    let index = instance.get_current_index(&rate);
    assert!(matches!(
        reader.get_grain(index, READ_TIMEOUT),
        Err(Error::FlowInvalid)
    ));

    // A fresh reader binds to the new region and works normally.
    let fresh = instance
        .create_flow_reader(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_reader()
        .unwrap();
    assert_eq!(fresh.get_runtime_info().unwrap().head_index(), 0);
}

#[test]
fn recreated_flow_invalidates_old_audio_readers() {
    let (instance, _domain_guard) = common::setup_test("invalid_continuous");
    let flow_def = common::audio_flow_def(AUDIO_FLOW_ID).to_string();
    let info = instance.create_flow(&flow_def, None).unwrap();

    let reader = instance
        .create_flow_reader(AUDIO_FLOW_ID)
        .unwrap()
        .to_samples_reader()
        .unwrap();

    instance.destroy_flow(AUDIO_FLOW_ID).unwrap();
    instance.create_flow(&flow_def, None).unwrap();

    let rate = info.common().sample_rate().unwrap();
    let index = instance.get_current_index(&rate);
    assert!(matches!(
        reader.get_samples_non_blocking(index, 64),
        Err(Error::FlowInvalid)
    ));

    instance.destroy_flow(AUDIO_FLOW_ID).unwrap();
}

#[test]
fn sliced_commits_are_progressively_visible() {
    let (instance, _domain_guard) = common::setup_test("slices");
    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    let options = r#"{"urn:x-mxl:option:max_commit_batch_size/v1.0": 270}"#;
    let info = instance.create_flow(&flow_def, Some(options)).unwrap();
    assert_eq!(info.common().max_commit_batch_size_hint(), 270);

    let reader = instance
        .create_flow_reader(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_reader()
        .unwrap();
    let mut writer = instance
        .create_flow_writer(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_writer()
        .unwrap();

    let rate = info.common().grain_rate().unwrap();
    let index = instance.get_current_index(&rate);
    let mut access = writer.open_grain(index).unwrap();
    assert_eq!(access.total_slices(), 1080);

    let mut last_write_time = reader.get_runtime_info().unwrap().last_write_time();
    for expected_valid in [270u32, 540, 810, 1080] {
        access.commit_slices(expected_valid).unwrap();

        let runtime = reader.get_runtime_info().unwrap();
        assert_eq!(runtime.head_index(), index);
        assert!(runtime.last_write_time() > last_write_time);
        last_write_time = runtime.last_write_time();

        let grain = reader.get_grain(index, READ_TIMEOUT).unwrap();
        assert_eq!(grain.valid_slices, expected_valid);
        assert_eq!(grain.is_complete(), expected_valid == 1080);
        assert_eq!(grain.valid_payload().len(), expected_valid as usize * 5120);
    }

    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
}

#[test]
fn sliced_commits_enforce_the_batch_hint() {
    let (instance, _domain_guard) = common::setup_test("slice_rules");
    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    let options = r#"{"urn:x-mxl:option:max_commit_batch_size/v1.0": 270}"#;
    let info = instance.create_flow(&flow_def, Some(options)).unwrap();

    let mut writer = instance
        .create_flow_writer(VIDEO_FLOW_ID)
        .unwrap()
        .to_grain_writer()
        .unwrap();
    let rate = info.common().grain_rate().unwrap();
    let mut access = writer.open_grain(instance.get_current_index(&rate)).unwrap();

    // Not a multiple of the hint and not the final batch.
    assert!(matches!(
        access.commit_slices(100),
        Err(Error::InvalidArg)
    ));
    access.commit_slices(540).unwrap();
    // valid_slices must not regress.
    assert!(matches!(
        access.commit_slices(270),
        Err(Error::InvalidArg)
    ));
    // The final batch tops up to the total even though 1080 is a multiple
    // anyway; oversized commits are rejected.
    assert!(access.commit_slices(2000).is_err());
    access.commit_slices(1080).unwrap();
}

#[test]
fn audio_samples_round_trip() {
    let (instance, _domain_guard) = common::setup_test("audio");
    let flow_def = common::audio_flow_def(AUDIO_FLOW_ID).to_string();
    let info = instance.create_flow(&flow_def, None).unwrap();

    let continuous = info.continuous().unwrap();
    assert_eq!(continuous.sample_rate, Rational::new(48000, 1));
    assert_eq!(continuous.channel_count, 1);
    assert_eq!(continuous.sample_word_size, 4);
    assert!(continuous.buffer_length > 128);
    assert!(continuous.buffer_length.is_power_of_two());

    let reader = instance
        .create_flow_reader(AUDIO_FLOW_ID)
        .unwrap()
        .to_samples_reader()
        .unwrap();
    let mut writer = instance
        .create_flow_writer(AUDIO_FLOW_ID)
        .unwrap()
        .to_samples_writer()
        .unwrap();

    let rate = info.common().sample_rate().unwrap();
    let index = instance.get_current_index(&rate);

    {
        let mut access = writer.open_samples(index, 64).unwrap();
        assert_eq!(access.channels(), 1);
        let (frag0, frag1) = access.channel_data_mut(0).unwrap();
        assert_eq!(frag0.len() + frag1.len(), 256);

        for (i, byte) in frag0.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let offset = frag0.len();
        for (i, byte) in frag1.iter_mut().enumerate() {
            *byte = (offset + i) as u8;
        }

        // Nothing is visible before the commit.
        assert_eq!(reader.get_runtime_info().unwrap().head_index(), 0);
        access.commit().unwrap();
    }

    let samples = reader.get_samples(index, 64, READ_TIMEOUT).unwrap();
    assert_eq!(samples.num_of_channels(), 1);
    let (frag0, frag1) = samples.channel_data(0).unwrap();
    assert_eq!(frag0.len() + frag1.len(), 256);

    let mut combined = Vec::with_capacity(256);
    combined.extend_from_slice(frag0);
    combined.extend_from_slice(frag1);
    let expected: Vec<u8> = (0..=255u8).collect();
    assert_eq!(combined, expected);

    assert_eq!(reader.get_runtime_info().unwrap().head_index(), index);

    // The writer keeps working after the reader is gone.
    reader.destroy().unwrap();
    let mut access = writer.open_samples(index + 64, 64).unwrap();
    let (frag0, frag1) = access.channel_data_mut(0).unwrap();
    assert_eq!(frag0.len() + frag1.len(), 256);
    drop(access);

    writer.destroy().unwrap();
    instance.destroy_flow(AUDIO_FLOW_ID).unwrap();
    assert!(matches!(
        instance.destroy_flow(AUDIO_FLOW_ID),
        Err(Error::FlowNotFound)
    ));
}

#[test]
fn audio_ring_wrap_with_uneven_batches() {
    let (instance, _domain_guard) = common::setup_test("audio_wrap");
    let flow_def = common::audio_flow_def(AUDIO_FLOW_ID).to_string();
    // 1 ms of history clamps the ring to its 128-sample floor, so the test
    // wraps it quickly.
    let options = r#"{"urn:x-mxl:option:history_duration/v1.0": 1000000}"#;
    let info = instance.create_flow(&flow_def, Some(options)).unwrap();

    let buffer_length = info.continuous().unwrap().buffer_length as usize;
    assert_eq!(buffer_length, 128);

    let rate = info.common().sample_rate().unwrap();
    let last_index = instance.get_current_index(&rate);

    // Fill the whole ring in 4 batches, stamping every sample with its
    // absolute index.
    let mut writer = instance
        .create_flow_writer(AUDIO_FLOW_ID)
        .unwrap()
        .to_samples_writer()
        .unwrap();
    for batch in common::plan_audio_batches(4, buffer_length, last_index) {
        let mut access = writer.open_samples(batch.index, batch.size).unwrap();
        let start = batch.index + 1 - batch.size as u64;
        let (frag0, frag1) = access.channel_data_mut(0).unwrap();
        assert_eq!((frag0.len() + frag1.len()) / 4, batch.size);
        fill_with_indices((frag0, frag1), start);
        access.commit().unwrap();
    }
    writer.destroy().unwrap();

    let reader = instance
        .create_flow_reader(AUDIO_FLOW_ID)
        .unwrap()
        .to_samples_reader()
        .unwrap();

    // Only the most recent half of the ring is readable. Check it twice:
    // once along the writer's batch boundaries, once in 3 uneven batches.
    let mut write_batches = common::plan_audio_batches(4, buffer_length, last_index);
    write_batches.drain(..write_batches.len() / 2);
    for plan in [
        write_batches,
        common::plan_audio_batches(3, buffer_length / 2, last_index),
    ] {
        for batch in plan {
            let samples = reader.get_samples_non_blocking(batch.index, batch.size).unwrap();
            let (frag0, frag1) = samples.channel_data(0).unwrap();
            assert_eq!((frag0.len() + frag1.len()) / 4, batch.size);
            assert_indices((frag0, frag1), batch.index + 1 - batch.size as u64);
        }
    }

    instance.destroy_flow(AUDIO_FLOW_ID).unwrap();
}

#[test]
fn data_flow_uses_fixed_anc_grains() {
    let (instance, _domain_guard) = common::setup_test("data");
    let flow_def = common::data_flow_def(DATA_FLOW_ID).to_string();
    let info = instance.create_flow(&flow_def, None).unwrap();
    assert_eq!(info.discrete().unwrap().grain_size, 4096);

    let reader = instance
        .create_flow_reader(DATA_FLOW_ID)
        .unwrap()
        .to_grain_reader()
        .unwrap();
    let mut writer = instance
        .create_flow_writer(DATA_FLOW_ID)
        .unwrap()
        .to_grain_writer()
        .unwrap();

    // An RFC 8331 style ANC packet payload.
    let packet: Vec<u8> = (0..191u8).collect();
    let rate = info.common().grain_rate().unwrap();
    let index = instance.get_current_index(&rate);

    let mut access = writer.open_grain(index).unwrap();
    assert_eq!(access.max_size(), 4096);
    access.payload_mut()[..packet.len()].copy_from_slice(&packet);
    access.set_flags(GRAIN_FLAG_INVALID);
    access.commit().unwrap();

    let grain = reader.get_grain(index, READ_TIMEOUT).unwrap();
    assert_eq!(grain.flags, GRAIN_FLAG_INVALID);
    assert_eq!(&grain.payload[..packet.len()], packet.as_slice());

    instance.destroy_flow(DATA_FLOW_ID).unwrap();
}

#[test]
fn create_flow_in_unwritable_domain_leaves_nothing_behind() {
    use std::os::unix::fs::PermissionsExt;

    // Root bypasses permission checks, so this test cannot observe EACCES.
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let (instance, domain_guard) = common::setup_test("unwritable");
    std::fs::set_permissions(
        domain_guard.path(),
        std::fs::Permissions::from_mode(0o555),
    )
    .unwrap();

    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    assert!(matches!(
        instance.create_flow(&flow_def, None),
        Err(Error::PermissionDenied)
    ));

    // No temporary directories or half-created flows remain.
    assert_eq!(std::fs::read_dir(domain_guard.path()).unwrap().count(), 0);

    std::fs::set_permissions(
        domain_guard.path(),
        std::fs::Permissions::from_mode(0o755),
    )
    .unwrap();
}

#[test]
fn get_flow_def_round_trips_byte_for_byte() {
    let (instance, _domain_guard) = common::setup_test("flow_def");
    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    instance.create_flow(&flow_def, None).unwrap();

    // Unparseable ID and unknown flows fail without touching the size.
    let mut size = 4096usize;
    let mut buffer = vec![0u8; 4096];
    assert!(matches!(
        instance.get_flow_def_buffered("this is not UUID", Some(&mut buffer), &mut size),
        Err(Error::InvalidArg)
    ));
    assert_eq!(size, 4096);
    assert!(matches!(
        instance.get_flow_def_buffered(
            "75f369f9-6814-48a3-b827-942bc24c3d25",
            Some(&mut buffer),
            &mut size
        ),
        Err(Error::FlowNotFound)
    ));
    assert_eq!(size, 4096);

    // Probing with no buffer reports the required size (JSON + NUL).
    let mut required = 0usize;
    assert!(matches!(
        instance.get_flow_def_buffered(VIDEO_FLOW_ID, None, &mut required),
        Err(Error::InvalidArg)
    ));
    assert_eq!(required, flow_def.len() + 1);

    // An undersized buffer is rejected and the required size is reported.
    let mut small = 10usize;
    assert!(matches!(
        instance.get_flow_def_buffered(VIDEO_FLOW_ID, Some(&mut buffer), &mut small),
        Err(Error::InvalidArg)
    ));
    assert_eq!(small, required);

    // A sufficient buffer receives the NUL-terminated descriptor.
    let mut size = buffer.len();
    instance
        .get_flow_def_buffered(VIDEO_FLOW_ID, Some(&mut buffer), &mut size)
        .unwrap();
    assert_eq!(size, required);
    assert_eq!(&buffer[..flow_def.len()], flow_def.as_bytes());
    assert_eq!(buffer[flow_def.len()], 0);

    // The convenience accessor returns the same bytes.
    assert_eq!(instance.get_flow_def(VIDEO_FLOW_ID).unwrap(), flow_def);

    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
}

#[test]
fn a_flow_accepts_a_single_writer() {
    let (instance, _domain_guard) = common::setup_test("single_writer");
    let flow_def = common::video_flow_def(VIDEO_FLOW_ID).to_string();
    instance.create_flow(&flow_def, None).unwrap();

    let _writer = instance.create_flow_writer(VIDEO_FLOW_ID).unwrap();
    assert!(matches!(
        instance.create_flow_writer(VIDEO_FLOW_ID),
        Err(Error::Conflict)
    ));

    drop(_writer);
    // The lock is released with the writer; a successor can attach.
    let _second = instance.create_flow_writer(VIDEO_FLOW_ID).unwrap();
}

#[test]
fn list_flows_enumerates_the_domain() {
    let (instance, _domain_guard) = common::setup_test("list");
    assert!(instance.list_flows().unwrap().is_empty());

    instance
        .create_flow(&common::video_flow_def(VIDEO_FLOW_ID).to_string(), None)
        .unwrap();
    instance
        .create_flow(&common::audio_flow_def(AUDIO_FLOW_ID).to_string(), None)
        .unwrap();

    let mut flows = instance.list_flows().unwrap();
    flows.sort();
    let mut expected = vec![
        uuid::Uuid::parse_str(VIDEO_FLOW_ID).unwrap(),
        uuid::Uuid::parse_str(AUDIO_FLOW_ID).unwrap(),
    ];
    expected.sort();
    assert_eq!(flows, expected);

    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
    assert_eq!(instance.list_flows().unwrap().len(), 1);
}

#[test]
fn non_normalized_grain_rate_is_exposed_reduced() {
    let (instance, _domain_guard) = common::setup_test("normalize");
    let mut flow_def = common::video_flow_def(VIDEO_FLOW_ID);
    // A dumb way to express 50/1.
    flow_def["grain_rate"] = serde_json::json!({"numerator": 100000, "denominator": 2000});
    let info = instance.create_flow(&flow_def.to_string(), None).unwrap();
    assert_eq!(info.common().grain_rate().unwrap(), Rational::new(50, 1));
    instance.destroy_flow(VIDEO_FLOW_ID).unwrap();
}

#[test]
fn instance_requires_an_existing_domain() {
    assert!(matches!(
        MxlInstance::new("/nonexistent/mxl/domain", ""),
        Err(Error::InvalidArg)
    ));
}
