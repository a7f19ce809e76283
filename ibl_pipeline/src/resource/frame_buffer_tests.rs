//! Unit tests for frame_buffer.rs

use crate::device::mock_device::{test_config, MockCommand, MockGraphicsDevice, SharedLedger};
use crate::device::TextureFormat;
use crate::error::Error;
use crate::resource::frame_buffer::*;

const COLOR: TextureFormat = TextureFormat::RGBA16_SFLOAT;
const DEPTH: TextureFormat = TextureFormat::D24_UNORM_S8_UINT;

fn mock() -> (MockGraphicsDevice, SharedLedger) {
    let ledger = SharedLedger::default();
    (MockGraphicsDevice::new(ledger.clone(), &test_config(800, 600, 4)), ledger)
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_multisampled_framebuffer() {
    let (mut device, ledger) = mock();
    let fb = create_frame_buffer(&mut device, 800, 600, 4, COLOR, DEPTH).unwrap();

    assert_eq!((fb.width, fb.height, fb.samples), (800, 600, 4));
    assert!(matches!(fb.color_target, ColorTarget::Multisampled(_)));
    assert!(fb.color_texture().is_none());

    let ledger = ledger.lock().unwrap();
    assert_eq!(ledger.render_targets.len(), 2);
    assert_eq!(ledger.textures.len(), 0);
    assert_eq!(ledger.framebuffers.len(), 1);
}

#[test]
fn test_single_sample_framebuffer_has_texture() {
    let (mut device, ledger) = mock();
    let fb = create_frame_buffer(&mut device, 800, 600, 1, COLOR, DEPTH).unwrap();

    let texture = fb.color_texture().unwrap();
    assert_eq!((texture.width, texture.height, texture.levels), (800, 600, 1));
    assert_eq!(ledger.lock().unwrap().textures.len(), 1);
}

#[test]
fn test_unsupported_sample_count_leaks_nothing() {
    let (mut device, ledger) = mock();
    for samples in [0, 3, 16] {
        let result = create_frame_buffer(&mut device, 64, 64, samples, COLOR, DEPTH);
        assert!(matches!(result, Err(Error::FramebufferIncomplete(_))), "samples = {}", samples);
    }
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}

#[test]
fn test_rejected_depth_format_releases_color() {
    let (mut device, ledger) = mock();
    ledger.lock().unwrap().reject_format = Some(DEPTH);

    let result = create_frame_buffer(&mut device, 64, 64, 4, COLOR, DEPTH);

    assert!(matches!(result, Err(Error::FramebufferIncomplete(_))));
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}

#[test]
fn test_color_format_in_depth_slot_rejected() {
    let (mut device, ledger) = mock();
    let result = create_frame_buffer(&mut device, 64, 64, 1, COLOR, TextureFormat::RGBA8_UNORM);
    assert!(matches!(result, Err(Error::FramebufferIncomplete(_))));
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}

// ============================================================================
// RESOLVE
// ============================================================================

#[test]
fn test_resolve_valid_pair() {
    let (mut device, ledger) = mock();
    let src = create_frame_buffer(&mut device, 800, 600, 4, COLOR, DEPTH).unwrap();
    let dst = create_frame_buffer(&mut device, 800, 600, 1, COLOR, DEPTH).unwrap();

    resolve_framebuffer(&mut device, &src, &dst).unwrap();

    assert!(ledger
        .lock()
        .unwrap()
        .commands
        .contains(&MockCommand::Resolve { src: src.id, dst: dst.id }));
}

#[test]
fn test_resolve_preconditions() {
    let (mut device, ledger) = mock();
    let ms = create_frame_buffer(&mut device, 800, 600, 4, COLOR, DEPTH).unwrap();
    let ss = create_frame_buffer(&mut device, 800, 600, 1, COLOR, DEPTH).unwrap();
    let ss_small = create_frame_buffer(&mut device, 400, 300, 1, COLOR, DEPTH).unwrap();
    let ms2 = create_frame_buffer(&mut device, 800, 600, 2, COLOR, DEPTH).unwrap();

    for (src, dst) in [(&ss, &ss), (&ms, &ms2), (&ms, &ss_small), (&ss, &ms)] {
        assert!(matches!(resolve_framebuffer(&mut device, src, dst), Err(Error::InvalidResource(_))));
    }
    let resolves = ledger
        .lock()
        .unwrap()
        .commands
        .iter()
        .filter(|c| matches!(c, MockCommand::Resolve { .. }))
        .count();
    assert_eq!(resolves, 0);
}

// ============================================================================
// DELETE
// ============================================================================

#[test]
fn test_delete_frame_buffer_is_idempotent() {
    let (mut device, ledger) = mock();
    let mut ms = create_frame_buffer(&mut device, 32, 32, 4, COLOR, DEPTH).unwrap();
    let mut ss = create_frame_buffer(&mut device, 32, 32, 1, COLOR, DEPTH).unwrap();

    delete_frame_buffer(&mut device, &mut ms);
    delete_frame_buffer(&mut device, &mut ss);
    delete_frame_buffer(&mut device, &mut ms);

    assert!(ms.is_null());
    assert_eq!(ss.samples, 0);
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}
