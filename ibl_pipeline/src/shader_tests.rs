//! Unit tests for shader.rs

use crate::device::mock_device::{test_config, MockGraphicsDevice, SharedLedger};
use crate::device::{GraphicsDevice, ShaderStage};
use crate::error::Error;
use crate::shader::*;

fn mock() -> (MockGraphicsDevice, SharedLedger) {
    let ledger = SharedLedger::default();
    (MockGraphicsDevice::new(ledger.clone(), &test_config(800, 600, 1)), ledger)
}

fn library() -> MemoryShaderLibrary {
    let mut library = MemoryShaderLibrary::new();
    library.insert("quad_vs", b"vs".to_vec()).insert("quad_fs", b"fs".to_vec());
    library
}

// ============================================================================
// LIBRARIES
// ============================================================================

#[test]
fn test_memory_library_lookup() {
    let library = library();
    assert_eq!(library.load("quad_vs").unwrap(), b"vs".to_vec());
    assert!(matches!(library.load("missing"), Err(Error::InvalidResource(_))));
}

#[test]
fn test_directory_library_paths_and_reads() {
    let root = std::env::temp_dir().join(format!("ibl_shader_lib_{}", std::process::id()));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("sky_fs.spv"), [1u8, 2, 3, 4]).unwrap();

    let library = DirectoryShaderLibrary::new(&root, ".spv");
    assert_eq!(library.path_of("sky_fs"), root.join("sky_fs.spv"));
    assert_eq!(library.load("sky_fs").unwrap(), vec![1, 2, 3, 4]);
    assert!(library.load("sky_vs").is_err());

    std::fs::remove_dir_all(&root).unwrap();
}

// ============================================================================
// COMPILE
// ============================================================================

#[test]
fn test_compile_shader_allocates_stage() {
    let (mut device, ledger) = mock();
    let id = compile_shader(&mut device, &library(), "quad_vs", ShaderStage::Vertex).unwrap();
    assert_eq!(ledger.lock().unwrap().stages[id].name, "quad_vs");
}

#[test]
fn test_compile_missing_source_names_file() {
    let (mut device, ledger) = mock();
    let err = compile_shader(&mut device, &library(), "nope_fs", ShaderStage::Fragment).unwrap_err();
    match err {
        Error::ShaderCompile { name, stage, log } => {
            assert_eq!(name, "nope_fs");
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(log.contains("nope_fs"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}

// ============================================================================
// LINK
// ============================================================================

#[test]
fn test_link_releases_stages_on_success() {
    let (mut device, ledger) = mock();
    let vs = compile_shader(&mut device, &library(), "quad_vs", ShaderStage::Vertex).unwrap();
    let fs = compile_shader(&mut device, &library(), "quad_fs", ShaderStage::Fragment).unwrap();

    let program = link_program(&mut device, &[vs, fs]).unwrap();

    let ledger = ledger.lock().unwrap();
    assert_eq!(ledger.stages.len(), 0);
    assert_eq!(ledger.programs[program], vec!["quad_vs".to_string(), "quad_fs".to_string()]);
}

#[test]
fn test_link_releases_stages_on_failure() {
    let (mut device, ledger) = mock();
    ledger.lock().unwrap().fail_link = true;
    let vs = compile_shader(&mut device, &library(), "quad_vs", ShaderStage::Vertex).unwrap();
    let fs = compile_shader(&mut device, &library(), "quad_fs", ShaderStage::Fragment).unwrap();

    assert!(matches!(link_program(&mut device, &[vs, fs]), Err(Error::ShaderLink { .. })));
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}

#[test]
fn test_build_program_releases_compiled_stages_on_compile_failure() {
    let (mut device, ledger) = mock();
    ledger.lock().unwrap().fail_compile = Some("quad_fs".to_string());

    let result = build_program(
        &mut device,
        &library(),
        &[("quad_vs", ShaderStage::Vertex), ("quad_fs", ShaderStage::Fragment)],
    );

    assert!(matches!(result, Err(Error::ShaderCompile { .. })));
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}

#[test]
fn test_build_program_success() {
    let (mut device, ledger) = mock();
    let program = build_program(
        &mut device,
        &library(),
        &[("quad_vs", ShaderStage::Vertex), ("quad_fs", ShaderStage::Fragment)],
    )
    .unwrap();
    device.destroy_program(program);
    assert_eq!(ledger.lock().unwrap().live_resources(), 0);
}
