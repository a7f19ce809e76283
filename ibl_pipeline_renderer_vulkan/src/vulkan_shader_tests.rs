//! Unit tests for SPIR-V validation and program interface checks
//!
//! Tests pure helpers without requiring GPU.

use super::*;

fn binding(binding: u32, kind: DescriptorKind, stages: vk::ShaderStageFlags) -> ReflectedBinding {
    ReflectedBinding {
        name: format!("b{}", binding),
        binding,
        kind,
        stages,
    }
}

fn header_bytes() -> Vec<u8> {
    // magic, version 1.0, generator, bound, schema
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

// ============================================================================
// SPIR-V WORD TESTS
// ============================================================================

#[test]
fn test_spirv_words_accepts_valid_header() {
    let words = spirv_words(&header_bytes()).unwrap();
    assert_eq!(words.len(), 5);
    assert_eq!(words[0], SPIRV_MAGIC);
}

#[test]
fn test_spirv_words_copies_from_unaligned_bytes() {
    let mut padded = vec![0u8];
    padded.extend(header_bytes());
    let words = spirv_words(&padded[1..]).unwrap();
    assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
}

#[test]
fn test_spirv_words_rejects_unaligned_size() {
    let mut bytes = header_bytes();
    bytes.push(0);
    assert!(spirv_words(&bytes).unwrap_err().contains("multiple of 4"));
}

#[test]
fn test_spirv_words_rejects_empty() {
    assert!(spirv_words(&[]).is_err());
}

#[test]
fn test_spirv_words_rejects_glsl_text() {
    let err = spirv_words(b"#version 450\nvoid main(){}\n").unwrap_err();
    assert!(err.contains("magic"));
}

// ============================================================================
// BINDING MERGE TESTS
// ============================================================================

#[test]
fn test_merge_bindings_combines_stage_flags() {
    let vs = StageReflection {
        bindings: vec![binding(0, DescriptorKind::UniformBuffer, vk::ShaderStageFlags::VERTEX)],
        ..Default::default()
    };
    let fs = StageReflection {
        bindings: vec![
            binding(2, DescriptorKind::CombinedImageSampler, vk::ShaderStageFlags::FRAGMENT),
            binding(0, DescriptorKind::UniformBuffer, vk::ShaderStageFlags::FRAGMENT),
        ],
        ..Default::default()
    };

    let merged = merge_bindings(&vs, &fs).unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].binding, 0);
    assert_eq!(
        merged[0].stages,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
    assert_eq!(merged[1].binding, 2);
    assert_eq!(merged[1].stages, vk::ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_merge_bindings_rejects_kind_conflict() {
    let vs = StageReflection {
        bindings: vec![binding(1, DescriptorKind::UniformBuffer, vk::ShaderStageFlags::VERTEX)],
        ..Default::default()
    };
    let fs = StageReflection {
        bindings: vec![binding(1, DescriptorKind::CombinedImageSampler, vk::ShaderStageFlags::FRAGMENT)],
        ..Default::default()
    };
    let err = merge_bindings(&vs, &fs).unwrap_err();
    assert!(err.contains("binding 1"));
}

// ============================================================================
// INTERFACE TESTS
// ============================================================================

#[test]
fn test_check_interface_matching_locations() {
    let vs = StageReflection { outputs: vec![0, 1, 2], ..Default::default() };
    let fs = StageReflection { inputs: vec![0, 2], ..Default::default() };
    assert!(check_interface(&vs, &fs).is_ok());
}

#[test]
fn test_check_interface_missing_location() {
    let vs = StageReflection { outputs: vec![0], ..Default::default() };
    let fs = StageReflection { inputs: vec![0, 3], ..Default::default() };
    let err = check_interface(&vs, &fs).unwrap_err();
    assert!(err.contains("[3]"));
}

#[test]
fn test_compute_stage_is_rejected() {
    let result = ShaderStageModule::compile("cs", ShaderStage::Compute, &header_bytes());
    assert!(matches!(result, Err(Error::ShaderCompile { stage: ShaderStage::Compute, .. })));
}

#[test]
fn test_compile_error_carries_name_and_stage() {
    let result = ShaderStageModule::compile("pbr_fs", ShaderStage::Fragment, b"not spirv");
    match result {
        Err(Error::ShaderCompile { name, stage, log }) => {
            assert_eq!(name, "pbr_fs");
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(!log.is_empty());
        }
        _ => panic!("expected ShaderCompile"),
    }
}
