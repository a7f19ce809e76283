/// Shader stages and programs - SPIR-V validation, spirq reflection and linking
///
/// A stage keeps its SPIR-V words and reflection only; modules are created
/// by the program at link time, so stages can be destroyed right after.

use ash::vk;
use ibl_pipeline::ibl::device::ShaderStage;
use ibl_pipeline::ibl::{Error, Result};
use ibl_pipeline::{ibl_debug, ibl_error};

use crate::vulkan_context::GpuContext;

/// SPIR-V magic number (first word of every module)
pub(crate) const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Descriptor kinds the pipeline binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DescriptorKind {
    UniformBuffer,
    CombinedImageSampler,
}

/// One reflected descriptor binding (set 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReflectedBinding {
    pub name: String,
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: vk::ShaderStageFlags,
}

/// Reflection data of one stage
#[derive(Debug, Clone, Default)]
pub(crate) struct StageReflection {
    pub bindings: Vec<ReflectedBinding>,
    /// Input locations
    pub inputs: Vec<u32>,
    /// Output locations
    pub outputs: Vec<u32>,
}

/// Compiled (validated and reflected) shader stage
pub struct ShaderStageModule {
    pub(crate) name: String,
    pub(crate) stage: ShaderStage,
    pub(crate) code: Vec<u32>,
    pub(crate) reflection: StageReflection,
}

fn compile_error(name: &str, stage: ShaderStage, log: String) -> Error {
    ibl_error!("ibl::vulkan", "Shader '{}' ({:?}) failed to compile: {}", name, stage, log);
    Error::ShaderCompile { name: name.to_string(), stage, log }
}

fn link_error(log: String) -> Error {
    ibl_error!("ibl::vulkan", "Program link failed: {}", log);
    Error::ShaderLink { log }
}

fn stage_flags(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

/// Decode little-endian SPIR-V bytes into words and check the header
pub(crate) fn spirv_words(code: &[u8]) -> std::result::Result<Vec<u32>, String> {
    if code.is_empty() || code.len() % 4 != 0 {
        return Err(format!("SPIR-V size {} is not a non-zero multiple of 4", code.len()));
    }
    let words: Vec<u32> = bytemuck::pod_collect_to_vec(code);
    let words: Vec<u32> = words.into_iter().map(u32::from_le).collect();
    if words[0] != SPIRV_MAGIC {
        return Err(format!("bad SPIR-V magic 0x{:08x}", words[0]));
    }
    Ok(words)
}

/// Convert spirq descriptor type to a DescriptorKind
fn descriptor_kind(desc_ty: &spirq::ty::DescriptorType) -> std::result::Result<DescriptorKind, String> {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => Ok(DescriptorKind::UniformBuffer),
        DescriptorType::CombinedImageSampler() => Ok(DescriptorKind::CombinedImageSampler),
        other => Err(format!("unsupported descriptor type {:?}", other)),
    }
}

/// Reflect descriptors and interface locations with spirq
fn reflect(code: &[u32], stage: ShaderStage) -> std::result::Result<StageReflection, String> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| format!("SPIR-V reflection failed: {:?}", e))?;

    let mut reflection = StageReflection::default();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, .. } => {
                    if desc_bind.set() != 0 {
                        return Err(format!("descriptor set {} is not supported", desc_bind.set()));
                    }
                    reflection.bindings.push(ReflectedBinding {
                        name: name.clone().unwrap_or_default(),
                        binding: desc_bind.bind(),
                        kind: descriptor_kind(desc_ty)?,
                        stages: stage_flags(stage),
                    });
                }
                spirq::var::Variable::Input { location, .. } => reflection.inputs.push(location.loc()),
                spirq::var::Variable::Output { location, .. } => reflection.outputs.push(location.loc()),
                _ => {}
            }
        }
    }
    reflection.inputs.sort_unstable();
    reflection.inputs.dedup();
    reflection.outputs.sort_unstable();
    reflection.outputs.dedup();
    Ok(reflection)
}

impl ShaderStageModule {
    /// Validate SPIR-V and reflect its interface
    ///
    /// # Errors
    ///
    /// `Error::ShaderCompile` for malformed modules or unsupported descriptors.
    pub fn compile(name: &str, stage: ShaderStage, code: &[u8]) -> Result<Self> {
        if stage == ShaderStage::Compute {
            return Err(compile_error(name, stage, "compute stages are not supported".to_string()));
        }
        let words = spirv_words(code).map_err(|log| compile_error(name, stage, log))?;
        let reflection = reflect(&words, stage).map_err(|log| compile_error(name, stage, log))?;

        ibl_debug!(
            "ibl::vulkan",
            "Compiled shader '{}' ({:?}): {} bindings, {} inputs, {} outputs",
            name,
            stage,
            reflection.bindings.len(),
            reflection.inputs.len(),
            reflection.outputs.len()
        );
        Ok(Self { name: name.to_string(), stage, code: words, reflection })
    }
}

// ============================================================================
// Program
// ============================================================================

/// Linked vertex + fragment program with its descriptor and pipeline layouts
pub struct Program {
    pub(crate) vertex_module: vk::ShaderModule,
    pub(crate) fragment_module: vk::ShaderModule,
    pub(crate) set_layout: vk::DescriptorSetLayout,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    pub(crate) bindings: Vec<ReflectedBinding>,
    /// Vertex input locations the vertex layout must provide
    pub(crate) vertex_inputs: Vec<u32>,
    pub(crate) name: String,
}

/// Merge bindings of both stages, rejecting type conflicts
pub(crate) fn merge_bindings(
    vertex: &StageReflection,
    fragment: &StageReflection,
) -> std::result::Result<Vec<ReflectedBinding>, String> {
    let mut merged: Vec<ReflectedBinding> = vertex.bindings.clone();

    for fs_binding in &fragment.bindings {
        if let Some(existing) = merged.iter_mut().find(|b| b.binding == fs_binding.binding) {
            if existing.kind != fs_binding.kind {
                return Err(format!(
                    "binding {} ('{}') is {:?} in the vertex stage and {:?} in the fragment stage",
                    existing.binding, existing.name, existing.kind, fs_binding.kind
                ));
            }
            existing.stages |= fs_binding.stages;
        } else {
            merged.push(fs_binding.clone());
        }
    }
    merged.sort_by_key(|b| b.binding);
    Ok(merged)
}

/// Check every fragment input is written by the vertex stage
pub(crate) fn check_interface(vertex: &StageReflection, fragment: &StageReflection) -> std::result::Result<(), String> {
    let missing: Vec<u32> = fragment
        .inputs
        .iter()
        .copied()
        .filter(|loc| !vertex.outputs.contains(loc))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("fragment inputs at locations {:?} are not written by the vertex stage", missing))
    }
}

impl Program {
    /// Link one vertex and one fragment stage
    ///
    /// # Errors
    ///
    /// `Error::ShaderLink` when the stage set or interfaces don't match.
    pub fn link(ctx: &GpuContext, stages: &[&ShaderStageModule]) -> Result<Self> {
        let vertex: Vec<_> = stages.iter().filter(|s| s.stage == ShaderStage::Vertex).collect();
        let fragment: Vec<_> = stages.iter().filter(|s| s.stage == ShaderStage::Fragment).collect();
        let (vs, fs) = match (vertex.as_slice(), fragment.as_slice()) {
            ([vs], [fs]) if stages.len() == 2 => (**vs, **fs),
            _ => {
                let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
                return Err(link_error(format!(
                    "expected one vertex and one fragment stage, got {:?}",
                    names
                )));
            }
        };

        let bindings = merge_bindings(&vs.reflection, &fs.reflection).map_err(link_error)?;
        check_interface(&vs.reflection, &fs.reflection).map_err(link_error)?;
        let name = format!("{}+{}", vs.name, fs.name);

        unsafe {
            let vertex_module = create_module(ctx, &vs.code).map_err(link_error)?;
            let fragment_module = match create_module(ctx, &fs.code) {
                Ok(module) => module,
                Err(log) => {
                    ctx.device.destroy_shader_module(vertex_module, None);
                    return Err(link_error(log));
                }
            };

            let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
                .iter()
                .map(|b| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(b.binding)
                        .descriptor_type(match b.kind {
                            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
                            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        })
                        .descriptor_count(1)
                        .stage_flags(b.stages)
                })
                .collect();

            let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
            let set_layout = match ctx.device.create_descriptor_set_layout(&set_layout_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    ctx.device.destroy_shader_module(vertex_module, None);
                    ctx.device.destroy_shader_module(fragment_module, None);
                    return Err(link_error(format!("failed to create descriptor set layout: {:?}", e)));
                }
            };

            let set_layouts = [set_layout];
            let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
            let pipeline_layout = match ctx.device.create_pipeline_layout(&layout_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    ctx.device.destroy_descriptor_set_layout(set_layout, None);
                    ctx.device.destroy_shader_module(vertex_module, None);
                    ctx.device.destroy_shader_module(fragment_module, None);
                    return Err(link_error(format!("failed to create pipeline layout: {:?}", e)));
                }
            };

            ibl_debug!("ibl::vulkan", "Linked program {} ({} bindings)", name, bindings.len());
            Ok(Self {
                vertex_module,
                fragment_module,
                set_layout,
                pipeline_layout,
                bindings,
                vertex_inputs: vs.reflection.inputs.clone(),
                name,
            })
        }
    }

    pub fn destroy(self, ctx: &GpuContext) {
        unsafe {
            ctx.device.destroy_pipeline_layout(self.pipeline_layout, None);
            ctx.device.destroy_descriptor_set_layout(self.set_layout, None);
            ctx.device.destroy_shader_module(self.vertex_module, None);
            ctx.device.destroy_shader_module(self.fragment_module, None);
        }
    }
}

unsafe fn create_module(ctx: &GpuContext, code: &[u32]) -> std::result::Result<vk::ShaderModule, String> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    ctx.device
        .create_shader_module(&create_info, None)
        .map_err(|e| format!("failed to create shader module: {:?}", e))
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
