/// PipelineCache - graphics pipelines built on demand for dynamic rendering
///
/// A pipeline is fully determined by the program, the vertex layout, the
/// draw state and the attachment formats of the pass it is used in. Draws
/// look their pipeline up by that key and build it on first use.

use ash::vk;
use ibl_pipeline::ibl::device::{DrawState, PrimitiveTopology, ProgramId, VertexLayout};
use ibl_pipeline::ibl::Result;
use ibl_pipeline::{ibl_bail, ibl_debug, ibl_err};
use rustc_hash::FxHashMap;
use std::ffi::CStr;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{compare_op_to_vk, cull_mode_to_vk, topology_to_vk, vertex_format_to_vk};
use crate::vulkan_shader::Program;

const ENTRY_POINT: &CStr = c"main";

/// Everything a graphics pipeline depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramId,
    pub layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub state: DrawState,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
}

/// Check that `layout` provides every input location the program reads
pub(crate) fn check_vertex_inputs(program_inputs: &[u32], layout: &VertexLayout) -> std::result::Result<(), String> {
    let missing: Vec<u32> = program_inputs
        .iter()
        .copied()
        .filter(|loc| !layout.attributes.iter().any(|a| a.location == *loc))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("vertex layout has no attributes for input locations {:?}", missing))
    }
}

#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: FxHashMap<PipelineKey, vk::Pipeline>,
}

impl PipelineCache {
    /// Get or build the pipeline for `key`
    pub(crate) fn get(&mut self, ctx: &GpuContext, key: &PipelineKey, program: &Program) -> Result<vk::Pipeline> {
        if let Some(&pipeline) = self.pipelines.get(key) {
            return Ok(pipeline);
        }
        if let Err(message) = check_vertex_inputs(&program.vertex_inputs, &key.layout) {
            ibl_bail!("ibl::vulkan", "Program {}: {}", program.name, message);
        }
        let pipeline = create_pipeline(ctx, key, program)?;
        ibl_debug!(
            "ibl::vulkan",
            "Built pipeline for {} ({:?}, {:?} x{})",
            program.name,
            key.topology,
            key.color_format,
            key.samples.as_raw()
        );
        self.pipelines.insert(key.clone(), pipeline);
        Ok(pipeline)
    }

    /// Destroy every pipeline built from `program` (device must be idle)
    pub(crate) fn purge_program(&mut self, ctx: &GpuContext, program: ProgramId) {
        self.pipelines.retain(|key, pipeline| {
            if key.program == program {
                unsafe { ctx.device.destroy_pipeline(*pipeline, None) };
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub(crate) fn destroy_all(&mut self, ctx: &GpuContext) {
        for (_, pipeline) in self.pipelines.drain() {
            unsafe { ctx.device.destroy_pipeline(pipeline, None) };
        }
    }
}

fn create_pipeline(ctx: &GpuContext, key: &PipelineKey, program: &Program) -> Result<vk::Pipeline> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(program.vertex_module)
            .name(ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(program.fragment_module)
            .name(ENTRY_POINT),
    ];

    // Single interleaved binding
    let vertex_bindings = [vk::VertexInputBindingDescription {
        binding: 0,
        stride: key.layout.stride,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = key
        .layout
        .attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: 0,
            format: vertex_format_to_vk(attribute.format),
            offset: attribute.offset,
        })
        .collect();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology_to_vk(key.topology))
        .primitive_restart_enable(false);

    // Viewport state (dynamic)
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    // Projections are Y-flipped for Vulkan, which keeps CCW meshes front-facing
    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull_mode_to_vk(key.state.cull_mode))
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(key.state.depth_test)
        .depth_write_enable(key.state.depth_write)
        .depth_compare_op(compare_op_to_vk(key.state.depth_compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(key.samples);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false);
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(std::slice::from_ref(&color_blend_attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [key.color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
    if let Some(depth_format) = key.depth_format {
        rendering_info = rendering_info.depth_attachment_format(depth_format);
        if matches!(depth_format, vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT) {
            rendering_info = rendering_info.stencil_attachment_format(depth_format);
        }
    }

    let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
        .push_next(&mut rendering_info)
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .depth_stencil_state(&depth_stencil_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(program.pipeline_layout);

    unsafe {
        let pipelines = ctx
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
            .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create graphics pipeline for {}: {:?}", program.name, e.1))?;
        Ok(pipelines[0])
    }
}
