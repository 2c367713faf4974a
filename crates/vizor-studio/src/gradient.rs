use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use vizor_engine::device::{WgpuBackend, WgpuRecorder};
use vizor_engine::overlay::OverlayContent;
use vizor_engine::strategy::{AttachmentDesc, OptionValue, StrategyStats};
use vizor_engine::{CapabilitySet, Frame, RenderingStrategy, StrategyCtx};

const OUTPUT: &str = "gradient";
const WORKGROUP: u32 = 8;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Params {
    time: f32,
    speed: f32,
    size: [f32; 2],
}

struct Gpu {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Animated gradient written by a compute shader into a storage attachment;
/// the engine blits it to the surface.
pub struct GradientStrategy {
    gpu: Option<Gpu>,
    speed: f64,
    stats: StrategyStats,
}

impl GradientStrategy {
    pub fn new() -> Self {
        Self {
            gpu: None,
            speed: 1.0,
            stats: StrategyStats::default(),
        }
    }

    fn bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params: &wgpu::Buffer,
        ctx: &StrategyCtx<'_, WgpuBackend>,
    ) -> Result<wgpu::BindGroup> {
        let output = ctx
            .targets()
            .attachment(OUTPUT)
            .context("gradient attachment missing")?;

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gradient bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(output.handle().view()),
                },
            ],
        }))
    }
}

impl Default for GradientStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderingStrategy<WgpuBackend> for GradientStrategy {
    fn name(&self) -> &str {
        "gradient"
    }

    fn negotiate_capabilities(&mut self) -> CapabilitySet {
        CapabilitySet::new().with_attachment(AttachmentDesc::storage(
            OUTPUT,
            wgpu::TextureFormat::Rgba8Unorm,
        ))
    }

    fn initialize(&mut self, ctx: &StrategyCtx<'_, WgpuBackend>, _caps: &CapabilitySet) -> Result<()> {
        let device = ctx.backend().device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gradient.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/gradient.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gradient bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gradient pipeline layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gradient pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gradient params"),
            size: std::mem::size_of::<Params>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = Self::bind_group(device, &layout, &params, ctx)?;
        self.gpu = Some(Gpu {
            pipeline,
            layout,
            params,
            bind_group,
        });
        Ok(())
    }

    fn on_resize(&mut self, ctx: &StrategyCtx<'_, WgpuBackend>) -> Result<()> {
        let gpu = self.gpu.as_mut().context("not initialized")?;
        // The storage attachment was reallocated; the old view is gone.
        gpu.bind_group = Self::bind_group(ctx.backend().device(), &gpu.layout, &gpu.params, ctx)?;
        Ok(())
    }

    fn update(&mut self, ctx: &StrategyCtx<'_, WgpuBackend>, frame: &Frame) -> Result<()> {
        let gpu = self.gpu.as_ref().context("not initialized")?;
        let params = Params {
            time: frame.elapsed as f32,
            speed: self.speed as f32,
            size: [frame.target_size.width as f32, frame.target_size.height as f32],
        };
        ctx.backend()
            .queue()
            .write_buffer(&gpu.params, 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn record_compute(
        &mut self,
        recorder: &mut WgpuRecorder,
        _ctx: &StrategyCtx<'_, WgpuBackend>,
        frame: &Frame,
    ) -> Result<()> {
        let gpu = self.gpu.as_ref().context("not initialized")?;
        let groups_x = frame.target_size.width.div_ceil(WORKGROUP);
        let groups_y = frame.target_size.height.div_ceil(WORKGROUP);

        let mut pass = recorder
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gradient"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&gpu.pipeline);
        pass.set_bind_group(0, &gpu.bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);

        self.stats.dispatches = 1;
        Ok(())
    }

    fn record_overlay_content(
        &mut self,
        _ctx: &StrategyCtx<'_, WgpuBackend>,
        _frame: &Frame,
        content: &mut OverlayContent,
    ) -> Result<()> {
        content.meter("speed", self.speed as f32, 4.0);
        Ok(())
    }

    fn stats(&self) -> StrategyStats {
        self.stats
    }

    fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        match (key, value.as_float()) {
            ("speed", Some(v)) if v >= 0.0 => {
                self.speed = v;
                true
            }
            _ => false,
        }
    }

    fn option(&self, key: &str) -> Option<OptionValue> {
        (key == "speed").then_some(OptionValue::Float(self.speed))
    }

    fn destroy(&mut self, _backend: &WgpuBackend) {
        if let Some(gpu) = self.gpu.take() {
            gpu.params.destroy();
        }
    }
}
