use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use vizor_engine::device::{WgpuBackend, WgpuRecorder};
use vizor_engine::overlay::OverlayContent;
use vizor_engine::strategy::{AttachmentDesc, OptionValue, StrategyStats};
use vizor_engine::{CapabilitySet, Frame, RenderingStrategy, StrategyCtx};

use crate::capture::Readback;

const COLOR: &str = "color";
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const BUILTIN_SHADER: &str = include_str!("../shaders/triangle.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Scene {
    angle: f32,
    aspect: f32,
    _pad: [f32; 2],
}

struct Gpu {
    layout: wgpu::PipelineLayout,
    pipeline: wgpu::RenderPipeline,
    scene: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Two depth-tested triangles drawn into an offscreen colour target.
///
/// The shader is read from `shader_path` and rebuilt on every asset reload.
pub struct TriangleStrategy {
    shader_path: PathBuf,
    gpu: Option<Gpu>,
    angle: f64,
    speed: f64,
    reloads: u32,
    screenshot: Option<PathBuf>,
}

impl TriangleStrategy {
    pub fn new(shader_path: impl Into<PathBuf>) -> Self {
        Self {
            shader_path: shader_path.into(),
            gpu: None,
            angle: 0.0,
            speed: 0.8,
            reloads: 0,
            screenshot: None,
        }
    }

    pub fn shader_path(&self) -> &Path {
        &self.shader_path
    }

    fn read_shader(&self) -> Result<String> {
        std::fs::read_to_string(&self.shader_path)
            .with_context(|| format!("failed to read {}", self.shader_path.display()))
    }

    fn build_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        source: &str,
    ) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("triangle.wgsl"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("triangle pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}

impl RenderingStrategy<WgpuBackend> for TriangleStrategy {
    fn name(&self) -> &str {
        "triangle"
    }

    fn negotiate_capabilities(&mut self) -> CapabilitySet {
        CapabilitySet::new()
            .with_attachment(
                AttachmentDesc::color(COLOR, COLOR_FORMAT).with_usage(wgpu::TextureUsages::COPY_SRC),
            )
            .with_depth_format(DEPTH_FORMAT)
    }

    fn initialize(&mut self, ctx: &StrategyCtx<'_, WgpuBackend>, _caps: &CapabilitySet) -> Result<()> {
        let device = ctx.backend().device();

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("triangle scene layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("triangle pipeline layout"),
            bind_group_layouts: &[&bind_layout],
            immediate_size: 0,
        });

        let scene = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("triangle scene"),
            size: std::mem::size_of::<Scene>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("triangle scene"),
            layout: &bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene.as_entire_binding(),
            }],
        });

        let source = self.read_shader().unwrap_or_else(|e| {
            log::warn!("{e:#}; using built-in triangle shader");
            BUILTIN_SHADER.to_owned()
        });
        let pipeline = Self::build_pipeline(device, &layout, &source);

        self.gpu = Some(Gpu {
            layout,
            pipeline,
            scene,
            bind_group,
        });
        Ok(())
    }

    fn update(&mut self, ctx: &StrategyCtx<'_, WgpuBackend>, frame: &Frame) -> Result<()> {
        let gpu = self.gpu.as_ref().context("not initialized")?;
        self.angle = (self.angle + frame.dt * self.speed) % std::f64::consts::TAU;

        let size = frame.target_size;
        let scene = Scene {
            angle: self.angle as f32,
            aspect: size.width as f32 / size.height.max(1) as f32,
            _pad: [0.0; 2],
        };
        ctx.backend()
            .queue()
            .write_buffer(&gpu.scene, 0, bytemuck::bytes_of(&scene));
        Ok(())
    }

    fn record_graphics(
        &mut self,
        recorder: &mut WgpuRecorder,
        ctx: &StrategyCtx<'_, WgpuBackend>,
        _frame: &Frame,
    ) -> Result<()> {
        let gpu = self.gpu.as_ref().context("not initialized")?;
        let targets = ctx.targets();
        let color = targets.attachment(COLOR).context("colour attachment missing")?;
        let depth = targets.depth().context("depth attachment missing")?;

        let mut pass = recorder
            .encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("triangle"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color.handle().view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.04,
                            g: 0.05,
                            b: 0.08,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth.handle().view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        pass.set_pipeline(&gpu.pipeline);
        pass.set_bind_group(0, &gpu.bind_group, &[]);
        pass.draw(0..6, 0..1);
        drop(pass);

        if let Some(path) = self.screenshot.take() {
            let readback = Readback::record(
                ctx.backend().device(),
                recorder.encoder(),
                color.handle().texture(),
                path,
            );
            readback.save_after_frame(ctx);
        }
        Ok(())
    }

    fn record_overlay_content(
        &mut self,
        _ctx: &StrategyCtx<'_, WgpuBackend>,
        _frame: &Frame,
        content: &mut OverlayContent,
    ) -> Result<()> {
        content.meter("speed", self.speed as f32, 4.0);
        content.meter("shader reloads", self.reloads.min(10) as f32, 10.0);
        Ok(())
    }

    fn reload_assets(&mut self, ctx: &StrategyCtx<'_, WgpuBackend>) -> Result<()> {
        let source = self.read_shader()?;
        let gpu = self.gpu.as_mut().context("not initialized")?;
        gpu.pipeline = Self::build_pipeline(ctx.backend().device(), &gpu.layout, &source);
        self.reloads += 1;
        log::info!("triangle shader rebuilt ({} reload(s))", self.reloads);
        Ok(())
    }

    fn request_screenshot(&mut self, _ctx: &StrategyCtx<'_, WgpuBackend>, path: &Path) -> Result<()> {
        self.screenshot = Some(path.to_path_buf());
        Ok(())
    }

    fn stats(&self) -> StrategyStats {
        StrategyStats {
            draw_calls: 1,
            triangles: 2,
            ..StrategyStats::default()
        }
    }

    fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        match (key, value.as_float()) {
            ("speed", Some(v)) => {
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
            gpu.scene.destroy();
        }
    }
}
