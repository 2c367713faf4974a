use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::WgpuBackend;
use crate::backend::SurfaceDesc;
use crate::debug::DebugSnapshot;
use crate::overlay::{Overlay, OverlayContent, OverlayItem};
use crate::strategy::StrategyStats;

const MARGIN: f32 = 12.0;
const ROW_HEIGHT: f32 = 10.0;
const ROW_GAP: f32 = 4.0;
const METER_WIDTH: f32 = 220.0;

/// Frame time that fills the frame meter.
const FRAME_BUDGET_MS: f32 = 33.3;

/// Count that fills the draw-call and dispatch meters.
const CALLS_FULL: f32 = 256.0;
/// Triangle count that fills the triangle meter.
const TRIANGLES_FULL: f32 = 1_000_000.0;

const TRACK: [f32; 4] = [0.08, 0.08, 0.08, 0.65];
const FILL_OK: [f32; 4] = [0.20, 0.75, 0.35, 0.90];
const FILL_WARN: [f32; 4] = [0.90, 0.65, 0.15, 0.90];
const FILL_BAD: [f32; 4] = [0.90, 0.20, 0.20, 0.90];
const FILL_STRATEGY: [f32; 4] = [0.25, 0.55, 0.95, 0.90];
const FILL_STATS: [f32; 4] = [0.60, 0.45, 0.90, 0.90];

/// Meter HUD drawn with instanced quads.
///
/// Built-in rows: frame time against a 30 Hz budget, frames in flight against
/// the ring length, and a red bar per strategy failure (capped). The strategy's
/// stats follow (draw calls, dispatches, triangles, CPU and GPU time), then the
/// meters the strategy adds.
#[derive(Default)]
pub struct HudOverlay {
    content: OverlayContent,
    instances: Vec<HudInstance>,

    pipeline_format: Option<wgpu::TextureFormat>,
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_group: Option<wgpu::BindGroup>,
    viewport_ubo: Option<wgpu::Buffer>,

    quad_vbo: Option<wgpu::Buffer>,
    quad_ibo: Option<wgpu::Buffer>,

    instance_vbo: Option<wgpu::Buffer>,
    instance_capacity: usize,

    /// First row free for strategy meters.
    next_row: usize,
}

impl HudOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_meter(&mut self, row: usize, fraction: f32, fill: [f32; 4]) {
        let y = MARGIN + row as f32 * (ROW_HEIGHT + ROW_GAP);
        self.instances.push(HudInstance {
            origin: [MARGIN, y],
            size: [METER_WIDTH, ROW_HEIGHT],
            color: TRACK,
        });
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > 0.0 {
            self.instances.push(HudInstance {
                origin: [MARGIN, y],
                size: [METER_WIDTH * fraction, ROW_HEIGHT],
                color: fill,
            });
        }
    }

    fn layout_rows(&mut self, snapshot: &DebugSnapshot) {
        self.instances.clear();

        let frame_ms = snapshot.frame_ms() as f32;
        let frame_fill = match frame_ms / FRAME_BUDGET_MS {
            f if f < 0.5 => FILL_OK,
            f if f < 1.0 => FILL_WARN,
            _ => FILL_BAD,
        };
        self.push_meter(0, frame_ms / FRAME_BUDGET_MS, frame_fill);

        let ring = snapshot.ring_len.max(1) as f32;
        self.push_meter(1, snapshot.frames_in_flight as f32 / ring, FILL_WARN);

        let failures = snapshot.strategy_failures.min(10) as f32 / 10.0;
        self.push_meter(2, failures, FILL_BAD);

        let rows = stat_fractions(&snapshot.strategy_stats);
        for (i, fraction) in rows.iter().enumerate() {
            self.push_meter(3 + i, *fraction, FILL_STATS);
        }
        self.next_row = 3 + rows.len();
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        if self.pipeline_format == Some(format) && self.pipeline.is_some() {
            return;
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("vizor hud shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/hud.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vizor hud bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<ViewportUniform>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("vizor hud pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("vizor hud pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), HudInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipeline_format = Some(format);
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bind_group_layout);

        self.bind_group = None;
        self.viewport_ubo = None;
    }

    fn ensure_bindings(&mut self, device: &wgpu::Device) {
        if self.bind_group.is_some() && self.viewport_ubo.is_some() {
            return;
        }
        let Some(bgl) = self.bind_group_layout.as_ref() else { return };

        let viewport_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vizor hud viewport ubo"),
            size: std::mem::size_of::<ViewportUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vizor hud bind group"),
            layout: bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: viewport_ubo.as_entire_binding(),
            }],
        });

        self.viewport_ubo = Some(viewport_ubo);
        self.bind_group = Some(bind_group);
    }

    fn ensure_static_buffers(&mut self, device: &wgpu::Device) {
        if self.quad_vbo.is_some() && self.quad_ibo.is_some() {
            return;
        }

        self.quad_vbo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vizor hud quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.quad_ibo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vizor hud quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        }));
    }

    fn ensure_instance_capacity(&mut self, device: &wgpu::Device, required: usize) {
        if required <= self.instance_capacity && self.instance_vbo.is_some() {
            return;
        }

        let new_cap = required.next_power_of_two().max(32);
        self.instance_vbo = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vizor hud instance vbo"),
            size: (new_cap * std::mem::size_of::<HudInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = new_cap;
    }
}

impl Overlay<WgpuBackend> for HudOverlay {
    fn begin_frame(&mut self, snapshot: &DebugSnapshot) {
        self.content.clear();
        self.layout_rows(snapshot);
    }

    fn content(&mut self) -> &mut OverlayContent {
        &mut self.content
    }

    fn prepare(&mut self, backend: &WgpuBackend, surface: &SurfaceDesc) -> anyhow::Result<()> {
        let device = backend.device();
        self.ensure_pipeline(device, surface.format);
        self.ensure_static_buffers(device);
        self.ensure_bindings(device);

        let base = self.next_row;
        let meters: Vec<f32> = self.content.items().iter().map(OverlayItem::fraction).collect();
        for (row, fraction) in meters.into_iter().enumerate() {
            self.push_meter(base + row, fraction, FILL_STRATEGY);
        }

        if self.instances.is_empty() {
            return Ok(());
        }
        self.ensure_instance_capacity(device, self.instances.len());

        let queue = backend.queue();
        if let Some(ubo) = self.viewport_ubo.as_ref() {
            let u = ViewportUniform {
                viewport: [
                    surface.size.width.max(1) as f32,
                    surface.size.height.max(1) as f32,
                ],
                _pad: [0.0; 2],
            };
            queue.write_buffer(ubo, 0, bytemuck::bytes_of(&u));
        }
        let vbo = self
            .instance_vbo
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("hud instance buffer missing"))?;
        queue.write_buffer(vbo, 0, bytemuck::cast_slice(&self.instances));
        Ok(())
    }

    fn render(
        &mut self,
        _backend: &WgpuBackend,
        pass: &mut wgpu::RenderPass<'_>,
        _surface: &SurfaceDesc,
    ) -> anyhow::Result<()> {
        if self.instances.is_empty() {
            return Ok(());
        }
        let (Some(pipeline), Some(bind_group), Some(quad_vbo), Some(quad_ibo), Some(instance_vbo)) = (
            self.pipeline.as_ref(),
            self.bind_group.as_ref(),
            self.quad_vbo.as_ref(),
            self.quad_ibo.as_ref(),
            self.instance_vbo.as_ref(),
        ) else {
            anyhow::bail!("hud rendered before prepare");
        };

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, quad_vbo.slice(..));
        pass.set_vertex_buffer(1, instance_vbo.slice(..));
        pass.set_index_buffer(quad_ibo.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..6, 0, 0..self.instances.len() as u32);
        Ok(())
    }

    fn on_resize(&mut self, _backend: &WgpuBackend, surface: &SurfaceDesc) {
        if self.pipeline_format != Some(surface.format) {
            // Rebuilt lazily in the next prepare.
            self.pipeline = None;
        }
    }

    fn shutdown(&mut self, _backend: &WgpuBackend) {
        self.instances.clear();
        self.instance_vbo = None;
        self.instance_capacity = 0;
        self.quad_vbo = None;
        self.quad_ibo = None;
        self.bind_group = None;
        self.viewport_ubo = None;
        self.pipeline = None;
        self.pipeline_format = None;
    }
}

/// Draw calls, dispatches, triangles, CPU time, GPU time.
fn stat_fractions(stats: &StrategyStats) -> [f32; 5] {
    [
        stats.draw_calls as f32 / CALLS_FULL,
        stats.dispatches as f32 / CALLS_FULL,
        stats.triangles as f32 / TRIANGLES_FULL,
        stats.cpu_ms / FRAME_BUDGET_MS,
        stats.gpu_ms / FRAME_BUDGET_MS,
    ]
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ViewportUniform {
    viewport: [f32; 2],
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadVertex {
    corner: [f32; 2],
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { corner: [0.0, 0.0] },
    QuadVertex { corner: [1.0, 0.0] },
    QuadVertex { corner: [1.0, 1.0] },
    QuadVertex { corner: [0.0, 1.0] },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct HudInstance {
    origin: [f32; 2],
    size: [f32; 2],
    color: [f32; 4],
}

impl HudInstance {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        1 => Float32x2, // origin
        2 => Float32x2, // size
        3 => Float32x4  // color
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<HudInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(dt_ms: f64, in_flight: usize, failures: u64) -> DebugSnapshot {
        DebugSnapshot {
            dt: dt_ms / 1000.0,
            frames_in_flight: in_flight,
            ring_len: 2,
            strategy_failures: failures,
            ..DebugSnapshot::default()
        }
    }

    #[test]
    fn rows_have_track_and_fill() {
        let mut hud = HudOverlay::new();
        hud.begin_frame(&snapshot(8.0, 1, 0));
        // frame: track + fill, in flight: track + fill, failures and the five
        // empty stats rows: track only
        assert_eq!(hud.instances.len(), 4 + 6);
        assert_eq!(hud.next_row, 8);
        assert_eq!(hud.instances[1].color, FILL_OK);
        assert!((hud.instances[3].size[0] - METER_WIDTH * 0.5).abs() < 1e-3);
    }

    #[test]
    fn slow_frames_turn_red_and_clamp() {
        let mut hud = HudOverlay::new();
        hud.begin_frame(&snapshot(100.0, 2, 25));
        assert_eq!(hud.instances[1].color, FILL_BAD);
        assert_eq!(hud.instances[1].size[0], METER_WIDTH);
        let failures_fill = hud.instances.get(5).map(|i| (i.color, i.size[0]));
        assert_eq!(failures_fill, Some((FILL_BAD, METER_WIDTH)));
    }

    #[test]
    fn strategy_stats_get_their_own_rows() {
        let mut snap = snapshot(8.0, 0, 0);
        snap.strategy_stats = StrategyStats {
            draw_calls: 128,
            dispatches: 0,
            triangles: 250_000,
            cpu_ms: 66.6,
            gpu_ms: 0.0,
        };
        let mut hud = HudOverlay::new();
        hud.begin_frame(&snap);

        let stats_fills: Vec<f32> = hud
            .instances
            .iter()
            .filter(|i| i.color == FILL_STATS)
            .map(|i| i.size[0] / METER_WIDTH)
            .collect();
        assert_eq!(stats_fills.len(), 3);
        assert!((stats_fills[0] - 0.5).abs() < 1e-3);
        assert!((stats_fills[1] - 0.25).abs() < 1e-3);
        assert_eq!(stats_fills[2], 1.0);

        // Row 4 (dispatches) has a track but no fill.
        let dispatch_y = MARGIN + 4.0 * (ROW_HEIGHT + ROW_GAP);
        let on_row: Vec<_> = hud.instances.iter().filter(|i| i.origin[1] == dispatch_y).collect();
        assert_eq!(on_row.len(), 1);
        assert_eq!(on_row[0].color, TRACK);
    }
}
