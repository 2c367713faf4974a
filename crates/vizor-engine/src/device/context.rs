use std::sync::Arc;

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use super::GpuInit;
use super::blit::Blitter;
use super::surface::{self, AcquireFailure};
use super::timeline::GpuTimeline;
use crate::backend::{
    Acquisition, AttachmentSpec, Backend, CompositeOp, PresentStatus, SurfaceDesc, SurfaceRequest,
};
use crate::error::{EngineError, EngineResult};

/// Command encoder for one ring slot.
pub struct WgpuRecorder {
    encoder: wgpu::CommandEncoder,
    slot: usize,
}

impl WgpuRecorder {
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// wgpu orders acquire, submit and present implicitly on the queue, so signals
/// only carry a label for logs.
#[derive(Debug)]
pub struct WgpuSignal {
    label: String,
}

impl WgpuSignal {
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Swapchain image acquired for the current frame.
pub struct WgpuImage {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    index: u32,
}

impl WgpuImage {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

pub struct WgpuAttachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: PhysicalSize<u32>,
}

impl WgpuAttachment {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }
}

/// [`Backend`] on a real wgpu device bound to one window.
///
/// Owns the instance, adapter, device, queue and window surface. Completion
/// values are tracked by [`GpuTimeline`] through queue callbacks.
pub struct WgpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// `None` until configured and after release.
    config: Option<wgpu::SurfaceConfiguration>,
    image_count: u32,
    next_image: u32,

    timeline: GpuTimeline,
    blitter: Blitter,
    name: String,
}

impl WgpuBackend {
    /// Creates the device for `window`. The surface stays unconfigured until the
    /// engine calls [`Backend::configure_surface`].
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let GpuInit {
            backends,
            power_preference,
            alpha_mode,
            required_features,
            required_limits,
            memory_hints,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("vizor device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        let timeline = GpuTimeline::new(&device);
        let blitter = Blitter::new(&device);

        Ok(Self {
            name: format!("wgpu/{:?}", info.backend).to_lowercase(),
            window,
            surface,
            adapter,
            device,
            queue,
            alpha_mode,
            config: None,
            image_count: 0,
            next_image: 0,
            timeline,
            blitter,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Active surface format, if the surface is configured.
    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.config.as_ref().map(|c| c.format)
    }

    fn configured_size(&self) -> Option<PhysicalSize<u32>> {
        self.config
            .as_ref()
            .map(|c| PhysicalSize::new(c.width, c.height))
    }
}

impl Backend for WgpuBackend {
    type Recorder = WgpuRecorder;
    type Signal = WgpuSignal;
    type Image = WgpuImage;
    type Attachment = WgpuAttachment;
    type Pass<'p> = wgpu::RenderPass<'p>;
    type Event = WindowEvent;

    fn name(&self) -> &str {
        &self.name
    }

    fn window_size(&self) -> PhysicalSize<u32> {
        self.window.inner_size()
    }

    fn configure_surface(&mut self, request: &SurfaceRequest) -> EngineResult<SurfaceDesc> {
        let caps = self.surface.get_capabilities(&self.adapter);
        let config = surface::configuration(&caps, request, self.alpha_mode)?;
        self.surface.configure(&self.device, &config);

        self.image_count = config.desired_maximum_frame_latency + 1;
        self.next_image = 0;
        let desc = surface::describe(&config, self.image_count);
        log::debug!(
            "surface configured: {}x{} {:?} {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );
        self.config = Some(config);
        Ok(desc)
    }

    fn release_surface(&mut self) {
        // wgpu has no unconfigure; dropping the config makes acquire fail until
        // the next configure.
        self.config = None;
    }

    fn acquire_image(&mut self, _acquired: &WgpuSignal) -> EngineResult<Acquisition<WgpuImage>> {
        if self.config.is_none() {
            return Err(EngineError::NotInitialized);
        }

        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(e) => {
                return match surface::map_surface_error(e) {
                    AcquireFailure::Stale => Ok(Acquisition::Stale),
                    AcquireFailure::Fatal(e) => Err(e),
                };
            }
        };

        if texture.suboptimal {
            log::debug!(target: "vizor_engine::frame", "suboptimal surface image");
            drop(texture);
            return Ok(Acquisition::Stale);
        }

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count.max(1);

        Ok(Acquisition::Ready {
            image: WgpuImage {
                texture,
                view,
                index,
            },
            index,
        })
    }

    fn present(&mut self, image: WgpuImage, _wait: &WgpuSignal) -> EngineResult<PresentStatus> {
        let WgpuImage { texture, view, .. } = image;
        drop(view);
        texture.present();

        if self.configured_size() != Some(self.window.inner_size()) {
            return Ok(PresentStatus::Stale);
        }
        Ok(PresentStatus::Presented)
    }

    fn create_signal(&mut self, label: &str) -> EngineResult<WgpuSignal> {
        Ok(WgpuSignal {
            label: label.to_owned(),
        })
    }

    fn destroy_signal(&mut self, signal: WgpuSignal) {
        log::trace!("signal `{}` destroyed", signal.label);
    }

    fn create_attachment(&mut self, spec: &AttachmentSpec) -> EngineResult<WgpuAttachment> {
        let max = self.device.limits().max_texture_dimension_2d;
        let PhysicalSize { width, height } = spec.size;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(EngineError::resource(
                spec.label.clone(),
                format!("extent {width}x{height} outside 1..={max}"),
            ));
        }
        if !self
            .adapter
            .get_texture_format_features(spec.format)
            .allowed_usages
            .contains(spec.usage)
        {
            return Err(EngineError::resource(
                spec.label.clone(),
                format!("{:?} does not support usage {:?}", spec.format, spec.usage),
            ));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&spec.label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: spec.format,
            usage: spec.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(WgpuAttachment {
            texture,
            view,
            format: spec.format,
            size: spec.size,
        })
    }

    fn destroy_attachment(&mut self, attachment: WgpuAttachment) {
        attachment.texture.destroy();
    }

    fn begin_recording(&mut self, slot: usize) -> EngineResult<WgpuRecorder> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vizor frame encoder"),
            });
        Ok(WgpuRecorder { encoder, slot })
    }

    fn push_debug_group(&self, recorder: &mut WgpuRecorder, label: &str) {
        recorder.encoder.push_debug_group(label);
    }

    fn pop_debug_group(&self, recorder: &mut WgpuRecorder) {
        recorder.encoder.pop_debug_group();
    }

    fn composite(
        &mut self,
        recorder: &mut WgpuRecorder,
        src: &WgpuAttachment,
        dst: &WgpuImage,
        op: CompositeOp,
    ) -> EngineResult<()> {
        match op {
            CompositeOp::Copy => {
                recorder.encoder.copy_texture_to_texture(
                    src.texture.as_image_copy(),
                    dst.texture.texture.as_image_copy(),
                    wgpu::Extent3d {
                        width: src.size.width,
                        height: src.size.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            CompositeOp::Blit { filter } => {
                let format = dst.texture.texture.format();
                self.blitter.blit(
                    &self.device,
                    &mut recorder.encoder,
                    &src.view,
                    &dst.view,
                    format,
                    filter,
                );
            }
        }
        Ok(())
    }

    fn record_load_pass(
        &self,
        recorder: &mut WgpuRecorder,
        target: &WgpuImage,
        label: &str,
        draw: &mut dyn FnMut(&mut wgpu::RenderPass<'_>),
    ) {
        let mut pass = recorder
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        draw(&mut pass);
    }

    fn submit(
        &mut self,
        recorder: WgpuRecorder,
        _wait: &WgpuSignal,
        _signal: &WgpuSignal,
        value: u64,
    ) -> EngineResult<()> {
        if self.timeline.is_lost() {
            return Err(EngineError::Submit("device lost".into()));
        }
        if value <= self.timeline.submitted() {
            return Err(EngineError::Submit(format!(
                "value {value} does not advance past {}",
                self.timeline.submitted()
            )));
        }
        let index = self.queue.submit(std::iter::once(recorder.encoder.finish()));
        self.timeline.signal_after(&self.queue, index, value);
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        // Drives pending completion callbacks; losses surface through `wait_for_value`.
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::debug!("non-blocking device poll failed: {e}");
        }
        self.timeline.completed()
    }

    fn wait_for_value(&mut self, value: u64) -> EngineResult<()> {
        self.timeline.wait(&self.device, value)
    }

    fn wait_idle(&mut self) -> EngineResult<()> {
        let last = self.timeline.submitted();
        self.timeline.wait(&self.device, last)
    }
}
