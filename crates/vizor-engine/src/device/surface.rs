use crate::backend::{SurfaceDesc, SurfaceRequest};
use crate::error::{EngineError, EngineResult};
use crate::surface::{choose_alpha_mode, choose_present_mode, choose_surface_format};

/// Builds a surface configuration for `request` from what the adapter reports.
pub(crate) fn configuration(
    caps: &wgpu::SurfaceCapabilities,
    request: &SurfaceRequest,
    alpha_mode: Option<wgpu::CompositeAlphaMode>,
) -> EngineResult<wgpu::SurfaceConfiguration> {
    let format = choose_surface_format(&caps.formats, request.prefer_srgb)
        .ok_or_else(|| EngineError::SurfaceConfiguration("surface reports no formats".into()))?;

    let usage = request.usage & caps.usages;
    if !usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
        return Err(EngineError::SurfaceConfiguration(format!(
            "surface images cannot be render targets (supported {:?})",
            caps.usages
        )));
    }

    Ok(wgpu::SurfaceConfiguration {
        usage,
        format,
        width: request.size.width.max(1),
        height: request.size.height.max(1),
        present_mode: choose_present_mode(&caps.present_modes, request.present_mode),
        alpha_mode: choose_alpha_mode(&caps.alpha_modes, alpha_mode),
        view_formats: vec![],
        desired_maximum_frame_latency: request.desired_maximum_frame_latency,
    })
}

pub(crate) fn describe(config: &wgpu::SurfaceConfiguration, image_count: u32) -> SurfaceDesc {
    SurfaceDesc {
        format: config.format,
        size: winit::dpi::PhysicalSize::new(config.width, config.height),
        present_mode: config.present_mode,
        usage: config.usage,
        image_count,
    }
}

/// What the frame loop should do after a failed `get_current_texture`.
#[derive(Debug)]
pub(crate) enum AcquireFailure {
    /// Rebuild the surface and try again next frame.
    Stale,
    Fatal(EngineError),
}

pub(crate) fn map_surface_error(err: wgpu::SurfaceError) -> AcquireFailure {
    match err {
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost | wgpu::SurfaceError::Timeout => {
            log::debug!(target: "vizor_engine::frame", "surface acquire: {err}");
            AcquireFailure::Stale
        }
        wgpu::SurfaceError::OutOfMemory | wgpu::SurfaceError::Other => {
            AcquireFailure::Fatal(EngineError::Acquire(err.to_string()))
        }
    }
}
