use std::collections::HashSet;

use winit::dpi::PhysicalSize;

use crate::error::{EngineError, EngineResult};
use crate::surface::{ImageLayout, clamp_extent};

/// One offscreen attachment a strategy wants the engine to allocate.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDesc {
    pub name: String,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub initial_layout: ImageLayout,
}

impl AttachmentDesc {
    /// Colour attachment usable as a render target and as a composite source.
    pub fn color(name: impl Into<String>, format: wgpu::TextureFormat) -> Self {
        Self {
            name: name.into(),
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            initial_layout: ImageLayout::ColorAttachment,
        }
    }

    /// Storage image written by compute work.
    pub fn storage(name: impl Into<String>, format: wgpu::TextureFormat) -> Self {
        Self {
            name: name.into(),
            format,
            usage: wgpu::TextureUsages::STORAGE_BINDING,
            initial_layout: ImageLayout::General,
        }
    }

    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.usage |= usage;
        self
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum CompositionMode {
    /// Engine copies or blits the presentation attachment into the surface image.
    #[default]
    Engine,
    /// Strategy records its own composite through `RenderingStrategy::composite`.
    Custom,
}

/// How offscreen attachments are sized relative to the presentation surface.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub enum TargetSize {
    #[default]
    MatchSurface,
    /// Surface extent times a factor; rounded, at least 1x1.
    Scaled(f32),
    Fixed(u32, u32),
}

impl TargetSize {
    pub fn resolve(self, surface: PhysicalSize<u32>) -> PhysicalSize<u32> {
        match self {
            Self::MatchSurface => clamp_extent(surface),
            Self::Scaled(factor) => {
                let scale = |v: u32| ((v as f32) * factor).round().max(1.0) as u32;
                PhysicalSize::new(scale(surface.width), scale(surface.height))
            }
            Self::Fixed(w, h) => clamp_extent(PhysicalSize::new(w, h)),
        }
    }

    /// `true` when the attachments must be rebuilt with the surface.
    pub fn tracks_surface(self) -> bool {
        !matches!(self, Self::Fixed(..))
    }
}

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Resource needs declared once by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySet {
    pub attachments: Vec<AttachmentDesc>,
    pub presentation_attachment: Option<String>,
    pub depth: Option<wgpu::TextureFormat>,
    pub composition: CompositionMode,
    pub overlay: bool,
    pub target_size: TargetSize,
    pub frames_in_flight: usize,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self {
            attachments: Vec::new(),
            presentation_attachment: None,
            depth: None,
            composition: CompositionMode::Engine,
            overlay: true,
            target_size: TargetSize::MatchSurface,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attachment(mut self, attachment: AttachmentDesc) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = Some(wgpu::TextureFormat::Depth32Float);
        self
    }

    pub fn with_depth_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth = Some(format);
        self
    }

    pub fn present_from(mut self, name: impl Into<String>) -> Self {
        self.presentation_attachment = Some(name.into());
        self
    }

    pub fn with_composition(mut self, mode: CompositionMode) -> Self {
        self.composition = mode;
        self
    }

    pub fn with_overlay(mut self, enabled: bool) -> Self {
        self.overlay = enabled;
        self
    }

    pub fn with_target_size(mut self, size: TargetSize) -> Self {
        self.target_size = size;
        self
    }

    pub fn with_frames_in_flight(mut self, n: usize) -> Self {
        self.frames_in_flight = n;
        self
    }

    /// Name of the attachment the engine composites from, if any.
    pub fn presentation_name(&self) -> Option<&str> {
        self.presentation_attachment
            .as_deref()
            .or_else(|| self.attachments.first().map(|a| a.name.as_str()))
    }

    /// Validates and normalizes the set. Called once by the engine after negotiation.
    pub fn validate(mut self) -> EngineResult<Self> {
        let invalid = |msg: String| Err(EngineError::InvalidCapabilities(msg));

        let mut seen = HashSet::new();
        for a in &self.attachments {
            if a.name.is_empty() {
                return invalid("attachment with empty name".into());
            }
            if !seen.insert(a.name.as_str()) {
                return invalid(format!("duplicate attachment `{}`", a.name));
            }
            if a.format.is_depth_stencil_format() {
                return invalid(format!(
                    "attachment `{}` uses depth format {:?}; declare depth separately",
                    a.name, a.format
                ));
            }
        }

        if let Some(depth) = self.depth {
            if !depth.is_depth_stencil_format() {
                return invalid(format!("{depth:?} is not a depth format"));
            }
        }

        if let TargetSize::Scaled(f) = self.target_size {
            if !(f.is_finite() && f > 0.0) {
                return invalid(format!("target scale {f} must be positive"));
            }
        }

        match (self.composition, self.presentation_name()) {
            (CompositionMode::Engine, None) => {
                return invalid("engine composition requires a colour attachment".into());
            }
            (_, Some(name)) if !self.attachments.iter().any(|a| a.name == name) => {
                return invalid(format!("presentation attachment `{name}` is not declared"));
            }
            _ => {}
        }

        let clamped = self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if clamped != self.frames_in_flight {
            log::warn!(
                "frames_in_flight={} out of range; using {clamped}",
                self.frames_in_flight
            );
            self.frames_in_flight = clamped;
        }

        // The composite source must be sampleable and copyable.
        if let Some(name) = self.presentation_name().map(str::to_owned) {
            if let Some(a) = self.attachments.iter_mut().find(|a| a.name == name) {
                a.usage |= wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
            }
        }

        Ok(self)
    }
}
