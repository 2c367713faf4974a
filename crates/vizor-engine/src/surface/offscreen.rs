use winit::dpi::PhysicalSize;

use crate::backend::{AttachmentSpec, Backend};
use crate::error::EngineResult;
use crate::strategy::{AttachmentDesc, CapabilitySet, TargetSize};

/// One allocated offscreen image plus the description it was built from.
pub struct Attachment<B: Backend> {
    desc: AttachmentDesc,
    size: PhysicalSize<u32>,
    handle: B::Attachment,
}

impl<B: Backend> Attachment<B> {
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &AttachmentDesc {
        &self.desc
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.desc.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn handle(&self) -> &B::Attachment {
        &self.handle
    }
}

impl<B: Backend> std::fmt::Debug for Attachment<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.desc.name)
            .field("format", &self.desc.format)
            .field("size", &self.size)
            .finish()
    }
}

/// Intermediate render targets a strategy draws into.
///
/// Sized independently of the presentation surface's format and image count.
/// Strategies only ever see `&OffscreenTarget` for the duration of a hook.
pub struct OffscreenTarget<B: Backend> {
    colors: Vec<Attachment<B>>,
    depth: Option<Attachment<B>>,
    presentation: Option<usize>,
    sizing: TargetSize,
    size: PhysicalSize<u32>,
}

impl<B: Backend> OffscreenTarget<B> {
    /// Allocates every attachment declared by `caps` at the resolved size.
    ///
    /// On failure, attachments created so far are released before returning.
    pub fn build(
        backend: &mut B,
        caps: &CapabilitySet,
        surface_size: PhysicalSize<u32>,
    ) -> EngineResult<Self> {
        let size = caps.target_size.resolve(surface_size);
        let mut target = Self {
            colors: Vec::with_capacity(caps.attachments.len()),
            depth: None,
            presentation: None,
            sizing: caps.target_size,
            size,
        };

        let depth_desc = caps.depth.map(|format| AttachmentDesc {
            name: "depth".to_owned(),
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            initial_layout: crate::surface::ImageLayout::Undefined,
        });

        for desc in &caps.attachments {
            match allocate(backend, desc, size) {
                Ok(a) => target.colors.push(a),
                Err(e) => {
                    target.destroy(backend);
                    return Err(e);
                }
            }
        }

        if let Some(desc) = depth_desc {
            match allocate(backend, &desc, size) {
                Ok(a) => target.depth = Some(a),
                Err(e) => {
                    target.destroy(backend);
                    return Err(e);
                }
            }
        }

        target.presentation = caps
            .presentation_name()
            .and_then(|name| target.colors.iter().position(|a| a.name() == name));

        log::debug!(
            "offscreen: {} colour attachment(s){} at {}x{}",
            target.colors.len(),
            if target.depth.is_some() { " + depth" } else { "" },
            size.width,
            size.height
        );

        Ok(target)
    }

    /// A target without attachments, used where hooks need a context but the
    /// real target is gone.
    pub(crate) fn empty(caps: &CapabilitySet, surface_size: PhysicalSize<u32>) -> Self {
        Self {
            colors: Vec::new(),
            depth: None,
            presentation: None,
            sizing: caps.target_size,
            size: caps.target_size.resolve(surface_size),
        }
    }

    /// Releases attachments in reverse creation order.
    pub fn destroy(mut self, backend: &mut B) {
        if let Some(depth) = self.depth.take() {
            backend.destroy_attachment(depth.handle);
        }
        while let Some(a) = self.colors.pop() {
            backend.destroy_attachment(a.handle);
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn tracks_surface(&self) -> bool {
        self.sizing.tracks_surface()
    }

    pub fn attachments(&self) -> &[Attachment<B>] {
        &self.colors
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment<B>> {
        self.colors.iter().find(|a| a.name() == name)
    }

    /// Attachment composited into the presentation image by default.
    pub fn presentation(&self) -> Option<&Attachment<B>> {
        self.presentation.and_then(|i| self.colors.get(i))
    }

    pub fn depth(&self) -> Option<&Attachment<B>> {
        self.depth.as_ref()
    }

    pub fn descriptions(&self) -> Vec<AttachmentDesc> {
        self.colors
            .iter()
            .chain(self.depth.iter())
            .map(|a| a.desc.clone())
            .collect()
    }
}

fn allocate<B: Backend>(
    backend: &mut B,
    desc: &AttachmentDesc,
    size: PhysicalSize<u32>,
) -> EngineResult<Attachment<B>> {
    let spec = AttachmentSpec {
        label: format!("vizor offscreen {}", desc.name),
        format: desc.format,
        usage: desc.usage,
        size,
    };
    let handle = backend.create_attachment(&spec)?;
    Ok(Attachment {
        desc: desc.clone(),
        size,
        handle,
    })
}
