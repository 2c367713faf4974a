use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{Context, Result, bail};
use vizor_engine::StrategyCtx;
use vizor_engine::device::WgpuBackend;

/// GPU-to-CPU copy of one RGBA8 attachment, written out as a PNG once the
/// frame that recorded the copy has completed.
pub struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    path: PathBuf,
}

impl Readback {
    /// Records a copy of `texture` into a fresh mappable buffer.
    pub fn record(
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        path: PathBuf,
    ) -> Self {
        let size = texture.size();
        let padded_row = (size.width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("screenshot readback"),
            size: u64::from(padded_row) * u64::from(size.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                depth_or_array_layers: 1,
                ..size
            },
        );

        Self {
            buffer,
            width: size.width,
            height: size.height,
            padded_row,
            path,
        }
    }

    /// Queues the PNG write behind the frame currently being recorded.
    pub fn save_after_frame(self, ctx: &StrategyCtx<'_, WgpuBackend>) {
        ctx.retire("screenshot readback", move |backend: &mut WgpuBackend| {
            match self.save(backend.device()) {
                Ok(path) => log::info!("screenshot written to {}", path.display()),
                Err(e) => log::warn!("screenshot failed: {e:#}"),
            }
        });
    }

    fn save(self, device: &wgpu::Device) -> Result<PathBuf> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("device poll during screenshot readback")?;
        rx.recv()
            .context("readback callback dropped")?
            .context("failed to map readback buffer")?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, self.width, self.height, self.padded_row)
        };
        self.buffer.unmap();
        self.buffer.destroy();

        write_png(&self.path, self.width, self.height, pixels)?;
        Ok(self.path)
    }
}

/// Drops the per-row alignment padding of a texture copy.
fn unpad_rows(data: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    data.chunks(padded_row as usize)
        .take(height as usize)
        .flat_map(|chunk| &chunk[..row])
        .copied()
        .collect()
}

fn write_png(path: &Path, width: u32, height: u32, pixels: Vec<u8>) -> Result<()> {
    let Some(img) = image::RgbaImage::from_raw(width, height, pixels) else {
        bail!("readback size does not match {width}x{height}");
    };
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
