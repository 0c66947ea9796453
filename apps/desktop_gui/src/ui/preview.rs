//! GPU previews of the selected and processed images.

use client_core::ImageWorkflow;
use egui::{ColorImage, Context, TextureHandle, TextureOptions, Vec2};

const MAX_PREVIEW_DIMENSION: u32 = 1024;

pub struct PreviewTexture {
    pub texture: TextureHandle,
    pub size: Vec2,
}

pub enum Preview {
    Ready(PreviewTexture),
    DecodeFailed(String),
}

/// Decodes encoded image bytes into an egui image, downscaled to fit
/// [`MAX_PREVIEW_DIMENSION`].
pub fn decode_color_image(bytes: &[u8]) -> Result<ColorImage, String> {
    let decoded = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let (w, h) = (decoded.width(), decoded.height());
    let resized = if w.max(h) > MAX_PREVIEW_DIMENSION {
        decoded.resize(
            MAX_PREVIEW_DIMENSION,
            MAX_PREVIEW_DIMENSION,
            image::imageops::FilterType::Triangle,
        )
    } else {
        decoded
    };
    let rgba = resized.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

/// Textures for the current workflow generation. Any generation change drops
/// them, which frees the GPU memory.
#[derive(Default)]
pub struct PreviewCache {
    generation: Option<u64>,
    original: Option<Preview>,
    result: Option<Preview>,
}

impl PreviewCache {
    pub fn sync(&mut self, ctx: &Context, workflow: Option<&ImageWorkflow>) {
        let Some(workflow) = workflow else {
            self.clear();
            return;
        };

        if self.generation != Some(workflow.generation()) {
            self.original = None;
            self.result = None;
            self.generation = Some(workflow.generation());
        }

        match workflow.selected() {
            Some(image) if self.original.is_none() => {
                self.original = Some(load_preview(
                    ctx,
                    format!("original:{}", workflow.generation()),
                    image.bytes(),
                ));
            }
            Some(_) => {}
            None => self.original = None,
        }

        match workflow.processed() {
            Some(processed) if self.result.is_none() => {
                self.result = Some(load_preview(
                    ctx,
                    format!("result:{}", workflow.generation()),
                    processed.bytes(),
                ));
            }
            Some(_) => {}
            None => self.result = None,
        }
    }

    pub fn clear(&mut self) {
        self.generation = None;
        self.original = None;
        self.result = None;
    }

    pub fn original(&self) -> Option<&Preview> {
        self.original.as_ref()
    }

    pub fn result(&self) -> Option<&Preview> {
        self.result.as_ref()
    }
}

fn load_preview(ctx: &Context, name: String, bytes: &[u8]) -> Preview {
    match decode_color_image(bytes) {
        Ok(color_image) => {
            let size = egui::vec2(color_image.size[0] as f32, color_image.size[1] as f32);
            let texture = ctx.load_texture(name, color_image, TextureOptions::LINEAR);
            Preview::Ready(PreviewTexture { texture, size })
        }
        Err(reason) => {
            tracing::warn!(%reason, "failed to decode preview");
            Preview::DecodeFailed(reason)
        }
    }
}
