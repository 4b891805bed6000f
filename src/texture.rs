// Texture decoding to tightly packed RGBA8

use anyhow::{Context, Result};
use std::path::Path;

pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("Failed to load texture {:?}", path))?
            .to_rgba8();

        let (width, height) = image.dimensions();
        anyhow::ensure!(width > 0 && height > 0, "Texture {:?} is empty", path);

        log::info!("Loaded texture {:?} ({}x{})", path, width, height);
        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
        })
    }
}
