use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to read texture {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode texture {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Texture {0:?} is neither png, jpeg nor bmp")]
    UnsupportedFormat(PathBuf),
}

/// Decoded RGBA8 pixels, ready to be uploaded by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    fn from_image(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            rgba: image.to_rgba8().into_raw(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, TextureError> {
        let format = match ImageFormat::from_path(path) {
            Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp)) => format,
            _ => return Err(TextureError::UnsupportedFormat(path.to_path_buf())),
        };
        let bytes = std::fs::read(path).map_err(|source| TextureError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match image::load_from_memory_with_format(&bytes, format) {
            Ok(image) => Ok(Self::from_image(&image)),
            Err(err) if format == ImageFormat::Jpeg => {
                log::debug!("Decoding {:?} as grayscale after: {}", path, err);
                Self::decode_grayscale(&bytes).map_err(|source| TextureError::Decode {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(source) => Err(TextureError::Decode {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn decode_grayscale(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let format = image::guess_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self::from_image(&DynamicImage::ImageLuma8(image.to_luma8())))
    }
}

/// Decoded textures by path. Failed loads are not cached.
#[derive(Default)]
pub struct TextureCache {
    textures: HashMap<PathBuf, Arc<TextureData>>,
}

impl TextureCache {
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<TextureData>, TextureError> {
        if let Some(texture) = self.textures.get(path) {
            return Ok(texture.clone());
        }
        let texture = Arc::new(TextureData::load(path)?);
        self.textures.insert(path.to_path_buf(), texture.clone());
        Ok(texture)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}
