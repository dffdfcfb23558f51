//! Captured photo handling and transport encoding
//!
//! Decodes whatever the browser camera uploads and re-encodes it as a
//! base64 JPEG payload for staging.

pub mod codec;

pub use codec::{encode, EncodedPayload, JPEG_QUALITY};

use crate::Result;
use image::DynamicImage;

/// A decoded camera frame, owned by the UI layer for one interaction.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    image: DynamicImage,
}

impl CapturedImage {
    /// Decode any format the `image` crate recognizes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            image: image::load_from_memory(bytes)?,
        })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub(crate) fn into_inner(self) -> DynamicImage {
        self.image
    }
}
