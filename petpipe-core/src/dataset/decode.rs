//! Image decoding
//!
//! Turns encoded JPEG/PNG bytes into channel-first `u8` tensors.

use bytes::Bytes;
use std::sync::Arc;

use crate::error::{PetError, Result};
use crate::metrics::standard::DECODE_LATENCY;

/// Decoded image in CHW layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Value at (channel, row, column)
    pub fn get(&self, c: usize, y: usize, x: usize) -> Option<u8> {
        if c >= self.channels || y >= self.height || x >= self.width {
            return None;
        }
        self.data.get((c * self.height + y) * self.width + x).copied()
    }
}

/// Decode function applied to each raw buffer: `(path, bytes) -> tensor`
pub type Decoder = Arc<dyn Fn(&str, &Bytes) -> Result<ImageTensor> + Send + Sync>;

/// Raw or decoded image data carried by a sample
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Bytes),
    Decoded(ImageTensor),
}

impl Payload {
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Payload::Raw(bytes) => Some(bytes),
            Payload::Decoded(_) => None,
        }
    }

    pub fn as_decoded(&self) -> Option<&ImageTensor> {
        match self {
            Payload::Decoded(tensor) => Some(tensor),
            Payload::Raw(_) => None,
        }
    }
}

/// Decode an encoded image into a CHW tensor.
///
/// Grayscale images (the trimaps) keep one channel; everything else is
/// converted to RGB.
pub fn decode_image(path: &str, data: &Bytes) -> Result<ImageTensor> {
    DECODE_LATENCY.time(|| {
        let img = image::load_from_memory(data).map_err(|e| PetError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let (width, height) = (img.width() as usize, img.height() as usize);
        let (channels, interleaved) = if img.color().has_color() {
            (3, img.to_rgb8().into_raw())
        } else {
            (1, img.to_luma8().into_raw())
        };

        let mut data = vec![0u8; interleaved.len()];
        for (idx, value) in interleaved.into_iter().enumerate() {
            let pixel = idx / channels;
            let c = idx % channels;
            data[c * height * width + pixel] = value;
        }

        Ok(ImageTensor {
            channels,
            height,
            width,
            data,
        })
    })
}

/// The default [`Decoder`] backed by [`decode_image`]
pub fn image_decoder() -> Decoder {
    Arc::new(decode_image)
}
