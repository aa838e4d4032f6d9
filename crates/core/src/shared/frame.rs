use std::io::Cursor;

use ndarray::ArrayView3;

use crate::shared::rect::{Rect, Size};

/// A still image captured from a video feed: contiguous RGB bytes in
/// row-major order.
///
/// Frames are ephemeral. `index` is the feed's sequence number and only
/// serves diagnostics.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

pub const CHANNELS: usize = 3;

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> Option<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, CHANNELS),
            &self.data,
        )
        .ok()
    }

    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Encodes the frame as PNG, the upload format of the face service.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let img = self.to_rgb_image().ok_or_else(|| {
            image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ))
        })?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Copies the pixels under `rect`, clamped to the frame bounds.
    ///
    /// Returns `None` when the clamped rectangle is empty.
    pub fn crop(&self, rect: &Rect) -> Option<Frame> {
        let bounds = Rect::new(0.0, 0.0, self.width as f64, self.height as f64);
        let clamped = rect.intersection(&bounds)?;

        let x1 = clamped.x.floor() as usize;
        let y1 = clamped.y.floor() as usize;
        let x2 = (clamped.max_x().ceil() as usize).min(self.width as usize);
        let y2 = (clamped.max_y().ceil() as usize).min(self.height as usize);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let row_bytes = self.width as usize * CHANNELS;
        let mut data = Vec::with_capacity((x2 - x1) * (y2 - y1) * CHANNELS);
        for row in y1..y2 {
            let start = row * row_bytes + x1 * CHANNELS;
            let end = row * row_bytes + x2 * CHANNELS;
            data.extend_from_slice(&self.data[start..end]);
        }
        Some(Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.index,
        ))
    }
}
