//! JPEG decode/encode for incoming and outgoing frames.

use opencv::core::{Mat, Vector};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

use crate::config::CodecConfig;
use crate::error::CycleError;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    jpeg_quality: i32,
}

impl FrameCodec {
    pub fn new(jpeg_quality: i32) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(config.jpeg_quality)
    }

    pub fn jpeg_quality(&self) -> i32 {
        self.jpeg_quality
    }

    /// Compressed image → BGR frame
    pub fn decode(&self, bytes: &[u8]) -> Result<Mat, CycleError> {
        if bytes.is_empty() {
            return Err(CycleError::EmptyImage);
        }
        let buf = Vector::<u8>::from_slice(bytes);
        let frame = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR).map_err(CycleError::Decode)?;
        if frame.empty() {
            return Err(CycleError::EmptyImage);
        }
        Ok(frame)
    }

    /// BGR (or BGRA) frame → JPEG bytes
    pub fn encode(&self, frame: &Mat) -> Result<Vec<u8>, CycleError> {
        let params = Vector::from_iter([imgcodecs::IMWRITE_JPEG_QUALITY, self.jpeg_quality]);
        let mut buf: Vector<u8> = Vector::new();

        // imencode expects BGR 8UC3; convert BGRA if needed
        if frame.channels() == 4 {
            let mut bgr = Mat::default();
            imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_BGRA2BGR).map_err(CycleError::Encode)?;
            imgcodecs::imencode(".jpg", &bgr, &mut buf, &params).map_err(CycleError::Encode)?;
        } else {
            imgcodecs::imencode(".jpg", frame, &mut buf, &params).map_err(CycleError::Encode)?;
        }

        Ok(buf.to_vec())
    }
}
