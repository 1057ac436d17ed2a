use crate::foundation::error::{LoopcastError, LoopcastResult};

/// Bytes per pixel of the packed `rgb24` layout used end-to-end.
pub const BYTES_PER_PIXEL: usize = 3;

/// `ffmpeg` name of the raw pixel format written to the encoder pipe.
pub const PIXEL_FORMAT: &str = "rgb24";

/// Output geometry, fixed for the whole process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> LoopcastResult<Self> {
        let res = Self { width, height };
        res.validate()?;
        Ok(res)
    }

    pub fn validate(self) -> LoopcastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LoopcastError::validation(
                "resolution width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // The encoder targets yuv420p, which needs even dimensions.
            return Err(LoopcastError::validation(
                "resolution width/height must be even (required for yuv420p output)",
            ));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(LoopcastError::validation(
                "resolution width/height must fit in 16 bits",
            ));
        }
        Ok(())
    }

    pub fn frame_len(self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// `WxH`, as `ffmpeg` expects it for `-s`.
    pub fn to_ffmpeg_size(self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> LoopcastResult<Self> {
        if den == 0 {
            return Err(LoopcastError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(LoopcastError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration(self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(f64::from(self.den) / f64::from(self.num))
    }

    /// Whole frames per second, rounded up; used for keyframe intervals.
    pub fn ceil_frames(self) -> u32 {
        self.num.div_ceil(self.den)
    }

    pub fn to_ffmpeg_rate(self) -> String {
        format!("{}/{}", self.num, self.den)
    }
}

/// A packed `rgb24` image, row-major, no row padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn from_rgb24(width: u32, height: u32, data: Vec<u8>) -> LoopcastResult<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(LoopcastError::validation(format!(
                "frame data size mismatch: got {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Opaque black frame.
    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0])
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let off = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[off], self.data[off + 1], self.data[off + 2]]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_image(self) -> LoopcastResult<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| LoopcastError::validation("frame buffer does not match its dimensions"))
    }

    pub(crate) fn from_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_rejects_zero_and_odd() {
        assert!(Resolution::new(0, 720).is_err());
        assert!(Resolution::new(1281, 720).is_err());
        assert!(Resolution::new(1280, 719).is_err());
        assert!(Resolution::new(70_000, 720).is_err());
        let res = Resolution::new(1280, 720).unwrap();
        assert_eq!(res.frame_len(), 1280 * 720 * 3);
        assert_eq!(res.to_ffmpeg_size(), "1280x720");
    }

    #[test]
    fn fps_validation_and_formatting() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 0).is_err());
        let fps = Fps::new(30000, 1001).unwrap();
        assert_eq!(fps.to_ffmpeg_rate(), "30000/1001");
        assert_eq!(fps.ceil_frames(), 30);
        assert!((fps.as_f64() - 29.97).abs() < 0.01);
    }

    #[test]
    fn frame_size_is_checked() {
        assert!(Frame::from_rgb24(2, 2, vec![0; 11]).is_err());
        let f = Frame::from_rgb24(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(f.pixel(1, 0), [4, 5, 6]);
    }

    #[test]
    fn filled_frame_repeats_color() {
        let f = Frame::filled(3, 2, [9, 8, 7]);
        assert_eq!(f.data.len(), 18);
        assert!(f.data.chunks_exact(3).all(|px| px == [9, 8, 7]));
    }
}
