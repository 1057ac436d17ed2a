use image::imageops::{self, FilterType};

use crate::foundation::{
    core::{Frame, Resolution},
    error::{LoopcastError, LoopcastResult},
};

/// Where a scaled source lands inside the target frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LetterboxGeometry {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_left: u32,
    pub pad_right: u32,
    pub pad_top: u32,
    pub pad_bottom: u32,
}

/// Fit `src_w × src_h` inside `target` without cropping; the odd pad pixel goes to the
/// trailing side.
pub fn letterbox_geometry(src_w: u32, src_h: u32, target: Resolution) -> LetterboxGeometry {
    let (tw, th) = (u64::from(target.width), u64::from(target.height));
    let (sw, sh) = (u64::from(src_w.max(1)), u64::from(src_h.max(1)));

    if sw * th > tw * sh {
        // Source is wider: fit to width, bars top and bottom.
        let scaled_h = ((sh * tw) / sw).clamp(1, th) as u32;
        let pad = target.height - scaled_h;
        LetterboxGeometry {
            scaled_width: target.width,
            scaled_height: scaled_h,
            pad_left: 0,
            pad_right: 0,
            pad_top: pad / 2,
            pad_bottom: pad - pad / 2,
        }
    } else {
        let scaled_w = ((sw * th) / sh).clamp(1, tw) as u32;
        let pad = target.width - scaled_w;
        LetterboxGeometry {
            scaled_width: scaled_w,
            scaled_height: target.height,
            pad_left: pad / 2,
            pad_right: pad - pad / 2,
            pad_top: 0,
            pad_bottom: 0,
        }
    }
}

/// Resize `frame` to exactly `target`, preserving aspect ratio with black bars.
pub fn letterbox(frame: Frame, target: Resolution) -> LoopcastResult<Frame> {
    if frame.width == 0 || frame.height == 0 {
        return Err(LoopcastError::validation("cannot letterbox an empty frame"));
    }
    if frame.width == target.width && frame.height == target.height {
        return Ok(frame);
    }

    let geo = letterbox_geometry(frame.width, frame.height, target);
    let src = frame.into_image()?;
    let scaled = if src.dimensions() == (geo.scaled_width, geo.scaled_height) {
        src
    } else {
        imageops::resize(
            &src,
            geo.scaled_width,
            geo.scaled_height,
            FilterType::Triangle,
        )
    };

    if geo.pad_left == 0 && geo.pad_right == 0 && geo.pad_top == 0 && geo.pad_bottom == 0 {
        return Ok(Frame::from_image(scaled));
    }

    let mut canvas = image::RgbImage::new(target.width, target.height);
    imageops::replace(
        &mut canvas,
        &scaled,
        i64::from(geo.pad_left),
        i64::from(geo.pad_top),
    );
    Ok(Frame::from_image(canvas))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(w: u32, h: u32) -> Resolution {
        Resolution {
            width: w,
            height: h,
        }
    }

    #[test]
    fn equal_aspect_has_no_padding() {
        let geo = letterbox_geometry(640, 360, res(1280, 720));
        assert_eq!(
            geo,
            LetterboxGeometry {
                scaled_width: 1280,
                scaled_height: 720,
                pad_left: 0,
                pad_right: 0,
                pad_top: 0,
                pad_bottom: 0,
            }
        );
    }

    #[test]
    fn wide_source_gets_top_and_bottom_bars() {
        // 2.39:1 into 16:9
        let geo = letterbox_geometry(1920, 803, res(1280, 720));
        assert_eq!(geo.scaled_width, 1280);
        assert_eq!(geo.scaled_height, 535);
        assert_eq!(geo.pad_top, 92);
        assert_eq!(geo.pad_bottom, 93);
        assert_eq!(geo.pad_left + geo.pad_right, 0);
    }

    #[test]
    fn tall_source_gets_side_bars() {
        let geo = letterbox_geometry(1080, 1920, res(1280, 720));
        assert_eq!(geo.scaled_height, 720);
        assert_eq!(geo.scaled_width, 405);
        assert_eq!(geo.pad_left, 437);
        assert_eq!(geo.pad_right, 438);
    }

    #[test]
    fn output_is_exact_target_for_any_aspect() {
        let target = res(64, 36);
        for (w, h) in [(10, 10), (100, 7), (7, 100), (64, 36), (33, 17), (1, 1), (200, 113)] {
            let out = letterbox(Frame::filled(w, h, [200, 100, 50]), target).unwrap();
            assert_eq!((out.width, out.height), (64, 36), "source {w}x{h}");
            assert_eq!(out.data.len(), target.frame_len());
        }
    }

    #[test]
    fn bars_are_black_and_content_is_kept() {
        let out = letterbox(Frame::filled(20, 20, [255, 255, 255]), res(40, 20)).unwrap();
        assert_eq!(out.pixel(0, 10), [0, 0, 0]);
        assert_eq!(out.pixel(39, 10), [0, 0, 0]);
        assert_eq!(out.pixel(20, 10), [255, 255, 255]);
    }

    #[test]
    fn same_size_is_passthrough() {
        let src = Frame::filled(8, 4, [1, 2, 3]);
        let out = letterbox(src.clone(), res(8, 4)).unwrap();
        assert_eq!(out, src);
    }
}
