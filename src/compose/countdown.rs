use std::path::Path;

use vello_cpu::kurbo::{Affine, Rect};

use crate::{
    compose::glyphs::{FontGlyphs, Glyphs},
    config::StreamConfig,
    foundation::{
        core::{BYTES_PER_PIXEL, Frame, Resolution},
        error::{LoopcastError, LoopcastResult},
    },
};

/// `MM:SS`, zero padded. Minutes are not wrapped into hours; values below zero show `00:00`.
pub fn format_countdown(secs_remaining: i64) -> String {
    let secs = secs_remaining.max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Axis-aligned pixel rectangle; `x`/`y` may be negative before clipping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> i64 {
        self.x + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        self.y + i64::from(self.height)
    }

    fn clip_to(self, bounds: Resolution) -> Self {
        let x0 = self.x.clamp(0, i64::from(bounds.width));
        let y0 = self.y.clamp(0, i64::from(bounds.height));
        let x1 = self.right().clamp(0, i64::from(bounds.width));
        let y1 = self.bottom().clamp(0, i64::from(bounds.height));
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }
}

/// Placement of the readout inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountdownLayout {
    /// Ink box of the text, centered in the frame.
    pub text: PixelRect,
    /// Opaque background: the text box grown by `margin` on every side, clipped to the frame.
    pub panel: PixelRect,
    pub margin: u32,
}

pub fn countdown_layout(frame: Resolution, text_w: u32, text_h: u32) -> CountdownLayout {
    let margin = ((f64::from(frame.height) * 0.02).floor() as u32).max(1);
    let text = PixelRect {
        x: (i64::from(frame.width) - i64::from(text_w)) / 2,
        y: (i64::from(frame.height) - i64::from(text_h)) / 2,
        width: text_w,
        height: text_h,
    };
    let panel = PixelRect {
        x: text.x - i64::from(margin),
        y: text.y - i64::from(margin),
        width: text_w + 2 * margin,
        height: text_h + 2 * margin,
    }
    .clip_to(frame);
    CountdownLayout {
        text,
        panel,
        margin,
    }
}

struct RenderedPanel {
    secs: i64,
    frame: Resolution,
    rect: PixelRect,
    rgb: Vec<u8>,
}

/// Burns a centered `MM:SS` readout, white on an opaque black box, into frames.
///
/// The rasterized box is cached per displayed value, so repeated frames within the same
/// second are a plain blit.
pub struct CountdownRenderer {
    glyphs: Glyphs,
    cached: Option<RenderedPanel>,
}

impl Default for CountdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownRenderer {
    /// Renderer using the built-in segment glyphs.
    pub fn new() -> Self {
        Self {
            glyphs: Glyphs::Segment,
            cached: None,
        }
    }

    pub fn from_font_bytes(bytes: Vec<u8>) -> LoopcastResult<Self> {
        Ok(Self {
            glyphs: Glyphs::Font(Box::new(FontGlyphs::from_bytes(bytes)?)),
            cached: None,
        })
    }

    pub fn from_font_file(path: &Path) -> LoopcastResult<Self> {
        Ok(Self {
            glyphs: Glyphs::Font(Box::new(FontGlyphs::from_file(path)?)),
            cached: None,
        })
    }

    pub fn for_config(cfg: &StreamConfig) -> LoopcastResult<Self> {
        match cfg.font_file.as_deref() {
            Some(path) => Self::from_font_file(path),
            None => Ok(Self::new()),
        }
    }

    pub fn layout(
        &mut self,
        frame: Resolution,
        secs_remaining: i64,
    ) -> LoopcastResult<CountdownLayout> {
        let text = format_countdown(secs_remaining);
        let (w, h) = self.glyphs.measure(&text, frame.height)?;
        Ok(countdown_layout(frame, w, h))
    }

    pub fn overlay(&mut self, frame: &mut Frame, secs_remaining: i64) -> LoopcastResult<()> {
        let secs = secs_remaining.max(0);
        let res = frame.resolution();
        let hit = self
            .cached
            .as_ref()
            .is_some_and(|c| c.secs == secs && c.frame == res);
        if !hit {
            self.cached = Some(self.rasterize(res, secs)?);
        }
        if let Some(panel) = self.cached.as_ref() {
            blit(frame, panel.rect, &panel.rgb);
        }
        Ok(())
    }

    fn rasterize(&mut self, res: Resolution, secs: i64) -> LoopcastResult<RenderedPanel> {
        let text = format_countdown(secs);
        let layout = self.layout(res, secs)?;
        let rect = layout.panel;
        if rect.width == 0 || rect.height == 0 {
            return Ok(RenderedPanel {
                secs,
                frame: res,
                rect,
                rgb: Vec::new(),
            });
        }

        let w: u16 = rect
            .width
            .try_into()
            .map_err(|_| LoopcastError::validation("overlay width exceeds u16"))?;
        let h: u16 = rect
            .height
            .try_into()
            .map_err(|_| LoopcastError::validation("overlay height exceeds u16"))?;

        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_transform(Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
        ctx.fill_rect(&Rect::new(0.0, 0.0, f64::from(w), f64::from(h)));

        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
        let origin = (
            (layout.text.x - rect.x) as f64,
            (layout.text.y - rect.y) as f64,
        );
        self.glyphs.paint(&mut ctx, &text, res.height, origin)?;

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut pixmap);

        // The panel is fully opaque, so premultiplied RGBA is plain RGBA here.
        let rgb = pixmap
            .data_as_u8_slice()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        Ok(RenderedPanel {
            secs,
            frame: res,
            rect,
            rgb,
        })
    }
}

/// Overlay with the built-in glyphs.
pub fn overlay_countdown(frame: &mut Frame, secs_remaining: i64) -> LoopcastResult<()> {
    CountdownRenderer::new().overlay(frame, secs_remaining)
}

fn blit(frame: &mut Frame, rect: PixelRect, rgb: &[u8]) {
    if rect.width == 0 || rect.height == 0 {
        return;
    }
    let row_len = rect.width as usize * BYTES_PER_PIXEL;
    let stride = frame.width as usize * BYTES_PER_PIXEL;
    for (row, src) in rgb.chunks_exact(row_len).enumerate() {
        let y = rect.y as usize + row;
        let off = y * stride + rect.x as usize * BYTES_PER_PIXEL;
        frame.data[off..off + row_len].copy_from_slice(src);
    }
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

    fn inside(r: PixelRect, frame: Resolution) -> bool {
        r.x >= 0
            && r.y >= 0
            && r.right() <= i64::from(frame.width)
            && r.bottom() <= i64::from(frame.height)
    }

    #[test]
    fn format_pads_and_lets_minutes_grow() {
        assert_eq!(format_countdown(30), "00:30");
        assert_eq!(format_countdown(61), "01:01");
        assert_eq!(format_countdown(3599), "59:59");
        assert_eq!(format_countdown(4500), "75:00");
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(-7), "00:00");
    }

    #[test]
    fn layout_centers_text_with_margin() {
        let l = countdown_layout(res(1280, 720), 200, 72);
        assert_eq!(l.margin, 14);
        assert_eq!((l.text.x, l.text.y), (540, 324));
        assert_eq!(
            l.panel,
            PixelRect {
                x: 526,
                y: 310,
                width: 228,
                height: 100,
            }
        );
    }

    #[test]
    fn layout_clips_oversized_text() {
        let l = countdown_layout(res(40, 20), 100, 30);
        assert!(inside(l.panel, res(40, 20)));
        assert_eq!((l.panel.width, l.panel.height), (40, 20));
    }

    #[test]
    fn panel_scales_with_height_and_stays_inside() {
        let mut renderer = CountdownRenderer::new();
        for secs in 0..=30 {
            let mut last = (0, 0);
            for h in [180u32, 360, 480, 720, 1080, 1440, 2160] {
                let frame = res(h * 16 / 9 + (h * 16 / 9) % 2, h);
                let l = renderer.layout(frame, secs).unwrap();
                assert!(inside(l.panel, frame), "secs={secs} h={h}: {l:?}");
                assert!(l.panel.width >= last.0 && l.panel.height >= last.1);
                last = (l.panel.width, l.panel.height);
            }
        }
    }

    #[test]
    fn overlay_draws_white_on_black_and_leaves_the_rest() {
        let mut frame = Frame::filled(320, 180, [10, 120, 200]);
        let mut renderer = CountdownRenderer::new();
        renderer.overlay(&mut frame, 88 * 60 + 8).unwrap();
        let l = renderer.layout(frame.resolution(), 88 * 60 + 8).unwrap();

        // Outside the panel: untouched.
        assert_eq!(frame.pixel(0, 0), [10, 120, 200]);
        assert_eq!(frame.pixel(319, 179), [10, 120, 200]);
        // Panel margin: black.
        assert_eq!(frame.pixel(l.panel.x as u32, l.panel.y as u32), [0, 0, 0]);
        // Top bar of the leading "8" sits at the text origin.
        let t = frame.pixel(l.text.x as u32 + 2, l.text.y as u32);
        assert!(t.iter().all(|&c| c > 200), "expected white, got {t:?}");
    }

    #[test]
    fn overlay_is_deterministic_and_cache_safe() {
        let base = Frame::filled(160, 90, [50, 50, 50]);
        let mut renderer = CountdownRenderer::new();

        let mut a = base.clone();
        renderer.overlay(&mut a, 25).unwrap();
        let mut b = base.clone();
        renderer.overlay(&mut b, 24).unwrap();
        let mut c = base.clone();
        renderer.overlay(&mut c, 25).unwrap();

        assert_ne!(a, b);
        assert_eq!(a, c);

        let mut fresh = base.clone();
        overlay_countdown(&mut fresh, 25).unwrap();
        assert_eq!(a, fresh);
    }

    #[test]
    fn overlay_handles_nonpositive_and_tiny_frames() {
        let mut frame = Frame::black(8, 4);
        overlay_countdown(&mut frame, -3).unwrap();
        overlay_countdown(&mut frame, 0).unwrap();
        let mut frame = Frame::black(2, 2);
        overlay_countdown(&mut frame, 10).unwrap();
    }

    #[test]
    fn font_renderer_when_a_system_font_is_present() {
        let candidates = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
            "/Library/Fonts/Arial Bold.ttf",
            "C:\\Windows\\Fonts\\arialbd.ttf",
        ];
        let Some(path) = candidates.iter().map(Path::new).find(|p| p.exists()) else {
            return;
        };
        let mut renderer = CountdownRenderer::from_font_file(path).unwrap();
        let mut frame = Frame::black(1280, 720);
        renderer.overlay(&mut frame, 754).unwrap();
        let l = renderer.layout(frame.resolution(), 754).unwrap();
        assert!(inside(l.panel, frame.resolution()));
        assert!(l.text.width > 0 && l.text.height > 0);
        assert!(frame.data.iter().any(|&c| c > 200));
    }
}
