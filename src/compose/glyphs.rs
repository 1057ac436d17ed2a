use std::path::Path;

use anyhow::Context as _;
use vello_cpu::kurbo::{Affine, Rect};

use crate::foundation::error::{LoopcastError, LoopcastResult};

/// Font size of the readout at a 720 px tall frame; scales linearly with height.
const FONT_PX_AT_720: f32 = 96.0;

/// Brush type for parley layouts. The readout is single-colored, so it carries no data.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct TextBrush;

/// Draws the `MM:SS` readout into a `vello_cpu` context.
pub(crate) enum Glyphs {
    Segment,
    Font(Box<FontGlyphs>),
}

impl Glyphs {
    /// Ink extent of `text` for a frame of the given height, in whole pixels.
    pub(crate) fn measure(&mut self, text: &str, frame_height: u32) -> LoopcastResult<(u32, u32)> {
        match self {
            Self::Segment => Ok(SegmentMetrics::for_height(frame_height).measure(text)),
            Self::Font(font) => {
                let layout = font.layout(text, frame_height)?;
                Ok((
                    layout.width().ceil().max(1.0) as u32,
                    layout.height().ceil().max(1.0) as u32,
                ))
            }
        }
    }

    /// Fill `text` in the current paint with its top-left corner at `origin`.
    pub(crate) fn paint(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        text: &str,
        frame_height: u32,
        origin: (f64, f64),
    ) -> LoopcastResult<()> {
        ctx.set_transform(Affine::translate(origin));
        match self {
            Self::Segment => {
                let metrics = SegmentMetrics::for_height(frame_height);
                for rect in metrics.rects(text) {
                    ctx.fill_rect(&rect);
                }
                Ok(())
            }
            Self::Font(font) => {
                let layout = font.layout(text, frame_height)?;
                for line in layout.lines() {
                    for item in line.items() {
                        let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                            continue;
                        };
                        let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                            id: g.id,
                            x: g.x,
                            y: g.y,
                        });
                        ctx.glyph_run(&font.font)
                            .font_size(run.run().font_size())
                            .fill_glyphs(glyphs);
                    }
                }
                Ok(())
            }
        }
    }
}

/// Glyphs shaped by parley from a single user-supplied font.
pub(crate) struct FontGlyphs {
    font: vello_cpu::peniko::FontData,
    family_name: String,
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl FontGlyphs {
    pub(crate) fn from_file(path: &Path) -> LoopcastResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font '{}'", path.display()))?;
        Self::from_bytes(bytes)
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> LoopcastResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            LoopcastError::validation("no font families registered from font bytes")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| LoopcastError::validation("registered font family has no name"))?
            .to_string();

        let font = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);

        Ok(Self {
            font,
            family_name,
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
        })
    }

    fn layout(
        &mut self,
        text: &str,
        frame_height: u32,
    ) -> LoopcastResult<parley::Layout<TextBrush>> {
        let size_px = frame_height as f32 / 720.0 * FONT_PX_AT_720;
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(LoopcastError::validation("text size must be finite and > 0"));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

/// Seven-segment digits and a two-dot colon built from axis-aligned bars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SegmentMetrics {
    pub digit_height: u32,
    pub digit_width: u32,
    pub thickness: u32,
    pub spacing: u32,
}

// Segment order: a (top), b (top right), c (bottom right), d (bottom), e (bottom left),
// f (top left), g (middle).
const DIGIT_SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

impl SegmentMetrics {
    pub(crate) fn for_height(frame_height: u32) -> Self {
        let digit_height = ((f64::from(frame_height) * 0.1).round() as u32).max(7);
        let thickness = ((f64::from(digit_height) / 7.0).round() as u32).max(1);
        let digit_width = ((f64::from(digit_height) * 0.55).round() as u32).max(thickness * 3);
        Self {
            digit_height,
            digit_width,
            thickness,
            spacing: thickness,
        }
    }

    fn advance(&self, c: char) -> u32 {
        match c {
            ':' => self.thickness,
            _ => self.digit_width,
        }
    }

    pub(crate) fn measure(&self, text: &str) -> (u32, u32) {
        let count = text.chars().count() as u32;
        let width: u32 = text.chars().map(|c| self.advance(c)).sum::<u32>()
            + self.spacing * count.saturating_sub(1);
        (width.max(1), self.digit_height)
    }

    /// Bars for `text`, relative to the text's top-left corner.
    pub(crate) fn rects(&self, text: &str) -> Vec<Rect> {
        let (w, h, t) = (
            f64::from(self.digit_width),
            f64::from(self.digit_height),
            f64::from(self.thickness),
        );
        let half = (h / 2.0).floor();
        let mid = ((h - t) / 2.0).floor();

        let mut out = Vec::new();
        let mut x = 0.0;
        for c in text.chars() {
            if let Some(d) = c.to_digit(10) {
                let segs = DIGIT_SEGMENTS[d as usize];
                let bars = [
                    Rect::new(0.0, 0.0, w, t),
                    Rect::new(w - t, 0.0, w, half),
                    Rect::new(w - t, half, w, h),
                    Rect::new(0.0, h - t, w, h),
                    Rect::new(0.0, half, t, h),
                    Rect::new(0.0, 0.0, t, half),
                    Rect::new(0.0, mid, w, mid + t),
                ];
                out.extend(
                    bars.iter()
                        .zip(segs)
                        .filter(|(_, on)| *on)
                        .map(|(r, _)| *r + vello_cpu::kurbo::Vec2::new(x, 0.0)),
                );
            } else if c == ':' {
                let upper = (h / 3.0 - t / 2.0).floor();
                let lower = (2.0 * h / 3.0 - t / 2.0).floor();
                out.push(Rect::new(x, upper, x + t, upper + t));
                out.push(Rect::new(x, lower, x + t, lower + t));
            }
            x += f64::from(self.advance(c) + self.spacing);
        }
        out
    }
}
