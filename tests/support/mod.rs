#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, Instant},
};

use loopcast::{
    Clock, Fps, Frame, FrameSource, LoopcastError, LoopcastResult, Resolution, SourceOpener,
    StreamConfig,
};

/// One 30 fps frame, rounded up so 30 reads cover a full second.
pub const FRAME_STEP: Duration = Duration::from_nanos(33_333_334);

pub const BG: &str = "bg.mp4";
pub const STING: &str = "sting.mp4";

pub fn test_config() -> StreamConfig {
    StreamConfig {
        background_video: PathBuf::from(BG),
        sting_video: PathBuf::from(STING),
        countdown_secs: 30,
        handoff_secs: 10,
        resolution: Resolution {
            width: 64,
            height: 36,
        },
        fps: Fps { num: 30, den: 1 },
        output_url: Some("rtmp://localhost/live/test".to_string()),
        retry_delay_ms: 20,
        shutdown_grace_ms: 50,
        ..StreamConfig::default()
    }
}

/// Synthetic clip; frame `i` is a solid color that encodes `i`.
#[derive(Clone, Copy, Debug)]
pub struct Clip {
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    pub tag: u8,
}

impl Clip {
    pub fn new(frames: u32, width: u32, height: u32, tag: u8) -> Self {
        Self {
            frames,
            width,
            height,
            tag,
        }
    }

    pub fn frame(&self, i: u32) -> Frame {
        Frame::filled(
            self.width,
            self.height,
            [self.tag, (i % 251) as u8, (i / 251) as u8],
        )
    }
}

pub struct MockSource {
    clip: Clip,
    pos: u32,
    rewinds: Rc<Cell<u32>>,
}

impl FrameSource for MockSource {
    fn next_frame(&mut self) -> LoopcastResult<Option<Frame>> {
        if self.pos >= self.clip.frames {
            return Ok(None);
        }
        let f = self.clip.frame(self.pos);
        self.pos += 1;
        Ok(Some(f))
    }

    fn rewind(&mut self) -> LoopcastResult<()> {
        self.pos = 0;
        self.rewinds.set(self.rewinds.get() + 1);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockOpener {
    clips: Rc<RefCell<HashMap<PathBuf, Clip>>>,
    opened: Rc<RefCell<Vec<PathBuf>>>,
    rewinds: Rc<Cell<u32>>,
    failing_opens: Rc<Cell<u32>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, clip: Clip) -> Self {
        self.clips.borrow_mut().insert(PathBuf::from(path), clip);
        self
    }

    /// The next `n` opens fail.
    pub fn failing_opens(self, n: u32) -> Self {
        self.failing_opens.set(n);
        self
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.borrow().clone()
    }

    pub fn rewinds(&self) -> u32 {
        self.rewinds.get()
    }
}

impl SourceOpener for MockOpener {
    fn open(&self, path: &Path) -> LoopcastResult<Box<dyn FrameSource>> {
        if self.failing_opens.get() > 0 {
            self.failing_opens.set(self.failing_opens.get() - 1);
            return Err(LoopcastError::media(format!(
                "scripted open failure for '{}'",
                path.display()
            )));
        }
        let clip = self
            .clips
            .borrow()
            .get(path)
            .copied()
            .ok_or_else(|| LoopcastError::media(format!("no clip for '{}'", path.display())))?;
        self.opened.borrow_mut().push(path.to_path_buf());
        Ok(Box::new(MockSource {
            clip,
            pos: 0,
            rewinds: Rc::clone(&self.rewinds),
        }))
    }
}

/// Advances by `step` every time it is read.
#[derive(Clone)]
pub struct SteppingClock {
    base: Instant,
    step: Duration,
    reads: Rc<Cell<u32>>,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            base: Instant::now(),
            step,
            reads: Rc::new(Cell::new(0)),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let n = self.reads.get();
        self.reads.set(n + 1);
        self.base + self.step * n
    }
}

/// Only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}

/// The usual fixture: 900-frame background at output size, 12-frame 4:3 sting.
pub fn standard_opener() -> MockOpener {
    MockOpener::new()
        .with(BG, Clip::new(900, 64, 36, 1))
        .with(STING, Clip::new(12, 48, 36, 2))
}
