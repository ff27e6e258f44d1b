//! Device commands as queued by producers

use std::fmt;
use std::sync::Arc;

use deck_transport::{Color, Rect};
use image::RgbImage;

/// Shared, already-scaled image payload
pub type Image = Arc<RgbImage>;

/// Deferred bookkeeping closure executed on the consumer
pub struct Task(Box<dyn FnOnce() + Send + 'static>);

impl Task {
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

/// One pending operation on a device.
///
/// Self-contained: nothing happens until the consumer executes it.
pub enum Command {
    /// Backlight brightness in percent, already clamped to 0-100
    SetBrightness(u8),
    SetKeyImage { key: u8, image: Image },
    /// Image covering the whole surface rectangle
    SetSurfaceImage(Image),
    SetStripImage(Image),
    /// `rect` in strip-local coordinates, `image` sized to match
    SetStripImageAt { rect: Rect, image: Image },
    FillSurface(Color),
    FillKey { key: u8, color: Color },
    ShowLogo,
    Task(Task),
    Close,
}

impl Command {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Command::SetBrightness(_) => "set-brightness",
            Command::SetKeyImage { .. } => "set-key-image",
            Command::SetSurfaceImage(_) => "set-surface-image",
            Command::SetStripImage(_) => "set-strip-image",
            Command::SetStripImageAt { .. } => "set-strip-image-at",
            Command::FillSurface(_) => "fill-surface",
            Command::FillKey { .. } => "fill-key",
            Command::ShowLogo => "show-logo",
            Command::Task(_) => "task",
            Command::Close => "close",
        }
    }

    /// Commands that change pixels on the device
    pub fn is_drawing(&self) -> bool {
        matches!(
            self,
            Command::SetKeyImage { .. }
                | Command::SetSurfaceImage(_)
                | Command::SetStripImage(_)
                | Command::SetStripImageAt { .. }
                | Command::FillSurface(_)
                | Command::FillKey { .. }
        )
    }

    /// Key index targeted by a per-key drawing command
    pub fn key_target(&self) -> Option<u8> {
        match self {
            Command::SetKeyImage { key, .. } | Command::FillKey { key, .. } => Some(*key),
            _ => None,
        }
    }

    /// Strip-local rectangle of an addressed strip update
    pub fn strip_rect(&self) -> Option<Rect> {
        match self {
            Command::SetStripImageAt { rect, .. } => Some(*rect),
            _ => None,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = |image: &Image| format!("{}x{}", image.width(), image.height());
        match self {
            Command::SetBrightness(v) => write!(f, "SetBrightness({v})"),
            Command::SetKeyImage { key, image } => {
                write!(f, "SetKeyImage {{ key: {key}, image: {} }}", dims(image))
            }
            Command::SetSurfaceImage(image) => write!(f, "SetSurfaceImage({})", dims(image)),
            Command::SetStripImage(image) => write!(f, "SetStripImage({})", dims(image)),
            Command::SetStripImageAt { rect, image } => write!(
                f,
                "SetStripImageAt {{ rect: {rect}, image: {} }}",
                dims(image)
            ),
            Command::FillSurface(color) => write!(f, "FillSurface({color:?})"),
            Command::FillKey { key, color } => {
                write!(f, "FillKey {{ key: {key}, color: {color:?} }}")
            }
            Command::ShowLogo => f.write_str("ShowLogo"),
            Command::Task(task) => task.fmt(f),
            Command::Close => f.write_str("Close"),
        }
    }
}
