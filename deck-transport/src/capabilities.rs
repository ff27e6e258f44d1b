//! Device capability descriptor
//!
//! Built once when a device is attached (from the model registry or a
//! custom builder) and never mutated afterwards. Everything above the
//! transport treats it as read-only context; it is `Send + Sync` and safe to
//! read from producers and the consumer without locking.

use bitflags::bitflags;
use serde::Serialize;

use crate::types::{Rect, Size};

bitflags! {
    /// Hardware-native primitives and reported input classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct Features: u16 {
        const KEY_IMAGE = 1 << 0;
        const SURFACE_IMAGE = 1 << 1;
        const STRIP_IMAGE = 1 << 2;
        /// Addressed sub-rectangle updates of the strip
        const STRIP_IMAGE_AT = 1 << 3;
        const FILL_SURFACE = 1 << 4;
        const FILL_KEY = 1 << 5;
        const BRIGHTNESS = 1 << 6;
        const SHOW_LOGO = 1 << 7;
        const KEY_INPUT = 1 << 8;
        const ENCODER_INPUT = 1 << 9;
        const TOUCH_INPUT = 1 << 10;
    }
}

/// Image container the transport expects for image primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    Jpeg,
    Bmp,
}

/// Orientation fix-up applied to key images before encoding.
///
/// Several panels are mounted upside down; both flips together are a
/// 180 degree rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageTransform {
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl ImageTransform {
    pub const NONE: Self = Self {
        flip_horizontal: false,
        flip_vertical: false,
    };

    pub const ROTATE_180: Self = Self {
        flip_horizontal: true,
        flip_vertical: true,
    };

    pub fn is_identity(&self) -> bool {
        !self.flip_horizontal && !self.flip_vertical
    }
}

/// Key grid dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Grid {
    pub rows: u8,
    pub columns: u8,
}

/// Secondary touch strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StripGeometry {
    /// Strip position in frame coordinates
    pub rect: Rect,
    /// Number of logical sections (one per encoder on current hardware)
    pub sections: u8,
}

/// Immutable description of a connected device model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub key_count: u8,
    pub key_size: Size,
    pub grid: Grid,
    /// Gap between neighbouring keys in frame coordinates
    pub key_spacing: u32,
    pub strip: Option<StripGeometry>,
    /// Explicit full-screen rectangle, if the model has one
    pub surface: Option<Rect>,
    pub encoder_count: u8,
    pub image_format: ImageFormat,
    pub key_transform: ImageTransform,
    pub features: Features,
}

/// Reasons a descriptor is rejected by [`Capabilities::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("device reports no keys")]
    NoKeys,
    #[error("{key_count} keys do not fit a {rows}x{columns} grid")]
    GridTooSmall { key_count: u8, rows: u8, columns: u8 },
    #[error("key size must be non-zero")]
    EmptyKeySize,
    #[error("strip {0} lies outside the surface")]
    StripOutsideSurface(Rect),
    #[error("strip must have at least one section")]
    NoStripSections,
    #[error("key bitmask wider than 64 bits ({0} keys)")]
    TooManyKeys(u8),
}

impl Capabilities {
    /// Start a descriptor for a key grid; everything else defaults to off.
    pub fn builder(key_count: u8, grid: Grid, key_size: Size) -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            caps: Capabilities {
                key_count,
                key_size,
                grid,
                key_spacing: 0,
                strip: None,
                surface: None,
                encoder_count: 0,
                image_format: ImageFormat::Jpeg,
                key_transform: ImageTransform::NONE,
                features: Features::KEY_IMAGE | Features::KEY_INPUT,
            },
        }
    }

    /// Check that the descriptor is internally consistent
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if self.key_count == 0 {
            return Err(CapabilityError::NoKeys);
        }
        if self.key_count > 64 {
            return Err(CapabilityError::TooManyKeys(self.key_count));
        }
        if u16::from(self.key_count) > u16::from(self.grid.rows) * u16::from(self.grid.columns) {
            return Err(CapabilityError::GridTooSmall {
                key_count: self.key_count,
                rows: self.grid.rows,
                columns: self.grid.columns,
            });
        }
        if self.key_size.width == 0 || self.key_size.height == 0 {
            return Err(CapabilityError::EmptyKeySize);
        }
        if let Some(strip) = &self.strip {
            if strip.sections == 0 {
                return Err(CapabilityError::NoStripSections);
            }
            if !self.surface_rect().contains_rect(&strip.rect) {
                return Err(CapabilityError::StripOutsideSurface(strip.rect));
            }
        }
        Ok(())
    }

    pub fn has(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    /// Frame rectangle of key `index`, `None` for an out-of-range index.
    ///
    /// Keys are laid out row-major: column = `index % columns`,
    /// row = `index / columns`.
    pub fn key_rect(&self, index: u8) -> Option<Rect> {
        if index >= self.key_count || self.grid.columns == 0 {
            return None;
        }
        let column = u32::from(index % self.grid.columns);
        let row = u32::from(index / self.grid.columns);
        Some(Rect::new(
            column * (self.key_size.width + self.key_spacing),
            row * (self.key_size.height + self.key_spacing),
            self.key_size.width,
            self.key_size.height,
        ))
    }

    /// Bounding rectangle of the key grid
    pub fn grid_rect(&self) -> Rect {
        let columns = u32::from(self.grid.columns);
        let rows = u32::from(self.grid.rows);
        let width = columns * self.key_size.width + columns.saturating_sub(1) * self.key_spacing;
        let height = rows * self.key_size.height + rows.saturating_sub(1) * self.key_spacing;
        Rect::new(0, 0, width, height)
    }

    /// The full-screen rectangle: the explicit surface if the model has one,
    /// otherwise the bounding box of the key grid and the strip.
    pub fn surface_rect(&self) -> Rect {
        if let Some(surface) = self.surface {
            return surface;
        }
        let grid = self.grid_rect();
        match &self.strip {
            Some(strip) => grid.union(&strip.rect),
            None => grid,
        }
    }

    /// Strip rectangle in frame coordinates
    pub fn strip_rect(&self) -> Option<Rect> {
        self.strip.map(|s| s.rect)
    }

    /// Frame rectangle of strip section `index`
    pub fn strip_section_rect(&self, index: u8) -> Option<Rect> {
        let strip = self.strip?;
        if index >= strip.sections {
            return None;
        }
        let width = strip.rect.width / u32::from(strip.sections);
        Some(Rect::new(
            strip.rect.x + u32::from(index) * width,
            strip.rect.y,
            width,
            strip.rect.height,
        ))
    }
}

/// Builder for custom descriptors (tests, unusual hardware)
#[derive(Debug, Clone)]
pub struct CapabilitiesBuilder {
    caps: Capabilities,
}

impl CapabilitiesBuilder {
    pub fn key_spacing(mut self, spacing: u32) -> Self {
        self.caps.key_spacing = spacing;
        self
    }

    pub fn strip(mut self, rect: Rect, sections: u8) -> Self {
        self.caps.strip = Some(StripGeometry { rect, sections });
        self.caps.features |= Features::STRIP_IMAGE;
        self
    }

    pub fn surface(mut self, rect: Rect) -> Self {
        self.caps.surface = Some(rect);
        self
    }

    pub fn encoders(mut self, count: u8) -> Self {
        self.caps.encoder_count = count;
        if count > 0 {
            self.caps.features |= Features::ENCODER_INPUT;
        }
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.caps.image_format = format;
        self
    }

    pub fn key_transform(mut self, transform: ImageTransform) -> Self {
        self.caps.key_transform = transform;
        self
    }

    /// Add native features on top of the defaults
    pub fn features(mut self, features: Features) -> Self {
        self.caps.features |= features;
        self
    }

    /// Replace the feature set entirely
    pub fn only_features(mut self, features: Features) -> Self {
        self.caps.features = features;
        self
    }

    pub fn build(self) -> Capabilities {
        self.caps
    }
}
