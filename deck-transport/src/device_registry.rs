//! Device registry - capability descriptors by USB product id
//!
//! Only gen-2 hardware (JPEG images, 1024-byte image reports) is listed;
//! anything else is not opened by the HID backend.

use crate::capabilities::{Capabilities, Features, Grid, ImageFormat, ImageTransform};
use crate::types::{Rect, Size};

/// Elgato vendor ID
pub const VENDOR_ID: u16 = 0x0FD9;

/// Known product IDs
pub mod pid {
    pub const ORIGINAL_V2: u16 = 0x006D;
    pub const MK2: u16 = 0x0080;
    pub const XL: u16 = 0x006C;
    pub const XL_V2: u16 = 0x008F;
    pub const PLUS: u16 = 0x0084;
}

/// A supported hardware model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    pub pid: u16,
    pub name: &'static str,
    kind: ModelKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Original,
    Xl,
    Plus,
}

/// All models the HID backend can drive
pub const MODELS: &[Model] = &[
    Model {
        pid: pid::ORIGINAL_V2,
        name: "Stream Deck Original V2",
        kind: ModelKind::Original,
    },
    Model {
        pid: pid::MK2,
        name: "Stream Deck MK.2",
        kind: ModelKind::Original,
    },
    Model {
        pid: pid::XL,
        name: "Stream Deck XL",
        kind: ModelKind::Xl,
    },
    Model {
        pid: pid::XL_V2,
        name: "Stream Deck XL V2",
        kind: ModelKind::Xl,
    },
    Model {
        pid: pid::PLUS,
        name: "Stream Deck +",
        kind: ModelKind::Plus,
    },
];

/// Natively supported primitives shared by all listed models
const BASE_FEATURES: Features = Features::KEY_IMAGE
    .union(Features::BRIGHTNESS)
    .union(Features::SHOW_LOGO)
    .union(Features::KEY_INPUT);

impl Model {
    /// Whether this model reports encoders and touch in typed input reports
    pub fn has_typed_input(&self) -> bool {
        self.kind == ModelKind::Plus
    }

    /// Build the capability descriptor for this model
    pub fn capabilities(&self) -> Capabilities {
        match self.kind {
            ModelKind::Original => {
                Capabilities::builder(15, Grid { rows: 3, columns: 5 }, Size::new(72, 72))
                    .image_format(ImageFormat::Jpeg)
                    .key_transform(ImageTransform::ROTATE_180)
                    .only_features(BASE_FEATURES)
                    .build()
            }
            ModelKind::Xl => {
                Capabilities::builder(32, Grid { rows: 4, columns: 8 }, Size::new(96, 96))
                    .image_format(ImageFormat::Jpeg)
                    .key_transform(ImageTransform::ROTATE_180)
                    .only_features(BASE_FEATURES)
                    .build()
            }
            ModelKind::Plus => {
                Capabilities::builder(8, Grid { rows: 2, columns: 4 }, Size::new(120, 120))
                    .key_spacing(40)
                    .image_format(ImageFormat::Jpeg)
                    .only_features(BASE_FEATURES)
                    .strip(Rect::new(0, 280, 800, 100), 4)
                    .encoders(4)
                    .features(Features::STRIP_IMAGE_AT | Features::TOUCH_INPUT)
                    .build()
            }
        }
    }
}

/// Look up a model by vendor and product id
pub fn lookup(vid: u16, pid: u16) -> Option<&'static Model> {
    if vid != VENDOR_ID {
        return None;
    }
    MODELS.iter().find(|m| m.pid == pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_models_validate() {
        for model in MODELS {
            assert!(
                model.capabilities().validate().is_ok(),
                "{} has an invalid descriptor",
                model.name
            );
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(VENDOR_ID, pid::XL).map(|m| m.name), Some("Stream Deck XL"));
        assert!(lookup(0x1234, pid::XL).is_none());
        assert!(lookup(VENDOR_ID, 0x0060).is_none());
    }

    #[test]
    fn test_plus_descriptor() {
        let caps = lookup(VENDOR_ID, pid::PLUS).unwrap().capabilities();
        assert_eq!(caps.encoder_count, 4);
        assert!(caps.has(Features::STRIP_IMAGE | Features::STRIP_IMAGE_AT));
        assert!(caps.has(Features::ENCODER_INPUT | Features::TOUCH_INPUT));
        assert!(caps.key_transform.is_identity());
        assert!(!caps.has(Features::FILL_KEY));
    }
}
