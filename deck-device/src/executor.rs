//! Consumer-side command execution
//!
//! Turns one queued [`Command`] into the transport primitives that carry it
//! out on the connected model. Commands the hardware has no primitive for
//! are emulated with the primitives it does have, or dropped when no
//! emulation exists.

use deck_transport::{
    BoxedTransport, Capabilities, Color, Features, ImageTransform, Primitive, Rect, TransportError,
};
use image::RgbImage;
use tracing::{debug, warn};

use crate::command::Command;
use crate::imaging::{crop_exact, encode, solid};

pub(crate) struct Executor {
    transport: BoxedTransport,
    caps: Capabilities,
    jpeg_quality: u8,
}

impl Executor {
    pub(crate) fn new(transport: BoxedTransport, caps: Capabilities, jpeg_quality: u8) -> Self {
        Self {
            transport,
            caps,
            jpeg_quality,
        }
    }

    pub(crate) fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Execute one command to completion.
    ///
    /// `Close` is handled by the consumer loop and is a no-op here.
    pub(crate) async fn execute(&self, command: Command) -> Result<(), TransportError> {
        match command {
            Command::SetBrightness(percent) => {
                if !self.caps.has(Features::BRIGHTNESS) {
                    return self.drop_unsupported("set-brightness");
                }
                self.apply(Primitive::SetBrightness(percent.min(100))).await
            }
            Command::SetKeyImage { key, image } => self.key_image(key, &image).await,
            Command::FillKey { key, color } => self.fill_key(key, color).await,
            Command::SetSurfaceImage(image) => self.surface_image(&image).await,
            Command::FillSurface(color) => self.fill_surface(color).await,
            Command::SetStripImage(image) => self.strip_image(None, &image).await,
            Command::SetStripImageAt { rect, image } => {
                if !self.caps.has(Features::STRIP_IMAGE_AT) {
                    return self.drop_unsupported("set-strip-image-at");
                }
                self.strip_image(Some(rect), &image).await
            }
            Command::ShowLogo => {
                if !self.caps.has(Features::SHOW_LOGO) {
                    return self.drop_unsupported("show-logo");
                }
                self.apply(Primitive::ShowLogo).await
            }
            Command::Task(task) => {
                task.run();
                Ok(())
            }
            Command::Close => Ok(()),
        }
    }

    async fn apply(&self, primitive: Primitive) -> Result<(), TransportError> {
        self.transport.apply(&primitive).await
    }

    fn drop_unsupported(&self, kind: &str) -> Result<(), TransportError> {
        debug!("Dropping {}: not supported by this device", kind);
        Ok(())
    }

    /// Encode for the wire; `None` (after logging) if the encoder failed
    fn encode(&self, image: &RgbImage, transform: ImageTransform) -> Option<Vec<u8>> {
        match encode(image, self.caps.image_format, transform, self.jpeg_quality) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(
                    "Failed to encode {}x{} image: {}",
                    image.width(),
                    image.height(),
                    e
                );
                None
            }
        }
    }

    async fn key_image(&self, key: u8, image: &RgbImage) -> Result<(), TransportError> {
        if key >= self.caps.key_count {
            debug!("Dropping image for key {} (device has {})", key, self.caps.key_count);
            return Ok(());
        }
        if !self.caps.has(Features::KEY_IMAGE) {
            return self.drop_unsupported("set-key-image");
        }
        let Some(data) = self.encode(image, self.caps.key_transform) else {
            return Ok(());
        };
        self.apply(Primitive::SetKeyImage { key, data }).await
    }

    async fn fill_key(&self, key: u8, color: Color) -> Result<(), TransportError> {
        if key >= self.caps.key_count {
            debug!("Dropping fill for key {} (device has {})", key, self.caps.key_count);
            return Ok(());
        }
        if self.caps.has(Features::FILL_KEY) {
            return self.apply(Primitive::FillKey { key, color }).await;
        }
        self.key_image(key, &solid(self.caps.key_size, color)).await
    }

    async fn strip_image(&self, rect: Option<Rect>, image: &RgbImage) -> Result<(), TransportError> {
        if self.caps.strip.is_none() || !self.caps.has(Features::STRIP_IMAGE) {
            return self.drop_unsupported("set-strip-image");
        }
        let Some(data) = self.encode(image, ImageTransform::NONE) else {
            return Ok(());
        };
        self.apply(Primitive::SetStripImage { rect, data }).await
    }

    async fn fill_surface(&self, color: Color) -> Result<(), TransportError> {
        if self.caps.has(Features::FILL_SURFACE) {
            return self.apply(Primitive::FillSurface(color)).await;
        }
        if self.caps.has(Features::SURFACE_IMAGE) {
            let surface = solid(self.caps.surface_rect().size(), color);
            return self.surface_image(&surface).await;
        }

        for key in 0..self.caps.key_count {
            self.fill_key(key, color).await?;
        }
        if let Some(strip) = self.caps.strip_rect() {
            self.strip_image(None, &solid(strip.size(), color)).await?;
        }
        Ok(())
    }

    /// `image` covers the surface rectangle
    async fn surface_image(&self, image: &RgbImage) -> Result<(), TransportError> {
        if self.caps.has(Features::SURFACE_IMAGE) {
            let Some(data) = self.encode(image, ImageTransform::NONE) else {
                return Ok(());
            };
            return self.apply(Primitive::SetSurfaceImage(data)).await;
        }

        let surface = self.caps.surface_rect();
        for key in 0..self.caps.key_count {
            let Some(rect) = self.caps.key_rect(key) else {
                continue;
            };
            let cell = crop_exact(image, rect.relative_to(&surface));
            self.key_image(key, &cell).await?;
        }
        if let Some(strip) = self.caps.strip_rect() {
            let region = crop_exact(image, strip.relative_to(&surface));
            self.strip_image(None, &region).await?;
        }
        Ok(())
    }
}
