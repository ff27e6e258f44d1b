//! Drawing and settings command handlers

use std::path::Path;

use anyhow::Context as _;
use deck_device::ScaleMode;
use deck_transport::Color;
use tracing::info;

use super::{finish, open_device, CommandResult, Context};

/// Set backlight brightness
pub async fn brightness(ctx: &Context, percent: u8) -> CommandResult {
    let device = open_device(ctx).await?;
    device.set_brightness(percent);
    finish(device).await;
    println!("Brightness set to {percent}%");
    Ok(())
}

/// Fill the whole surface or a single key
pub async fn fill(ctx: &Context, color: Color, key: Option<u8>) -> CommandResult {
    let device = open_device(ctx).await?;
    if let Some(key) = key {
        check_key(device.capabilities().map(|c| c.key_count), key)?;
        device.fill_key(key, color);
    } else {
        device.fill_surface(color);
    }
    finish(device).await;
    Ok(())
}

/// Draw an image file on the surface, a key, or the strip
pub async fn draw_image(
    ctx: &Context,
    path: &Path,
    key: Option<u8>,
    strip: bool,
    scale: Option<ScaleMode>,
) -> CommandResult {
    let source = image::open(path).with_context(|| format!("loading {}", path.display()))?;
    let mode = scale.unwrap_or(ctx.config.session.default_scale_mode);

    let device = open_device(ctx).await?;
    let caps = device
        .capabilities()
        .cloned()
        .context("device closed while opening")?;

    match key {
        Some(key) => {
            check_key(Some(caps.key_count), key)?;
            device.set_key_image(key, &source, mode);
        }
        None if strip => {
            if caps.strip.is_none() {
                device.close();
                anyhow::bail!("this device has no touch strip");
            }
            device.set_strip_image(&source, mode);
        }
        None => device.set_surface_image(&source, mode),
    }
    info!("Sent {} ({} scaling)", path.display(), mode);

    finish(device).await;
    Ok(())
}

/// Reset to the vendor logo
pub async fn logo(ctx: &Context) -> CommandResult {
    let device = open_device(ctx).await?;
    device.show_logo();
    finish(device).await;
    Ok(())
}

fn check_key(key_count: Option<u8>, key: u8) -> CommandResult {
    match key_count {
        Some(count) if key >= count => {
            anyhow::bail!("key {key} out of range (device has {count} keys)")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key(Some(15), 14).is_ok());
        assert!(check_key(Some(15), 15).is_err());
        assert!(check_key(None, 200).is_ok());
    }
}
