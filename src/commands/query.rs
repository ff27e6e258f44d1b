//! Query command handlers: list, info

use deck_transport::{device_registry, Capabilities, Features, HidDiscovery, TransportDeviceInfo};
use serde::Serialize;

use super::{finish, open_device, CommandResult, Context};

/// List attached devices
pub fn list(json: bool) -> CommandResult {
    let devices = HidDiscovery::new().list_devices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No supported devices found");
        return Ok(());
    }
    for device in &devices {
        println!(
            "{:<16} {:04x}:{:04x}  serial={}  path={}",
            device.model,
            device.info.vid,
            device.info.pid,
            device.info.serial.as_deref().unwrap_or("-"),
            device.info.device_path
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct InfoReport<'a> {
    model: Option<&'static str>,
    #[serde(flatten)]
    info: &'a TransportDeviceInfo,
    capabilities: &'a Capabilities,
}

/// Show identity and capabilities of the selected device
pub async fn info(ctx: &Context, json: bool) -> CommandResult {
    let device = open_device(ctx).await?;
    let (Some(info), Some(caps)) = (device.info(), device.capabilities()) else {
        anyhow::bail!("device closed before it could be queried");
    };
    let model = device_registry::lookup(info.vid, info.pid).map(|m| m.name);

    if json {
        let report = InfoReport {
            model,
            info,
            capabilities: caps,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_info(model, info, caps);
    }

    finish(device).await;
    Ok(())
}

fn print_info(model: Option<&str>, info: &TransportDeviceInfo, caps: &Capabilities) {
    println!("Device:     {}", model.unwrap_or("unknown model"));
    println!("Product:    {}", info.display_name());
    println!("USB ID:     {:04x}:{:04x}", info.vid, info.pid);
    println!("Serial:     {}", info.serial.as_deref().unwrap_or("-"));
    println!(
        "Firmware:   {}",
        info.firmware_version.as_deref().unwrap_or("-")
    );
    println!("Protocol:   gen {}", info.protocol_version);
    println!(
        "Keys:       {} ({}x{}, {}x{} px)",
        caps.key_count,
        caps.grid.columns,
        caps.grid.rows,
        caps.key_size.width,
        caps.key_size.height
    );
    println!("Surface:    {}", caps.surface_rect());
    if let Some(strip) = &caps.strip {
        println!("Strip:      {} ({} sections)", strip.rect, strip.sections);
    }
    if caps.encoder_count > 0 {
        println!("Encoders:   {}", caps.encoder_count);
    }
    println!("Format:     {:?}", caps.image_format);

    let names: Vec<&str> = caps.features.iter_names().map(|(name, _)| name).collect();
    println!("Features:   {}", names.join(" "));
    if !caps.has(Features::FILL_KEY) {
        println!("            (fills emulated with key images)");
    }
}
