//! Input event monitor

use std::sync::atomic::Ordering;
use std::time::Duration;

use deck_device::{DeviceState, InputEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{finish, open_device, setup_interrupt_handler, CommandResult, Context};

/// Print typed input events until Ctrl-C or the device goes away
pub async fn watch(ctx: &Context) -> CommandResult {
    let running = setup_interrupt_handler();
    let device = open_device(ctx).await?;
    let mut events = device.subscribe_input();

    println!("Watching input (Ctrl-C to stop)...");
    while running.load(Ordering::SeqCst) {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Ok(event)) => println!("{}", describe(&event)),
            Ok(Err(RecvError::Lagged(n))) => warn!("Missed {} events", n),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => continue,
        }
    }

    if device.state() == DeviceState::Ready {
        finish(device).await;
    } else {
        println!("Device disconnected");
    }
    Ok(())
}

fn describe(event: &InputEvent) -> String {
    match event {
        InputEvent::KeyPress { key, down } => {
            format!("key {key:>2} {}", if *down { "down" } else { "up" })
        }
        InputEvent::EncoderPress { encoder, down } => {
            format!("encoder {encoder} {}", if *down { "pressed" } else { "released" })
        }
        InputEvent::EncoderRotate { encoder, delta } => {
            format!("encoder {encoder} rotate {delta:+}")
        }
        InputEvent::Touch(p) => format!("touch at ({}, {})", p.x, p.y),
        InputEvent::Fling {
            start,
            end,
            direction,
        } => format!(
            "fling {:?} ({}, {}) -> ({}, {})",
            direction, start.x, start.y, end.x, end.y
        ),
    }
}
