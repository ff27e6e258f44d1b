//! Session façade tests against an in-memory recording transport

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deck_device::{
    Device, DeviceError, DeviceState, FlingDirection, InputEvent, InvalidationMark, ScaleMode,
    SessionConfig,
};
use deck_transport::{
    BoxedTransport, Capabilities, Color, Connector, Features, Grid, InputReport, Point, Primitive,
    Rect, Size, TimestampedReport, Transport, TransportDeviceInfo, TransportError,
};
use image::{DynamicImage, RgbImage};
use parking_lot::Mutex;
use tokio::sync::broadcast;

const TIMEOUT: Duration = Duration::from_secs(2);

struct RecordingTransport {
    info: TransportDeviceInfo,
    caps: Capabilities,
    applied: Mutex<Vec<Primitive>>,
    fail: AtomicBool,
    closed: AtomicBool,
    unplugged: AtomicBool,
    input: Mutex<Option<broadcast::Sender<TimestampedReport>>>,
}

impl RecordingTransport {
    fn new(caps: Capabilities, protocol_version: u8) -> Arc<Self> {
        let (input, _) = broadcast::channel(16);
        Arc::new(Self {
            info: TransportDeviceInfo {
                vid: 0x0FD9,
                pid: 0x0084,
                device_path: "mock".into(),
                serial: Some("TEST0001".into()),
                product_name: Some("Mock Deck".into()),
                firmware_version: Some("1.0.0".into()),
                protocol_version,
            },
            caps,
            applied: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            unplugged: AtomicBool::new(false),
            input: Mutex::new(Some(input)),
        })
    }

    fn applied(&self) -> Vec<Primitive> {
        self.applied.lock().clone()
    }

    fn names(&self) -> Vec<&'static str> {
        self.applied.lock().iter().map(Primitive::name).collect()
    }

    fn inject(&self, report: InputReport) {
        if let Some(tx) = self.input.lock().as_ref() {
            tx.send(TimestampedReport::new(0.0, report)).unwrap();
        }
    }

    /// Same contract as the HID reader giving up: link down, stream closed
    fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
        self.input.lock().take();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    async fn apply(&self, primitive: &Primitive) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) || self.unplugged.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.applied.lock().push(primitive.clone());
        Ok(())
    }

    fn subscribe_input(&self) -> Option<broadcast::Receiver<TimestampedReport>> {
        self.input.lock().as_ref().map(|tx| tx.subscribe())
    }

    async fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.unplugged.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.input.lock().take();
        Ok(())
    }
}

struct MockConnector(Arc<RecordingTransport>);

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> Result<BoxedTransport, TransportError> {
        let transport: BoxedTransport = self.0.clone();
        Ok(transport)
    }
}

struct MissingConnector;

#[async_trait]
impl Connector for MissingConnector {
    async fn open(&self) -> Result<BoxedTransport, TransportError> {
        Err(TransportError::DeviceNotFound("no supported device found".into()))
    }
}

/// 15 keys, 5x3, 72 px, no strip, no native fill
fn original() -> Capabilities {
    Capabilities::builder(15, Grid { rows: 3, columns: 5 }, Size::new(72, 72))
        .features(Features::BRIGHTNESS | Features::SHOW_LOGO)
        .build()
}

/// 8 keys with a 800x100 strip that takes sub-rectangle updates
fn plus() -> Capabilities {
    Capabilities::builder(8, Grid { rows: 2, columns: 4 }, Size::new(120, 120))
        .key_spacing(40)
        .strip(Rect::new(0, 280, 800, 100), 4)
        .encoders(4)
        .features(Features::STRIP_IMAGE_AT | Features::TOUCH_INPUT | Features::BRIGHTNESS)
        .build()
}

async fn started(caps: Capabilities) -> (Device, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new(caps, 2);
    let device = Device::new(MockConnector(transport.clone()), SessionConfig::default());
    device.start().await.unwrap();
    assert_eq!(device.state(), DeviceState::Ready);
    (device, transport)
}

async fn next_event(rx: &mut broadcast::Receiver<InputEvent>) -> InputEvent {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("no input event")
        .expect("input stream ended")
}

#[tokio::test]
async fn test_brightness_clamped_to_100() {
    let (device, transport) = started(original()).await;
    device.set_brightness(180);
    device.sync().await;
    assert_eq!(transport.applied(), vec![Primitive::SetBrightness(100)]);
}

#[tokio::test]
async fn test_fill_surface_emulated_with_key_images() {
    let (device, transport) = started(original()).await;
    device.fill_surface(Color::new(0, 0, 255));
    device.sync().await;

    let applied = transport.applied();
    assert_eq!(applied.len(), 15);
    let keys: Vec<u8> = applied
        .iter()
        .map(|p| match p {
            Primitive::SetKeyImage { key, .. } => *key,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(keys, (0..15).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_fill_surface_coalesces_pending_key_draws() {
    let (device, transport) = started(original()).await;
    // The consumer has not run yet on this single-threaded runtime
    device.fill_key(2, Color::WHITE);
    device.fill_key(5, Color::WHITE);
    device.fill_surface(Color::BLACK);
    assert_eq!(device.pending(), 1);
    device.sync().await;
    assert_eq!(transport.applied().len(), 15);
}

#[tokio::test]
async fn test_close_discards_pending_commands() {
    let (device, transport) = started(original()).await;
    for key in 0..10 {
        device.fill_key(key, Color::WHITE);
    }
    device.show_logo();
    device.close();
    device.show_logo();

    let state = tokio::time::timeout(TIMEOUT, device.closed()).await.unwrap();
    assert_eq!(state, DeviceState::Closed);
    assert!(transport.applied().is_empty());
    assert!(transport.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_fatal_error_closes_session() {
    let (device, transport) = started(original()).await;
    let mut events = device.subscribe_input();
    let handler_runs = Arc::new(AtomicUsize::new(0));
    {
        let runs = handler_runs.clone();
        device.on_close(move || {
            runs.fetch_add(1, Ordering::SeqCst);
        });
    }

    transport.fail.store(true, Ordering::SeqCst);
    device.fill_key(0, Color::WHITE);
    device.fill_key(1, Color::WHITE);

    let state = tokio::time::timeout(TIMEOUT, device.closed()).await.unwrap();
    assert_eq!(state, DeviceState::Closed);
    assert_eq!(handler_runs.load(Ordering::SeqCst), 1);
    assert!(matches!(
        events.recv().await,
        Err(broadcast::error::RecvError::Closed)
    ));

    // Misuse after close is a silent no-op
    device.fill_key(3, Color::WHITE);
    device.close();
    assert_eq!(device.pending(), 0);
    assert_eq!(handler_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_handler_registered_late_runs_immediately() {
    let (device, _transport) = started(original()).await;
    device.close();
    device.closed().await;

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    device.on_close(move || flag.store(true, Ordering::SeqCst));
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_protocol_mismatch_fails() {
    let transport = RecordingTransport::new(original(), 1);
    let device = Device::new(MockConnector(transport.clone()), SessionConfig::default());

    let err = device.start().await.unwrap_err();
    assert!(matches!(
        err,
        DeviceError::VersionMismatch { found: 1, .. }
    ));
    assert!(matches!(device.state(), DeviceState::Failed(_)));
    assert!(transport.closed.load(Ordering::SeqCst));

    device.fill_key(0, Color::WHITE);
    assert_eq!(device.pending(), 0);
}

#[tokio::test]
async fn test_invalid_descriptor_fails() {
    let caps = Capabilities::builder(20, Grid { rows: 3, columns: 5 }, Size::new(72, 72)).build();
    let transport = RecordingTransport::new(caps, 2);
    let device = Device::new(MockConnector(transport), SessionConfig::default());
    assert!(matches!(
        device.start().await,
        Err(DeviceError::InvalidCapabilities(_))
    ));
    assert!(matches!(device.state(), DeviceState::Failed(_)));
}

#[tokio::test]
async fn test_open_failure_and_restart_rejected() {
    let device = Device::new(MissingConnector, SessionConfig::default());
    assert!(matches!(
        device.start().await,
        Err(DeviceError::Transport(TransportError::DeviceNotFound(_)))
    ));
    assert!(matches!(
        device.start().await,
        Err(DeviceError::InvalidState(DeviceState::Failed(_)))
    ));
}

#[tokio::test]
async fn test_close_before_start() {
    let transport = RecordingTransport::new(original(), 2);
    let device = Device::new(MockConnector(transport), SessionConfig::default());
    device.close();
    assert_eq!(device.state(), DeviceState::Closed);
    assert!(device.start().await.is_err());
}

#[tokio::test]
async fn test_key_presses_become_edges() {
    let (device, transport) = started(original()).await;
    let mut events = device.subscribe_input();

    transport.inject(InputReport::Keys(0b000));
    transport.inject(InputReport::Keys(0b101));
    transport.inject(InputReport::Keys(0b100));

    assert_eq!(
        next_event(&mut events).await,
        InputEvent::KeyPress { key: 0, down: true }
    );
    assert_eq!(
        next_event(&mut events).await,
        InputEvent::KeyPress { key: 2, down: true }
    );
    assert_eq!(
        next_event(&mut events).await,
        InputEvent::KeyPress {
            key: 0,
            down: false
        }
    );
}

#[tokio::test]
async fn test_touch_strip_events() {
    let (device, transport) = started(plus()).await;
    let mut events = device.subscribe_input();

    transport.inject(InputReport::Fling {
        start: Point::new(10, 50),
        end: Point::new(90, 52),
    });
    transport.inject(InputReport::Rotate(vec![0, 3, 0, 0]));

    assert!(matches!(
        next_event(&mut events).await,
        InputEvent::Fling {
            direction: FlingDirection::Right,
            ..
        }
    ));
    assert_eq!(
        next_event(&mut events).await,
        InputEvent::EncoderRotate {
            encoder: 1,
            delta: 3
        }
    );
}

#[tokio::test]
async fn test_unplug_closes_session() {
    let (device, transport) = started(original()).await;
    let mut events = device.subscribe_input();
    transport.unplug();
    assert!(!transport.is_connected().await);
    assert!(transport.subscribe_input().is_none());

    let state = tokio::time::timeout(TIMEOUT, device.closed()).await.unwrap();
    assert_eq!(state, DeviceState::Closed);
    assert!(transport.applied().is_empty());
    assert!(events.recv().await.is_err());
    assert!(device.subscribe_input().recv().await.is_err());
}

#[tokio::test]
async fn test_present_sends_only_dirty_regions() {
    let (device, transport) = started(plus()).await;
    let frame = RgbImage::new(800, 380);

    device.invalidate(InvalidationMark::Key(5));
    device.invalidate(InvalidationMark::StripRect(Rect::new(200, 290, 100, 50)));
    device.present(&frame);
    device.sync().await;

    let applied = transport.applied();
    assert_eq!(applied.len(), 2);
    assert!(matches!(applied[0], Primitive::SetKeyImage { key: 5, .. }));
    assert!(matches!(
        applied[1],
        Primitive::SetStripImage {
            rect: Some(Rect {
                x: 200,
                y: 10,
                width: 100,
                height: 50
            }),
            ..
        }
    ));

    // Nothing marked: nothing sent
    device.present(&frame);
    device.sync().await;
    assert_eq!(transport.applied().len(), 2);
}

#[tokio::test]
async fn test_strip_updates_through_api() {
    let (device, transport) = started(plus()).await;
    let image = DynamicImage::ImageRgb8(RgbImage::new(50, 50));

    device.set_strip_image_at(&image, Rect::new(0, 0, 200, 100), ScaleMode::Fill);
    // Outside the strip: ignored
    device.set_strip_image_at(&image, Rect::new(700, 0, 200, 100), ScaleMode::Fill);
    device.set_strip_image_at(&image, Rect::new(u32::MAX - 5, 0, 10, 10), ScaleMode::Fill);
    device.invalidate(InvalidationMark::StripRect(Rect::new(u32::MAX - 5, 300, 10, 10)));
    device.present(&RgbImage::new(800, 380));
    device.set_key_image(3, &image, ScaleMode::Fit);
    device.sync().await;

    assert_eq!(transport.names(), vec!["set-strip-image-at", "set-key-image"]);
}

#[tokio::test]
async fn test_key_handle_draws_its_key() {
    let (device, transport) = started(original()).await;
    let handle = device.key(7);
    assert_eq!(handle.rect(), Some(Rect::new(144, 72, 72, 72)));

    handle.fill(Color::WHITE);
    device.sync().await;
    assert!(matches!(
        transport.applied()[..],
        [Primitive::SetKeyImage { key: 7, .. }]
    ));
}

#[tokio::test]
async fn test_device_info_exposed() {
    let (device, _transport) = started(plus()).await;
    let info = device.info().unwrap();
    assert_eq!(info.serial.as_deref(), Some("TEST0001"));
    assert_eq!(info.firmware_version.as_deref(), Some("1.0.0"));
    assert_eq!(device.capabilities().map(|c| c.key_count), Some(8));
}
