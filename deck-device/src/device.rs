//! Device session façade
//!
//! [`Device`] owns one connected device: the command queue, the consumer
//! task that drains it into the transport, the input task that turns raw
//! snapshots into [`InputEvent`]s, and the dirty-region tracker used by the
//! rendering boundary.
//!
//! Lifecycle:
//!
//! ```text
//! Idle --start--> Opening --ok--> Ready --close / link lost--> Closed
//!                    |
//!                    +--error--> Failed
//! ```
//!
//! Producer calls made outside `Ready` are ignored.

use std::fmt;
use std::sync::{Arc, OnceLock};

use deck_transport::{
    BoxedTransport, Capabilities, Color, Connector, Rect, TimestampedReport, TransportDeviceInfo,
};
use image::{DynamicImage, RgbImage};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, Task};
use crate::config::SessionConfig;
use crate::dirty::{DirtyTracker, InvalidationMark};
use crate::error::DeviceError;
use crate::executor::Executor;
use crate::imaging::{scale, ScaleMode};
use crate::input::{InputDecoder, InputEvent};
use crate::queue::CommandQueue;

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeviceState {
    Idle,
    Opening,
    Ready,
    Closed,
    /// Opening failed; carries the reason
    Failed(String),
}

impl DeviceState {
    /// `Closed` and `Failed` are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceState::Closed | DeviceState::Failed(_))
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Idle => f.write_str("idle"),
            DeviceState::Opening => f.write_str("opening"),
            DeviceState::Ready => f.write_str("ready"),
            DeviceState::Closed => f.write_str("closed"),
            DeviceState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

type CloseHandler = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct CloseHooks {
    handlers: Vec<CloseHandler>,
    fired: bool,
}

/// State shared between the façade and its background tasks
struct Lifecycle {
    state: watch::Sender<DeviceState>,
    events: Mutex<Option<broadcast::Sender<InputEvent>>>,
    close_hooks: Mutex<CloseHooks>,
}

impl Lifecycle {
    fn set_state(&self, state: DeviceState) {
        info!("Device {}", state);
        self.state.send_replace(state);
    }

    /// Run registered close handlers; later registrations run immediately
    fn fire_close_hooks(&self) {
        let handlers = {
            let mut hooks = self.close_hooks.lock();
            hooks.fired = true;
            std::mem::take(&mut hooks.handlers)
        };
        if !handlers.is_empty() {
            debug!("Running {} close handlers", handlers.len());
        }
        for handler in handlers {
            handler();
        }
    }

    /// Drop the event sender so every subscriber sees the stream end
    fn end_input(&self) {
        self.events.lock().take();
    }

    fn publish(&self, event: InputEvent) -> bool {
        let events = self.events.lock();
        let Some(tx) = events.as_ref() else {
            return false;
        };
        trace!("Input event: {:?}", event);
        // No subscribers is fine
        let _ = tx.send(event);
        true
    }
}

/// Everything that exists once the transport is open
struct Session {
    transport: BoxedTransport,
    caps: Capabilities,
    tracker: Mutex<DirtyTracker>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    queue: Arc<CommandQueue>,
    lifecycle: Arc<Lifecycle>,
    session: OnceLock<Session>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: let the consumer wind down
        self.queue.enqueue(Command::Close);
    }
}

/// Handle to one device session.
///
/// Cheap to clone; all clones drive the same device. Dropping the last
/// clone closes the session.
#[derive(Clone)]
pub struct Device {
    shared: Arc<Shared>,
}

impl Device {
    /// Create an idle session that will open its transport through `connector`
    pub fn new<C>(connector: C, config: SessionConfig) -> Self
    where
        C: Connector + 'static,
    {
        let (state, _) = watch::channel(DeviceState::Idle);
        let (events, _) = broadcast::channel(config.input_channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                connector: Arc::new(connector),
                config,
                queue: Arc::new(CommandQueue::new()),
                lifecycle: Arc::new(Lifecycle {
                    state,
                    events: Mutex::new(Some(events)),
                    close_hooks: Mutex::new(CloseHooks::default()),
                }),
                session: OnceLock::new(),
            }),
        }
    }

    // === Lifecycle ===

    /// Open the transport and start the consumer and input tasks.
    ///
    /// Only valid from `Idle`. On error the session moves to `Failed` and
    /// stays there.
    pub async fn start(&self) -> Result<(), DeviceError> {
        let mut allowed = false;
        self.shared.lifecycle.state.send_if_modified(|state| {
            if *state == DeviceState::Idle {
                *state = DeviceState::Opening;
                allowed = true;
            }
            allowed
        });
        if !allowed {
            return Err(DeviceError::InvalidState(self.state()));
        }
        debug!("Opening device");

        let session = match self.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to open device: {}", e);
                self.shared.queue.shutdown();
                self.shared.lifecycle.fire_close_hooks();
                self.shared.lifecycle.end_input();
                self.shared
                    .lifecycle
                    .set_state(DeviceState::Failed(e.to_string()));
                return Err(e);
            }
        };

        let transport = Arc::clone(&session.transport);
        let caps = session.caps.clone();
        let info = transport.device_info();
        info!(
            "Opened {} (serial {}, firmware {})",
            info.display_name(),
            info.serial.as_deref().unwrap_or("unknown"),
            info.firmware_version.as_deref().unwrap_or("unknown")
        );
        if self.shared.session.set(session).is_err() {
            return Err(DeviceError::InvalidState(self.state()));
        }

        self.shared.lifecycle.set_state(DeviceState::Ready);

        let input = transport.subscribe_input().map(|rx| {
            tokio::spawn(run_input(
                rx,
                InputDecoder::new(caps.key_count, caps.encoder_count),
                Arc::clone(&self.shared.lifecycle),
                Arc::clone(&self.shared.queue),
            ))
        });
        if input.is_none() {
            debug!("Transport has no input endpoint");
        }

        let executor = Executor::new(transport, caps, self.shared.config.jpeg_quality);
        tokio::spawn(run_consumer(
            Arc::clone(&self.shared.queue),
            executor,
            Arc::clone(&self.shared.lifecycle),
            input,
        ));
        Ok(())
    }

    async fn open(&self) -> Result<Session, DeviceError> {
        let transport = self.shared.connector.open().await?;

        let version = transport.device_info().protocol_version;
        if !self.shared.config.supports_protocol(version) {
            release(&transport).await;
            return Err(DeviceError::VersionMismatch {
                found: version,
                supported: self.shared.config.supported_protocols.clone(),
            });
        }

        let caps = transport.capabilities().clone();
        if let Err(e) = caps.validate() {
            release(&transport).await;
            return Err(e.into());
        }

        Ok(Session {
            transport,
            caps,
            tracker: Mutex::new(DirtyTracker::new()),
        })
    }

    /// Request shutdown.
    ///
    /// Pending commands are discarded; the command in flight finishes, close
    /// handlers run, then the transport is released. Idempotent.
    pub fn close(&self) {
        let mut was_idle = false;
        self.shared.lifecycle.state.send_if_modified(|state| {
            if *state == DeviceState::Idle {
                *state = DeviceState::Closed;
                was_idle = true;
            }
            was_idle
        });
        if was_idle {
            info!("Device closed before start");
            self.shared.queue.shutdown();
            self.shared.lifecycle.fire_close_hooks();
            self.shared.lifecycle.end_input();
            return;
        }
        self.shared.queue.enqueue(Command::Close);
    }

    /// Register `handler` to run once when the session ends.
    ///
    /// Runs immediately if the session has already ended.
    pub fn on_close<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut hooks = self.shared.lifecycle.close_hooks.lock();
        if hooks.fired {
            drop(hooks);
            handler();
            return;
        }
        hooks.handlers.push(Box::new(handler));
    }

    /// Current lifecycle state
    pub fn state(&self) -> DeviceState {
        self.shared.lifecycle.state.borrow().clone()
    }

    /// Observe lifecycle transitions
    pub fn watch_state(&self) -> watch::Receiver<DeviceState> {
        self.shared.lifecycle.state.subscribe()
    }

    /// Wait until the session reaches `Closed` or `Failed`
    pub async fn closed(&self) -> DeviceState {
        let mut rx = self.watch_state();
        let state = match rx.wait_for(DeviceState::is_terminal).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Resolve once every command enqueued before this call has executed.
    ///
    /// Also resolves if the session ends first.
    pub async fn sync(&self) {
        if self.ready("sync").is_none() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.shared.queue.enqueue(Command::Task(Task::new(move || {
            let _ = tx.send(());
        })));
        let _ = rx.await;
    }

    /// Run `f` on the consumer, in order with the drawing commands
    pub fn enqueue_task<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.ready("task").is_some() {
            self.shared.queue.enqueue(Command::Task(Task::new(f)));
        }
    }

    // === Device Info ===

    /// Capability descriptor, once the session is open
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.shared.session.get().map(|s| &s.caps)
    }

    /// Identity of the connected device (serial, firmware, product)
    pub fn info(&self) -> Option<&TransportDeviceInfo> {
        self.shared.session.get().map(|s| s.transport.device_info())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Number of commands waiting for the consumer
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    // === Input ===

    /// Subscribe to typed input events.
    ///
    /// The stream ends when the session ends; subscribing afterwards yields
    /// an already-ended stream.
    pub fn subscribe_input(&self) -> broadcast::Receiver<InputEvent> {
        if let Some(tx) = self.shared.lifecycle.events.lock().as_ref() {
            return tx.subscribe();
        }
        let (_, rx) = broadcast::channel(1);
        rx
    }

    // === Drawing ===

    /// Backlight brightness, clamped to 0-100
    pub fn set_brightness(&self, percent: u8) {
        self.submit(Command::SetBrightness(percent.min(100)));
    }

    pub fn set_key_image(&self, key: u8, image: &DynamicImage, mode: ScaleMode) {
        let Some(caps) = self.ready("set-key-image") else {
            return;
        };
        if key >= caps.key_count {
            debug!("Ignoring image for key {} (device has {})", key, caps.key_count);
            return;
        }
        let image = Arc::new(scale(image, caps.key_size, mode));
        self.submit(Command::SetKeyImage { key, image });
    }

    /// Image covering the whole surface
    pub fn set_surface_image(&self, image: &DynamicImage, mode: ScaleMode) {
        let Some(caps) = self.ready("set-surface-image") else {
            return;
        };
        let image = Arc::new(scale(image, caps.surface_rect().size(), mode));
        self.submit(Command::SetSurfaceImage(image));
    }

    pub fn set_strip_image(&self, image: &DynamicImage, mode: ScaleMode) {
        let Some(caps) = self.ready("set-strip-image") else {
            return;
        };
        let Some(strip) = caps.strip_rect() else {
            debug!("Ignoring strip image: device has no strip");
            return;
        };
        let image = Arc::new(scale(image, strip.size(), mode));
        self.submit(Command::SetStripImage(image));
    }

    /// Update part of the strip; `rect` is in strip-local coordinates
    pub fn set_strip_image_at(&self, image: &DynamicImage, rect: Rect, mode: ScaleMode) {
        let Some(caps) = self.ready("set-strip-image-at") else {
            return;
        };
        let Some(strip) = caps.strip_rect() else {
            debug!("Ignoring strip image: device has no strip");
            return;
        };
        if rect.is_empty() || !Rect::from_size(strip.size()).contains_rect(&rect) {
            debug!("Ignoring strip update {} outside strip {}", rect, Rect::from_size(strip.size()));
            return;
        }
        let image = Arc::new(scale(image, rect.size(), mode));
        self.submit(Command::SetStripImageAt { rect, image });
    }

    pub fn fill_surface(&self, color: Color) {
        self.submit(Command::FillSurface(color));
    }

    pub fn fill_key(&self, key: u8, color: Color) {
        self.submit(Command::FillKey { key, color });
    }

    /// Reset the display to the vendor logo
    pub fn show_logo(&self) {
        self.submit(Command::ShowLogo);
    }

    // === Rendering boundary ===

    /// Record that a region changed; nothing is sent until [`Device::present`]
    pub fn invalidate(&self, mark: InvalidationMark) {
        let Some(session) = self.session_if_ready("invalidate") else {
            return;
        };
        session.tracker.lock().mark_dirty(mark);
    }

    /// Flush invalidated regions of `frame` to the device.
    ///
    /// `frame` covers the surface rectangle in frame coordinates.
    pub fn present(&self, frame: &RgbImage) {
        let Some(session) = self.session_if_ready("present") else {
            return;
        };
        let commands = session.tracker.lock().flush(frame, &session.caps);
        for command in commands {
            self.shared.queue.enqueue(command);
        }
    }

    /// Handle for one key, for visual elements that draw themselves
    pub fn key(&self, index: u8) -> KeyHandle {
        KeyHandle {
            device: self.clone(),
            index,
        }
    }

    fn submit(&self, command: Command) {
        if self.ready(command.kind()).is_some() {
            self.shared.queue.enqueue(command);
        }
    }

    fn session_if_ready(&self, op: &str) -> Option<&Session> {
        let state = self.shared.lifecycle.state.borrow().clone();
        if state != DeviceState::Ready {
            debug!("Ignoring {} in state {}", op, state);
            return None;
        }
        self.shared.session.get()
    }

    fn ready(&self, op: &str) -> Option<&Capabilities> {
        self.session_if_ready(op).map(|s| &s.caps)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Back-reference from a visual element to the key it occupies
#[derive(Debug, Clone)]
pub struct KeyHandle {
    device: Device,
    index: u8,
}

impl KeyHandle {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Frame rectangle of this key, once the session is open
    pub fn rect(&self) -> Option<Rect> {
        self.device.capabilities()?.key_rect(self.index)
    }

    pub fn draw(&self, image: &DynamicImage, mode: ScaleMode) {
        self.device.set_key_image(self.index, image, mode);
    }

    pub fn fill(&self, color: Color) {
        self.device.fill_key(self.index, color);
    }

    pub fn invalidate(&self) {
        self.device.invalidate(InvalidationMark::Key(self.index));
    }
}

async fn release(transport: &BoxedTransport) {
    if let Err(e) = transport.close().await {
        debug!("Error closing transport: {}", e);
    }
}

/// Drain the queue into the transport until `Close` or a fatal error
async fn run_consumer(
    queue: Arc<CommandQueue>,
    executor: Executor,
    lifecycle: Arc<Lifecycle>,
    input: Option<JoinHandle<()>>,
) {
    while let Some(command) = queue.next().await {
        if let Command::Close = command {
            debug!("Close requested");
            break;
        }
        let kind = command.kind();
        trace!("Executing {}", kind);
        if let Err(e) = executor.execute(command).await {
            if e.is_fatal() {
                warn!("{} failed, closing device: {}", kind, e);
                let discarded = queue.shutdown();
                if discarded > 0 {
                    debug!("Discarded {} pending commands", discarded);
                }
                break;
            }
            debug!("{} failed: {}", kind, e);
        }
    }
    queue.shutdown();

    lifecycle.fire_close_hooks();
    release(executor.transport()).await;
    if let Some(input) = input {
        input.abort();
    }
    lifecycle.end_input();
    lifecycle.set_state(DeviceState::Closed);
}

/// Decode raw reports and fan typed events out to subscribers
async fn run_input(
    mut reports: broadcast::Receiver<TimestampedReport>,
    mut decoder: InputDecoder,
    lifecycle: Arc<Lifecycle>,
    queue: Arc<CommandQueue>,
) {
    loop {
        match reports.recv().await {
            Ok(report) => {
                for event in decoder.decode(&report.report) {
                    if !lifecycle.publish(event) {
                        return;
                    }
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!("Input decoder lagged, {} reports dropped", n);
            }
            Err(RecvError::Closed) => {
                if !queue.is_closed() {
                    warn!("Input stream ended, closing device");
                    queue.enqueue(Command::Close);
                }
                return;
            }
        }
    }
}
