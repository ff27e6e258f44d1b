//! Input report parsing and the shared reader thread
//!
//! The device pushes input reports on its interrupt endpoint. Key and
//! encoder-press reports carry the full state of every element; rotation,
//! touch and fling reports are one-shot events. Parsing turns raw bytes into
//! [`InputReport`] values and never keeps state of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidapi::HidDevice;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::{input, report, INPUT_REPORT_SIZE};
use crate::types::{InputReport, Point, TimestampedReport};

/// Broadcast channel capacity for input reports
const REPORT_CHANNEL_CAPACITY: usize = 256;

/// Consecutive read failures after which the device is considered gone
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Input report decoder for one device model
#[derive(Debug, Clone, Copy)]
pub struct ReportParser {
    key_count: u8,
    encoder_count: u8,
    /// Typed reports (`[0x01, type, ...]`) as sent by models with encoders
    typed: bool,
}

impl ReportParser {
    pub fn new(key_count: u8, encoder_count: u8, typed: bool) -> Self {
        Self {
            key_count,
            encoder_count,
            typed,
        }
    }

    /// Decode one raw input report (report ID included).
    ///
    /// Returns `None` for reports that are too short or of an unknown type.
    pub fn parse(&self, data: &[u8]) -> Option<InputReport> {
        if data.len() < 2 || data[0] != report::INPUT {
            return None;
        }
        if !self.typed {
            return self.parse_keys(data);
        }
        match data[1] {
            input::KEYS => self.parse_keys(data),
            input::TOUCH => parse_touch(data),
            input::ENCODER => self.parse_encoder(data),
            _ => None,
        }
    }

    fn parse_keys(&self, data: &[u8]) -> Option<InputReport> {
        let start = input::KEY_STATE_OFFSET;
        let states = data.get(start..start + usize::from(self.key_count))?;
        Some(InputReport::Keys(pack_states(states)))
    }

    fn parse_encoder(&self, data: &[u8]) -> Option<InputReport> {
        let kind = *data.get(4)?;
        let start = input::ENCODER_STATE_OFFSET;
        let states = data.get(start..start + usize::from(self.encoder_count))?;
        match kind {
            input::ENCODER_PRESS => Some(InputReport::Encoders(pack_states(states))),
            input::ENCODER_ROTATE => Some(InputReport::Rotate(
                states.iter().map(|&b| b as i8).collect(),
            )),
            _ => None,
        }
    }
}

/// One byte per element, non-zero = down, packed into a bitmask
fn pack_states(states: &[u8]) -> u64 {
    states
        .iter()
        .take(64)
        .enumerate()
        .filter(|(_, &b)| b != 0)
        .fold(0u64, |mask, (i, _)| mask | (1 << i))
}

fn read_point(data: &[u8], offset: usize) -> Option<Point> {
    let x = u16::from_le_bytes([*data.get(offset)?, *data.get(offset + 1)?]);
    let y = u16::from_le_bytes([*data.get(offset + 2)?, *data.get(offset + 3)?]);
    Some(Point::new(i32::from(x), i32::from(y)))
}

fn parse_touch(data: &[u8]) -> Option<InputReport> {
    let kind = *data.get(4)?;
    let start = read_point(data, 6)?;
    match kind {
        input::TOUCH_SHORT | input::TOUCH_LONG => Some(InputReport::Touch(start)),
        input::TOUCH_FLING => Some(InputReport::Fling {
            start,
            end: read_point(data, 10)?,
        }),
        _ => None,
    }
}

/// Blocking source of raw input reports
pub trait InputSource: Send + 'static {
    /// Read one report into `buf`, returning its length (0 on timeout)
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;
}

impl InputSource for HidDevice {
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        Ok(HidDevice::read_timeout(self, buf, timeout_ms)?)
    }
}

/// Configuration for the input reader loop
#[derive(Clone)]
pub struct ReaderConfig {
    /// Read timeout in milliseconds (for checking shutdown flag when idle)
    pub read_timeout_ms: i32,
    /// Sleep duration on error before retrying
    pub error_sleep_ms: u64,
    /// Name prefix for thread name and logging
    pub name: String,
}

impl ReaderConfig {
    pub fn hid(name: impl Into<String>) -> Self {
        Self {
            read_timeout_ms: 10,
            error_sleep_ms: 50,
            name: name.into(),
        }
    }
}

type ReportSender = Arc<Mutex<Option<broadcast::Sender<TimestampedReport>>>>;

/// Owns the broadcast channel and the reader thread of one device.
///
/// The only sender lives in a slot shared with the reader thread. Whoever
/// stops first (the thread giving up, or [`InputSubsystem::shutdown`])
/// empties the slot, and subscribers observe `Closed`.
pub struct InputSubsystem {
    report_tx: ReportSender,
    shutdown: Arc<AtomicBool>,
    link_lost: Arc<AtomicBool>,
}

/// What the reader thread shares with its subsystem
struct ReaderLink {
    report_tx: ReportSender,
    shutdown: Arc<AtomicBool>,
    link_lost: Arc<AtomicBool>,
}

impl ReaderLink {
    fn publish(&self, report: TimestampedReport) {
        if let Some(tx) = self.report_tx.lock().as_ref() {
            // Ignore send errors: no subscribers yet
            let _ = tx.send(report);
        }
    }

    fn release(&self) {
        self.report_tx.lock().take();
    }
}

impl InputSubsystem {
    /// Spawn the reader thread for `source`
    pub fn spawn<S: InputSource>(
        source: S,
        parser: ReportParser,
        config: ReaderConfig,
    ) -> Result<Self, TransportError> {
        let (tx, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        let subsystem = Self {
            report_tx: Arc::new(Mutex::new(Some(tx))),
            shutdown: Arc::new(AtomicBool::new(false)),
            link_lost: Arc::new(AtomicBool::new(false)),
        };
        let link = ReaderLink {
            report_tx: Arc::clone(&subsystem.report_tx),
            shutdown: Arc::clone(&subsystem.shutdown),
            link_lost: Arc::clone(&subsystem.link_lost),
        };

        std::thread::Builder::new()
            .name(format!("{}-input-reader", config.name))
            .spawn(move || run_input_reader_loop(source, link, parser, config))
            .map_err(|e| TransportError::Internal(format!("spawn input reader: {e}")))?;

        Ok(subsystem)
    }

    /// A subsystem without input endpoint
    pub fn disabled() -> Self {
        Self {
            report_tx: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(AtomicBool::new(true)),
            link_lost: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `None` once the reader has stopped or for a disabled subsystem
    pub fn subscribe(&self) -> Option<broadcast::Receiver<TimestampedReport>> {
        self.report_tx.lock().as_ref().map(|tx| tx.subscribe())
    }

    /// True once the reader thread gave up on a device that stopped answering
    pub fn link_lost(&self) -> bool {
        self.link_lost.load(Ordering::SeqCst)
    }

    /// Stop the reader thread and release the sender
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.report_tx.lock().take();
    }
}

impl Drop for InputSubsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read reports until shutdown or until the device stops answering.
///
/// Exits after [`MAX_CONSECUTIVE_ERRORS`] failed reads in a row, marking
/// the link lost. Either way the sender is released on exit.
fn run_input_reader_loop<S: InputSource>(
    source: S,
    link: ReaderLink,
    parser: ReportParser,
    config: ReaderConfig,
) {
    debug!("{} input reader thread started", config.name);
    let mut buf = [0u8; INPUT_REPORT_SIZE];
    let start_time = Instant::now();
    let mut consecutive_errors = 0u32;

    while !link.shutdown.load(Ordering::Relaxed) {
        match source.read_timeout(&mut buf, config.read_timeout_ms) {
            Ok(len) if len > 0 => {
                consecutive_errors = 0;
                let timestamp = start_time.elapsed().as_secs_f64();
                match parser.parse(&buf[..len]) {
                    Some(report) => link.publish(TimestampedReport::new(timestamp, report)),
                    None => debug!(
                        "{} ignoring input report: {:02X?}",
                        config.name,
                        &buf[..len.min(16)]
                    ),
                }
            }
            Ok(_) => {
                consecutive_errors = 0;
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!("{} input reader error: {}", config.name, e);
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    warn!("{} input reader giving up, device gone", config.name);
                    link.link_lost.store(true, Ordering::SeqCst);
                    break;
                }
                std::thread::sleep(Duration::from_millis(config.error_sleep_ms));
            }
        }
    }

    link.release();
    debug!("{} input reader thread exiting", config.name);
}
