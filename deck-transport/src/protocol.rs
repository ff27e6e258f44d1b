//! Wire protocol constants and packet builders for gen-2 Stream Deck hardware
//!
//! Images are streamed as fixed-size output reports, each carrying a small
//! header followed by a slice of the encoded image. Settings go out as
//! 32-byte feature reports.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::types::Rect;

/// Protocol generation implemented by [`crate::HidDeckTransport`]
pub const PROTOCOL_GEN2: u8 = 2;

/// Output report size for image transfers
pub const IMAGE_REPORT_SIZE: usize = 1024;

/// Feature report size
pub const FEATURE_REPORT_SIZE: usize = 32;

/// Largest input report any supported model sends
pub const INPUT_REPORT_SIZE: usize = 64;

/// Report IDs
pub mod report {
    /// Input report (keys, encoders, touch)
    pub const INPUT: u8 = 0x01;
    /// Image output report
    pub const IMAGE: u8 = 0x02;
    /// Feature report carrying a settings command
    pub const COMMAND: u8 = 0x03;
    /// Feature report: firmware version
    pub const FIRMWARE_VERSION: u8 = 0x05;
    /// Feature report: serial number
    pub const SERIAL: u8 = 0x06;
}

/// Command bytes (second byte of command/image reports)
pub mod cmd {
    /// Reset the device, showing the boot logo
    pub const RESET: u8 = 0x02;
    /// Key image page
    pub const KEY_IMAGE: u8 = 0x07;
    /// Backlight brightness in percent
    pub const BRIGHTNESS: u8 = 0x08;
    /// Strip (LCD) image page with target rectangle
    pub const STRIP_IMAGE: u8 = 0x0C;
}

/// Input report layout
pub mod input {
    /// Input type: key states follow at [`KEY_STATE_OFFSET`]
    pub const KEYS: u8 = 0x00;
    /// Input type: touch strip event
    pub const TOUCH: u8 = 0x02;
    /// Input type: encoder event
    pub const ENCODER: u8 = 0x03;

    /// Offset of the first key state byte
    pub const KEY_STATE_OFFSET: usize = 4;

    /// Touch kinds (byte 4 of a touch report)
    pub const TOUCH_SHORT: u8 = 0x01;
    pub const TOUCH_LONG: u8 = 0x02;
    pub const TOUCH_FLING: u8 = 0x03;

    /// Encoder event kinds (byte 4 of an encoder report)
    pub const ENCODER_PRESS: u8 = 0x00;
    pub const ENCODER_ROTATE: u8 = 0x01;

    /// Offset of the first per-encoder byte
    pub const ENCODER_STATE_OFFSET: usize = 5;
}

/// Header of a key image page
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct KeyImageHeader {
    report_id: u8,
    command: u8,
    key: u8,
    is_last: u8,
    length: [u8; 2],
    page: [u8; 2],
}

/// Header of a strip image page
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct StripImageHeader {
    report_id: u8,
    command: u8,
    x: [u8; 2],
    y: [u8; 2],
    width: [u8; 2],
    height: [u8; 2],
    is_last: u8,
    page: [u8; 2],
    length: [u8; 2],
    _pad: u8,
}

const KEY_HEADER_LEN: usize = std::mem::size_of::<KeyImageHeader>();
const STRIP_HEADER_LEN: usize = std::mem::size_of::<StripImageHeader>();

/// Split `data` into pages of `capacity` bytes.
///
/// Always yields at least one page so an empty image still terminates the
/// transfer with `is_last` set.
fn pages(data: &[u8], capacity: usize) -> impl Iterator<Item = (u16, &[u8], bool)> {
    let count = data.len().div_ceil(capacity).max(1);
    (0..count).map(move |page| {
        let start = (page * capacity).min(data.len());
        let end = (start + capacity).min(data.len());
        (page as u16, &data[start..end], page == count - 1)
    })
}

fn write_report(header: &[u8], chunk: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; IMAGE_REPORT_SIZE];
    buf[..header.len()].copy_from_slice(header);
    buf[header.len()..header.len() + chunk.len()].copy_from_slice(chunk);
    buf
}

/// Build the output reports that upload an encoded image to one key
pub fn key_image_reports(key: u8, data: &[u8]) -> Vec<Vec<u8>> {
    pages(data, IMAGE_REPORT_SIZE - KEY_HEADER_LEN)
        .map(|(page, chunk, is_last)| {
            let header = KeyImageHeader {
                report_id: report::IMAGE,
                command: cmd::KEY_IMAGE,
                key,
                is_last: u8::from(is_last),
                length: (chunk.len() as u16).to_le_bytes(),
                page: page.to_le_bytes(),
            };
            write_report(header.as_bytes(), chunk)
        })
        .collect()
}

/// Build the output reports that upload an encoded image to a strip rectangle
/// (strip-local coordinates)
pub fn strip_image_reports(rect: Rect, data: &[u8]) -> Vec<Vec<u8>> {
    pages(data, IMAGE_REPORT_SIZE - STRIP_HEADER_LEN)
        .map(|(page, chunk, is_last)| {
            let header = StripImageHeader {
                report_id: report::IMAGE,
                command: cmd::STRIP_IMAGE,
                x: (rect.x as u16).to_le_bytes(),
                y: (rect.y as u16).to_le_bytes(),
                width: (rect.width as u16).to_le_bytes(),
                height: (rect.height as u16).to_le_bytes(),
                is_last: u8::from(is_last),
                page: page.to_le_bytes(),
                length: (chunk.len() as u16).to_le_bytes(),
                _pad: 0,
            };
            write_report(header.as_bytes(), chunk)
        })
        .collect()
}

/// Build a settings feature report: `[0x03, command, payload..]` padded to 32 bytes
pub fn command_report(command: u8, payload: &[u8]) -> [u8; FEATURE_REPORT_SIZE] {
    let mut buf = [0u8; FEATURE_REPORT_SIZE];
    buf[0] = report::COMMAND;
    buf[1] = command;
    let len = payload.len().min(FEATURE_REPORT_SIZE - 2);
    buf[2..2 + len].copy_from_slice(&payload[..len]);
    buf
}

/// Brightness feature report, clamped to 0-100
pub fn brightness_report(percent: u8) -> [u8; FEATURE_REPORT_SIZE] {
    command_report(cmd::BRIGHTNESS, &[percent.min(100)])
}

/// Extract a printable ASCII string from a feature report starting at `offset`
pub fn ascii_field(buf: &[u8], offset: usize) -> Option<String> {
    let field = buf.get(offset..)?;
    let text: String = field
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(KEY_HEADER_LEN, 8);
        assert_eq!(STRIP_HEADER_LEN, 16);
    }

    #[test]
    fn test_key_image_paging() {
        let data: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let reports = key_image_reports(7, &data);
        assert_eq!(reports.len(), 3);

        let first = &reports[0];
        assert_eq!(first.len(), IMAGE_REPORT_SIZE);
        assert_eq!(&first[..4], &[0x02, 0x07, 7, 0]);
        assert_eq!(u16::from_le_bytes([first[4], first[5]]), 1016);
        assert_eq!(u16::from_le_bytes([first[6], first[7]]), 0);
        assert_eq!(first[8], 0);

        let last = &reports[2];
        assert_eq!(last[3], 1);
        assert_eq!(u16::from_le_bytes([last[4], last[5]]), 2500 - 2 * 1016);
        assert_eq!(u16::from_le_bytes([last[6], last[7]]), 2);
        assert_eq!(last[8], data[2 * 1016]);
    }

    #[test]
    fn test_empty_image_single_page() {
        let reports = key_image_reports(0, &[]);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0][3], 1);
        assert_eq!(&reports[0][4..6], &[0, 0]);
    }

    #[test]
    fn test_strip_image_header() {
        let reports = strip_image_reports(Rect::new(200, 0, 200, 100), &[0xAA; 10]);
        assert_eq!(reports.len(), 1);
        let r = &reports[0];
        assert_eq!(&r[..2], &[0x02, 0x0C]);
        assert_eq!(u16::from_le_bytes([r[2], r[3]]), 200);
        assert_eq!(u16::from_le_bytes([r[4], r[5]]), 0);
        assert_eq!(u16::from_le_bytes([r[6], r[7]]), 200);
        assert_eq!(u16::from_le_bytes([r[8], r[9]]), 100);
        assert_eq!(r[10], 1);
        assert_eq!(u16::from_le_bytes([r[13], r[14]]), 10);
        assert_eq!(r[16], 0xAA);
    }

    #[test]
    fn test_brightness_clamped() {
        let report = brightness_report(150);
        assert_eq!(&report[..3], &[0x03, 0x08, 100]);
        assert_eq!(report.len(), FEATURE_REPORT_SIZE);
    }

    #[test]
    fn test_ascii_field() {
        let mut buf = [0u8; 32];
        buf[0] = report::SERIAL;
        buf[2..10].copy_from_slice(b"CL12K1A0");
        assert_eq!(ascii_field(&buf, 2).as_deref(), Some("CL12K1A0"));
        assert_eq!(ascii_field(&[0u8; 8], 2), None);
    }
}
