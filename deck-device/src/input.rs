//! Input decoding: level snapshots in, edge events out

use deck_transport::{InputReport, Point};
use serde::Serialize;

/// Edge detector over a fixed-width bitmask.
///
/// Holds the last accepted mask; each `apply` reports every bit that
/// changed since, lowest index first.
#[derive(Debug, Clone)]
pub struct BitmaskDiff {
    width: u8,
    last: u64,
}

impl BitmaskDiff {
    /// `width` is capped at 64
    pub fn new(width: u8) -> Self {
        Self {
            width: width.min(64),
            last: 0,
        }
    }

    fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Feed a new snapshot; returns `(index, is_set)` for each changed bit
    pub fn apply(&mut self, snapshot: u64) -> Vec<(u8, bool)> {
        let current = snapshot & self.mask();
        let mut changed = current ^ self.last;
        self.last = current;

        let mut edges = Vec::with_capacity(changed.count_ones() as usize);
        while changed != 0 {
            let index = changed.trailing_zeros() as u8;
            edges.push((index, current & (1 << index) != 0));
            changed &= changed - 1;
        }
        edges
    }

    /// Last accepted snapshot
    pub fn state(&self) -> u64 {
        self.last
    }
}

/// Direction of a swipe across the strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlingDirection {
    None,
    Left,
    Right,
    Up,
    Down,
}

impl FlingDirection {
    /// Dominant axis of travel from `start` to `end`; y grows downward.
    ///
    /// Equal magnitudes on both axes count as horizontal.
    pub fn between(start: Point, end: Point) -> Self {
        let dx = i64::from(end.x) - i64::from(start.x);
        let dy = i64::from(end.y) - i64::from(start.y);
        if dx == 0 && dy == 0 {
            return Self::None;
        }
        if dx.abs() >= dy.abs() {
            if dx > 0 {
                Self::Right
            } else {
                Self::Left
            }
        } else if dy > 0 {
            Self::Down
        } else {
            Self::Up
        }
    }
}

/// Typed, edge-triggered input event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InputEvent {
    KeyPress { key: u8, down: bool },
    EncoderPress { encoder: u8, down: bool },
    /// Signed detents, clockwise positive
    EncoderRotate { encoder: u8, delta: i32 },
    Touch(Point),
    Fling {
        start: Point,
        end: Point,
        direction: FlingDirection,
    },
}

/// Per-device decoder owning the diff state for keys and encoders
#[derive(Debug, Clone)]
pub struct InputDecoder {
    keys: BitmaskDiff,
    encoders: BitmaskDiff,
}

impl InputDecoder {
    pub fn new(key_count: u8, encoder_count: u8) -> Self {
        Self {
            keys: BitmaskDiff::new(key_count),
            encoders: BitmaskDiff::new(encoder_count),
        }
    }

    pub fn decode(&mut self, report: &InputReport) -> Vec<InputEvent> {
        match report {
            InputReport::Keys(mask) => self
                .keys
                .apply(*mask)
                .into_iter()
                .map(|(key, down)| InputEvent::KeyPress { key, down })
                .collect(),
            InputReport::Encoders(mask) => self
                .encoders
                .apply(*mask)
                .into_iter()
                .map(|(encoder, down)| InputEvent::EncoderPress { encoder, down })
                .collect(),
            InputReport::Rotate(deltas) => deltas
                .iter()
                .enumerate()
                .filter(|(_, delta)| **delta != 0)
                .map(|(encoder, delta)| InputEvent::EncoderRotate {
                    encoder: encoder as u8,
                    delta: i32::from(*delta),
                })
                .collect(),
            InputReport::Touch(point) => vec![InputEvent::Touch(*point)],
            InputReport::Fling { start, end } => vec![InputEvent::Fling {
                start: *start,
                end: *end,
                direction: FlingDirection::between(*start, *end),
            }],
        }
    }
}
