//! Dirty-region tracking
//!
//! The renderer marks what changed between frames; on `flush` the tracker
//! turns the marks into the smallest set of drawing commands the connected
//! model can execute, cutting each region out of the rendered frame.

use std::collections::HashSet;
use std::sync::Arc;

use deck_transport::{Capabilities, Features, Rect};
use image::RgbImage;
use tracing::debug;

use crate::command::Command;
use crate::imaging::crop_exact;

/// A region that changed since the last flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationMark {
    /// Everything
    Surface,
    Key(u8),
    /// The whole strip
    Strip,
    /// Part of the strip, in frame coordinates
    StripRect(Rect),
}

/// Accumulates invalidation marks for one device
#[derive(Debug, Default)]
pub struct DirtyTracker {
    marks: HashSet<InvalidationMark>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&mut self, mark: InvalidationMark) {
        self.marks.insert(mark);
    }

    pub fn is_clean(&self) -> bool {
        self.marks.is_empty()
    }

    /// Drain the marks into drawing commands cut from `frame`.
    ///
    /// `frame` is in frame coordinates and normally covers
    /// [`Capabilities::surface_rect`]; regions past its edges come out black.
    pub fn flush(&mut self, frame: &RgbImage, caps: &Capabilities) -> Vec<Command> {
        let marks = std::mem::take(&mut self.marks);
        if marks.is_empty() {
            return Vec::new();
        }

        if marks.contains(&InvalidationMark::Surface) {
            let surface = crop_exact(frame, caps.surface_rect());
            return vec![Command::SetSurfaceImage(Arc::new(surface))];
        }

        let mut commands = Vec::new();

        let mut keys: Vec<u8> = marks
            .iter()
            .filter_map(|m| match m {
                InvalidationMark::Key(k) => Some(*k),
                _ => None,
            })
            .collect();
        keys.sort_unstable();
        for key in keys {
            let Some(rect) = caps.key_rect(key) else {
                debug!("Ignoring invalidation of key {} (device has {})", key, caps.key_count);
                continue;
            };
            commands.push(Command::SetKeyImage {
                key,
                image: Arc::new(crop_exact(frame, rect)),
            });
        }

        if let Some(strip) = caps.strip_rect() {
            commands.extend(strip_commands(&marks, frame, strip, caps));
        }

        commands
    }
}

fn strip_commands(
    marks: &HashSet<InvalidationMark>,
    frame: &RgbImage,
    strip: Rect,
    caps: &Capabilities,
) -> Vec<Command> {
    let rects: Vec<Rect> = marks
        .iter()
        .filter_map(|m| match m {
            InvalidationMark::StripRect(r) => Some(*r),
            _ => None,
        })
        .collect();
    let whole = marks.contains(&InvalidationMark::Strip);
    if !whole && rects.is_empty() {
        return Vec::new();
    }

    if whole || !caps.has(Features::STRIP_IMAGE_AT) {
        return vec![Command::SetStripImage(Arc::new(crop_exact(frame, strip)))];
    }

    let mut clipped: Vec<Rect> = rects
        .iter()
        .filter_map(|r| r.intersection(&strip))
        .collect();
    clipped.sort_unstable_by_key(|r| (r.y, r.x, r.width, r.height));
    clipped.dedup();

    clipped
        .into_iter()
        .map(|rect| Command::SetStripImageAt {
            rect: rect.relative_to(&strip),
            image: Arc::new(crop_exact(frame, rect)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_transport::{Grid, Size};
    use image::Rgb;

    fn original() -> Capabilities {
        Capabilities::builder(15, Grid { rows: 3, columns: 5 }, Size::new(72, 72)).build()
    }

    fn plus(addressed: bool) -> Capabilities {
        let builder = Capabilities::builder(8, Grid { rows: 2, columns: 4 }, Size::new(120, 120))
            .key_spacing(40)
            .strip(Rect::new(0, 280, 800, 100), 4);
        if addressed {
            builder.features(Features::STRIP_IMAGE_AT).build()
        } else {
            builder.build()
        }
    }

    fn frame_for(caps: &Capabilities) -> RgbImage {
        let surface = caps.surface_rect();
        RgbImage::from_fn(surface.width, surface.height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 7])
        })
    }

    #[test]
    fn test_single_key_cut_from_frame() {
        let caps = original();
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::Key(7));

        let commands = tracker.flush(&frame, &caps);
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::SetKeyImage { key: 7, image } => {
                assert_eq!(image.dimensions(), (72, 72));
                assert_eq!(*image.get_pixel(0, 0), Rgb([144, 72, 7]));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(tracker.is_clean());
    }

    #[test]
    fn test_surface_dominates() {
        let caps = plus(true);
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::Key(1));
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(0, 280, 10, 10)));
        tracker.mark_dirty(InvalidationMark::Surface);
        tracker.mark_dirty(InvalidationMark::Key(3));

        let commands = tracker.flush(&frame, &caps);
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::SetSurfaceImage(image) => assert_eq!(image.dimensions(), (800, 380)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_keys_ascending_and_invalid_skipped() {
        let caps = original();
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        for key in [9, 2, 40, 5, 2] {
            tracker.mark_dirty(InvalidationMark::Key(key));
        }
        let keys: Vec<_> = tracker
            .flush(&frame, &caps)
            .iter()
            .filter_map(Command::key_target)
            .collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }

    #[test]
    fn test_strip_without_addressed_updates() {
        let caps = plus(false);
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(0, 280, 100, 50)));
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(300, 300, 100, 50)));

        let commands = tracker.flush(&frame, &caps);
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::SetStripImage(image) => assert_eq!(image.dimensions(), (800, 100)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_strip_rects_clipped_and_translated() {
        let caps = plus(true);
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(200, 290, 100, 50)));
        // Straddles the top edge of the strip
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(0, 260, 50, 40)));
        // Entirely in the key area
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(0, 0, 50, 50)));

        let commands = tracker.flush(&frame, &caps);
        let rects: Vec<_> = commands.iter().filter_map(Command::strip_rect).collect();
        assert_eq!(
            rects,
            vec![Rect::new(0, 0, 50, 20), Rect::new(200, 10, 100, 50)]
        );
        match &commands[1] {
            Command::SetStripImageAt { image, .. } => {
                assert_eq!(image.dimensions(), (100, 50));
                assert_eq!(*image.get_pixel(0, 0), Rgb([200, 34, 7]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_far_out_strip_rect_dropped() {
        let caps = plus(true);
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(u32::MAX - 5, 300, 10, 10)));
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(100, u32::MAX - 1, 10, 10)));
        tracker.mark_dirty(InvalidationMark::Key(1));

        let kinds: Vec<_> = tracker.flush(&frame, &caps).iter().map(Command::kind).collect();
        assert_eq!(kinds, vec!["set-key-image"]);
        assert!(tracker.is_clean());
    }

    #[test]
    fn test_whole_strip_mark_wins() {
        let caps = plus(true);
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(200, 290, 100, 50)));
        tracker.mark_dirty(InvalidationMark::Strip);
        tracker.mark_dirty(InvalidationMark::Key(0));

        let kinds: Vec<_> = tracker.flush(&frame, &caps).iter().map(Command::kind).collect();
        assert_eq!(kinds, vec!["set-key-image", "set-strip-image"]);
    }

    #[test]
    fn test_strip_marks_ignored_without_strip() {
        let caps = original();
        let frame = frame_for(&caps);
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(InvalidationMark::Strip);
        tracker.mark_dirty(InvalidationMark::StripRect(Rect::new(0, 0, 10, 10)));
        assert!(tracker.flush(&frame, &caps).is_empty());
        assert!(tracker.is_clean());
    }
}
