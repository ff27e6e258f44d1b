//! Coalescing command queue
//!
//! Multi-producer, single-consumer FIFO. Producers never block: `enqueue`
//! takes a short lock, applies the coalescing rules and wakes the consumer.
//! The consumer awaits [`CommandQueue::next`], which returns `None` once the
//! queue is closed and drained.
//!
//! Coalescing rules, applied at enqueue time:
//!
//! | New command | Replaces |
//! |-------------|----------|
//! | `SetKeyImage(i)` / `FillKey(i)` | any pending command for key `i` |
//! | `SetSurfaceImage` / `FillSurface` | every pending drawing command |
//! | `SetStripImage` | pending `SetStripImage` / `SetStripImageAt` |
//! | `SetStripImageAt(r)` | pending `SetStripImageAt` whose rect lies inside `r` |
//! | `Close` | everything |
//!
//! A replacement takes the slot of the earliest command it replaces, so a
//! burst of updates to one key keeps its place in line.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::command::Command;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Command>,
    closed: bool,
}

/// Per-device command queue
#[derive(Default)]
pub struct CommandQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command, coalescing it with pending ones.
    ///
    /// Ignored once the queue is closed. `Command::Close` discards all
    /// pending commands and closes the queue behind itself.
    pub fn enqueue(&self, command: Command) {
        {
            let mut state = self.state.lock();
            if state.closed {
                debug!("Queue closed, dropping {}", command.kind());
                return;
            }
            if matches!(command, Command::Close) {
                let discarded = state.pending.len();
                if discarded > 0 {
                    debug!("Close discards {} pending commands", discarded);
                }
                state.pending.clear();
                state.closed = true;
            }
            coalesce(&mut state.pending, command);
        }
        self.notify.notify_one();
    }

    /// Wait for the next command.
    ///
    /// Returns `None` once the queue is closed and nothing is left.
    pub async fn next(&self) -> Option<Command> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(command) = state.pending.pop_front() {
                    return Some(command);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit when nobody waits, so an enqueue
            // between the unlock above and this await is not lost
            self.notify.notified().await;
        }
    }

    /// Discard everything and close without queueing `Close`.
    ///
    /// Used by the consumer after a fatal transport error. Returns the number
    /// of discarded commands.
    pub fn shutdown(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            let n = state.pending.len();
            state.pending.clear();
            n
        };
        self.notify.notify_one();
        discarded
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Kinds of the pending commands in execution order
    pub fn pending_kinds(&self) -> Vec<&'static str> {
        self.state.lock().pending.iter().map(Command::kind).collect()
    }
}

fn coalesce(pending: &mut VecDeque<Command>, command: Command) {
    match &command {
        Command::SetKeyImage { key, .. } | Command::FillKey { key, .. } => {
            let key = *key;
            replace_earliest(pending, command, |c| c.key_target() == Some(key));
        }
        Command::SetSurfaceImage(_) | Command::FillSurface(_) => {
            pending.retain(|c| !c.is_drawing());
            pending.push_back(command);
        }
        Command::SetStripImage(_) => {
            replace_earliest(pending, command, |c| {
                matches!(
                    c,
                    Command::SetStripImage(_) | Command::SetStripImageAt { .. }
                )
            });
        }
        Command::SetStripImageAt { rect, .. } => {
            let rect = *rect;
            replace_earliest(pending, command, |c| {
                c.strip_rect().is_some_and(|old| rect.contains_rect(&old))
            });
        }
        Command::SetBrightness(_) | Command::ShowLogo | Command::Task(_) | Command::Close => {
            pending.push_back(command);
        }
    }
}

/// Put `command` in the slot of the first pending command matching
/// `superseded` and drop any later matches; append if nothing matches.
fn replace_earliest<F>(pending: &mut VecDeque<Command>, command: Command, superseded: F)
where
    F: Fn(&Command) -> bool,
{
    let Some(pos) = pending.iter().position(&superseded) else {
        pending.push_back(command);
        return;
    };
    pending[pos] = command;

    let mut i = pos + 1;
    while i < pending.len() {
        if superseded(&pending[i]) {
            pending.remove(i);
        } else {
            i += 1;
        }
    }
}
