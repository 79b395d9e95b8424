//! Render scheduling primitive for the authoring loop.
//!
//! The clock owns no thread and never calls anything; the driver polls
//! [`FrameClock::take_due`] from wherever its ticks actually come from and
//! runs a render for each drained id. Cancellation is idempotent:
//! cancelling a fired, already-cancelled, or never-issued tick is a no-op.

use indexmap::IndexMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(u64);

impl TickId {
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TickKind {
    /// Due at the next drain, whenever that is.
    Frame,
    /// Due once `now_ms` reaches the deadline.
    Timeout { deadline_ms: f64 },
}

#[derive(Default)]
pub struct FrameClock {
    next_id: u64,
    pending: IndexMap<TickId, TickKind>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn schedule(&mut self, kind: TickKind) -> TickId {
        let id = TickId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id, kind);
        id
    }

    /// Requests a tick on the next frame.
    pub fn request_frame(&mut self) -> TickId {
        self.schedule(TickKind::Frame)
    }

    /// Requests a tick `delay_ms` after `now_ms`.
    pub fn request_timeout(&mut self, now_ms: f64, delay_ms: f64) -> TickId {
        self.schedule(TickKind::Timeout {
            deadline_ms: now_ms + delay_ms.max(0.0),
        })
    }

    /// Idempotent: unknown ids are ignored.
    pub fn cancel(&mut self, id: TickId) {
        self.pending.shift_remove(&id);
    }

    /// Drains every due tick, in scheduling order. A drained tick is gone;
    /// repeating work reschedules explicitly.
    pub fn take_due(&mut self, now_ms: f64) -> Vec<TickId> {
        let due: Vec<TickId> = self
            .pending
            .iter()
            .filter(|(_, kind)| match kind {
                TickKind::Frame => true,
                TickKind::Timeout { deadline_ms } => *deadline_ms <= now_ms,
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            self.pending.shift_remove(id);
        }
        due
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
