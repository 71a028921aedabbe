//! Trailing-edge debounce for inbound snapshots.
//!
//! Every offer restarts the quiet window; the held snapshot is released once the
//! window elapses without a newer one, or once `max_wait` has passed since the
//! first snapshot of the burst. The released snapshot is always the newest one
//! offered, so intermediate snapshots may be skipped but the last never is.
use std::time::{Duration, Instant};

use crate::synth::model::SystemSnapshot;

pub struct SnapshotCoalescer {
    window: Duration,
    max_wait: Duration,
    pending: Option<Pending>,
}

struct Pending {
    snapshot: SystemSnapshot,
    first_at: Instant,
    last_at: Instant,
}

impl SnapshotCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_wait: window * 4,
            pending: None,
        }
    }
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait.max(self.window);
        self
    }
    pub fn window(&self) -> Duration {
        self.window
    }
    pub fn offer(&mut self, snapshot: SystemSnapshot, now: Instant) {
        let first_at = self.pending.as_ref().map_or(now, |p| p.first_at);
        self.pending = Some(Pending {
            snapshot,
            first_at,
            last_at: now,
        });
    }
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
    /// When the held snapshot becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .map(|p| (p.last_at + self.window).min(p.first_at + self.max_wait))
    }
    /// Releases the held snapshot if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<SystemSnapshot> {
        let due = self.deadline()?;
        if now < due {
            return None;
        }
        self.pending.take().map(|p| p.snapshot)
    }
    /// Releases the held snapshot regardless of its deadline.
    pub fn flush(&mut self) -> Option<SystemSnapshot> {
        self.pending.take().map(|p| p.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::model::PhaseUnit;

    fn snap(id: u32) -> SystemSnapshot {
        SystemSnapshot::new(vec![PhaseUnit {
            id,
            voltage: None,
            current: None,
        }])
    }

    #[test]
    fn burst_releases_only_the_last_snapshot() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut c = SnapshotCoalescer::new(ms(100));
        c.offer(snap(1), t0);
        c.offer(snap(2), t0 + ms(30));
        c.offer(snap(3), t0 + ms(60));
        assert_eq!(c.poll(t0 + ms(120)), None);
        assert_eq!(c.deadline(), Some(t0 + ms(160)));
        assert_eq!(c.poll(t0 + ms(160)), Some(snap(3)));
        assert!(!c.is_pending());
        assert_eq!(c.poll(t0 + ms(500)), None);
    }

    #[test]
    fn continuous_stream_is_bounded_by_max_wait() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut c = SnapshotCoalescer::new(ms(100)).with_max_wait(ms(250));
        let mut released = Vec::new();
        for i in 0..20u32 {
            let now = t0 + ms(50 * i as u64);
            c.offer(snap(i), now);
            if let Some(s) = c.poll(now) {
                released.push(s.phases()[0].id);
            }
        }
        // a new burst starts after every release
        assert_eq!(released, vec![5, 11, 17]);
        assert_eq!(c.flush(), Some(snap(19)));
    }
}
