use chrono::{DateTime, Utc};

/// The instant the next sync cycle should fetch from. Owned by the scheduler
/// loop; cycles never overlap, so no locking is needed. `advance` replaces the
/// value unconditionally -- keeping it monotonic is the caller's job.
#[derive(Debug, Clone, Copy)]
pub struct Watermark {
    at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    pub fn current(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn advance(&mut self, next: DateTime<Utc>) {
        self.at = next;
    }
}
