use std::time::Instant;

/// What a deferred timer does once it is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Re-evaluate the channel because the preview of `line_index` may open.
    FadeIn { line_index: usize },
    /// The running countdown has reached zero.
    CountdownExpiry,
}

/// Handle returned by [`TimerList::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    id: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
struct PendingTimer {
    handle: TimerHandle,
    due: Instant,
    kind: TimerKind,
}

/// Per-singer list of cancelable one-shot timers.
///
/// [`TimerList::cancel_all`] starts a new generation: handles from before the
/// sweep are never reported live again, so a late completion is a no-op.
#[derive(Debug, Default)]
pub struct TimerList {
    next_id: u64,
    generation: u64,
    pending: Vec<PendingTimer>,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, kind: TimerKind) -> TimerHandle {
        let handle = TimerHandle {
            id: self.next_id,
            generation: self.generation,
        };
        self.next_id += 1;
        self.pending.push(PendingTimer { handle, due, kind });
        handle
    }

    pub fn cancel(&mut self, handle: &TimerHandle) {
        self.pending.retain(|timer| timer.handle != *handle);
    }

    /// Cancels every pending timer. Safe to call on an empty list.
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            tracing::trace!(cancelled = self.pending.len(), "cancelling timers");
        }
        self.pending.clear();
        self.generation += 1;
    }

    pub fn is_live(&self, handle: &TimerHandle) -> bool {
        handle.generation == self.generation
            && self.pending.iter().any(|timer| timer.handle == *handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn poll(&mut self, now: Instant) -> Vec<(TimerHandle, TimerKind)> {
        let mut due = Vec::new();
        self.pending.retain(|timer| {
            if timer.due <= now {
                due.push(timer.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|timer| (timer.due, timer.handle.id));
        due.into_iter()
            .map(|timer| (timer.handle, timer.kind))
            .collect()
    }
}
