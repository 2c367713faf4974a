use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{EngineError, EngineResult};

/// Completion counter realised on a wgpu queue.
///
/// Each submission registers an `on_submitted_work_done` callback that raises
/// the shared atomic to the submission's value, and keeps the queue's
/// [`wgpu::SubmissionIndex`] so a waiter can block on exactly that submission.
pub(crate) struct GpuTimeline {
    completed: Arc<AtomicU64>,
    lost: Arc<AtomicBool>,
    submitted: u64,
    pending: Submissions<wgpu::SubmissionIndex>,
}

impl GpuTimeline {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        Self {
            completed: Arc::new(AtomicU64::new(0)),
            lost,
            submitted: 0,
            pending: Submissions::default(),
        }
    }

    /// Arms the completion callback for `value`. Call right after `queue.submit`
    /// with the index it returned.
    pub(crate) fn signal_after(
        &mut self,
        queue: &wgpu::Queue,
        index: wgpu::SubmissionIndex,
        value: u64,
    ) {
        debug_assert!(value > self.submitted);
        self.submitted = value;
        self.pending.record(value, index);
        let completed = Arc::clone(&self.completed);
        queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn submitted(&self) -> u64 {
        self.submitted
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Blocks until the GPU reaches `value`. There is no timeout; a lost device
    /// or a failing poll ends the wait with [`EngineError::DeviceLost`].
    pub(crate) fn wait(&mut self, device: &wgpu::Device, value: u64) -> EngineResult<()> {
        if value > self.submitted {
            return Err(EngineError::DeviceLost {
                value,
                reason: format!("value never submitted (last {})", self.submitted),
            });
        }

        while self.completed() < value {
            if self.is_lost() {
                return Err(EngineError::DeviceLost {
                    value,
                    reason: "device lost callback fired".into(),
                });
            }
            let Some(index) = self.pending.index_for(value).cloned() else {
                return Err(EngineError::DeviceLost {
                    value,
                    reason: "no submission recorded for value".into(),
                });
            };
            device
                .poll(wgpu::PollType::Wait {
                    submission_index: Some(index),
                    timeout: None,
                })
                .map_err(|e| EngineError::DeviceLost {
                    value,
                    reason: e.to_string(),
                })?;
            // The callbacks of every submission up to `index` have run now.
            self.completed.fetch_max(value, Ordering::AcqRel);
        }
        self.pending.prune(self.completed());
        Ok(())
    }
}

/// Submission handles keyed by the completion value they signal.
#[derive(Debug)]
struct Submissions<T> {
    by_value: BTreeMap<u64, T>,
}

impl<T> Default for Submissions<T> {
    fn default() -> Self {
        Self {
            by_value: BTreeMap::new(),
        }
    }
}

impl<T> Submissions<T> {
    fn record(&mut self, value: u64, index: T) {
        self.by_value.insert(value, index);
    }

    /// The earliest submission whose completion implies `value` is reached.
    fn index_for(&self, value: u64) -> Option<&T> {
        self.by_value.range(value..).next().map(|(_, index)| index)
    }

    /// Forgets every submission at or below `completed`.
    fn prune(&mut self, completed: u64) {
        self.by_value = self.by_value.split_off(&(completed + 1));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_targets_the_submission_that_signals_the_value() {
        let mut subs = Submissions::default();
        subs.record(1, "a");
        subs.record(2, "b");
        subs.record(5, "c");

        assert_eq!(subs.index_for(2), Some(&"b"));
        // Value 3 was never signalled on its own; submission 5 covers it.
        assert_eq!(subs.index_for(3), Some(&"c"));
        assert_eq!(subs.index_for(6), None);
    }

    #[test]
    fn completed_submissions_are_forgotten() {
        let mut subs = Submissions::default();
        for v in 1..=4 {
            subs.record(v, v);
        }
        subs.prune(2);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs.index_for(1), Some(&3));
    }
}
