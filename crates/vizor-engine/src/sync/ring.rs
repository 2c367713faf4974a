use crate::backend::Backend;
use crate::error::EngineResult;
use crate::sync::DeletionQueue;

/// Reusable per-frame resources.
pub struct ResourceSlot<B: Backend> {
    index: usize,
    acquired: B::Signal,
    render_complete: B::Signal,
    last_claimed: Option<u64>,
    recorder: Option<B::Recorder>,
    deferred: DeletionQueue<B>,
    uses: u64,
}

impl<B: Backend> ResourceSlot<B> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Signal the presentation engine raises once the acquired image is usable.
    pub fn acquired(&self) -> &B::Signal {
        &self.acquired
    }

    /// Signal raised when this slot's submission finishes; presentation waits on it.
    pub fn render_complete(&self) -> &B::Signal {
        &self.render_complete
    }

    /// Completion value this slot submitted last, if it has been used.
    pub fn last_claimed(&self) -> Option<u64> {
        self.last_claimed
    }

    pub fn uses(&self) -> u64 {
        self.uses
    }

    /// Starts a fresh recorder for this slot, replacing any abandoned one.
    pub fn begin(&mut self, backend: &mut B) -> EngineResult<&mut B::Recorder> {
        let recorder = backend.begin_recording(self.index)?;
        Ok(self.recorder.insert(recorder))
    }

    pub fn recorder_mut(&mut self) -> Option<&mut B::Recorder> {
        self.recorder.as_mut()
    }

    /// Takes the recorder for submission.
    pub fn take_recorder(&mut self) -> Option<B::Recorder> {
        self.recorder.take()
    }

    /// Drops an unsubmitted recorder. The slot's claimed value is unchanged.
    pub fn abandon(&mut self) {
        self.recorder = None;
    }

    /// Queues `destroy` to run the next time this slot is reused.
    pub fn defer(&mut self, label: &'static str, destroy: impl FnOnce(&mut B) + 'static) {
        self.deferred.push(label, destroy);
    }

    pub fn defer_all(&mut self, queue: &mut DeletionQueue<B>) {
        self.deferred.append(queue);
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}

/// Fixed ring of N [`ResourceSlot`]s indexed by `frame_index % N`.
pub struct ResourceRing<B: Backend> {
    slots: Vec<ResourceSlot<B>>,
}

impl<B: Backend> ResourceRing<B> {
    /// Creates `frames_in_flight` slots. Signals already created are destroyed
    /// again if a later one fails.
    pub fn new(backend: &mut B, frames_in_flight: usize) -> EngineResult<Self> {
        let mut ring = Self {
            slots: Vec::with_capacity(frames_in_flight),
        };

        for index in 0..frames_in_flight.max(1) {
            match create_slot(backend, index) {
                Ok(slot) => ring.slots.push(slot),
                Err(e) => {
                    ring.destroy(backend);
                    return Err(e);
                }
            }
        }

        log::debug!("resource ring: {} slot(s)", ring.slots.len());
        Ok(ring)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot_index(&self, frame_index: u64) -> usize {
        (frame_index % self.slots.len() as u64) as usize
    }

    pub fn slot(&self, index: usize) -> Option<&ResourceSlot<B>> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ResourceSlot<B>> {
        self.slots.get_mut(index)
    }

    /// Returns the slot for `frame_index` once the GPU has finished its previous
    /// use, then runs the slot's deferred destructors.
    ///
    /// Blocks on the slot's last claimed value. The first use never waits.
    pub fn acquire_slot(
        &mut self,
        backend: &mut B,
        frame_index: u64,
    ) -> EngineResult<&mut ResourceSlot<B>> {
        let index = self.slot_index(frame_index);
        let slot = &mut self.slots[index];

        if let Some(value) = slot.last_claimed {
            if backend.completed_value() < value {
                log::trace!(
                    target: "vizor_engine::frame",
                    "frame {frame_index}: slot {index} waiting for value {value}"
                );
                backend.wait_for_value(value)?;
            }
        }

        slot.deferred.flush(backend);
        slot.uses += 1;
        Ok(slot)
    }

    /// Records the value slot `index` just submitted.
    pub fn retire_slot(&mut self, index: usize, claimed_value: u64) {
        if let Some(slot) = self.slots.get_mut(index) {
            debug_assert!(slot.last_claimed.is_none_or(|v| v < claimed_value));
            slot.last_claimed = Some(claimed_value);
            slot.recorder = None;
        }
    }

    /// Highest value claimed by any slot.
    pub fn highest_claimed(&self) -> Option<u64> {
        self.slots.iter().filter_map(|s| s.last_claimed).max()
    }

    /// Number of slots whose last submission has not completed.
    pub fn in_flight(&self, completed: u64) -> usize {
        self.slots
            .iter()
            .filter(|s| s.last_claimed.is_some_and(|v| v > completed))
            .count()
    }

    /// Waits for every slot's claimed value, lowest first, then runs all
    /// deferred destructors.
    pub fn drain(&mut self, backend: &mut B) -> EngineResult<()> {
        let mut values: Vec<u64> = self.slots.iter().filter_map(|s| s.last_claimed).collect();
        values.sort_unstable();

        for value in values {
            if backend.completed_value() < value {
                backend.wait_for_value(value)?;
            }
        }

        for slot in &mut self.slots {
            slot.deferred.flush(backend);
            slot.recorder = None;
        }
        Ok(())
    }

    /// Destroys all slot resources, last slot first. The GPU must be idle.
    pub fn destroy(mut self, backend: &mut B) {
        while let Some(mut slot) = self.slots.pop() {
            slot.deferred.flush(backend);
            drop(slot.recorder.take());
            backend.destroy_signal(slot.render_complete);
            backend.destroy_signal(slot.acquired);
        }
    }
}

fn create_slot<B: Backend>(backend: &mut B, index: usize) -> EngineResult<ResourceSlot<B>> {
    let acquired = backend.create_signal(&format!("slot {index} acquired"))?;
    let render_complete = match backend.create_signal(&format!("slot {index} render complete")) {
        Ok(s) => s,
        Err(e) => {
            backend.destroy_signal(acquired);
            return Err(e);
        }
    };

    Ok(ResourceSlot {
        index,
        acquired,
        render_complete,
        last_claimed: None,
        recorder: None,
        deferred: DeletionQueue::new(),
        uses: 0,
    })
}
