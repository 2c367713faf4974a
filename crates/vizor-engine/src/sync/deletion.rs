/// Ordered list of deferred destructors run against a context `C`.
///
/// `flush` runs the most recently pushed entry first, so teardown mirrors the
/// order in which resources were acquired.
pub struct DeletionQueue<C> {
    entries: Vec<(&'static str, Box<dyn FnOnce(&mut C)>)>,
}

impl<C> Default for DeletionQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> DeletionQueue<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, label: &'static str, destroy: impl FnOnce(&mut C) + 'static) {
        self.entries.push((label, Box::new(destroy)));
    }

    /// Moves every entry of `other` onto the end of this queue.
    pub fn append(&mut self, other: &mut Self) {
        self.entries.append(&mut other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every entry in reverse push order and empties the queue.
    pub fn flush(&mut self, ctx: &mut C) {
        while let Some((label, destroy)) = self.entries.pop() {
            log::trace!(target: "vizor_engine::frame", "deferred destroy: {label}");
            destroy(ctx);
        }
    }
}

impl<C> std::fmt::Debug for DeletionQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(label, _)| label))
            .finish()
    }
}
