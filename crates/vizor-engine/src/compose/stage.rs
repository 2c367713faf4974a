/// Steps of one frame's composition, in recording order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    StrategyDraw,
    EngineComposite,
    CustomComposite,
    OverlayDraw,
    Present,
}

impl Stage {
    /// Debug group label recorded around the stage's commands.
    pub fn label(self) -> &'static str {
        match self {
            Self::StrategyDraw => "strategy-draw",
            Self::EngineComposite => "engine-composite",
            Self::CustomComposite => "custom-composite",
            Self::OverlayDraw => "overlay-draw",
            Self::Present => "present",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::StrategyDraw => 0,
            Self::EngineComposite | Self::CustomComposite => 1,
            Self::OverlayDraw => 2,
            Self::Present => 3,
        }
    }
}

/// Ordered record of the stages a frame went through.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageTracker {
    history: Vec<Stage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            history: Vec::with_capacity(5),
        }
    }

    /// Enters `next`. Stages only move forward; the one exception is an engine
    /// composite replacing a rejected custom composite.
    pub fn enter(&mut self, next: Stage) {
        if let Some(&current) = self.history.last() {
            let fallback = current == Stage::CustomComposite && next == Stage::EngineComposite;
            debug_assert!(
                fallback || next.rank() > current.rank(),
                "composition stage {next:?} entered after {current:?}"
            );
        }
        self.history.push(next);
    }

    pub fn current(&self) -> Option<Stage> {
        self.history.last().copied()
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }
}
