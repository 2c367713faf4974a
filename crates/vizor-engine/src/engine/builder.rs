use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::engine::Orchestrator;
use crate::error::{EngineError, EngineResult};
use crate::overlay::Overlay;
use crate::strategy::RenderingStrategy;

/// Collects the engine's collaborators before [`build`](Self::build).
pub struct EngineBuilder<B: Backend> {
    backend: Option<B>,
    strategy: Option<Box<dyn RenderingStrategy<B>>>,
    overlay: Option<Box<dyn Overlay<B>>>,
    config: EngineConfig,
}

impl<B: Backend> Default for EngineBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> EngineBuilder<B> {
    pub fn new() -> Self {
        Self {
            backend: None,
            strategy: None,
            overlay: None,
            config: EngineConfig::default(),
        }
    }

    pub fn backend(mut self, backend: B) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn strategy(mut self, strategy: impl RenderingStrategy<B> + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    pub fn boxed_strategy(mut self, strategy: Box<dyn RenderingStrategy<B>>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn overlay(mut self, overlay: impl Overlay<B> + 'static) -> Self {
        self.overlay = Some(Box::new(overlay));
        self
    }

    pub fn boxed_overlay(mut self, overlay: Option<Box<dyn Overlay<B>>>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Initializes the engine. Fails without side effects if the backend or
    /// the strategy is missing.
    pub fn build(self) -> EngineResult<Orchestrator<B>> {
        let backend = self.backend.ok_or(EngineError::MissingBackend)?;
        let strategy = self.strategy.ok_or(EngineError::MissingStrategy)?;
        Orchestrator::init(backend, strategy, self.overlay, self.config)
    }
}
