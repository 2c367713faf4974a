//! Engine error taxonomy.
//!
//! Every failure the orchestrator can surface is an [`EngineError`]. Callers use
//! [`EngineError::class`] to decide between aborting, rebuilding, or carrying on.

use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorClass {
    /// Startup or resource-creation failure; no runnable engine is left behind.
    Fatal,
    /// Stale presentation surface; handled by a rebuild on the next iteration.
    Transient,
    /// A rendering strategy hook failed outside `initialize`.
    StrategyLocal,
    /// The GPU stopped making progress or rejected work.
    DeviceLoss,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no device context was provided to the engine")]
    MissingBackend,

    #[error("no rendering strategy was set before init")]
    MissingStrategy,

    #[error("invalid capability set: {0}")]
    InvalidCapabilities(String),

    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: String, reason: String },

    #[error("presentation surface configuration failed: {0}")]
    SurfaceConfiguration(String),

    #[error("presentation surface is stale and must be rebuilt")]
    SurfaceStale,

    #[error("rendering strategy failed to initialize")]
    StrategyInit(#[source] anyhow::Error),

    #[error("strategy hook `{hook}` failed")]
    StrategyHook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("custom composite left the presentation image in {0:?}")]
    CompositeLayout(crate::surface::ImageLayout),

    #[error("failed to acquire next presentable image: {0}")]
    Acquire(String),

    #[error("failed to present image: {0}")]
    Present(String),

    #[error("command submission failed: {0}")]
    Submit(String),

    #[error("device lost while waiting for completion value {value}: {reason}")]
    DeviceLost { value: u64, reason: String },

    #[error("overlay subsystem failed: {0}")]
    Overlay(String),

    #[error("engine is not initialized")]
    NotInitialized,
}

impl EngineError {
    pub fn resource(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResourceCreation {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn hook(hook: &'static str, source: anyhow::Error) -> Self {
        Self::StrategyHook { hook, source }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::SurfaceStale => ErrorClass::Transient,
            Self::StrategyHook { .. } | Self::CompositeLayout(_) => ErrorClass::StrategyLocal,
            Self::DeviceLost { .. } | Self::Submit(_) | Self::Present(_) => ErrorClass::DeviceLoss,
            _ => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if the run loop must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal | ErrorClass::DeviceLoss)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
