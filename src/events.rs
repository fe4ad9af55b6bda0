use tokio::sync::oneshot;

use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// One slot's content as published to the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotContent {
    pub index: usize,
    pub record: Record,
}

/// Full redraw after a successful install.
#[derive(Debug, Clone)]
pub struct PoolReplaced {
    pub generation: u64,
    pub slots: Vec<SlotContent>,
}

/// Single-slot delta produced by one rotation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub generation: u64,
    pub slot: usize,
    pub record: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Provider,
    InsufficientResults,
    Install,
}

/// Everything the rendering layer observes.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Progress { refresh: u64, fraction: f64 },
    PoolReplaced(PoolReplaced),
    Swap(SwapEvent),
    PlayState(PlayState),
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug)]
pub enum EngineCommand {
    Refresh(String),
    Play,
    Pause,
    TogglePlay,
    Stop(oneshot::Sender<()>),
}
