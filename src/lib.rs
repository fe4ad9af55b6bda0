pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod pool;
pub mod provider;
pub mod tasks {
    pub mod engine;
    pub mod refresh;
    pub mod scheduler;
}

pub use pool::{PoolManager, PoolSnapshot};
pub use tasks::engine::{Engine, EngineHandle};
