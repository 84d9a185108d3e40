pub mod callback;
pub mod commands;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod platform;
pub mod storage;

pub use config::Config;
pub use error::{PlatformError, PlatformResult};
pub use platform::FactorPlatform;
