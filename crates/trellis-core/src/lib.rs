pub mod acquire;
pub mod cache;
pub mod checksum;
pub mod conflict;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
mod fsutil;
pub mod latest;
pub mod locator;
pub mod namespace;
pub mod paths;
pub mod pattern;
pub mod repository;
pub mod resolver;
pub mod selector;
pub mod settings;
pub mod version;

pub mod reporter;

pub use context::{Interrupt, ResolveContext};
pub use engine::{Engine, ResolveOptions, ResolveReport};
pub use error::ResolveError;
pub use paths::*;
pub use reporter::{NullReporter, Reporter};
pub use resolver::{DependencyResolver, ResolverEnv};
pub use settings::{Settings, SettingsError, SettingsFile};

/// User Agent string for repository requests
pub const USER_AGENT: &str = concat!("trellis-core/", env!("CARGO_PKG_VERSION"));
