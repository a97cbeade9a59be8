pub mod config;
pub mod dynamic;
pub mod processor;
pub mod types;

pub use config::{ConfigLoader, EnvironmentConfig, ProxyConfig, ResonanceConfig, Settings};
pub use dynamic::{DynamicCache, DynamicInvocation};
pub use processor::{TemplatePreview, VariableProcessor};
pub use types::{EnvChange, EnvDiff, VariableContext};
