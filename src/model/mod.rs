/// 数据模型 - collection、endpoint、environment
pub mod collection;
pub mod environment;

pub use collection::{
    Collection, Endpoint, EndpointScripts, is_absolute_url, join_url, substitute_path_params,
};
pub use environment::Environment;
