/// 存储 - collection、environment、runner 定义与端点脚本
pub mod file;
pub mod repository;

pub use file::{StoreFile, Stores};
pub use repository::{MemoryRepository, Repository};
