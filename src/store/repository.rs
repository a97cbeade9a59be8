use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::Result;

/// 以不透明 id 为键的异步存储
///
/// runner 只依赖这个接口，不关心底层是内存、文件还是数据库。
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, id: &str) -> Result<Option<T>>;

    async fn set(&self, id: &str, value: T) -> Result<()>;

    /// 按插入顺序返回全部条目
    async fn list(&self) -> Result<Vec<T>>;

    /// 返回条目是否存在
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// 内存实现
#[derive(Debug)]
pub struct MemoryRepository<T> {
    items: RwLock<IndexMap<String, T>>,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(IndexMap::new()),
        }
    }
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, T)>,
    {
        Self {
            items: RwLock::new(entries.into_iter().collect()),
        }
    }
}

#[async_trait]
impl<T> Repository<T> for MemoryRepository<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn set(&self, id: &str, value: T) -> Result<()> {
        self.items.write().await.insert(id.to_string(), value);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<T>> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.items.write().await.shift_remove(id).is_some())
    }
}
