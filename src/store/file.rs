use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{Collection, EndpointScripts, Environment};
use crate::runner::RunnerDefinition;
use crate::store::repository::{MemoryRepository, Repository};
use crate::{ResonanceError, Result};

/// JSON 存储文件的结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreFile {
    pub collections: Vec<Collection>,
    pub environments: Vec<Environment>,
    pub runners: Vec<RunnerDefinition>,
    /// 键为 `"{collection_id}_{endpoint_id}"`
    pub scripts: IndexMap<String, EndpointScripts>,
}

impl StoreFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ResonanceError::Store(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
            ResonanceError::Store(format!("Invalid store file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            collections = file.collections.len(),
            environments = file.environments.len(),
            runners = file.runners.len(),
            "Loaded store file"
        );
        Ok(file)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn into_stores(self) -> Stores {
        Stores {
            collections: Arc::new(MemoryRepository::from_entries(
                self.collections.into_iter().map(|c| (c.id.clone(), c)),
            )),
            environments: Arc::new(MemoryRepository::from_entries(
                self.environments.into_iter().map(|e| (e.id.clone(), e)),
            )),
            runners: Arc::new(MemoryRepository::from_entries(
                self.runners.into_iter().map(|r| (r.id.clone(), r)),
            )),
            scripts: Arc::new(MemoryRepository::from_entries(self.scripts)),
        }
    }
}

/// runner 使用的四个存储
#[derive(Clone)]
pub struct Stores {
    pub collections: Arc<dyn Repository<Collection>>,
    pub environments: Arc<dyn Repository<Environment>>,
    pub runners: Arc<dyn Repository<RunnerDefinition>>,
    pub scripts: Arc<dyn Repository<EndpointScripts>>,
}

impl Default for Stores {
    fn default() -> Self {
        StoreFile::default().into_stores()
    }
}

impl Stores {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 把当前内容导出为可保存的 StoreFile
    pub async fn snapshot(&self) -> Result<StoreFile> {
        let mut scripts = IndexMap::new();
        let collections = self.collections.list().await?;
        for collection in &collections {
            for endpoint in &collection.endpoints {
                let key = EndpointScripts::key(&collection.id, &endpoint.id);
                if let Some(script) = self.scripts.get(&key).await? {
                    scripts.insert(key, script);
                }
            }
        }

        Ok(StoreFile {
            collections,
            environments: self.environments.list().await?,
            runners: self.runners.list().await?,
            scripts,
        })
    }
}
