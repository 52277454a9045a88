use std::sync::{Arc, RwLock};

use prediction_core::TaskError;
use prediction_domain::entities::ModelDescriptor;
use prediction_domain::ports::ModelInfoProvider;
use tracing::debug;

/// 已知模型的快照
///
/// 每次同步整体替换快照；同步失败时保留上一次的快照。
pub struct ModelCatalog {
    provider: Arc<dyn ModelInfoProvider>,
    projects: Vec<String>,
    snapshot: RwLock<Arc<Vec<ModelDescriptor>>>,
}

impl ModelCatalog {
    /// `projects` 为空表示所有项目
    pub fn new(provider: Arc<dyn ModelInfoProvider>, projects: Vec<String>) -> Self {
        Self {
            provider,
            projects,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn projects(&self) -> &[String] {
        &self.projects
    }

    /// 拉取模型列表并替换快照，返回新快照中的模型数量
    pub async fn synchronize(&self) -> Result<usize, TaskError> {
        let models = self.provider.get_all_models(&self.projects).await?;
        let count = models.len();

        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(models);
        debug!("模型目录快照已替换: {} 个模型", count);
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<Vec<ModelDescriptor>> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
