//! 按名称或类型查找事务管理器

use crate::error::{TransactionError, TransactionResult};
use crate::manager::PlatformTransactionManager;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 事务管理器的外部查找契约
pub trait TransactionManagerRegistry: Send + Sync + 'static {
    /// 按名称（限定名）查找
    fn manager(&self, name: &str) -> TransactionResult<Arc<dyn PlatformTransactionManager>>;

    /// 按类型查找唯一的管理器
    fn unique_manager(&self) -> TransactionResult<Arc<dyn PlatformTransactionManager>>;
}

/// 基于映射表的注册表
#[derive(Default)]
pub struct MapTransactionManagerRegistry {
    managers: RwLock<BTreeMap<String, Arc<dyn PlatformTransactionManager>>>,
}

impl MapTransactionManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, manager: Arc<dyn PlatformTransactionManager>) {
        let name = name.into();
        tracing::debug!("Registering transaction manager '{}'", name);
        self.managers.write().insert(name, manager);
    }

    pub fn with(self, name: impl Into<String>, manager: Arc<dyn PlatformTransactionManager>) -> Self {
        self.register(name, manager);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.managers.read().keys().cloned().collect()
    }
}

impl TransactionManagerRegistry for MapTransactionManagerRegistry {
    fn manager(&self, name: &str) -> TransactionResult<Arc<dyn PlatformTransactionManager>> {
        self.managers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TransactionError::NoTransactionManager(name.to_string()))
    }

    fn unique_manager(&self) -> TransactionResult<Arc<dyn PlatformTransactionManager>> {
        let managers = self.managers.read();
        let mut candidates = managers.values();
        match (candidates.next(), managers.len()) {
            (Some(manager), 1) => Ok(Arc::clone(manager)),
            (None, _) => Err(TransactionError::NoTransactionManager(
                "PlatformTransactionManager".to_string(),
            )),
            (_, count) => Err(TransactionError::NoUniqueTransactionManager(count)),
        }
    }
}
