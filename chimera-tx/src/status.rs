//! 事务状态
//!
//! `TransactionStatus` 由事务管理器创建，交给应用代码标记回滚，再交回管理器提交或回滚。

use crate::definition::TransactionDefinition;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// 一个实际的事务，参与者共享同一个句柄
#[derive(Debug)]
pub struct TransactionHandle {
    id: u64,
    rollback_only: AtomicBool,
}

impl TransactionHandle {
    pub fn begin() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst),
            rollback_only: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// 整个事务只能回滚（参与者失败时设置）
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }
}

/// 事务状态
pub struct TransactionStatus {
    name: Option<String>,
    read_only: bool,
    transaction: Option<Arc<TransactionHandle>>,
    new_transaction: bool,
    savepoint: bool,
    rollback_only: AtomicBool,
    completed: AtomicBool,
    suspended: Mutex<Option<Arc<TransactionHandle>>>,
}

impl TransactionStatus {
    pub fn new(
        definition: &TransactionDefinition,
        transaction: Option<Arc<TransactionHandle>>,
        new_transaction: bool,
    ) -> Self {
        Self {
            name: definition.name.clone(),
            read_only: definition.read_only,
            transaction,
            new_transaction,
            savepoint: false,
            rollback_only: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            suspended: Mutex::new(None),
        }
    }

    /// 没有实际事务的状态（SUPPORTS / NOT_SUPPORTED / NEVER）
    pub fn empty(definition: &TransactionDefinition) -> Self {
        Self::new(definition, None, false)
    }

    /// 嵌套事务：回滚只回到保存点
    pub fn with_savepoint(mut self) -> Self {
        self.savepoint = true;
        self
    }

    /// 完成后需要恢复的外层事务
    pub fn with_suspended(self, suspended: Option<Arc<TransactionHandle>>) -> Self {
        *self.suspended.lock() = suspended;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn transaction(&self) -> Option<&Arc<TransactionHandle>> {
        self.transaction.as_ref()
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn is_new_transaction(&self) -> bool {
        self.has_transaction() && self.new_transaction
    }

    pub fn has_savepoint(&self) -> bool {
        self.savepoint
    }

    /// 只回滚，提交请求会变成回滚
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_local_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub fn is_global_rollback_only(&self) -> bool {
        self.transaction
            .as_ref()
            .map(|tx| tx.is_rollback_only())
            .unwrap_or(false)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.is_local_rollback_only() || self.is_global_rollback_only()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn set_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn take_suspended(&self) -> Option<Arc<TransactionHandle>> {
        self.suspended.lock().take()
    }
}

impl fmt::Debug for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("name", &self.name)
            .field("transaction", &self.transaction.as_ref().map(|tx| tx.id()))
            .field("new_transaction", &self.new_transaction)
            .field("savepoint", &self.savepoint)
            .field("rollback_only", &self.is_rollback_only())
            .field("completed", &self.is_completed())
            .finish()
    }
}
