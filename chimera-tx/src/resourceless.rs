//! 不绑定任何资源的事务管理器
//!
//! 完整执行传播行为的状态机（加入、挂起、保存点、只回滚标记），
//! 但提交和回滚只更新计数。适合测试，以及只需要事务边界语义的场景。

use crate::definition::{Isolation, Propagation, TransactionDefinition, TIMEOUT_DEFAULT};
use crate::error::{TransactionError, TransactionResult};
use crate::manager::PlatformTransactionManager;
use crate::status::{TransactionHandle, TransactionStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// 事务计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub savepoint_rollbacks: u64,
}

#[derive(Default)]
pub struct ResourcelessTransactionManager {
    current: Mutex<HashMap<ThreadId, Arc<TransactionHandle>>>,
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    savepoint_rollbacks: AtomicU64,
}

impl ResourcelessTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.begun.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
            savepoint_rollbacks: self.savepoint_rollbacks.load(Ordering::SeqCst),
        }
    }

    /// 当前线程上是否有活动事务
    pub fn has_active_transaction(&self) -> bool {
        self.current.lock().contains_key(&thread::current().id())
    }

    fn begin(
        &self,
        definition: &TransactionDefinition,
        thread: ThreadId,
        suspended: Option<Arc<TransactionHandle>>,
    ) -> Arc<TransactionStatus> {
        let handle = TransactionHandle::begin();
        tracing::debug!(
            "Creating new transaction #{} with name [{}]: {}",
            handle.id(),
            definition.name.as_deref().unwrap_or(""),
            definition
        );
        self.current.lock().insert(thread, Arc::clone(&handle));
        self.begun.fetch_add(1, Ordering::SeqCst);
        Arc::new(TransactionStatus::new(definition, Some(handle), true).with_suspended(suspended))
    }

    fn suspend(&self, thread: ThreadId) -> Option<Arc<TransactionHandle>> {
        let suspended = self.current.lock().remove(&thread);
        if let Some(handle) = &suspended {
            tracing::debug!("Suspending current transaction #{}", handle.id());
        }
        suspended
    }

    fn handle_existing(
        &self,
        definition: &TransactionDefinition,
        existing: Arc<TransactionHandle>,
        thread: ThreadId,
    ) -> TransactionResult<Arc<TransactionStatus>> {
        match definition.propagation {
            Propagation::Never => Err(TransactionError::IllegalTransactionState(
                "Existing transaction found for transaction marked with propagation 'never'".to_string(),
            )),
            Propagation::NotSupported => {
                let suspended = self.suspend(thread);
                Ok(Arc::new(TransactionStatus::empty(definition).with_suspended(suspended)))
            }
            Propagation::RequiresNew => {
                let suspended = self.suspend(thread);
                Ok(self.begin(definition, thread, suspended))
            }
            Propagation::Nested => {
                tracing::debug!("Creating nested transaction with name [{}]", definition.name.as_deref().unwrap_or(""));
                Ok(Arc::new(
                    TransactionStatus::new(definition, Some(existing), false).with_savepoint(),
                ))
            }
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                tracing::trace!("Participating in existing transaction #{}", existing.id());
                Ok(Arc::new(TransactionStatus::new(definition, Some(existing), false)))
            }
        }
    }

    fn process_commit(&self, status: &TransactionStatus) {
        if status.has_savepoint() {
            tracing::debug!("Releasing transaction savepoint");
        } else if status.is_new_transaction() {
            tracing::debug!("Initiating transaction commit");
            self.committed.fetch_add(1, Ordering::SeqCst);
        }
        self.cleanup_after_completion(status);
    }

    fn process_rollback(&self, status: &TransactionStatus) {
        if status.has_savepoint() {
            tracing::debug!("Rolling back transaction to savepoint");
            self.savepoint_rollbacks.fetch_add(1, Ordering::SeqCst);
        } else if status.is_new_transaction() {
            tracing::debug!("Initiating transaction rollback");
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
        } else if let Some(tx) = status.transaction() {
            tracing::debug!("Participating transaction failed - marking existing transaction as rollback-only");
            tx.set_rollback_only();
        } else {
            tracing::debug!("Should roll back transaction but cannot - no transaction available");
        }
        self.cleanup_after_completion(status);
    }

    fn cleanup_after_completion(&self, status: &TransactionStatus) {
        status.set_completed();
        let thread = thread::current().id();
        if status.is_new_transaction() {
            self.current.lock().remove(&thread);
        }
        if let Some(suspended) = status.take_suspended() {
            tracing::debug!("Resuming suspended transaction #{} after completion of inner transaction", suspended.id());
            self.current.lock().insert(thread, suspended);
        }
    }

    fn check_not_completed(status: &TransactionStatus) -> TransactionResult<()> {
        if status.is_completed() {
            return Err(TransactionError::IllegalTransactionState(
                "Transaction is already completed - do not call commit or rollback more than once per transaction"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl PlatformTransactionManager for ResourcelessTransactionManager {
    fn get_transaction(&self, definition: &TransactionDefinition) -> TransactionResult<Arc<TransactionStatus>> {
        if definition.timeout < TIMEOUT_DEFAULT {
            return Err(TransactionError::InvalidTimeout(definition.timeout));
        }
        let thread = thread::current().id();
        let existing = self.current.lock().get(&thread).cloned();
        if let Some(existing) = existing {
            return self.handle_existing(definition, existing, thread);
        }

        match definition.propagation {
            Propagation::Mandatory => Err(TransactionError::IllegalTransactionState(
                "No existing transaction found for transaction marked with propagation 'mandatory'".to_string(),
            )),
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                Ok(self.begin(definition, thread, None))
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                if definition.isolation != Isolation::Default {
                    tracing::warn!(
                        "Custom isolation level specified but no actual transaction initiated; isolation level will effectively be ignored: {}",
                        definition
                    );
                }
                Ok(Arc::new(TransactionStatus::empty(definition)))
            }
        }
    }

    fn commit(&self, status: &TransactionStatus) -> TransactionResult<()> {
        Self::check_not_completed(status)?;
        if status.is_local_rollback_only() {
            tracing::debug!("Transactional code has requested rollback");
            self.process_rollback(status);
            return Ok(());
        }
        if status.is_global_rollback_only() && !status.has_savepoint() {
            tracing::debug!("Global transaction is marked as rollback-only but transactional code requested commit");
            let new_transaction = status.is_new_transaction();
            self.process_rollback(status);
            if new_transaction {
                return Err(TransactionError::UnexpectedRollback);
            }
            return Ok(());
        }
        self.process_commit(status);
        Ok(())
    }

    fn rollback(&self, status: &TransactionStatus) -> TransactionResult<()> {
        Self::check_not_completed(status)?;
        self.process_rollback(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(propagation: Propagation) -> TransactionDefinition {
        TransactionDefinition::with_propagation(propagation)
    }

    #[test]
    fn test_required_participates_in_existing() {
        let tm = ResourcelessTransactionManager::new();
        let outer = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        let inner = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        assert!(outer.is_new_transaction());
        assert!(!inner.is_new_transaction());

        tm.commit(&inner).unwrap();
        assert!(tm.has_active_transaction());
        tm.commit(&outer).unwrap();
        assert!(!tm.has_active_transaction());
        assert_eq!(tm.stats(), TransactionStats { begun: 1, committed: 1, ..Default::default() });
    }

    #[test]
    fn test_inner_rollback_marks_outer_rollback_only() {
        let tm = ResourcelessTransactionManager::new();
        let outer = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        let inner = tm.get_transaction(&definition(Propagation::Supports)).unwrap();
        tm.rollback(&inner).unwrap();

        assert!(outer.is_rollback_only());
        assert!(matches!(tm.commit(&outer), Err(TransactionError::UnexpectedRollback)));
        assert_eq!(tm.stats().rolled_back, 1);
        assert_eq!(tm.stats().committed, 0);
    }

    #[test]
    fn test_requires_new_suspends_and_resumes() {
        let tm = ResourcelessTransactionManager::new();
        let outer = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        let inner = tm.get_transaction(&definition(Propagation::RequiresNew)).unwrap();
        assert!(inner.is_new_transaction());
        assert_ne!(outer.transaction().unwrap().id(), inner.transaction().unwrap().id());

        tm.rollback(&inner).unwrap();
        let joined = tm.get_transaction(&definition(Propagation::Mandatory)).unwrap();
        assert_eq!(joined.transaction().unwrap().id(), outer.transaction().unwrap().id());
        tm.commit(&joined).unwrap();
        tm.commit(&outer).unwrap();
        assert_eq!(tm.stats(), TransactionStats { begun: 2, committed: 1, rolled_back: 1, savepoint_rollbacks: 0 });
    }

    #[test]
    fn test_nested_rollback_stays_local() {
        let tm = ResourcelessTransactionManager::new();
        let outer = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        let nested = tm.get_transaction(&definition(Propagation::Nested)).unwrap();
        assert!(nested.has_savepoint());
        tm.rollback(&nested).unwrap();

        assert!(!outer.is_rollback_only());
        tm.commit(&outer).unwrap();
        assert_eq!(tm.stats().savepoint_rollbacks, 1);
        assert_eq!(tm.stats().committed, 1);
    }

    #[test]
    fn test_propagation_constraints() {
        let tm = ResourcelessTransactionManager::new();
        assert!(matches!(
            tm.get_transaction(&definition(Propagation::Mandatory)),
            Err(TransactionError::IllegalTransactionState(_))
        ));
        let outer = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        assert!(matches!(
            tm.get_transaction(&definition(Propagation::Never)),
            Err(TransactionError::IllegalTransactionState(_))
        ));

        let unsupported = tm.get_transaction(&definition(Propagation::NotSupported)).unwrap();
        assert!(!unsupported.has_transaction());
        assert!(!tm.has_active_transaction());
        tm.commit(&unsupported).unwrap();
        assert!(tm.has_active_transaction());
        tm.commit(&outer).unwrap();
    }

    #[test]
    fn test_local_rollback_only_and_double_completion() {
        let tm = ResourcelessTransactionManager::new();
        let status = tm.get_transaction(&definition(Propagation::Required)).unwrap();
        status.set_rollback_only();
        tm.commit(&status).unwrap();
        assert_eq!(tm.stats().rolled_back, 1);
        assert!(matches!(
            tm.rollback(&status),
            Err(TransactionError::IllegalTransactionState(_))
        ));
    }

    #[test]
    fn test_invalid_timeout() {
        let tm = ResourcelessTransactionManager::new();
        let mut def = definition(Propagation::Required);
        def.timeout = -7;
        assert!(matches!(tm.get_transaction(&def), Err(TransactionError::InvalidTimeout(-7))));
    }
}
