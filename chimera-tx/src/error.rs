//! 事务错误类型
//!
//! `TransactionError` 在跨越调用边界时转换为 `Throwable`，
//! 异常类都位于 `TransactionException`（非受检）之下。

use chimera_core::{lang, ClassInfo, Throwable};
use once_cell::sync::Lazy;
use std::sync::Arc;
use thiserror::Error;

pub const TRANSACTION_EXCEPTION: &str = "chimera.tx.TransactionException";
pub const TRANSACTION_SYSTEM_EXCEPTION: &str = "chimera.tx.TransactionSystemException";
pub const NO_TRANSACTION_EXCEPTION: &str = "chimera.tx.NoTransactionException";
pub const ILLEGAL_TRANSACTION_STATE_EXCEPTION: &str = "chimera.tx.IllegalTransactionStateException";
pub const UNEXPECTED_ROLLBACK_EXCEPTION: &str = "chimera.tx.UnexpectedRollbackException";
pub const INVALID_TIMEOUT_EXCEPTION: &str = "chimera.tx.InvalidTimeoutException";
pub const NO_SUCH_BEAN_DEFINITION_EXCEPTION: &str = "chimera.beans.NoSuchBeanDefinitionException";
pub const NO_UNIQUE_BEAN_DEFINITION_EXCEPTION: &str = "chimera.beans.NoUniqueBeanDefinitionException";

static TRANSACTION_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(TRANSACTION_EXCEPTION, &lang::runtime_exception()));

static TRANSACTION_SYSTEM_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(TRANSACTION_SYSTEM_EXCEPTION, &TRANSACTION_EXCEPTION_CLASS));

static NO_TRANSACTION_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(NO_TRANSACTION_EXCEPTION, &TRANSACTION_EXCEPTION_CLASS));

static ILLEGAL_TRANSACTION_STATE_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> = Lazy::new(|| {
    ClassInfo::exception(ILLEGAL_TRANSACTION_STATE_EXCEPTION, &TRANSACTION_EXCEPTION_CLASS)
});

static UNEXPECTED_ROLLBACK_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(UNEXPECTED_ROLLBACK_EXCEPTION, &TRANSACTION_EXCEPTION_CLASS));

static INVALID_TIMEOUT_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(INVALID_TIMEOUT_EXCEPTION, &TRANSACTION_EXCEPTION_CLASS));

static NO_SUCH_BEAN_DEFINITION_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(NO_SUCH_BEAN_DEFINITION_EXCEPTION, &lang::runtime_exception()));

static NO_UNIQUE_BEAN_DEFINITION_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> = Lazy::new(|| {
    ClassInfo::exception(NO_UNIQUE_BEAN_DEFINITION_EXCEPTION, &NO_SUCH_BEAN_DEFINITION_EXCEPTION_CLASS)
});

pub fn transaction_exception() -> Arc<ClassInfo> {
    Arc::clone(&TRANSACTION_EXCEPTION_CLASS)
}

pub fn transaction_system_exception() -> Arc<ClassInfo> {
    Arc::clone(&TRANSACTION_SYSTEM_EXCEPTION_CLASS)
}

/// 事务错误
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("No transaction aspect-managed TransactionStatus in scope")]
    NoTransaction,

    #[error("No transaction manager named '{0}' is registered")]
    NoTransactionManager(String),

    #[error("No unique transaction manager found: {0} candidates registered")]
    NoUniqueTransactionManager(usize),

    #[error("Invalid transaction attribute '{value}': {reason}")]
    InvalidAttribute { value: String, reason: String },

    #[error("Invalid transaction timeout: {0}")]
    InvalidTimeout(i32),

    #[error("{0}")]
    IllegalTransactionState(String),

    #[error("Transaction rolled back because it has been marked as rollback-only")]
    UnexpectedRollback,

    #[error("{0}")]
    System(String),

    #[error("{0}")]
    Configuration(String),
}

pub type TransactionResult<T> = Result<T, TransactionError>;

impl From<TransactionError> for Throwable {
    fn from(err: TransactionError) -> Self {
        let class = match &err {
            TransactionError::NoTransaction => Arc::clone(&NO_TRANSACTION_EXCEPTION_CLASS),
            TransactionError::NoTransactionManager(_) => {
                Arc::clone(&NO_SUCH_BEAN_DEFINITION_EXCEPTION_CLASS)
            }
            TransactionError::NoUniqueTransactionManager(_) => {
                Arc::clone(&NO_UNIQUE_BEAN_DEFINITION_EXCEPTION_CLASS)
            }
            TransactionError::InvalidAttribute { .. } => lang::illegal_argument_exception(),
            TransactionError::InvalidTimeout(_) => Arc::clone(&INVALID_TIMEOUT_EXCEPTION_CLASS),
            TransactionError::IllegalTransactionState(_) => {
                Arc::clone(&ILLEGAL_TRANSACTION_STATE_EXCEPTION_CLASS)
            }
            TransactionError::UnexpectedRollback => Arc::clone(&UNEXPECTED_ROLLBACK_EXCEPTION_CLASS),
            TransactionError::System(_) => transaction_system_exception(),
            TransactionError::Configuration(_) => lang::illegal_state_exception(),
        };
        Throwable::new(class, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_errors_are_unchecked() {
        let err: Throwable = TransactionError::NoTransaction.into();
        assert!(err.is_unchecked());
        assert!(err.is_instance_of(TRANSACTION_EXCEPTION));
        assert_eq!(err.class_name(), NO_TRANSACTION_EXCEPTION);
    }

    #[test]
    fn test_unique_lookup_failure_is_a_bean_lookup_failure() {
        let err: Throwable = TransactionError::NoUniqueTransactionManager(2).into();
        assert!(err.is_instance_of(NO_SUCH_BEAN_DEFINITION_EXCEPTION));
        assert!(err.message().unwrap().contains("2 candidates"));
    }
}
