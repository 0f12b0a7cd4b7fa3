//! 事务管理器契约

use crate::attribute::TransactionAttribute;
use crate::definition::TransactionDefinition;
use crate::error::TransactionResult;
use crate::status::TransactionStatus;
use chimera_core::{Throwable, Value};
use std::sync::Arc;

/// 标准事务管理器：开启（或加入）事务、提交、回滚
pub trait PlatformTransactionManager: Send + Sync + 'static {
    /// 按传播行为返回当前事务或新建事务
    fn get_transaction(&self, definition: &TransactionDefinition) -> TransactionResult<Arc<TransactionStatus>>;

    /// 提交；状态已标记为只回滚时执行回滚
    fn commit(&self, status: &TransactionStatus) -> TransactionResult<()>;

    fn rollback(&self, status: &TransactionStatus) -> TransactionResult<()>;

    /// 由管理器自己控制提交和回滚流程时返回 Some
    fn as_callback_preferring(&self) -> Option<&dyn CallbackPreferringPlatformTransactionManager> {
        None
    }
}

/// 事务回调，参数是管理器为本次执行准备的状态
pub type TransactionCallback<'a> = dyn FnMut(&Arc<TransactionStatus>) -> Result<Value, Throwable> + 'a;

/// 回调式事务管理器
///
/// 回调返回错误时回滚，正常返回时提交。
pub trait CallbackPreferringPlatformTransactionManager: PlatformTransactionManager {
    fn execute(
        &self,
        attribute: &TransactionAttribute,
        callback: &mut TransactionCallback<'_>,
    ) -> Result<Value, Throwable>;
}
