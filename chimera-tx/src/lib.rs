//! Chimera TX - 声明式事务
//!
//! 基于 `chimera-aop` 的方法拦截，在事务中执行被代理的方法：
//! - 事务属性（传播行为、隔离级别、超时、只读、回滚规则）及其文本形式
//! - 按方法解析属性的属性来源，支持方法名模式
//! - 按限定名或唯一性解析事务管理器
//! - `TransactionInterceptor` 负责开启、提交和按规则回滚，并把当前事务绑定到线程
//!
//! ```ignore
//! use chimera_tx::prelude::*;
//!
//! let interceptor = TransactionInterceptor::new(
//!     Arc::new(ResourcelessTransactionManager::new()),
//!     NameMatchTransactionAttributeSource::new().with("place*", TransactionAttribute::new()),
//! );
//! factory.add_advice(Advice::interceptor(interceptor))?;
//! ```

pub mod aspect_support;
pub mod attribute;
pub mod config;
pub mod definition;
pub mod error;
pub mod interceptor;
pub mod manager;
pub mod registry;
pub mod resourceless;
pub mod source;
pub mod status;

pub use aspect_support::{
    current_transaction_info, current_transaction_status, TransactionAspectSupport, TransactionInfo,
    TransactionInfoScope,
};
pub use attribute::{RollbackRule, TransactionAttribute};
pub use config::TransactionSettings;
pub use definition::{Isolation, Propagation, TransactionDefinition, TIMEOUT_DEFAULT};
pub use error::{TransactionError, TransactionResult};
pub use interceptor::TransactionInterceptor;
pub use manager::{
    CallbackPreferringPlatformTransactionManager, PlatformTransactionManager, TransactionCallback,
};
pub use registry::{MapTransactionManagerRegistry, TransactionManagerRegistry};
pub use resourceless::{ResourcelessTransactionManager, TransactionStats};
pub use source::{
    CompositeTransactionAttributeSource, MatchAlwaysTransactionAttributeSource,
    NameMatchTransactionAttributeSource, TransactionAttributeSource,
};
pub use status::{TransactionHandle, TransactionStatus};

/// 预导入模块
pub mod prelude {
    pub use crate::aspect_support::{current_transaction_status, TransactionAspectSupport};
    pub use crate::attribute::{RollbackRule, TransactionAttribute};
    pub use crate::definition::{Isolation, Propagation};
    pub use crate::error::{TransactionError, TransactionResult};
    pub use crate::interceptor::TransactionInterceptor;
    pub use crate::manager::PlatformTransactionManager;
    pub use crate::resourceless::ResourcelessTransactionManager;
    pub use crate::source::{NameMatchTransactionAttributeSource, TransactionAttributeSource};
    pub use crate::status::TransactionStatus;
}
