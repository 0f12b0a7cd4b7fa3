//! 声明式事务拦截器
//!
//! ```ignore
//! let interceptor = TransactionInterceptor::new(
//!     Arc::new(ResourcelessTransactionManager::new()),
//!     NameMatchTransactionAttributeSource::new()
//!         .with("get*", "PROPAGATION_REQUIRED,readOnly".parse()?)
//!         .with("place*", TransactionAttribute::new()),
//! );
//! factory.add_advice(Advice::interceptor(interceptor))?;
//! ```

use crate::aspect_support::TransactionAspectSupport;
use crate::error::TransactionResult;
use crate::manager::PlatformTransactionManager;
use crate::source::{NameMatchTransactionAttributeSource, TransactionAttributeSource};
use chimera_aop::{utils, MethodInterceptor, MethodInvocation};
use chimera_core::{Throwable, Value};
use std::ops::Deref;
use std::sync::Arc;

/// 在事务中执行被拦截的方法
pub struct TransactionInterceptor {
    support: TransactionAspectSupport,
}

impl TransactionInterceptor {
    pub fn new(
        transaction_manager: Arc<dyn PlatformTransactionManager>,
        attributes: NameMatchTransactionAttributeSource,
    ) -> Self {
        Self::with_support(
            TransactionAspectSupport::new()
                .with_transaction_manager(transaction_manager)
                .with_transaction_attributes(attributes),
        )
    }

    pub fn with_attribute_source(
        transaction_manager: Arc<dyn PlatformTransactionManager>,
        source: Arc<dyn TransactionAttributeSource>,
    ) -> Self {
        Self::with_support(
            TransactionAspectSupport::new()
                .with_transaction_manager(transaction_manager)
                .with_attribute_source(source),
        )
    }

    pub fn with_support(support: TransactionAspectSupport) -> Self {
        Self { support }
    }

    /// 检查配置后创建
    pub fn validated(support: TransactionAspectSupport) -> TransactionResult<Self> {
        support.validate()?;
        Ok(Self::with_support(support))
    }

    pub fn support(&self) -> &TransactionAspectSupport {
        &self.support
    }
}

impl Deref for TransactionInterceptor {
    type Target = TransactionAspectSupport;

    fn deref(&self) -> &Self::Target {
        &self.support
    }
}

impl MethodInterceptor for TransactionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
        // 目标类可能为空，此时用方法的声明类型
        let target_class = invocation
            .target_class()
            .cloned()
            .or_else(|| invocation.this().map(utils::target_class));
        let method = invocation.method().clone();
        self.support
            .invoke_within_transaction(&method, target_class.as_ref(), || invocation.proceed())
    }
}
