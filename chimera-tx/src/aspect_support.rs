//! 事务环绕逻辑
//!
//! `TransactionAspectSupport::invoke_within_transaction` 是所有事务拦截方式的公共部分：
//! 解析事务属性和事务管理器，开启或加入事务，执行连接点，按回滚规则提交或回滚。
//!
//! 每次调用都会把一个 `TransactionInfo` 绑定到当前线程（非事务方法绑定占位信息），
//! 退出时恢复为外层的信息，因此同一线程上的嵌套调用总能看到正确的当前事务。

use crate::attribute::TransactionAttribute;
use crate::error::{TransactionError, TransactionResult, TRANSACTION_SYSTEM_EXCEPTION};
use crate::manager::{CallbackPreferringPlatformTransactionManager, PlatformTransactionManager};
use crate::registry::TransactionManagerRegistry;
use crate::source::{
    CompositeTransactionAttributeSource, NameMatchTransactionAttributeSource, TransactionAttributeSource,
};
use crate::status::TransactionStatus;
use chimera_core::{lang, ClassInfo, Method, Throwable, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 回调式管理器只传播非受检异常，需要回滚的受检异常用它包装后穿过回调边界
const THROWABLE_HOLDER_EXCEPTION: &str = "chimera.tx.ThrowableHolderException";

static THROWABLE_HOLDER_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(THROWABLE_HOLDER_EXCEPTION, &lang::runtime_exception()));

thread_local! {
    static CURRENT_TRANSACTION_INFO: RefCell<Option<Arc<TransactionInfo>>> = const { RefCell::new(None) };
}

/// 当前线程上绑定的事务信息
pub fn current_transaction_info() -> Option<Arc<TransactionInfo>> {
    CURRENT_TRANSACTION_INFO.with(|current| current.borrow().clone())
}

/// 当前线程上由事务拦截开启的事务状态
///
/// 没有绑定信息，或绑定的是非事务方法的占位信息时失败。
pub fn current_transaction_status() -> TransactionResult<Arc<TransactionStatus>> {
    current_transaction_info()
        .and_then(|info| info.transaction_status().cloned())
        .ok_or(TransactionError::NoTransaction)
}

/// 一次事务拦截的信息
pub struct TransactionInfo {
    transaction_manager: Option<Arc<dyn PlatformTransactionManager>>,
    transaction_attribute: Option<Arc<TransactionAttribute>>,
    joinpoint_identification: String,
    transaction_status: Option<Arc<TransactionStatus>>,
}

impl TransactionInfo {
    pub fn transaction_manager(&self) -> Option<&Arc<dyn PlatformTransactionManager>> {
        self.transaction_manager.as_ref()
    }

    pub fn transaction_attribute(&self) -> Option<&Arc<TransactionAttribute>> {
        self.transaction_attribute.as_ref()
    }

    pub fn joinpoint_identification(&self) -> &str {
        &self.joinpoint_identification
    }

    pub fn transaction_status(&self) -> Option<&Arc<TransactionStatus>> {
        self.transaction_status.as_ref()
    }

    /// 本次拦截是否开启或加入了事务
    pub fn has_transaction(&self) -> bool {
        self.transaction_status.is_some()
    }
}

impl fmt::Debug for TransactionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionInfo")
            .field("joinpoint", &self.joinpoint_identification)
            .field("attribute", &self.transaction_attribute.as_ref().map(|a| a.to_string()))
            .field("status", &self.transaction_status)
            .finish()
    }
}

/// 绑定期间 `TransactionInfo` 是线程上的当前信息，释放时恢复外层信息
pub struct TransactionInfoScope {
    info: Arc<TransactionInfo>,
    previous: Option<Arc<TransactionInfo>>,
}

impl TransactionInfoScope {
    fn bind(info: Arc<TransactionInfo>) -> Self {
        let previous = CURRENT_TRANSACTION_INFO.with(|current| current.replace(Some(Arc::clone(&info))));
        Self { info, previous }
    }

    pub fn info(&self) -> &Arc<TransactionInfo> {
        &self.info
    }
}

impl Drop for TransactionInfoScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TRANSACTION_INFO.with(|current| *current.borrow_mut() = previous);
    }
}

/// 事务拦截的公共支持
#[derive(Default)]
pub struct TransactionAspectSupport {
    attribute_source: Option<Arc<dyn TransactionAttributeSource>>,
    transaction_manager: Option<Arc<dyn PlatformTransactionManager>>,
    transaction_manager_name: Option<String>,
    registry: Option<Arc<dyn TransactionManagerRegistry>>,
    /// 按限定名缓存查找结果，None 是按类型查找的默认管理器
    manager_cache: Mutex<HashMap<Option<String>, Arc<dyn PlatformTransactionManager>>>,
}

impl TransactionAspectSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute_source(mut self, source: Arc<dyn TransactionAttributeSource>) -> Self {
        self.attribute_source = Some(source);
        self
    }

    /// 按方法名模式配置属性，例如 `get* -> PROPAGATION_REQUIRED,readOnly`
    pub fn with_transaction_attributes(mut self, source: NameMatchTransactionAttributeSource) -> Self {
        self.attribute_source = Some(Arc::new(source));
        self
    }

    /// 依次询问多个属性来源
    pub fn with_attribute_sources(mut self, sources: Vec<Arc<dyn TransactionAttributeSource>>) -> Self {
        self.attribute_source = Some(Arc::new(CompositeTransactionAttributeSource::new(sources)));
        self
    }

    pub fn with_transaction_manager(mut self, manager: Arc<dyn PlatformTransactionManager>) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    /// 从注册表查找的默认管理器名称
    pub fn with_transaction_manager_name(mut self, name: impl Into<String>) -> Self {
        self.transaction_manager_name = Some(name.into());
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn TransactionManagerRegistry>) -> Self {
        self.registry = Some(registry);
        self.manager_cache.lock().clear();
        self
    }

    pub fn attribute_source(&self) -> Option<&Arc<dyn TransactionAttributeSource>> {
        self.attribute_source.as_ref()
    }

    pub fn transaction_manager(&self) -> Option<&Arc<dyn PlatformTransactionManager>> {
        self.transaction_manager.as_ref()
    }

    /// 检查必需的配置
    pub fn validate(&self) -> TransactionResult<()> {
        if self.transaction_manager.is_none() && self.registry.is_none() {
            return Err(TransactionError::Configuration(
                "Set the transaction manager or provide a registry containing a PlatformTransactionManager"
                    .to_string(),
            ));
        }
        if self.attribute_source.is_none() {
            return Err(TransactionError::Configuration(
                "A transaction attribute source is required: if there are no transactional methods, don't use a transaction aspect"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn clear_transaction_manager_cache(&self) {
        self.manager_cache.lock().clear();
    }

    /// 在事务中执行 `invocation`
    pub fn invoke_within_transaction<F>(
        &self,
        method: &Method,
        target_class: Option<&Arc<ClassInfo>>,
        invocation: F,
    ) -> Result<Value, Throwable>
    where
        F: FnOnce() -> Result<Value, Throwable>,
    {
        let attribute = self
            .attribute_source
            .as_ref()
            .and_then(|source| source.transaction_attribute(method, target_class));
        let manager = self.determine_transaction_manager(attribute.as_deref())?;
        let joinpoint = method_identification(method, target_class, attribute.as_deref());

        if let (Some(attribute), Some(manager)) = (&attribute, &manager) {
            if let Some(callback_manager) = manager.as_callback_preferring() {
                return self.invoke_with_callback_manager(
                    callback_manager,
                    manager,
                    attribute,
                    &joinpoint,
                    invocation,
                );
            }
        }

        let scope = self.create_transaction_if_necessary(manager, attribute, &joinpoint)?;
        let info = Arc::clone(scope.info());
        let outcome = invocation().or_else(|ex| {
            self.complete_transaction_after_throwing(&info, &ex)?;
            Err(ex)
        });
        drop(scope);
        let value = outcome?;
        self.commit_transaction_after_returning(&info)?;
        Ok(value)
    }

    fn invoke_with_callback_manager<F>(
        &self,
        callback_manager: &dyn CallbackPreferringPlatformTransactionManager,
        manager: &Arc<dyn PlatformTransactionManager>,
        attribute: &Arc<TransactionAttribute>,
        joinpoint: &str,
        invocation: F,
    ) -> Result<Value, Throwable>
    where
        F: FnOnce() -> Result<Value, Throwable>,
    {
        let attribute = named_attribute(attribute, joinpoint);
        let mut invocation = Some(invocation);
        let mut captured: Option<Throwable> = None;

        let result = callback_manager.execute(&attribute, &mut |status: &Arc<TransactionStatus>| {
            let _scope = self.prepare_transaction_info(
                Some(Arc::clone(manager)),
                Some(Arc::clone(&attribute)),
                joinpoint,
                Some(Arc::clone(status)),
            );
            let Some(invocation) = invocation.take() else {
                return Err(Throwable::illegal_state(format!(
                    "Transaction callback for [{}] invoked more than once",
                    joinpoint
                )));
            };
            match invocation() {
                Ok(value) => Ok(value),
                Err(ex) if attribute.rollback_on(&ex) => {
                    if ex.is_unchecked() {
                        Err(ex)
                    } else {
                        Err(Throwable::wrapping(Arc::clone(&THROWABLE_HOLDER_EXCEPTION_CLASS), ex))
                    }
                }
                Err(ex) => {
                    // 提交之后再抛出
                    captured = Some(ex);
                    Ok(Value::Null)
                }
            }
        });

        match result {
            Ok(value) => match captured {
                Some(ex) => Err(ex),
                None => Ok(value),
            },
            Err(err) if err.class_name() == THROWABLE_HOLDER_EXCEPTION => {
                Err(err.cause().cloned().unwrap_or(err))
            }
            Err(err) => {
                if let Some(application_exception) = captured {
                    tracing::error!(
                        "Application exception overridden by commit exception: {}",
                        application_exception
                    );
                    if err.is_instance_of(TRANSACTION_SYSTEM_EXCEPTION) {
                        err.init_application_exception(application_exception);
                    }
                }
                Err(err)
            }
        }
    }

    /// 解析事务管理器：属性限定名 > 默认名称 > 直接配置的管理器 > 按类型唯一查找
    fn determine_transaction_manager(
        &self,
        attribute: Option<&TransactionAttribute>,
    ) -> TransactionResult<Option<Arc<dyn PlatformTransactionManager>>> {
        let (Some(attribute), Some(registry)) = (attribute, &self.registry) else {
            return Ok(self.transaction_manager.clone());
        };

        if let Some(qualifier) = attribute.get_qualifier() {
            return self.qualified_manager(registry, qualifier).map(Some);
        }
        if let Some(name) = self.transaction_manager_name.as_deref().filter(|n| !n.is_empty()) {
            return self.qualified_manager(registry, name).map(Some);
        }
        if let Some(manager) = &self.transaction_manager {
            return Ok(Some(Arc::clone(manager)));
        }

        let mut cache = self.manager_cache.lock();
        if let Some(manager) = cache.get(&None) {
            return Ok(Some(Arc::clone(manager)));
        }
        let manager = registry.unique_manager()?;
        cache.insert(None, Arc::clone(&manager));
        Ok(Some(manager))
    }

    fn qualified_manager(
        &self,
        registry: &Arc<dyn TransactionManagerRegistry>,
        qualifier: &str,
    ) -> TransactionResult<Arc<dyn PlatformTransactionManager>> {
        let key = Some(qualifier.to_string());
        let mut cache = self.manager_cache.lock();
        if let Some(manager) = cache.get(&key) {
            return Ok(Arc::clone(manager));
        }
        let manager = registry.manager(qualifier)?;
        cache.insert(key, Arc::clone(&manager));
        Ok(manager)
    }

    /// 需要时开启事务，并把信息绑定到当前线程
    pub fn create_transaction_if_necessary(
        &self,
        manager: Option<Arc<dyn PlatformTransactionManager>>,
        attribute: Option<Arc<TransactionAttribute>>,
        joinpoint: &str,
    ) -> Result<TransactionInfoScope, Throwable> {
        let attribute = attribute.map(|attribute| named_attribute(&attribute, joinpoint));

        let status = match (&attribute, &manager) {
            (Some(attribute), Some(manager)) => Some(manager.get_transaction(attribute.definition())?),
            (Some(_), None) => {
                tracing::debug!(
                    "Skipping transactional joinpoint [{}] because no transaction manager has been configured",
                    joinpoint
                );
                None
            }
            (None, _) => None,
        };
        Ok(self.prepare_transaction_info(manager, attribute, joinpoint, status))
    }

    fn prepare_transaction_info(
        &self,
        manager: Option<Arc<dyn PlatformTransactionManager>>,
        attribute: Option<Arc<TransactionAttribute>>,
        joinpoint: &str,
        status: Option<Arc<TransactionStatus>>,
    ) -> TransactionInfoScope {
        if attribute.is_some() {
            tracing::trace!("Getting transaction for [{}]", joinpoint);
        } else {
            // 占位信息：保持线程上的信息栈完整
            tracing::trace!(
                "No need to create transaction for [{}]: This method is not transactional.",
                joinpoint
            );
        }
        let status = if attribute.is_some() { status } else { None };
        TransactionInfoScope::bind(Arc::new(TransactionInfo {
            transaction_manager: manager,
            transaction_attribute: attribute,
            joinpoint_identification: joinpoint.to_string(),
            transaction_status: status,
        }))
    }

    fn commit_transaction_after_returning(&self, info: &TransactionInfo) -> Result<(), Throwable> {
        let (Some(status), Some(manager)) = (&info.transaction_status, &info.transaction_manager) else {
            return Ok(());
        };
        tracing::trace!("Completing transaction for [{}]", info.joinpoint_identification);
        manager.commit(status)?;
        Ok(())
    }

    /// 异常退出：按回滚规则回滚或提交，原异常由调用方重新抛出
    fn complete_transaction_after_throwing(&self, info: &TransactionInfo, ex: &Throwable) -> Result<(), Throwable> {
        let (Some(status), Some(manager)) = (&info.transaction_status, &info.transaction_manager) else {
            return Ok(());
        };
        tracing::trace!(
            "Completing transaction for [{}] after exception: {}",
            info.joinpoint_identification,
            ex
        );
        let rollback = info
            .transaction_attribute
            .as_ref()
            .map(|attribute| attribute.rollback_on(ex))
            .unwrap_or(false);
        if rollback {
            manager
                .rollback(status)
                .map_err(|err| overridden_by(err, ex, "rollback"))
        } else {
            manager
                .commit(status)
                .map_err(|err| overridden_by(err, ex, "commit"))
        }
    }
}

/// 提交或回滚失败时，基础设施异常代替应用异常传播
fn overridden_by(err: TransactionError, application_exception: &Throwable, action: &str) -> Throwable {
    tracing::error!(
        "Application exception overridden by {} exception: {}",
        action,
        application_exception
    );
    let failure: Throwable = err.into();
    if failure.is_instance_of(TRANSACTION_SYSTEM_EXCEPTION) {
        failure.init_application_exception(application_exception.clone());
    }
    failure
}

/// 属性没有名称时使用连接点标识
fn named_attribute(attribute: &Arc<TransactionAttribute>, joinpoint: &str) -> Arc<TransactionAttribute> {
    if attribute.get_name().is_some() {
        return Arc::clone(attribute);
    }
    Arc::new(TransactionAttribute::clone(attribute).name(joinpoint))
}

/// 连接点标识：属性描述优先，否则为 `类名.方法名`
fn method_identification(
    method: &Method,
    target_class: Option<&Arc<ClassInfo>>,
    attribute: Option<&TransactionAttribute>,
) -> String {
    if let Some(descriptor) = attribute.and_then(TransactionAttribute::descriptor) {
        return descriptor.to_string();
    }
    let class_name = target_class
        .map(|class| class.name())
        .unwrap_or_else(|| method.declaring_class());
    format!("{}.{}", class_name, method.name())
}
