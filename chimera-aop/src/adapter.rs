//! 通知适配器注册表
//!
//! 把各种通知统一转换为 `MethodInterceptor`。环绕通知和引入直接使用，
//! 前置、返回后、异常通知由内置适配器包装，自定义种类由注册的适配器处理。
//!
//! 自定义适配器可以在运行时注册到全局注册表，也可以通过 inventory 在编译期提交：
//! ```ignore
//! chimera_aop::inventory::submit! {
//!     AdapterRegistration::new("timing", || Arc::new(TimingAdapter))
//! }
//! ```

use crate::advice::{
    Advice, AdviceKind, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
use crate::advisor::Advisor;
use crate::error::{AopConfigError, AopConfigResult};
use crate::invocation::MethodInvocation;
use chimera_core::{Throwable, Value};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// 通知适配器
pub trait AdvisorAdapter: Send + Sync {
    fn supports_advice(&self, advice: &Advice) -> bool;

    fn interceptor(&self, advisor: &Advisor) -> Option<Arc<dyn MethodInterceptor>>;
}

/// 前置通知拦截器
pub struct MethodBeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodBeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn MethodBeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for MethodBeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
        self.advice
            .before(invocation.method(), invocation.arguments(), invocation.this())?;
        invocation.proceed()
    }
}

/// 返回后通知拦截器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
        let value = invocation.proceed()?;
        self.advice.after_returning(
            &value,
            invocation.method(),
            invocation.arguments(),
            invocation.this(),
        )?;
        Ok(value)
    }
}

/// 异常通知拦截器
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn ThrowsAdvice>,
}

impl ThrowsAdviceInterceptor {
    pub fn new(advice: Arc<dyn ThrowsAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(ex) => {
                if self.advice.handles(&ex) {
                    tracing::trace!("Found handler for exception of type [{}]", ex.class_name());
                    self.advice.after_throwing(
                        invocation.method(),
                        invocation.arguments(),
                        invocation.this(),
                        &ex,
                    )?;
                }
                Err(ex)
            }
        }
    }
}

struct MethodBeforeAdviceAdapter;

impl AdvisorAdapter for MethodBeforeAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::Before(_))
    }

    fn interceptor(&self, advisor: &Advisor) -> Option<Arc<dyn MethodInterceptor>> {
        match advisor.advice().kind() {
            AdviceKind::Before(advice) => Some(Arc::new(MethodBeforeAdviceInterceptor::new(
                Arc::clone(advice),
            ))),
            _ => None,
        }
    }
}

struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::AfterReturning(_))
    }

    fn interceptor(&self, advisor: &Advisor) -> Option<Arc<dyn MethodInterceptor>> {
        match advisor.advice().kind() {
            AdviceKind::AfterReturning(advice) => Some(Arc::new(
                AfterReturningAdviceInterceptor::new(Arc::clone(advice)),
            )),
            _ => None,
        }
    }
}

struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice.kind(), AdviceKind::Throws(_))
    }

    fn interceptor(&self, advisor: &Advisor) -> Option<Arc<dyn MethodInterceptor>> {
        match advisor.advice().kind() {
            AdviceKind::Throws(advice) => {
                Some(Arc::new(ThrowsAdviceInterceptor::new(Arc::clone(advice))))
            }
            _ => None,
        }
    }
}

/// 适配器注册器
///
/// 用于 inventory 自动收集自定义适配器
pub struct AdapterRegistration {
    pub name: &'static str,
    pub creator: fn() -> Arc<dyn AdvisorAdapter>,
}

impl AdapterRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn AdvisorAdapter>) -> Self {
        Self { name, creator }
    }
}

inventory::collect!(AdapterRegistration);

/// 适配器注册表
pub struct AdvisorAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl AdvisorAdapterRegistry {
    /// 只包含内置适配器
    pub fn new() -> Self {
        let adapters: Vec<Arc<dyn AdvisorAdapter>> = vec![
            Arc::new(MethodBeforeAdviceAdapter),
            Arc::new(AfterReturningAdviceAdapter),
            Arc::new(ThrowsAdviceAdapter),
        ];
        Self {
            adapters: RwLock::new(adapters),
        }
    }

    pub fn register_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        self.adapters.write().push(adapter);
    }

    /// 从 inventory 加载所有提交的适配器
    pub fn auto_load_adapters(&self) {
        let registrations: Vec<_> = inventory::iter::<AdapterRegistration>().collect();
        if registrations.is_empty() {
            return;
        }
        tracing::info!("Auto-loading {} advisor adapter(s)", registrations.len());
        for registration in registrations {
            tracing::debug!("  ├─ Loading advisor adapter: {}", registration.name);
            self.register_adapter((registration.creator)());
        }
    }

    /// 通知是否能被转换为拦截器
    pub fn supports(&self, advice: &Advice) -> bool {
        match advice.kind() {
            AdviceKind::Interceptor(_) | AdviceKind::Introduction { .. } => true,
            _ => self.adapters.read().iter().any(|a| a.supports_advice(advice)),
        }
    }

    /// 把切面的通知转换为拦截器
    pub fn interceptors(&self, advisor: &Advisor) -> AopConfigResult<Vec<Arc<dyn MethodInterceptor>>> {
        let advice = advisor.advice();
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::with_capacity(1);

        match advice.kind() {
            AdviceKind::Interceptor(interceptor) => interceptors.push(Arc::clone(interceptor)),
            AdviceKind::Introduction { interceptor, .. } => {
                interceptors.push(Arc::clone(interceptor))
            }
            _ => {}
        }

        for adapter in self.adapters.read().iter() {
            if adapter.supports_advice(advice) {
                if let Some(interceptor) = adapter.interceptor(advisor) {
                    interceptors.push(interceptor);
                }
            }
        }

        if interceptors.is_empty() {
            return Err(AopConfigError::UnknownAdviceType(advice.type_name().to_string()));
        }
        Ok(interceptors)
    }
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局适配器注册表
///
/// 首次访问时初始化，加载所有通过 inventory 提交的适配器
static GLOBAL_ADAPTER_REGISTRY: Lazy<AdvisorAdapterRegistry> = Lazy::new(|| {
    let registry = AdvisorAdapterRegistry::new();
    registry.auto_load_adapters();
    registry
});

/// 获取全局适配器注册表
pub fn global_adapter_registry() -> &'static AdvisorAdapterRegistry {
    &GLOBAL_ADAPTER_REGISTRY
}
