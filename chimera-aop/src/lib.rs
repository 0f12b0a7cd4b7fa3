//! Chimera AOP - 面向切面编程支持
//!
//! 在不修改目标对象的前提下拦截方法调用：
//! - 代理配置（`AdvisedSupport` / `ProxyFactory`）：有序的切面、目标源、被代理接口、行为开关
//! - 切面（`Advisor`）= 切点（`Pointcut`）+ 通知（`Advice`），或无条件生效的引入
//! - 通知经适配器注册表统一转换为 `MethodInterceptor`，按切面顺序组成拦截器链
//! - 接口代理与子类代理两种策略，子类代理在生成时为每个方法选定回调
//! - `AopContext` 在调用期间暴露当前代理
//!
//! ```ignore
//! use chimera_aop::prelude::*;
//!
//! let factory = ProxyFactory::new(ObjectRef::new(OrderService::default()));
//! factory.add_advisor(Advisor::name_match(["place*"], Advice::before(AuditAdvice)))?;
//! let orders = factory.get_proxy()?;
//! orders.call("place_order", &[Value::Long(42)])?;
//! ```

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aop_context;
pub mod cglib_proxy;
pub mod chain;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod introduction;
pub mod invocation;
pub mod jdk_proxy;
pub mod pointcut;
pub mod proxy;
pub mod proxy_factory;
pub mod target_source;
pub mod utils;

// 重新导出核心类型
pub use adapter::{
    global_adapter_registry, AdapterRegistration, AdvisorAdapter, AdvisorAdapterRegistry,
    AfterReturningAdviceInterceptor, MethodBeforeAdviceInterceptor, ThrowsAdviceInterceptor,
};
pub use advice::{
    AfterReturningAdvice, Advice, AdviceId, AdviceKind, FnInterceptor, IntroductionInfo,
    MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
pub use advised::AdvisedSupport;
pub use advisor::Advisor;
pub use cglib_proxy::{CallbackKind, CglibAopProxy};
pub use chain::{AdvisorChainFactory, ChainElement, DefaultAdvisorChainFactory};
pub use config::ProxyConfig;
pub use error::{AopConfigError, AopConfigResult, AopError, GenerationError};
pub use introduction::DelegatingIntroductionInterceptor;
pub use invocation::MethodInvocation;
pub use jdk_proxy::JdkDynamicAopProxy;
pub use pointcut::{ClassFilter, MethodMatcher, Pointcut};
pub use proxy::{AopProxy, AopProxyFactory, DefaultAopProxyFactory};
pub use proxy_factory::ProxyFactory;
pub use target_source::{
    EmptyTargetSource, PrototypeTargetSource, SingletonTargetSource, TargetSource,
    ThreadLocalTargetSource,
};

// 导出 inventory 供适配器注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::aop_context;
    pub use crate::advice::*;
    pub use crate::advised::AdvisedSupport;
    pub use crate::advisor::Advisor;
    pub use crate::config::ProxyConfig;
    pub use crate::error::{AopConfigError, AopConfigResult};
    pub use crate::invocation::MethodInvocation;
    pub use crate::pointcut::{ClassFilter, MethodMatcher, Pointcut};
    pub use crate::proxy_factory::ProxyFactory;
    pub use crate::target_source::*;
    pub use chimera_core::{ClassInfo, Method, ObjectRef, Throwable, Value};
}
