//! 编程式创建代理
//!
//! ```ignore
//! let factory = ProxyFactory::new(ObjectRef::new(UserServiceImpl::default()));
//! factory.add_advice(Advice::around(|inv| {
//!     tracing::info!("calling {}", inv.joinpoint_identification());
//!     inv.proceed()
//! }))?;
//! let proxy = factory.get_proxy()?;
//! ```
//!
//! `ProxyFactory` 解引用为 `AdvisedSupport`，切面与开关的修改方法都可以直接调用。
//! 创建出的代理与工厂共享同一份配置，配置冻结之前的修改对已有代理同样生效。

use crate::advice::Advice;
use crate::advised::AdvisedSupport;
use crate::config::ProxyConfig;
use crate::error::AopConfigResult;
use crate::proxy::{AopProxy, AopProxyFactory, DefaultAopProxyFactory};
use crate::target_source::TargetSource;
use chimera_core::{ClassInfo, ObjectRef};
use std::ops::Deref;
use std::sync::Arc;

pub struct ProxyFactory {
    config: Arc<AdvisedSupport>,
    aop_proxy_factory: Arc<dyn AopProxyFactory>,
}

impl ProxyFactory {
    /// 代理给定目标，并代理它实现的全部接口
    pub fn new(target: ObjectRef) -> Self {
        let factory = Self::empty();
        let interfaces = target.class().all_interfaces();
        factory.config.set_target(target);
        for ifc in interfaces {
            if let Err(err) = factory.config.add_interface(ifc) {
                tracing::warn!("Skipping proxy interface: {}", err);
            }
        }
        factory
    }

    /// 没有目标和切面的空工厂
    pub fn empty() -> Self {
        Self {
            config: Arc::new(AdvisedSupport::new()),
            aop_proxy_factory: Arc::new(DefaultAopProxyFactory::new()),
        }
    }

    /// 代理指定接口，目标来自目标源
    pub fn for_interface(interface: Arc<ClassInfo>, target_source: Arc<dyn TargetSource>) -> AopConfigResult<Self> {
        let factory = Self::empty();
        factory.config.add_interface(interface)?;
        factory.config.set_target_source(target_source);
        Ok(factory)
    }

    pub fn with_target_source(self, target_source: Arc<dyn TargetSource>) -> Self {
        self.config.set_target_source(target_source);
        self
    }

    pub fn with_interface(self, interface: Arc<ClassInfo>) -> AopConfigResult<Self> {
        self.config.add_interface(interface)?;
        Ok(self)
    }

    pub fn with_advice(self, advice: Advice) -> AopConfigResult<Self> {
        self.config.add_advice(advice)?;
        Ok(self)
    }

    /// 套用一组开关（通常来自 `ProxyConfig::from_environment`）
    pub fn with_config(self, config: ProxyConfig) -> Self {
        self.config.apply_config(config);
        self
    }

    pub fn set_aop_proxy_factory(&mut self, factory: Arc<dyn AopProxyFactory>) {
        self.aop_proxy_factory = factory;
    }

    pub fn aop_proxy_factory(&self) -> &Arc<dyn AopProxyFactory> {
        &self.aop_proxy_factory
    }

    /// 共享的代理配置
    pub fn config(&self) -> &Arc<AdvisedSupport> {
        &self.config
    }

    pub fn create_aop_proxy(&self) -> AopConfigResult<Box<dyn AopProxy>> {
        self.aop_proxy_factory
            .create_aop_proxy(Arc::clone(&self.config))
    }

    /// 创建代理对象
    pub fn get_proxy(&self) -> AopConfigResult<ObjectRef> {
        self.create_aop_proxy()?.get_proxy()
    }

    /// 快捷方式：用单个通知代理目标
    pub fn proxy_with(target: ObjectRef, advice: Advice) -> AopConfigResult<ObjectRef> {
        ProxyFactory::new(target).with_advice(advice)?.get_proxy()
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for ProxyFactory {
    type Target = AdvisedSupport;

    fn deref(&self) -> &Self::Target {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AopConfigError;
    use crate::utils;
    use chimera_core::{Invocable, Method, ReturnType, Throwable, Value};
    use std::any::Any;

    fn api() -> Arc<ClassInfo> {
        ClassInfo::interface("app.Api")
            .method(Method::new("ping").returns(ReturnType::reference("String")))
            .build()
    }

    struct Service;

    impl Invocable for Service {
        fn class(&self) -> Arc<ClassInfo> {
            ClassInfo::class("app.Service")
                .implements(api())
                .method(Method::new("ping").returns(ReturnType::reference("String")))
                .build()
        }

        fn invoke(&self, _: &ObjectRef, _: &Method, _: &[Value]) -> Result<Value, Throwable> {
            Ok(Value::from("pong"))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_target_interfaces_select_interface_proxy() {
        let factory = ProxyFactory::new(ObjectRef::new(Service));
        assert!(factory.is_interface_proxied("app.Api"));
        let proxy = factory.get_proxy().unwrap();
        assert!(utils::is_jdk_dynamic_proxy(&proxy));
        assert_eq!(proxy.call("ping", &[]).unwrap(), Value::from("pong"));
    }

    #[test]
    fn test_proxy_target_class_flag() {
        let factory = ProxyFactory::new(ObjectRef::new(Service)).with_config(ProxyConfig {
            proxy_target_class: true,
            ..ProxyConfig::default()
        });
        let proxy = factory.get_proxy().unwrap();
        assert!(utils::is_cglib_proxy(&proxy));
        assert_eq!(utils::target_class(&proxy).name(), "app.Service");
    }

    #[test]
    fn test_changes_reach_existing_proxy_until_frozen() {
        let factory = ProxyFactory::new(ObjectRef::new(Service));
        let proxy = factory.get_proxy().unwrap();
        factory
            .add_advice(Advice::around(|_| Ok(Value::from("intercepted"))))
            .unwrap();
        assert_eq!(proxy.call("ping", &[]).unwrap(), Value::from("intercepted"));

        factory.set_frozen(true);
        let err = factory.add_advice(Advice::around(|inv| inv.proceed())).unwrap_err();
        assert!(matches!(err, AopConfigError::Frozen));
    }

    #[test]
    fn test_empty_factory_cannot_build_proxy() {
        let err = ProxyFactory::empty().get_proxy().err().unwrap();
        assert!(matches!(err, AopConfigError::NoTargetClass | AopConfigError::NoAdvisorsOrTarget));
    }
}
