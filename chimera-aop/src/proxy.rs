//! 代理策略与代理调用的公共部分
//!
//! - `AopProxy` - 已配置好的代理，按需创建代理对象
//! - `AopProxyFactory` / `DefaultAopProxyFactory` - 根据配置选择接口代理或子类代理
//! - 两种代理共用的返回值处理、目标租用、`Advised` 方法分派

use crate::advised::AdvisedSupport;
use crate::cglib_proxy::{CglibAopProxy, CglibProxyInstance};
use crate::error::{AopConfigError, AopConfigResult, AopError};
use crate::interfaces;
use crate::jdk_proxy::{JdkDynamicAopProxy, JdkProxyInstance};
use crate::target_source::TargetSource;
use chimera_core::{Method, ObjectRef, ReturnType, Throwable, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 已配置好的代理
pub trait AopProxy: Send + Sync {
    /// 创建新的代理对象
    fn get_proxy(&self) -> AopConfigResult<ObjectRef>;
}

/// 代理工厂：根据配置创建 `AopProxy`
pub trait AopProxyFactory: Send + Sync {
    fn create_aop_proxy(&self, config: Arc<AdvisedSupport>) -> AopConfigResult<Box<dyn AopProxy>>;
}

/// 默认代理工厂
///
/// 满足以下任一条件时使用子类代理：
/// - `optimize` 为 true
/// - `proxy_target_class` 为 true
/// - 没有用户提供的接口
///
/// 目标类本身是接口或接口代理类时仍退回接口代理。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAopProxyFactory;

impl DefaultAopProxyFactory {
    pub fn new() -> Self {
        Self
    }
}

impl AopProxyFactory for DefaultAopProxyFactory {
    fn create_aop_proxy(&self, config: Arc<AdvisedSupport>) -> AopConfigResult<Box<dyn AopProxy>> {
        if config.is_optimize()
            || config.is_proxy_target_class()
            || config.has_no_user_supplied_interfaces()
        {
            let target_class = config.target_class().ok_or(AopConfigError::NoTargetClass)?;
            if target_class.is_interface() || target_class.is_jdk_proxy() {
                tracing::trace!(
                    "Target class [{}] is an interface or proxy class, using interface-based proxy",
                    target_class.name()
                );
                return Ok(Box::new(JdkDynamicAopProxy::new(config)?));
            }
            tracing::trace!("Using class-based proxy for [{}]", target_class.name());
            Ok(Box::new(CglibAopProxy::new(config)?))
        } else {
            Ok(Box::new(JdkDynamicAopProxy::new(config)?))
        }
    }
}

/// 代理对象背后的配置（不考虑 `opaque`）
pub(crate) fn proxy_config(object: &ObjectRef) -> Option<&Arc<AdvisedSupport>> {
    if let Some(proxy) = object.downcast_ref::<JdkProxyInstance>() {
        return Some(proxy.config());
    }
    object
        .downcast_ref::<CglibProxyInstance>()
        .map(CglibProxyInstance::config)
}

/// 返回值处理
///
/// - 返回了目标对象本身时替换为代理（声明类型实现 `RawTargetAccess` 时不替换）
/// - 基本类型返回值拿到 null 时报错
pub(crate) fn process_return_type(
    proxy: &ObjectRef,
    target: Option<&ObjectRef>,
    method: &Method,
    value: Value,
) -> Result<Value, Throwable> {
    let returns_target = match target {
        Some(target) => value.is_same_object(target),
        None => false,
    };
    if returns_target && !method.is_raw_target_access() && proxy_fits(proxy, method.return_type()) {
        tracing::trace!("Replacing returned target with proxy for [{}]", method.key());
        return Ok(Value::Object(proxy.clone()));
    }
    if matches!(value, Value::Null | Value::Void) && method.return_type().is_primitive() {
        return Err(AopError::NullPrimitiveReturn {
            method: method.to_string(),
        }
        .into());
    }
    Ok(value)
}

fn proxy_fits(proxy: &ObjectRef, return_type: &ReturnType) -> bool {
    match return_type {
        ReturnType::Reference(name) => proxy.class().is_assignable_to(name),
        _ => true,
    }
}

/// 一次调用期间持有的目标
///
/// 非静态目标源的目标在 `release` 或 drop 时归还。
pub(crate) struct TargetLease<'a> {
    source: &'a dyn TargetSource,
    target: Option<ObjectRef>,
    released: bool,
}

impl<'a> TargetLease<'a> {
    pub(crate) fn acquire(source: &'a dyn TargetSource) -> Result<Self, Throwable> {
        let target = source.get_target()?;
        Ok(Self {
            source,
            target,
            released: false,
        })
    }

    pub(crate) fn target(&self) -> Option<&ObjectRef> {
        self.target.as_ref()
    }

    /// 归还目标，归还失败优先于调用结果
    pub(crate) fn release(mut self) -> Result<(), Throwable> {
        self.released = true;
        self.do_release()
    }

    fn do_release(&self) -> Result<(), Throwable> {
        match &self.target {
            Some(target) if !self.source.is_static() => self.source.release_target(target),
            _ => Ok(()),
        }
    }
}

impl Drop for TargetLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.do_release() {
                tracing::warn!("Failed to release target from {}: {}", self.source.describe(), err);
            }
        }
    }
}

/// 把 `Advised` / `TargetClassAware` 上的方法分派给配置
pub(crate) fn invoke_advised_method(
    config: &AdvisedSupport,
    method: &Method,
) -> Result<Value, Throwable> {
    let value = match method.name() {
        interfaces::GET_TARGET_CLASS => match config.target_class() {
            Some(class) => Value::data(class),
            None => Value::Null,
        },
        "is_frozen" => Value::Bool(config.is_frozen()),
        "is_proxy_target_class" => Value::Bool(config.is_proxy_target_class()),
        "is_expose_proxy" => Value::Bool(config.is_expose_proxy()),
        "is_opaque" => Value::Bool(config.is_opaque()),
        "is_pre_filtered" => Value::Bool(config.is_pre_filtered()),
        "get_proxied_interfaces" => Value::data(
            config
                .proxied_interfaces()
                .iter()
                .map(|i| i.name().to_string())
                .collect::<Vec<_>>(),
        ),
        "get_advisor_count" => Value::Int(config.advisor_count() as i32),
        "to_proxy_config_string" => Value::Str(config.to_proxy_config_string()),
        other => {
            return Err(Throwable::illegal_argument(format!(
                "Unsupported introspection method: {}",
                other
            )))
        }
    };
    Ok(value)
}

/// 代理 `hash_code` 的实现：代理类型常量 * 13 + 目标源哈希
pub(crate) fn proxy_hash_code(proxy_type: &str, config: &AdvisedSupport) -> Value {
    let mut hasher = DefaultHasher::new();
    proxy_type.hash(&mut hasher);
    let hash = hasher
        .finish()
        .wrapping_mul(13)
        .wrapping_add(config.target_source().hash_code());
    Value::Int(hash as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AOP_INVOCATION_EXCEPTION;
    use crate::target_source::{PrototypeTargetSource, SingletonTargetSource};
    use chimera_core::{ClassInfo, Invocable, PrimitiveKind};
    use std::any::Any;

    struct Node;

    impl Invocable for Node {
        fn class(&self) -> Arc<ClassInfo> {
            node_class()
        }

        fn invoke(&self, this: &ObjectRef, _: &Method, _: &[Value]) -> Result<Value, Throwable> {
            Ok(Value::Object(this.clone()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn node_class() -> Arc<ClassInfo> {
        ClassInfo::class("app.Node")
            .method(Method::new("me").returns(ReturnType::reference("app.Node")))
            .method(Method::new("size").returns(ReturnType::Primitive(PrimitiveKind::Int)))
            .build()
    }

    #[test]
    fn test_returned_target_is_replaced() {
        let target = ObjectRef::new(Node);
        let method = node_class().find_method("me", Some(0)).unwrap();
        let value =
            process_return_type(&target, Some(&target), &method, Value::Object(target.clone()))
                .unwrap();
        assert!(value.is_same_object(&target));

        let other = ObjectRef::new(Node);
        let value =
            process_return_type(&other, Some(&target), &method, Value::Object(target.clone()))
                .unwrap();
        assert!(value.is_same_object(&other));
    }

    #[test]
    fn test_null_for_primitive_fails() {
        let target = ObjectRef::new(Node);
        let method = node_class().find_method("size", Some(0)).unwrap();
        let err = process_return_type(&target, Some(&target), &method, Value::Null).unwrap_err();
        assert!(err.is_instance_of(AOP_INVOCATION_EXCEPTION));
    }

    #[test]
    fn test_lease_releases_non_static_targets() {
        let source = PrototypeTargetSource::new(node_class(), || Ok(ObjectRef::new(Node)));
        let lease = TargetLease::acquire(&source).unwrap();
        assert!(lease.target().is_some());
        lease.release().unwrap();
        {
            let _dropped = TargetLease::acquire(&source).unwrap();
        }
        assert_eq!(source.released_count(), 2);

        let singleton = SingletonTargetSource::new(ObjectRef::new(Node));
        TargetLease::acquire(&singleton).unwrap().release().unwrap();
    }

    #[test]
    fn test_selector_requires_target_class_for_class_proxy() {
        let config = Arc::new(AdvisedSupport::new());
        config.add_advice(crate::advice::Advice::around(|inv| inv.proceed())).unwrap();
        config.set_proxy_target_class(true);
        let err = DefaultAopProxyFactory::new().create_aop_proxy(config).err().unwrap();
        assert!(matches!(err, AopConfigError::NoTargetClass));
    }
}
