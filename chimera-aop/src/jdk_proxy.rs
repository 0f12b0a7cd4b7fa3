//! 基于接口的代理
//!
//! 代理类实现配置中的全部接口以及框架标记接口，所有方法调用都进入同一个分派入口。
//! `equals` / `hash_code` 未在接口上声明时按配置逻辑比较。

use crate::advised::AdvisedSupport;
use crate::aop_context;
use crate::error::{AopConfigError, AopConfigResult};
use crate::interfaces;
use crate::invocation::MethodInvocation;
use crate::proxy::{
    invoke_advised_method, process_return_type, proxy_hash_code, AopProxy, TargetLease,
};
use crate::utils;
use chimera_core::{ClassInfo, ClassKind, Invocable, Method, ObjectRef, Throwable, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PROXY_TYPE: &str = "JdkDynamicAopProxy";

/// 已生成的接口代理类，按接口列表缓存
static PROXY_CLASSES: Lazy<Mutex<HashMap<Vec<String>, Arc<ClassInfo>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static PROXY_CLASS_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn proxy_class_for(interfaces: Vec<Arc<ClassInfo>>) -> Arc<ClassInfo> {
    let key: Vec<String> = interfaces.iter().map(|i| i.name().to_string()).collect();
    let mut classes = PROXY_CLASSES.lock();
    if let Some(class) = classes.get(&key) {
        return Arc::clone(class);
    }
    let name = format!(
        "chimera.proxy.$Proxy{}",
        PROXY_CLASS_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    let class = ClassInfo::builder(name, ClassKind::JdkProxy)
        .implements_all(interfaces)
        .final_class()
        .build();
    tracing::debug!("Generated interface proxy class [{}] for {:?}", class.name(), key);
    classes.insert(key, Arc::clone(&class));
    class
}

/// 接口代理
pub struct JdkDynamicAopProxy {
    config: Arc<AdvisedSupport>,
    proxied_interfaces: Vec<Arc<ClassInfo>>,
    equals_defined: bool,
    hash_code_defined: bool,
}

impl JdkDynamicAopProxy {
    pub fn new(config: Arc<AdvisedSupport>) -> AopConfigResult<Self> {
        if config.is_empty_configuration() {
            return Err(AopConfigError::NoAdvisorsOrTarget);
        }
        let proxied_interfaces = utils::complete_proxied_interfaces(&config, true);
        let (equals_defined, hash_code_defined) = find_defined_equals_and_hash_code(&proxied_interfaces);
        Ok(Self {
            config,
            proxied_interfaces,
            equals_defined,
            hash_code_defined,
        })
    }
}

/// 接口上是否自己声明了 `equals` / `hash_code`
fn find_defined_equals_and_hash_code(interfaces: &[Arc<ClassInfo>]) -> (bool, bool) {
    let mut equals = false;
    let mut hash_code = false;
    for ifc in interfaces {
        for method in ifc.all_methods() {
            equals |= method.is_equals_method();
            hash_code |= method.is_hash_code_method();
        }
        if equals && hash_code {
            break;
        }
    }
    (equals, hash_code)
}

impl AopProxy for JdkDynamicAopProxy {
    fn get_proxy(&self) -> AopConfigResult<ObjectRef> {
        let class = proxy_class_for(self.proxied_interfaces.clone());
        tracing::trace!(
            "Creating interface-based proxy: {}",
            self.config.target_source().describe()
        );
        Ok(ObjectRef::new(JdkProxyInstance {
            class,
            config: Arc::clone(&self.config),
            equals_defined: self.equals_defined,
            hash_code_defined: self.hash_code_defined,
        }))
    }
}

/// 接口代理对象
pub(crate) struct JdkProxyInstance {
    class: Arc<ClassInfo>,
    config: Arc<AdvisedSupport>,
    equals_defined: bool,
    hash_code_defined: bool,
}

impl JdkProxyInstance {
    pub(crate) fn config(&self) -> &Arc<AdvisedSupport> {
        &self.config
    }

    fn equals(&self, this: &ObjectRef, other: Option<&Value>) -> Value {
        let equal = match other.and_then(Value::as_object) {
            Some(other) if other.ptr_eq(this) => true,
            Some(other) => other
                .downcast_ref::<JdkProxyInstance>()
                .map(|o| utils::equals_in_proxy(&self.config, &o.config))
                .unwrap_or(false),
            None => false,
        };
        Value::Bool(equal)
    }

    fn invoke_through_chain(
        &self,
        this: &ObjectRef,
        method: &Method,
        args: &[Value],
    ) -> Result<Value, Throwable> {
        let _exposed = self
            .config
            .is_expose_proxy()
            .then(|| aop_context::expose(Some(this.clone())));

        let target_source = self.config.target_source();
        let lease = TargetLease::acquire(&*target_source)?;
        let result = {
            let target = lease.target();
            let target_class = target.map(ObjectRef::class);
            let chain = self
                .config
                .interceptors_and_dynamic_advice(method, target_class.as_ref())?;
            let value = if chain.is_empty() {
                utils::invoke_joinpoint(target, method, args)
            } else {
                MethodInvocation::new(this, target, method, args.to_vec(), target_class, &chain)
                    .proceed()
            };
            value.and_then(|value| process_return_type(this, target, method, value))
        };
        lease.release()?;
        result
    }
}

impl Invocable for JdkProxyInstance {
    fn class(&self) -> Arc<ClassInfo> {
        Arc::clone(&self.class)
    }

    fn invoke(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        if !self.equals_defined && method.is_equals_method() {
            return Ok(self.equals(this, args.first()));
        }
        if !self.hash_code_defined && method.is_hash_code_method() {
            return Ok(proxy_hash_code(PROXY_TYPE, &self.config));
        }
        if method.declaring_class() == interfaces::DECORATING_PROXY {
            return Ok(Value::data(utils::ultimate_target_class(this)));
        }
        if !self.config.is_opaque() && interfaces::is_advised_method(method) {
            return invoke_advised_method(&self.config, method);
        }
        self.invoke_through_chain(this, method, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::target_source::SingletonTargetSource;
    use chimera_core::{PrimitiveKind, ReturnType};

    fn greeter() -> Arc<ClassInfo> {
        ClassInfo::interface("app.Greeter")
            .method(Method::new("greet").param("String").returns(ReturnType::reference("String")))
            .build()
    }

    struct English;

    impl Invocable for English {
        fn class(&self) -> Arc<ClassInfo> {
            ClassInfo::class("app.English")
                .implements(greeter())
                .method(Method::new("greet").param("String").returns(ReturnType::reference("String")))
                .method(Method::new("count").returns(ReturnType::Primitive(PrimitiveKind::Int)))
                .build()
        }

        fn invoke(&self, _: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
            match method.name() {
                "greet" => Ok(Value::Str(format!("Hello, {}", args[0].as_str().unwrap_or("")))),
                _ => Ok(Value::Null),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn config_for(target: ObjectRef) -> Arc<AdvisedSupport> {
        let config = Arc::new(AdvisedSupport::new());
        config.set_interfaces(vec![greeter()]).unwrap();
        config.set_target_source(Arc::new(SingletonTargetSource::new(target)));
        config
    }

    #[test]
    fn test_interface_proxy_runs_chain() {
        let config = config_for(ObjectRef::new(English));
        config
            .add_advice(Advice::around(|inv| {
                let value = inv.proceed()?;
                Ok(Value::Str(format!("{}!", value.as_str().unwrap_or(""))))
            }))
            .unwrap();

        let proxy = JdkDynamicAopProxy::new(config).unwrap().get_proxy().unwrap();
        assert!(proxy.class().is_jdk_proxy());
        assert!(proxy.class().is_assignable_to("app.Greeter"));
        assert!(proxy.class().is_assignable_to(interfaces::DECORATING_PROXY));
        let value = proxy.call("greet", &[Value::from("Ada")]).unwrap();
        assert_eq!(value, Value::from("Hello, Ada!"));
    }

    #[test]
    fn test_introspection_and_decorated_class() {
        let proxy = JdkDynamicAopProxy::new(config_for(ObjectRef::new(English)))
            .unwrap()
            .get_proxy()
            .unwrap();
        assert_eq!(proxy.call("get_advisor_count", &[]).unwrap(), Value::Int(0));
        let decorated = proxy.call(interfaces::GET_DECORATED_CLASS, &[]).unwrap();
        assert_eq!(decorated.downcast_data::<Arc<ClassInfo>>().unwrap().name(), "app.English");
    }

    #[test]
    fn test_same_interfaces_share_proxy_class() {
        let a = JdkDynamicAopProxy::new(config_for(ObjectRef::new(English))).unwrap();
        let b = JdkDynamicAopProxy::new(config_for(ObjectRef::new(English))).unwrap();
        assert_eq!(
            a.get_proxy().unwrap().class().name(),
            b.get_proxy().unwrap().class().name()
        );
    }

    #[test]
    fn test_empty_configuration_is_rejected() {
        let err = JdkDynamicAopProxy::new(Arc::new(AdvisedSupport::new())).err().unwrap();
        assert!(matches!(err, AopConfigError::NoAdvisorsOrTarget));
    }
}
