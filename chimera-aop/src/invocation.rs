//! 方法调用（MethodInvocation）
//!
//! 每次代理调用创建一个 `MethodInvocation`，它是一个沿拦截器链前进的游标：
//! `proceed()` 调用下一个拦截器，链走完后调用目标方法。
//! 索引 0 的拦截器在最外层（最先进入、最后退出）。

use crate::chain::ChainElement;
use chimera_core::{ClassInfo, Method, ObjectRef, Throwable, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 一次代理方法调用
pub struct MethodInvocation<'a> {
    proxy: &'a ObjectRef,
    target: Option<&'a ObjectRef>,
    method: &'a Method,
    arguments: Vec<Value>,
    target_class: Option<Arc<ClassInfo>>,
    chain: &'a [ChainElement],
    current: usize,
    user_attributes: HashMap<String, Value>,
}

impl<'a> MethodInvocation<'a> {
    pub fn new(
        proxy: &'a ObjectRef,
        target: Option<&'a ObjectRef>,
        method: &'a Method,
        arguments: Vec<Value>,
        target_class: Option<Arc<ClassInfo>>,
        chain: &'a [ChainElement],
    ) -> Self {
        Self {
            proxy,
            target,
            method,
            arguments,
            target_class,
            chain,
            current: 0,
            user_attributes: HashMap::new(),
        }
    }

    /// 进入链中的下一个拦截器；链已走完时调用目标方法
    ///
    /// 运行时匹配器拒绝当前参数的拦截器被跳过。
    pub fn proceed(&mut self) -> Result<Value, Throwable> {
        let chain = self.chain;
        while let Some(element) = chain.get(self.current) {
            self.current += 1;
            match element {
                ChainElement::Interceptor { interceptor, .. } => {
                    return interceptor.invoke(self);
                }
                ChainElement::Dynamic {
                    interceptor,
                    matcher,
                    ..
                } => {
                    let matched = match &self.target_class {
                        Some(class) => matcher.matches_runtime(self.method, class, &self.arguments),
                        None => {
                            let declaring = ClassInfo::interface(self.method.declaring_class()).build();
                            matcher.matches_runtime(self.method, &declaring, &self.arguments)
                        }
                    };
                    if matched {
                        return interceptor.invoke(self);
                    }
                    tracing::trace!(
                        "Runtime matcher rejected arguments of [{}], skipping interceptor",
                        self.method.key()
                    );
                }
            }
        }
        self.invoke_joinpoint()
    }

    fn invoke_joinpoint(&self) -> Result<Value, Throwable> {
        crate::utils::invoke_joinpoint(self.target, self.method, &self.arguments)
    }

    /// 代理对象
    pub fn proxy(&self) -> &ObjectRef {
        self.proxy
    }

    /// 目标对象（目标源可能不提供目标）
    pub fn this(&self) -> Option<&ObjectRef> {
        self.target
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// 替换传给后续拦截器和目标方法的参数
    pub fn set_arguments(&mut self, arguments: Vec<Value>) {
        self.arguments = arguments;
    }

    pub fn arguments_mut(&mut self) -> &mut Vec<Value> {
        &mut self.arguments
    }

    pub fn target_class(&self) -> Option<&Arc<ClassInfo>> {
        self.target_class.as_ref()
    }

    /// 下一个要执行的拦截器的位置
    pub fn current_interceptor_index(&self) -> usize {
        self.current
    }

    pub fn set_user_attribute(&mut self, key: impl Into<String>, value: Option<Value>) {
        let key = key.into();
        match value {
            Some(value) => {
                self.user_attributes.insert(key, value);
            }
            None => {
                self.user_attributes.remove(&key);
            }
        }
    }

    pub fn user_attribute(&self, key: &str) -> Option<&Value> {
        self.user_attributes.get(key)
    }

    /// 调用点的完整标识，例如 `app.UserService.find`
    pub fn joinpoint_identification(&self) -> String {
        let class_name = self
            .target_class
            .as_ref()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| self.method.declaring_class().to_string());
        format!("{}.{}", class_name, self.method.name())
    }
}

impl fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method.key().to_string())
            .field("target", &self.target)
            .field("arguments", &self.arguments)
            .field("current", &self.current)
            .field("chain", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, AdviceKind};
    use crate::pointcut::MethodMatcher;
    use chimera_core::{lang, Invocable, ReturnType};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: AtomicUsize,
    }

    impl Invocable for Counter {
        fn class(&self) -> Arc<ClassInfo> {
            ClassInfo::class("test.Counter")
                .method(Method::new("add").param("i32").returns(ReturnType::Primitive(chimera_core::PrimitiveKind::Int)))
                .build()
        }

        fn invoke(&self, _this: &ObjectRef, _method: &Method, args: &[Value]) -> Result<Value, Throwable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(args[0].as_i32().unwrap_or(0) + 1))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn element(advice: &Advice, matcher: Option<MethodMatcher>) -> ChainElement {
        let interceptor = match advice.kind() {
            AdviceKind::Interceptor(i) => Arc::clone(i),
            _ => unreachable!(),
        };
        match matcher {
            Some(matcher) => ChainElement::Dynamic {
                interceptor,
                advice: advice.id(),
                matcher,
            },
            None => ChainElement::Interceptor {
                interceptor,
                advice: advice.id(),
            },
        }
    }

    fn recording(log: &Arc<parking_lot::Mutex<Vec<&'static str>>>, name: &'static str) -> Advice {
        let log = Arc::clone(log);
        Advice::around(move |inv| {
            log.lock().push(name);
            let result = inv.proceed();
            log.lock().push(name);
            result
        })
    }

    #[test]
    fn test_outermost_first_and_single_joinpoint_call() {
        let target = ObjectRef::new(Counter { calls: AtomicUsize::new(0) });
        let class = target.class();
        let method = class.find_method("add", Some(1)).unwrap();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let never = MethodMatcher::runtime(MethodMatcher::True, |_, _, _| false);

        let chain = vec![
            element(&recording(&log, "outer"), None),
            element(&recording(&log, "skipped"), Some(never.clone())),
            element(&recording(&log, "skipped"), Some(never)),
            element(&recording(&log, "inner"), None),
        ];

        let mut invocation = MethodInvocation::new(
            &target,
            Some(&target),
            &method,
            vec![Value::Int(1)],
            Some(Arc::clone(&class)),
            &chain,
        );
        assert_eq!(invocation.proceed().unwrap(), Value::Int(2));
        assert_eq!(*log.lock(), vec!["outer", "inner", "inner", "outer"]);

        let counter = target.downcast_ref::<Counter>().unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_circuit_and_argument_rewrite() {
        let target = ObjectRef::new(Counter { calls: AtomicUsize::new(0) });
        let class = target.class();
        let method = class.find_method("add", Some(1)).unwrap();

        let rewrite = Advice::around(|inv| {
            inv.set_arguments(vec![Value::Int(41)]);
            inv.set_user_attribute("rewritten", Some(Value::Bool(true)));
            inv.proceed()
        });
        let chain = vec![element(&rewrite, None)];
        let mut invocation =
            MethodInvocation::new(&target, Some(&target), &method, vec![Value::Int(0)], None, &chain);
        assert_eq!(invocation.proceed().unwrap(), Value::Int(42));
        assert_eq!(invocation.user_attribute("rewritten"), Some(&Value::Bool(true)));
        assert_eq!(invocation.joinpoint_identification(), "test.Counter.add");

        let short = Advice::around(|_| Ok(Value::Int(-1)));
        let chain = vec![element(&short, None)];
        let mut invocation =
            MethodInvocation::new(&target, Some(&target), &method, vec![Value::Int(0)], None, &chain);
        assert_eq!(invocation.proceed().unwrap(), Value::Int(-1));
        assert_eq!(target.downcast_ref::<Counter>().unwrap().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_target_fails() {
        let proxy = ObjectRef::new(Counter { calls: AtomicUsize::new(0) });
        let method = proxy.class().find_method("add", Some(1)).unwrap();
        let mut invocation = MethodInvocation::new(&proxy, None, &method, vec![Value::Int(0)], None, &[]);
        let err = invocation.proceed().unwrap_err();
        assert!(err.is_instance_of(lang::ILLEGAL_STATE_EXCEPTION));
    }
}
