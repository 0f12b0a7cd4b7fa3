//! 拦截器链解析
//!
//! `(配置, 方法, 目标类) -> 有序拦截器列表`。按切面声明顺序依次做类过滤、方法匹配，
//! 再把通知适配为拦截器；运行时匹配器与拦截器一起保存，调用时再按参数判定。

use crate::adapter::{global_adapter_registry, AdvisorAdapterRegistry};
use crate::advice::{Advice, AdviceId, MethodInterceptor};
use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::error::AopConfigResult;
use crate::pointcut::MethodMatcher;
use chimera_core::{ClassInfo, Method};
use std::fmt;
use std::sync::Arc;

/// 解析后的链元素
#[derive(Clone)]
pub enum ChainElement {
    /// 静态匹配的拦截器
    Interceptor {
        interceptor: Arc<dyn MethodInterceptor>,
        advice: AdviceId,
    },
    /// 需要在每次调用时按参数再判定的拦截器
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        advice: AdviceId,
        matcher: MethodMatcher,
    },
}

impl ChainElement {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainElement::Interceptor { interceptor, .. }
            | ChainElement::Dynamic { interceptor, .. } => interceptor,
        }
    }

    /// 来源通知的身份
    pub fn advice_id(&self) -> AdviceId {
        match self {
            ChainElement::Interceptor { advice, .. } | ChainElement::Dynamic { advice, .. } => {
                *advice
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainElement::Dynamic { .. })
    }
}

/// 来源通知相同（适配器每次生成的包装对象不同，不参与比较）
impl PartialEq for ChainElement {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ChainElement::Interceptor { advice: a, .. },
                ChainElement::Interceptor { advice: b, .. },
            ) => a == b,
            (
                ChainElement::Dynamic {
                    advice: a,
                    matcher: ma,
                    ..
                },
                ChainElement::Dynamic {
                    advice: b,
                    matcher: mb,
                    ..
                },
            ) => a == b && ma == mb,
            _ => false,
        }
    }
}

impl fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Interceptor { advice, .. } => write!(f, "Interceptor({:?})", advice),
            ChainElement::Dynamic { advice, matcher, .. } => {
                write!(f, "Dynamic({:?}, {:?})", advice, matcher)
            }
        }
    }
}

/// 拦截器链工厂
pub trait AdvisorChainFactory: Send + Sync {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_class: Option<&Arc<ClassInfo>>,
    ) -> AopConfigResult<Vec<ChainElement>>;

    /// 添加切面时的检查：该通知能否被转换为拦截器
    fn supports_advice(&self, advice: &Advice) -> bool {
        global_adapter_registry().supports(advice)
    }
}

/// 默认的拦截器链工厂
#[derive(Default)]
pub struct DefaultAdvisorChainFactory {
    registry: Option<Arc<AdvisorAdapterRegistry>>,
}

impl DefaultAdvisorChainFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定的适配器注册表（默认使用全局注册表）
    pub fn with_registry(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    fn registry(&self) -> &AdvisorAdapterRegistry {
        match &self.registry {
            Some(registry) => registry,
            None => global_adapter_registry(),
        }
    }
}

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn supports_advice(&self, advice: &Advice) -> bool {
        self.registry().supports(advice)
    }

    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_class: Option<&Arc<ClassInfo>>,
    ) -> AopConfigResult<Vec<ChainElement>> {
        let registry = self.registry();
        let advisors = config.advisors();
        let actual_class = match target_class {
            Some(class) => Arc::clone(class),
            None => declaring_class(config, method),
        };
        let pre_filtered = config.is_pre_filtered();
        let mut has_introductions: Option<bool> = None;
        let mut chain = Vec::with_capacity(advisors.len());

        for advisor in advisors.iter() {
            match advisor {
                Advisor::Pointcut { pointcut, advice } => {
                    if !pre_filtered && !pointcut.class_filter().matches(&actual_class) {
                        continue;
                    }
                    let matcher = pointcut.method_matcher();
                    let matched = if matcher.is_introduction_aware() {
                        let has = *has_introductions
                            .get_or_insert_with(|| has_matching_introductions(&advisors, &actual_class));
                        matcher.matches_with_introductions(method, &actual_class, has)
                    } else {
                        matcher.matches(method, &actual_class)
                    };
                    if !matched {
                        continue;
                    }

                    let interceptors = registry.interceptors(advisor)?;
                    if matcher.is_runtime() {
                        chain.extend(interceptors.into_iter().map(|interceptor| {
                            ChainElement::Dynamic {
                                interceptor,
                                advice: advice.id(),
                                matcher: matcher.clone(),
                            }
                        }));
                    } else {
                        chain.extend(interceptors.into_iter().map(|interceptor| {
                            ChainElement::Interceptor {
                                interceptor,
                                advice: advice.id(),
                            }
                        }));
                    }
                }
                Advisor::Introduction {
                    class_filter,
                    advice,
                    ..
                } => {
                    if pre_filtered || class_filter.matches(&actual_class) {
                        chain.extend(registry.interceptors(advisor)?.into_iter().map(
                            |interceptor| ChainElement::Interceptor {
                                interceptor,
                                advice: advice.id(),
                            },
                        ));
                    }
                }
                Advisor::Unconditional { advice } => {
                    chain.extend(registry.interceptors(advisor)?.into_iter().map(
                        |interceptor| ChainElement::Interceptor {
                            interceptor,
                            advice: advice.id(),
                        },
                    ));
                }
            }
        }

        tracing::trace!(
            "Resolved {} interceptor(s) for method [{}] on [{}]",
            chain.len(),
            method.key(),
            actual_class.name()
        );
        Ok(chain)
    }
}

/// 没有目标类时退回到方法的声明类型
fn declaring_class(config: &AdvisedSupport, method: &Method) -> Arc<ClassInfo> {
    config
        .proxied_interfaces()
        .iter()
        .find_map(|ifc| ifc.find_type(method.declaring_class()))
        .unwrap_or_else(|| ClassInfo::interface(method.declaring_class()).build())
}

/// 是否有引入切面适用于该类
fn has_matching_introductions(advisors: &[Advisor], class: &ClassInfo) -> bool {
    advisors.iter().any(|advisor| match advisor {
        Advisor::Introduction { class_filter, .. } => class_filter.matches(class),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::pointcut::{ClassFilter, Pointcut};
    use chimera_core::{ObjectRef, Throwable, Value};

    fn service() -> Arc<ClassInfo> {
        ClassInfo::class("app.OrderService")
            .method(Method::new("place").param("i64"))
            .method(Method::new("cancel").param("i64"))
            .build()
    }

    fn method(class: &ClassInfo, name: &str) -> Method {
        class.find_method(name, None).unwrap()
    }

    fn passthrough() -> Advice {
        Advice::around(|inv| inv.proceed())
    }

    fn resolve(config: &AdvisedSupport, class: &Arc<ClassInfo>, name: &str) -> Vec<ChainElement> {
        DefaultAdvisorChainFactory::new()
            .interceptors_and_dynamic_advice(config, &method(class, name), Some(class))
            .unwrap()
    }

    #[test]
    fn test_chain_order_follows_advisor_order() {
        let class = service();
        let config = AdvisedSupport::new();
        let first = passthrough();
        let skipped = passthrough();
        let last = passthrough();
        config.add_advisor(Advisor::always(first.clone())).unwrap();
        config
            .add_advisor(Advisor::name_match(["cancel"], skipped.clone()))
            .unwrap();
        config.add_advisor(Advisor::always(last.clone())).unwrap();

        let chain = resolve(&config, &class, "place");
        let ids: Vec<_> = chain.iter().map(|e| e.advice_id()).collect();
        assert_eq!(ids, vec![first.id(), last.id()]);

        let chain = resolve(&config, &class, "cancel");
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].advice_id(), skipped.id());
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let class = service();
        let config = AdvisedSupport::new();
        config
            .add_advisor(Advisor::always(Advice::before(NoopBefore)))
            .unwrap();
        config.set_frozen(true);

        assert_eq!(resolve(&config, &class, "place"), resolve(&config, &class, "place"));
    }

    #[test]
    fn test_class_filter_and_pre_filtered() {
        let class = service();
        let config = AdvisedSupport::new();
        config
            .add_advisor(Advisor::new(
                Pointcut::for_class(ClassFilter::type_pattern("*Repository")),
                passthrough(),
            ))
            .unwrap();
        assert!(resolve(&config, &class, "place").is_empty());

        config.set_pre_filtered(true);
        assert_eq!(resolve(&config, &class, "place").len(), 1);
    }

    #[test]
    fn test_runtime_matcher_is_deferred() {
        let class = service();
        let config = AdvisedSupport::new();
        let matcher = MethodMatcher::runtime(MethodMatcher::True, |_, _, args| !args.is_empty());
        config
            .add_advisor(Advisor::new(Pointcut::for_methods(matcher), passthrough()))
            .unwrap();

        let chain = resolve(&config, &class, "place");
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_dynamic());
    }

    #[test]
    fn test_introduction_aware_matcher_sees_introductions() {
        let class = service();
        let config = AdvisedSupport::new();
        let matcher = MethodMatcher::introduction_aware(|_, _, has| has);
        config
            .add_advisor(Advisor::new(Pointcut::for_methods(matcher), passthrough()))
            .unwrap();
        assert!(resolve(&config, &class, "place").is_empty());

        let lockable = ClassInfo::interface("app.Lockable").build();
        config
            .add_advisor(Advisor::introduction(Advice::introduction(Mixin(lockable))).unwrap())
            .unwrap();
        // 引入本身 + 被引入改变匹配结果的切面
        assert_eq!(resolve(&config, &class, "place").len(), 2);
    }

    struct NoopBefore;

    impl crate::advice::MethodBeforeAdvice for NoopBefore {
        fn before(&self, _: &Method, _: &[Value], _: Option<&ObjectRef>) -> Result<(), Throwable> {
            Ok(())
        }
    }

    struct Mixin(Arc<ClassInfo>);

    impl MethodInterceptor for Mixin {
        fn invoke(
            &self,
            invocation: &mut crate::invocation::MethodInvocation<'_>,
        ) -> Result<Value, Throwable> {
            invocation.proceed()
        }
    }

    impl crate::advice::IntroductionInfo for Mixin {
        fn interfaces(&self) -> Vec<Arc<ClassInfo>> {
            vec![self.0.clone()]
        }
    }
}
