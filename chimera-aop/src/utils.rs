//! 代理相关的工具函数

use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::cglib_proxy::CglibProxyInstance;
use crate::error::AopError;
use crate::interfaces;
use crate::jdk_proxy::JdkProxyInstance;
use crate::pointcut::{MethodMatcher, Pointcut};
use crate::proxy::proxy_config;
use crate::target_source::SingletonTargetSource;
use chimera_core::{ClassInfo, Method, ObjectRef, Throwable, Value};
use std::sync::Arc;

/// 直接在目标上调用方法
pub fn invoke_joinpoint(
    target: Option<&ObjectRef>,
    method: &Method,
    args: &[Value],
) -> Result<Value, Throwable> {
    match target {
        Some(target) => target.invoke(method, args),
        None => Err(AopError::NoTarget {
            method: method.key().to_string(),
        }
        .into()),
    }
}

/// 是否为本框架生成的代理（接口代理或子类代理）
pub fn is_aop_proxy(object: &ObjectRef) -> bool {
    object.class().is_assignable_to(interfaces::CHIMERA_PROXY)
        && (is_jdk_dynamic_proxy(object) || is_cglib_proxy(object))
}

pub fn is_jdk_dynamic_proxy(object: &ObjectRef) -> bool {
    object.is::<JdkProxyInstance>()
}

pub fn is_cglib_proxy(object: &ObjectRef) -> bool {
    object.is::<CglibProxyInstance>()
}

/// 代理的配置；非代理或 `opaque` 代理返回 None
pub fn advised(object: &ObjectRef) -> Option<Arc<AdvisedSupport>> {
    proxy_config(object)
        .filter(|config| !config.is_opaque())
        .map(Arc::clone)
}

/// 对象的目标类
///
/// 代理返回配置的目标类，子类代理退回到其父类，其余返回对象自身的类。
pub fn target_class(candidate: &ObjectRef) -> Arc<ClassInfo> {
    if let Some(class) = advised(candidate).and_then(|config| config.target_class()) {
        return class;
    }
    let class = candidate.class();
    if is_cglib_proxy(candidate) {
        class.user_class()
    } else {
        class
    }
}

/// 单例目标源背后的目标
pub fn singleton_target(candidate: &ObjectRef) -> Option<ObjectRef> {
    let config = advised(candidate)?;
    let source = config.target_source();
    source
        .as_any()
        .downcast_ref::<SingletonTargetSource>()
        .map(|s| s.target().clone())
}

/// 穿过多层代理得到最终的目标类
pub fn ultimate_target_class(candidate: &ObjectRef) -> Arc<ClassInfo> {
    let mut current = candidate.clone();
    let mut result = target_class(&current);
    while let Some(next) = singleton_target(&current) {
        result = target_class(&next);
        current = next;
    }
    result
}

/// 代理需要实现的完整接口列表：用户接口 + `ChimeraProxy` + `Advised`（非 opaque）+ `DecoratingProxy`（可选）
///
/// 没有指定接口时，若目标类本身是接口或接口代理类，先把它们补进配置。
pub fn complete_proxied_interfaces(config: &AdvisedSupport, decorating: bool) -> Vec<Arc<ClassInfo>> {
    let mut specified = config.proxied_interfaces();
    if specified.is_empty() {
        if let Some(target_class) = config.target_class() {
            let inferred = if target_class.is_interface() {
                vec![target_class]
            } else if target_class.is_jdk_proxy() {
                target_class.interfaces().to_vec()
            } else {
                Vec::new()
            };
            if !inferred.is_empty() {
                if let Err(err) = config.set_interfaces(inferred) {
                    tracing::warn!("Could not adopt interfaces of target class: {}", err);
                }
                specified = config.proxied_interfaces();
            }
        }
    }

    if !config.is_interface_proxied(interfaces::CHIMERA_PROXY) {
        specified.push(interfaces::chimera_proxy());
    }
    if !config.is_opaque() && !config.is_interface_proxied(interfaces::ADVISED) {
        specified.push(interfaces::advised());
    }
    if decorating && !config.is_interface_proxied(interfaces::DECORATING_PROXY) {
        specified.push(interfaces::decorating_proxy());
    }
    specified
}

/// 代理实现的用户接口（去掉框架标记接口）
pub fn proxied_user_interfaces(proxy: &ObjectRef) -> Vec<Arc<ClassInfo>> {
    proxy
        .class()
        .interfaces()
        .iter()
        .filter(|i| !interfaces::is_marker_interface(i.name()))
        .cloned()
        .collect()
}

/// 两个配置是否逻辑相等：接口、切面序列、目标源
pub fn equals_in_proxy(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    std::ptr::eq(a, b)
        || (equals_proxied_interfaces(a, b)
            && equals_advisors(a, b)
            && a.target_source().equals(&*b.target_source()))
}

pub fn equals_proxied_interfaces(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    let left = a.proxied_interfaces();
    let right = b.proxied_interfaces();
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(l, r)| l.name() == r.name())
}

pub fn equals_advisors(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    a.advisors()[..] == b.advisors()[..]
}

/// 切面能否应用到给定类的某个方法上
pub fn can_apply(advisor: &Advisor, target_class: &Arc<ClassInfo>, has_introductions: bool) -> bool {
    match advisor {
        Advisor::Introduction { class_filter, .. } => class_filter.matches(target_class),
        Advisor::Pointcut { pointcut, .. } => {
            can_apply_pointcut(pointcut, target_class, has_introductions)
        }
        Advisor::Unconditional { .. } => true,
    }
}

fn can_apply_pointcut(pointcut: &Pointcut, target_class: &Arc<ClassInfo>, has_introductions: bool) -> bool {
    if !pointcut.class_filter().matches(target_class) {
        return false;
    }
    let matcher = pointcut.method_matcher();
    if *matcher == MethodMatcher::True {
        return true;
    }

    let user_class = target_class.user_class();
    let mut candidates = vec![Arc::clone(&user_class)];
    candidates.extend(user_class.all_interfaces());
    candidates.iter().any(|class| {
        class.all_methods().iter().any(|method| {
            if matcher.is_introduction_aware() {
                matcher.matches_with_introductions(method, target_class, has_introductions)
            } else {
                matcher.matches(method, target_class)
            }
        })
    })
}

/// 从候选切面中筛选出能应用到给定类的切面（引入切面优先判定）
pub fn find_advisors_that_can_apply(candidates: &[Advisor], target_class: &Arc<ClassInfo>) -> Vec<Advisor> {
    let mut eligible: Vec<Advisor> = candidates
        .iter()
        .filter(|a| a.is_introduction() && can_apply(a, target_class, false))
        .cloned()
        .collect();
    let has_introductions = !eligible.is_empty();
    eligible.extend(
        candidates
            .iter()
            .filter(|a| !a.is_introduction() && can_apply(a, target_class, has_introductions))
            .cloned(),
    );
    eligible
}
