//! 代理相关的标记接口
//!
//! - `ChimeraProxy` - 所有代理都实现的标记接口
//! - `TargetClassAware` - 暴露目标类
//! - `Advised` - 运行时查看代理配置（`opaque` 时不实现）
//! - `DecoratingProxy` - 暴露被装饰的最终类（仅接口代理）
//! - `RawTargetAccess` - 声明类型实现它时，返回 `this` 不替换为代理

use chimera_core::{lang, ClassInfo, Method, PrimitiveKind, ReturnType};
use once_cell::sync::Lazy;
use std::sync::Arc;

pub const CHIMERA_PROXY: &str = "chimera.aop.ChimeraProxy";
pub const TARGET_CLASS_AWARE: &str = "chimera.aop.TargetClassAware";
pub const ADVISED: &str = "chimera.aop.Advised";
pub const DECORATING_PROXY: &str = "chimera.aop.DecoratingProxy";
pub const RAW_TARGET_ACCESS: &str = lang::RAW_TARGET_ACCESS;

pub const GET_TARGET_CLASS: &str = "get_target_class";
pub const GET_DECORATED_CLASS: &str = "get_decorated_class";

fn boolean() -> ReturnType {
    ReturnType::Primitive(PrimitiveKind::Boolean)
}

static CHIMERA_PROXY_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::interface(CHIMERA_PROXY).build());

static TARGET_CLASS_AWARE_CLASS: Lazy<Arc<ClassInfo>> = Lazy::new(|| {
    ClassInfo::interface(TARGET_CLASS_AWARE)
        .method(Method::new(GET_TARGET_CLASS).returns(ReturnType::reference("ClassInfo")))
        .build()
});

static ADVISED_CLASS: Lazy<Arc<ClassInfo>> = Lazy::new(|| {
    ClassInfo::interface(ADVISED)
        .implements(target_class_aware())
        .method(Method::new("is_frozen").returns(boolean()))
        .method(Method::new("is_proxy_target_class").returns(boolean()))
        .method(Method::new("is_expose_proxy").returns(boolean()))
        .method(Method::new("is_opaque").returns(boolean()))
        .method(Method::new("is_pre_filtered").returns(boolean()))
        .method(Method::new("get_proxied_interfaces").returns(ReturnType::reference("Vec<String>")))
        .method(
            Method::new("get_advisor_count").returns(ReturnType::Primitive(PrimitiveKind::Int)),
        )
        .method(Method::new("to_proxy_config_string").returns(ReturnType::reference("String")))
        .build()
});

static DECORATING_PROXY_CLASS: Lazy<Arc<ClassInfo>> = Lazy::new(|| {
    ClassInfo::interface(DECORATING_PROXY)
        .method(Method::new(GET_DECORATED_CLASS).returns(ReturnType::reference("ClassInfo")))
        .build()
});

static RAW_TARGET_ACCESS_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::interface(RAW_TARGET_ACCESS).build());

pub fn chimera_proxy() -> Arc<ClassInfo> {
    Arc::clone(&CHIMERA_PROXY_CLASS)
}

pub fn target_class_aware() -> Arc<ClassInfo> {
    Arc::clone(&TARGET_CLASS_AWARE_CLASS)
}

pub fn advised() -> Arc<ClassInfo> {
    Arc::clone(&ADVISED_CLASS)
}

pub fn decorating_proxy() -> Arc<ClassInfo> {
    Arc::clone(&DECORATING_PROXY_CLASS)
}

pub fn raw_target_access() -> Arc<ClassInfo> {
    Arc::clone(&RAW_TARGET_ACCESS_CLASS)
}

/// 是否为框架自身的标记接口（不算用户接口）
pub fn is_marker_interface(name: &str) -> bool {
    matches!(name, CHIMERA_PROXY | ADVISED | DECORATING_PROXY | TARGET_CLASS_AWARE)
}

/// 方法是否声明在 `Advised` 或其父接口上
pub fn is_advised_method(method: &Method) -> bool {
    ADVISED_CLASS.is_assignable_to(method.declaring_class())
        && method.declaring_class() != lang::OBJECT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advised_extends_target_class_aware() {
        assert!(advised().is_assignable_to(TARGET_CLASS_AWARE));
        assert!(advised().find_method(GET_TARGET_CLASS, Some(0)).is_some());
    }

    #[test]
    fn test_advised_method_detection() {
        let count = advised().find_method("get_advisor_count", Some(0)).unwrap();
        assert!(is_advised_method(&count));

        let target_class = advised().find_method(GET_TARGET_CLASS, Some(0)).unwrap();
        assert_eq!(target_class.declaring_class(), TARGET_CLASS_AWARE);
        assert!(is_advised_method(&target_class));

        let equals = lang::object_method(lang::EQUALS).unwrap();
        assert!(!is_advised_method(&equals));
    }

    #[test]
    fn test_raw_target_access_marker_matches_core_constant() {
        let class = ClassInfo::class("app.Raw")
            .implements(raw_target_access())
            .method(Method::new("me").returns(ReturnType::reference("app.Raw")))
            .build();
        assert!(class.declared_methods()[0].is_raw_target_access());
        assert!(is_marker_interface(CHIMERA_PROXY));
        assert!(!is_marker_interface(RAW_TARGET_ACCESS));
    }
}
