//! 内置的基础类型
//!
//! 所有类的根 `Object`，以及异常体系 `Throwable` → `Exception` → `RuntimeException`、
//! `Throwable` → `Error`。

use crate::class::{ClassInfo, Method, PrimitiveKind, ReturnType, Visibility};
use once_cell::sync::Lazy;
use std::sync::Arc;

pub const OBJECT: &str = "Object";
pub const THROWABLE: &str = "Throwable";
pub const EXCEPTION: &str = "Exception";
pub const RUNTIME_EXCEPTION: &str = "RuntimeException";
pub const ERROR: &str = "Error";
pub const ILLEGAL_STATE_EXCEPTION: &str = "IllegalStateException";
pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "IllegalArgumentException";

/// 声明类型实现该标记接口时，返回 `this` 不会被替换为代理
pub const RAW_TARGET_ACCESS: &str = "chimera.aop.RawTargetAccess";

pub const EQUALS: &str = "equals";
pub const HASH_CODE: &str = "hash_code";
pub const TO_STRING: &str = "to_string";
pub const FINALIZE: &str = "finalize";

static OBJECT_CLASS: Lazy<Arc<ClassInfo>> = Lazy::new(|| {
    ClassInfo::class(OBJECT)
        .root()
        .method(
            Method::new(EQUALS)
                .param(OBJECT)
                .returns(ReturnType::Primitive(PrimitiveKind::Boolean)),
        )
        .method(Method::new(HASH_CODE).returns(ReturnType::Primitive(PrimitiveKind::Int)))
        .method(Method::new(TO_STRING).returns(ReturnType::reference("String")))
        .method(Method::new(FINALIZE).visibility(Visibility::Protected))
        .build()
});

static THROWABLE_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::class(THROWABLE).build());

static EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(EXCEPTION, &THROWABLE_CLASS));

static RUNTIME_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(RUNTIME_EXCEPTION, &EXCEPTION_CLASS));

static ERROR_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(ERROR, &THROWABLE_CLASS));

static ILLEGAL_STATE_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(ILLEGAL_STATE_EXCEPTION, &RUNTIME_EXCEPTION_CLASS));

static ILLEGAL_ARGUMENT_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(ILLEGAL_ARGUMENT_EXCEPTION, &RUNTIME_EXCEPTION_CLASS));

pub fn object() -> Arc<ClassInfo> {
    Arc::clone(&OBJECT_CLASS)
}

pub fn throwable() -> Arc<ClassInfo> {
    Arc::clone(&THROWABLE_CLASS)
}

pub fn exception() -> Arc<ClassInfo> {
    Arc::clone(&EXCEPTION_CLASS)
}

pub fn runtime_exception() -> Arc<ClassInfo> {
    Arc::clone(&RUNTIME_EXCEPTION_CLASS)
}

pub fn error() -> Arc<ClassInfo> {
    Arc::clone(&ERROR_CLASS)
}

pub fn illegal_state_exception() -> Arc<ClassInfo> {
    Arc::clone(&ILLEGAL_STATE_EXCEPTION_CLASS)
}

pub fn illegal_argument_exception() -> Arc<ClassInfo> {
    Arc::clone(&ILLEGAL_ARGUMENT_EXCEPTION_CLASS)
}

/// `Object` 上声明的方法
pub fn object_method(name: &str) -> Option<Method> {
    OBJECT_CLASS
        .declared_methods()
        .iter()
        .find(|m| m.name() == name)
        .cloned()
}
