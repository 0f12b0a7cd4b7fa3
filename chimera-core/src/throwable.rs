//! 异常值
//!
//! `Throwable` 是方法调用的失败通道：应用异常、框架异常都以它为载体。
//! 克隆共享同一个实例，`same_instance` 比较身份。

use crate::class::ClassInfo;
use crate::lang;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

struct ThrowableInner {
    class: Arc<ClassInfo>,
    message: Option<String>,
    cause: Option<Throwable>,
    application_exception: OnceCell<Throwable>,
}

/// 异常实例
#[derive(Clone)]
pub struct Throwable {
    inner: Arc<ThrowableInner>,
}

impl Throwable {
    pub fn new(class: Arc<ClassInfo>, message: impl Into<String>) -> Self {
        Self::build(class, Some(message.into()), None)
    }

    pub fn without_message(class: Arc<ClassInfo>) -> Self {
        Self::build(class, None, None)
    }

    pub fn with_cause(class: Arc<ClassInfo>, message: impl Into<String>, cause: Throwable) -> Self {
        Self::build(class, Some(message.into()), Some(cause))
    }

    /// 仅包装原因，消息取自原因
    pub fn wrapping(class: Arc<ClassInfo>, cause: Throwable) -> Self {
        let message = cause.to_string();
        Self::build(class, Some(message), Some(cause))
    }

    fn build(class: Arc<ClassInfo>, message: Option<String>, cause: Option<Throwable>) -> Self {
        Self {
            inner: Arc::new(ThrowableInner {
                class,
                message,
                cause,
                application_exception: OnceCell::new(),
            }),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(lang::runtime_exception(), message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(lang::illegal_state_exception(), message)
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(lang::illegal_argument_exception(), message)
    }

    pub fn class(&self) -> &Arc<ClassInfo> {
        &self.inner.class
    }

    pub fn class_name(&self) -> &str {
        self.inner.class.name()
    }

    pub fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }

    pub fn cause(&self) -> Option<&Throwable> {
        self.inner.cause.as_ref()
    }

    pub fn is_instance_of(&self, type_name: &str) -> bool {
        self.inner.class.is_assignable_to(type_name)
    }

    /// `RuntimeException` 或 `Error` 的子类
    pub fn is_unchecked(&self) -> bool {
        self.is_instance_of(lang::RUNTIME_EXCEPTION) || self.is_instance_of(lang::ERROR)
    }

    pub fn is_checked(&self) -> bool {
        !self.is_unchecked()
    }

    /// 是否为同一个异常实例
    pub fn same_instance(&self, other: &Throwable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 记录被本异常覆盖的应用异常，只能设置一次
    pub fn init_application_exception(&self, application_exception: Throwable) -> bool {
        self.inner
            .application_exception
            .set(application_exception)
            .is_ok()
    }

    pub fn application_exception(&self) -> Option<&Throwable> {
        self.inner.application_exception.get()
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.message {
            Some(message) => write!(f, "{}: {}", self.class_name(), message),
            None => write!(f, "{}", self.class_name()),
        }
    }
}

impl fmt::Debug for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throwable")
            .field("class", &self.class_name())
            .field("message", &self.inner.message)
            .field("cause", &self.inner.cause)
            .finish()
    }
}

impl std::error::Error for Throwable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
