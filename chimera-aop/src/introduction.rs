//! 引入（mixin）
//!
//! `DelegatingIntroductionInterceptor` 让代理额外实现一组接口，
//! 这些接口上的方法交给委托对象执行，其余方法照常进入链的下一环。

use crate::advice::{IntroductionInfo, MethodInterceptor};
use crate::interfaces;
use crate::invocation::MethodInvocation;
use chimera_core::{lang, ClassInfo, Method, ObjectRef, Throwable, Value};
use std::sync::Arc;

/// 把引入接口上的方法委托给另一个对象
pub struct DelegatingIntroductionInterceptor {
    delegate: ObjectRef,
    interfaces: Vec<Arc<ClassInfo>>,
}

impl DelegatingIntroductionInterceptor {
    /// 引入委托对象实现的全部接口（框架标记接口除外）
    pub fn new(delegate: ObjectRef) -> Self {
        let interfaces = delegate
            .class()
            .all_interfaces()
            .into_iter()
            .filter(|i| !interfaces::is_marker_interface(i.name()))
            .collect();
        Self { delegate, interfaces }
    }

    /// 只引入指定的接口
    pub fn with_interfaces(delegate: ObjectRef, interfaces: Vec<Arc<ClassInfo>>) -> Self {
        Self { delegate, interfaces }
    }

    /// 不再引入某个接口
    pub fn suppress_interface(&mut self, name: &str) {
        self.interfaces.retain(|i| i.name() != name);
    }

    pub fn delegate(&self) -> &ObjectRef {
        &self.delegate
    }

    fn is_method_on_introduced_interface(&self, method: &Method) -> bool {
        self.interfaces
            .iter()
            .any(|ifc| ifc.is_assignable_to(method.declaring_class()))
            && method.declaring_class() != lang::OBJECT
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
        if !self.is_method_on_introduced_interface(invocation.method()) {
            return invocation.proceed();
        }
        let value = self
            .delegate
            .invoke(invocation.method(), invocation.arguments())?;
        // 委托返回自身时交出代理
        if value.is_same_object(&self.delegate) {
            return Ok(Value::Object(invocation.proxy().clone()));
        }
        Ok(value)
    }
}

impl IntroductionInfo for DelegatingIntroductionInterceptor {
    fn interfaces(&self) -> Vec<Arc<ClassInfo>> {
        self.interfaces.clone()
    }
}
