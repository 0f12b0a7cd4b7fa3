//! 当前代理（AopContext）
//!
//! 配置 `expose_proxy = true` 时，代理在调用期间把自身绑定到当前线程，
//! 目标对象内部可以通过 `current_proxy()` 拿到代理，从而让自调用也经过通知。
//!
//! 绑定是作用域式的：`expose` 返回的守卫在所有退出路径上恢复之前的值，
//! 同一线程上的嵌套代理调用互不干扰。

use crate::error::AopError;
use chimera_core::{ObjectRef, Throwable};
use std::cell::RefCell;

thread_local! {
    static CURRENT_PROXY: RefCell<Option<ObjectRef>> = const { RefCell::new(None) };
}

/// 当前线程上正在执行的代理
pub fn current_proxy() -> Result<ObjectRef, Throwable> {
    CURRENT_PROXY
        .with(|current| current.borrow().clone())
        .ok_or_else(|| AopError::NoCurrentProxy.into())
}

/// 绑定代理（或清空绑定），守卫释放时恢复之前的值
#[must_use = "the previous proxy is restored when the guard is dropped"]
pub fn expose(proxy: Option<ObjectRef>) -> ProxyScope {
    let previous = CURRENT_PROXY.with(|current| current.replace(proxy));
    ProxyScope { previous }
}

/// 当前线程是否绑定了代理
pub fn is_exposed() -> bool {
    CURRENT_PROXY.with(|current| current.borrow().is_some())
}

/// `expose` 返回的作用域守卫
pub struct ProxyScope {
    previous: Option<ObjectRef>,
}

impl Drop for ProxyScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXY.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{lang, ClassInfo, Invocable, Method, Value};
    use std::any::Any;
    use std::sync::Arc;

    struct Dummy;

    impl Invocable for Dummy {
        fn class(&self) -> Arc<ClassInfo> {
            ClassInfo::class("test.Dummy").build()
        }

        fn invoke(&self, _: &ObjectRef, _: &Method, _: &[Value]) -> Result<Value, Throwable> {
            Ok(Value::Void)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_no_proxy_bound() {
        let err = current_proxy().unwrap_err();
        assert!(err.is_instance_of(lang::ILLEGAL_STATE_EXCEPTION));
        assert!(!is_exposed());
    }

    #[test]
    fn test_nested_scopes_restore_previous() {
        let outer = ObjectRef::new(Dummy);
        let inner = ObjectRef::new(Dummy);
        {
            let _outer_scope = expose(Some(outer.clone()));
            assert!(current_proxy().unwrap().ptr_eq(&outer));
            {
                let _inner_scope = expose(Some(inner.clone()));
                assert!(current_proxy().unwrap().ptr_eq(&inner));
            }
            assert!(current_proxy().unwrap().ptr_eq(&outer));
        }
        assert!(current_proxy().is_err());
    }

    #[test]
    fn test_binding_is_per_thread() {
        let proxy = ObjectRef::new(Dummy);
        let _scope = expose(Some(proxy));
        let seen = std::thread::spawn(|| is_exposed()).join().unwrap();
        assert!(!seen);
        assert!(is_exposed());
    }
}
