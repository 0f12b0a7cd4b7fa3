//! 非静态目标源与引入

use chimera_aop::prelude::*;
use chimera_aop::{utils, DelegatingIntroductionInterceptor};
use chimera_aop_macros::proxyable;
use chimera_core::{PrimitiveKind, ReturnType};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Session {
    requests: AtomicUsize,
}

#[proxyable(name = "it.Session")]
impl Session {
    pub fn touch(&self) -> i32 {
        self.requests.fetch_add(1, Ordering::SeqCst) as i32 + 1
    }

    pub fn fail(&self) -> Result<i32, Throwable> {
        Err(Throwable::illegal_state("session expired"))
    }
}

fn lockable_api() -> Arc<ClassInfo> {
    ClassInfo::interface("it.Lockable")
        .method(Method::new("lock"))
        .method(Method::new("locked").returns(ReturnType::Primitive(PrimitiveKind::Boolean)))
        .build()
}

#[derive(Default)]
struct LockMixin {
    locked: AtomicBool,
}

#[proxyable(name = "it.LockMixin", interfaces(lockable_api))]
impl LockMixin {
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

#[test]
fn test_prototype_target_is_released_on_every_path() {
    let source = Arc::new(PrototypeTargetSource::new(Session::class_info(), || {
        Ok(ObjectRef::new(Session::default()))
    }));
    let factory = ProxyFactory::empty().with_target_source(source.clone());
    factory.add_advice(Advice::around(|inv| inv.proceed())).unwrap();
    let proxy = factory.get_proxy().unwrap();
    assert!(utils::is_cglib_proxy(&proxy));

    // 每次调用拿到新目标
    assert_eq!(proxy.call("touch", &[]).unwrap(), Value::Int(1));
    assert_eq!(proxy.call("touch", &[]).unwrap(), Value::Int(1));
    let err = proxy.call("fail", &[]).unwrap_err();
    assert_eq!(err.message(), Some("session expired"));

    assert_eq!(source.created_count(), 3);
    assert_eq!(source.released_count(), 3);
}

#[test]
fn test_thread_local_target_per_thread() {
    let source = Arc::new(ThreadLocalTargetSource::new(Session::class_info(), || {
        Ok(ObjectRef::new(Session::default()))
    }));
    let proxy = ProxyFactory::empty()
        .with_target_source(source.clone())
        .get_proxy()
        .unwrap();

    assert_eq!(proxy.call("touch", &[]).unwrap(), Value::Int(1));
    assert_eq!(proxy.call("touch", &[]).unwrap(), Value::Int(2));

    let remote = proxy.clone();
    let value = std::thread::spawn(move || remote.call("touch", &[]).unwrap())
        .join()
        .unwrap();
    assert_eq!(value, Value::Int(1));
    assert_eq!(source.object_count(), 2);
    assert_eq!(source.invocation_count(), 3);
    assert_eq!(source.hit_count(), 1);
}

#[test]
fn test_introduction_adds_interface_to_proxy() {
    let factory = ProxyFactory::new(ObjectRef::new(Session::default()));
    let mixin = DelegatingIntroductionInterceptor::new(ObjectRef::new(LockMixin::default()));
    factory
        .add_advisor(Advisor::introduction(Advice::introduction(mixin)).unwrap())
        .unwrap();
    assert!(factory.is_interface_proxied("it.Lockable"));

    let proxy = factory.get_proxy().unwrap();
    assert!(proxy.class().is_assignable_to("it.Lockable"));
    assert_eq!(proxy.call("locked", &[]).unwrap(), Value::Bool(false));
    proxy.call("lock", &[]).unwrap();
    assert_eq!(proxy.call("locked", &[]).unwrap(), Value::Bool(true));

    // 移除引入后接口随之移除
    let advisor = factory.advisors()[0].clone();
    assert!(factory.remove_advisor(&advisor).unwrap());
    assert!(!factory.is_interface_proxied("it.Lockable"));
}
