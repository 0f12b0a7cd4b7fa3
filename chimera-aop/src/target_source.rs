//! 目标源（TargetSource）
//!
//! 决定代理背后的真实对象如何获取、何时释放：
//! - `SingletonTargetSource` - 固定的单个目标（静态）
//! - `EmptyTargetSource` - 没有目标，只有（可选的）目标类
//! - `PrototypeTargetSource` - 每次调用创建新目标，调用结束后释放
//! - `ThreadLocalTargetSource` - 每个线程一个目标
//!
//! 非静态目标在真正调用前才获取，并在所有退出路径上释放。

use chimera_core::{ClassInfo, ObjectRef, Throwable};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

/// 目标源
pub trait TargetSource: Send + Sync + 'static {
    /// 目标类（可能未知）
    fn target_class(&self) -> Option<Arc<ClassInfo>>;

    /// 每次 `get_target` 是否都返回同一个对象
    fn is_static(&self) -> bool;

    fn get_target(&self) -> Result<Option<ObjectRef>, Throwable>;

    fn release_target(&self, _target: &ObjectRef) -> Result<(), Throwable> {
        Ok(())
    }

    /// 逻辑相等（代理的 equals 使用）
    fn equals(&self, other: &dyn TargetSource) -> bool;

    fn hash_code(&self) -> u64;

    fn describe(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// 单个固定目标
pub struct SingletonTargetSource {
    target: ObjectRef,
}

impl SingletonTargetSource {
    pub fn new(target: ObjectRef) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<Arc<ClassInfo>> {
        Some(self.target.class())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> Result<Option<ObjectRef>, Throwable> {
        Ok(Some(self.target.clone()))
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<SingletonTargetSource>()
            .map(|o| o.target.ptr_eq(&self.target))
            .unwrap_or(false)
    }

    fn hash_code(&self) -> u64 {
        self.target.identity_hash()
    }

    fn describe(&self) -> String {
        format!("SingletonTargetSource for target object [{:?}]", self.target)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 没有目标对象
///
/// 不带目标类的实例是配置的默认目标源。
#[derive(Default)]
pub struct EmptyTargetSource {
    target_class: Option<Arc<ClassInfo>>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_class(target_class: Arc<ClassInfo>) -> Self {
        Self {
            target_class: Some(target_class),
        }
    }

    /// 是否为未指定任何信息的默认目标源
    pub fn is_default(&self) -> bool {
        self.target_class.is_none()
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<Arc<ClassInfo>> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> Result<Option<ObjectRef>, Throwable> {
        Ok(None)
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<EmptyTargetSource>()
            .map(|o| o.target_class == self.target_class)
            .unwrap_or(false)
    }

    fn hash_code(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        "EmptyTargetSource".hash(&mut hasher);
        self.target_class.as_ref().map(|c| c.name()).hash(&mut hasher);
        hasher.finish()
    }

    fn describe(&self) -> String {
        match &self.target_class {
            Some(class) => format!("EmptyTargetSource: target class [{}]", class.name()),
            None => "EmptyTargetSource: no target class".to_string(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type TargetFactory = Arc<dyn Fn() -> Result<ObjectRef, Throwable> + Send + Sync>;

/// 每次调用创建新目标
pub struct PrototypeTargetSource {
    target_class: Arc<ClassInfo>,
    factory: TargetFactory,
    created: AtomicU64,
    released: AtomicU64,
}

impl PrototypeTargetSource {
    pub fn new<F>(target_class: Arc<ClassInfo>, factory: F) -> Self
    where
        F: Fn() -> Result<ObjectRef, Throwable> + Send + Sync + 'static,
    {
        Self {
            target_class,
            factory: Arc::new(factory),
            created: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Option<Arc<ClassInfo>> {
        Some(Arc::clone(&self.target_class))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> Result<Option<ObjectRef>, Throwable> {
        let target = (self.factory)()?;
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Created new prototype target of [{}]", self.target_class.name());
        Ok(Some(target))
    }

    fn release_target(&self, _target: &ObjectRef) -> Result<(), Throwable> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<PrototypeTargetSource>()
            .map(|o| Arc::ptr_eq(&o.factory, &self.factory))
            .unwrap_or(false)
    }

    fn hash_code(&self) -> u64 {
        Arc::as_ptr(&self.factory) as *const () as usize as u64
    }

    fn describe(&self) -> String {
        format!("PrototypeTargetSource for target class [{}]", self.target_class.name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 每个线程一个目标
pub struct ThreadLocalTargetSource {
    target_class: Arc<ClassInfo>,
    factory: TargetFactory,
    targets: Mutex<HashMap<ThreadId, ObjectRef>>,
    invocation_count: AtomicU64,
    hit_count: AtomicU64,
}

impl ThreadLocalTargetSource {
    pub fn new<F>(target_class: Arc<ClassInfo>, factory: F) -> Self
    where
        F: Fn() -> Result<ObjectRef, Throwable> + Send + Sync + 'static,
    {
        Self {
            target_class,
            factory: Arc::new(factory),
            targets: Mutex::new(HashMap::new()),
            invocation_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocation_count.load(Ordering::SeqCst)
    }

    /// 命中已有线程目标的次数
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::SeqCst)
    }

    /// 已创建的目标数量
    pub fn object_count(&self) -> usize {
        self.targets.lock().len()
    }

    /// 丢弃所有线程的目标
    pub fn destroy(&self) {
        let mut targets = self.targets.lock();
        tracing::debug!(
            "Destroying {} thread-bound target(s) of [{}]",
            targets.len(),
            self.target_class.name()
        );
        targets.clear();
    }
}

impl TargetSource for ThreadLocalTargetSource {
    fn target_class(&self) -> Option<Arc<ClassInfo>> {
        Some(Arc::clone(&self.target_class))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> Result<Option<ObjectRef>, Throwable> {
        self.invocation_count.fetch_add(1, Ordering::SeqCst);
        let thread = std::thread::current().id();
        if let Some(target) = self.targets.lock().get(&thread) {
            self.hit_count.fetch_add(1, Ordering::SeqCst);
            return Ok(Some(target.clone()));
        }

        // 工厂在锁外调用
        let target = (self.factory)()?;
        tracing::trace!(
            "No target for thread {:?}: created one of [{}]",
            thread,
            self.target_class.name()
        );
        self.targets.lock().insert(thread, target.clone());
        Ok(Some(target))
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        std::ptr::eq(
            self as *const Self as *const (),
            other.as_any() as *const dyn Any as *const (),
        )
    }

    fn hash_code(&self) -> u64 {
        self as *const Self as usize as u64
    }

    fn describe(&self) -> String {
        format!("ThreadLocalTargetSource for target class [{}]", self.target_class.name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
