//! 基于子类的代理
//!
//! 为目标类生成一个子类描述，并在生成时为每个方法选定回调（不是每次调用时选择）：
//!
//! | 方法 | 回调 |
//! |---|---|
//! | `finalize` | `NoOverride`，什么也不做 |
//! | `Advised` 上的方法 | `DispatchAdvised`，直接交给配置 |
//! | `equals` / `hash_code` | 按配置逻辑比较 / 计算 |
//! | 有通知，或配置未冻结 | `AopProxy`；冻结 + 静态目标 + 不暴露代理时用预先解析好的 `FixedChain` |
//! | 无通知且已冻结 | 返回值不可能是 `this` 时 `DispatchTarget` 直接分派，否则 `InvokeTarget` |
//!
//! 无法被子类覆盖的方法（final、private、static、跨加载单元的包可见方法）不经过通知，直接到达目标。

use crate::advised::AdvisedSupport;
use crate::aop_context;
use crate::chain::ChainElement;
use crate::error::{AopConfigError, AopConfigResult, GenerationError};
use crate::interfaces;
use crate::invocation::MethodInvocation;
use crate::proxy::{
    invoke_advised_method, process_return_type, proxy_hash_code, AopProxy, TargetLease,
};
use crate::utils;
use chimera_core::{ClassInfo, ClassKind, Invocable, Method, MethodKey, ObjectRef, Throwable, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PROXY_TYPE: &str = "CglibAopProxy";

/// 方法回调的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// 每次调用解析拦截器链
    AopProxy,
    /// 无通知，调用目标并处理返回值 / 暴露代理
    InvokeTarget,
    /// 不覆盖（`finalize`）
    NoOverride,
    /// 无通知，直接分派到静态目标
    DispatchTarget,
    /// 分派到代理配置
    DispatchAdvised,
    InvokeEquals,
    InvokeHashCode,
    /// 预先解析好的拦截器链
    FixedChain,
    /// 子类无法覆盖的方法，调用直接到达目标
    NotOverridden,
}

/// 生成类缓存的键：父类、接口、每个方法的回调
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GeneratedClassKey {
    superclass: String,
    interfaces: Vec<String>,
    callbacks: Vec<(MethodKey, CallbackKind)>,
}

static GENERATED_CLASSES: Lazy<Mutex<HashMap<GeneratedClassKey, Arc<ClassInfo>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static GENERATED_CLASS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 已校验过的父类
static VALIDATED_CLASSES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// 预先解析的链及其静态目标
struct FixedChain {
    chain: Arc<[ChainElement]>,
    target: Option<ObjectRef>,
    target_class: Arc<ClassInfo>,
}

/// 方法到回调的分派表
struct DispatchTable {
    entries: Vec<(Method, CallbackKind)>,
    index: HashMap<MethodKey, usize>,
}

impl DispatchTable {
    fn new(entries: Vec<(Method, CallbackKind)>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (method, _))| (method.key(), i))
            .collect();
        Self { entries, index }
    }

    /// 先按完整标识查找，再按签名查找（方法可能取自接口）
    fn lookup(&self, method: &Method) -> Option<CallbackKind> {
        if let Some(&i) = self.index.get(&method.key()) {
            return Some(self.entries[i].1);
        }
        self.entries
            .iter()
            .find(|(m, _)| m.same_signature(method))
            .map(|(_, kind)| *kind)
    }

    fn cache_key(&self) -> Vec<(MethodKey, CallbackKind)> {
        self.entries.iter().map(|(m, kind)| (m.key(), *kind)).collect()
    }
}

/// 子类代理
pub struct CglibAopProxy {
    config: Arc<AdvisedSupport>,
}

impl CglibAopProxy {
    pub fn new(config: Arc<AdvisedSupport>) -> AopConfigResult<Self> {
        if config.is_empty_configuration() {
            return Err(AopConfigError::NoAdvisorsOrTarget);
        }
        Ok(Self { config })
    }

    fn proxy_superclass(&self) -> AopConfigResult<Arc<ClassInfo>> {
        let root_class = self
            .config
            .target_class()
            .ok_or(AopConfigError::NoTargetClass)?;
        if !root_class.is_generated() {
            return Ok(root_class);
        }
        // 目标本身是子类代理：代理其用户类，并保留它额外实现的接口
        for ifc in root_class.interfaces() {
            if let Err(err) = self.config.add_interface(Arc::clone(ifc)) {
                tracing::warn!("Could not carry over interface [{}]: {}", ifc.name(), err);
            }
        }
        Ok(root_class.user_class())
    }

    /// 构建回调所需的共享状态和每个方法的回调选择
    fn build_dispatch(
        &self,
        superclass: &Arc<ClassInfo>,
        interfaces: &[Arc<ClassInfo>],
    ) -> AopConfigResult<(Callbacks, DispatchTable)> {
        let target_source = self.config.target_source();
        let is_static = target_source.is_static();
        let is_frozen = self.config.is_frozen();
        let expose_proxy = self.config.is_expose_proxy();
        let static_target = if is_static {
            target_source
                .get_target()
                .map_err(|err| AopConfigError::CodeGeneration {
                    class: superclass.name().to_string(),
                    source: GenerationError::Target(err),
                })?
        } else {
            None
        };

        let methods = ClassInfo::builder(superclass.name(), ClassKind::Generated)
            .extends(Arc::clone(superclass))
            .implements_all(interfaces.iter().cloned())
            .build()
            .all_methods();

        // 冻结 + 静态目标：预先解析每个方法的链
        let mut fixed = HashMap::new();
        if is_static && is_frozen && !expose_proxy {
            for method in &methods {
                let chain = self
                    .config
                    .interceptors_and_dynamic_advice(method, Some(superclass))?;
                if !chain.is_empty() {
                    fixed.insert(
                        method.key(),
                        FixedChain {
                            chain,
                            target: static_target.clone(),
                            target_class: Arc::clone(superclass),
                        },
                    );
                }
            }
        }

        let filter = CallbackFilter {
            config: &self.config,
            superclass,
            fixed: &fixed,
            is_static,
            is_frozen,
            expose_proxy,
            proxy_loader: self.config.proxy_loader(),
        };
        let mut entries = Vec::with_capacity(methods.len());
        for method in methods {
            let kind = filter.accept(&method)?;
            entries.push((method, kind));
        }

        let callbacks = Callbacks {
            static_target,
            is_static,
            expose_proxy,
            fixed,
        };
        Ok((callbacks, DispatchTable::new(entries)))
    }
}

impl AopProxy for CglibAopProxy {
    fn get_proxy(&self) -> AopConfigResult<ObjectRef> {
        let superclass = self.proxy_superclass()?;
        tracing::trace!(
            "Creating class-based proxy for [{}]: {}",
            superclass.name(),
            self.config.target_source().describe()
        );

        validate_class_for_proxy(&superclass, self.config.proxy_loader().as_deref());
        if superclass.is_final() {
            return Err(AopConfigError::CodeGeneration {
                class: superclass.name().to_string(),
                source: GenerationError::FinalClass(superclass.name().to_string()),
            });
        }

        let interfaces = utils::complete_proxied_interfaces(&self.config, false);
        let (callbacks, table) = self.build_dispatch(&superclass, &interfaces)?;
        let class = generated_class(&superclass, interfaces, &table, self.config.proxy_loader());

        Ok(ObjectRef::new(CglibProxyInstance {
            class,
            config: Arc::clone(&self.config),
            table,
            callbacks,
        }))
    }
}

/// 按父类、接口和回调签名复用生成的子类
fn generated_class(
    superclass: &Arc<ClassInfo>,
    interfaces: Vec<Arc<ClassInfo>>,
    table: &DispatchTable,
    loader: Option<String>,
) -> Arc<ClassInfo> {
    let key = GeneratedClassKey {
        superclass: superclass.name().to_string(),
        interfaces: interfaces.iter().map(|i| i.name().to_string()).collect(),
        callbacks: table.cache_key(),
    };
    let mut classes = GENERATED_CLASSES.lock();
    if let Some(class) = classes.get(&key) {
        return Arc::clone(class);
    }

    let name = format!(
        "{}$$ChimeraProxy$${}",
        superclass.name(),
        GENERATED_CLASS_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    let mut builder = ClassInfo::builder(name, ClassKind::Generated)
        .extends(Arc::clone(superclass))
        .implements_all(interfaces);
    if let Some(loader) = loader.or_else(|| superclass.loader().map(str::to_string)) {
        builder = builder.loader(loader);
    }
    let class = builder.build();
    tracing::debug!("Generated proxy subclass [{}]", class.name());
    classes.insert(key, Arc::clone(&class));
    class
}

/// 检查父类中无法被覆盖的方法并记录警告，每个类只检查一次
fn validate_class_for_proxy(class: &Arc<ClassInfo>, proxy_loader: Option<&str>) {
    let key = format!("{}@{}", class.name(), proxy_loader.unwrap_or(""));
    if !VALIDATED_CLASSES.lock().insert(key) {
        return;
    }

    let interfaces = class.all_interfaces();
    let mut current = Some(Arc::clone(class));
    while let Some(class) = current {
        if class.is_object() {
            break;
        }
        for method in class.declared_methods() {
            if method.is_static() || method.is_private() {
                continue;
            }
            if method.is_final() {
                if interfaces.iter().any(|ifc| ifc.has_method(method)) {
                    tracing::warn!(
                        "Unable to proxy interface-implementing method [{}] because it is marked as final: consider using interface-based proxies instead",
                        method
                    );
                } else {
                    tracing::warn!(
                        "Final method [{}] cannot be proxied via subclassing: calls to this method bypass advice and go directly to the target",
                        method
                    );
                }
            } else if method.get_modifiers().is_package_visible()
                && crosses_loader(class.loader(), proxy_loader)
            {
                tracing::warn!(
                    "Method [{}] is package-visible across different loaders and cannot be proxied via subclassing: declare it public or protected if invocations through the proxy are required",
                    method
                );
            }
        }
        current = class.superclass().cloned();
    }
}

fn crosses_loader(class_loader: Option<&str>, proxy_loader: Option<&str>) -> bool {
    match proxy_loader {
        Some(proxy_loader) => class_loader != Some(proxy_loader),
        None => false,
    }
}

/// 生成时为每个方法选择回调
struct CallbackFilter<'a> {
    config: &'a AdvisedSupport,
    superclass: &'a Arc<ClassInfo>,
    fixed: &'a HashMap<MethodKey, FixedChain>,
    is_static: bool,
    is_frozen: bool,
    expose_proxy: bool,
    proxy_loader: Option<String>,
}

impl CallbackFilter<'_> {
    fn accept(&self, method: &Method) -> AopConfigResult<CallbackKind> {
        if !self.is_overridable(method) {
            tracing::trace!("Method [{}] cannot be overridden, calls go to the target", method);
            return Ok(CallbackKind::NotOverridden);
        }
        if method.is_finalize_method() {
            tracing::trace!("Found finalize() method - using NO_OVERRIDE");
            return Ok(CallbackKind::NoOverride);
        }
        if !self.config.is_opaque() && interfaces::is_advised_method(method) {
            tracing::trace!("Method is declared on Advised interface: {}", method);
            return Ok(CallbackKind::DispatchAdvised);
        }
        if method.is_equals_method() {
            tracing::trace!("Found 'equals' method: {}", method);
            return Ok(CallbackKind::InvokeEquals);
        }
        if method.is_hash_code_method() {
            tracing::trace!("Found 'hash_code' method: {}", method);
            return Ok(CallbackKind::InvokeHashCode);
        }

        let target_class = self.config.target_class();
        let chain = self
            .config
            .interceptors_and_dynamic_advice(method, target_class.as_ref())?;
        let have_advice = !chain.is_empty();

        if have_advice || !self.is_frozen {
            if self.expose_proxy {
                tracing::trace!("Must expose proxy on advised method: {}", method);
                return Ok(CallbackKind::AopProxy);
            }
            if self.is_static && self.is_frozen && self.fixed.contains_key(&method.key()) {
                tracing::trace!("Method has advice and optimizations are enabled: {}", method);
                return Ok(CallbackKind::FixedChain);
            }
            tracing::trace!("Unable to apply any optimizations to advised method: {}", method);
            return Ok(CallbackKind::AopProxy);
        }

        if self.expose_proxy || !self.is_static {
            return Ok(CallbackKind::InvokeTarget);
        }
        let may_return_this = target_class
            .as_ref()
            .map(|class| method.return_type().may_alias(class))
            .unwrap_or(false);
        if may_return_this {
            tracing::trace!(
                "Method return type is assignable from target type and may therefore return 'this' - using INVOKE_TARGET: {}",
                method
            );
            Ok(CallbackKind::InvokeTarget)
        } else {
            tracing::trace!(
                "Method return type ensures 'this' cannot be returned - using DISPATCH_TARGET: {}",
                method
            );
            Ok(CallbackKind::DispatchTarget)
        }
    }

    fn is_overridable(&self, method: &Method) -> bool {
        let declaring = match self.superclass.find_type(method.declaring_class()) {
            Some(class) if !class.is_interface() => class,
            _ => return true,
        };
        if method.is_final() || method.is_private() || method.is_static() {
            return false;
        }
        !(method.get_modifiers().is_package_visible()
            && crosses_loader(declaring.loader(), self.proxy_loader.as_deref()))
    }
}

/// 代理对象上所有回调共享的状态
struct Callbacks {
    static_target: Option<ObjectRef>,
    is_static: bool,
    expose_proxy: bool,
    fixed: HashMap<MethodKey, FixedChain>,
}

/// 子类代理对象
pub(crate) struct CglibProxyInstance {
    class: Arc<ClassInfo>,
    config: Arc<AdvisedSupport>,
    table: DispatchTable,
    callbacks: Callbacks,
}

impl CglibProxyInstance {
    pub(crate) fn config(&self) -> &Arc<AdvisedSupport> {
        &self.config
    }

    fn callback_kind(&self, method: &Method) -> CallbackKind {
        self.table.lookup(method).unwrap_or(CallbackKind::AopProxy)
    }

    /// 通用路径：每次调用解析拦截器链
    fn dynamic_advised(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        let _exposed = self
            .config
            .is_expose_proxy()
            .then(|| aop_context::expose(Some(this.clone())));

        let target_source = self.config.target_source();
        let lease = TargetLease::acquire(&*target_source)?;
        let result = {
            let target = lease.target();
            let target_class = target.map(ObjectRef::class);
            let chain = self
                .config
                .interceptors_and_dynamic_advice(method, target_class.as_ref())?;
            let value = if chain.is_empty() && method.is_public() {
                utils::invoke_joinpoint(target, method, args)
            } else {
                MethodInvocation::new(this, target, method, args.to_vec(), target_class, &chain)
                    .proceed()
            };
            value.and_then(|value| process_return_type(this, target, method, value))
        };
        lease.release()?;
        result
    }

    /// 无通知：调用目标，处理返回值，按需暴露代理
    fn invoke_target(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        let _exposed = self
            .callbacks
            .expose_proxy
            .then(|| aop_context::expose(Some(this.clone())));

        if self.callbacks.is_static {
            let target = self.callbacks.static_target.as_ref();
            let value = utils::invoke_joinpoint(target, method, args)?;
            return process_return_type(this, target, method, value);
        }

        let target_source = self.config.target_source();
        let lease = TargetLease::acquire(&*target_source)?;
        let result = utils::invoke_joinpoint(lease.target(), method, args)
            .and_then(|value| process_return_type(this, lease.target(), method, value));
        lease.release()?;
        result
    }

    /// 不经过通知，直接调用目标
    fn invoke_unadvised(&self, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        if self.callbacks.is_static {
            return utils::invoke_joinpoint(self.callbacks.static_target.as_ref(), method, args);
        }
        let target_source = self.config.target_source();
        let lease = TargetLease::acquire(&*target_source)?;
        let result = utils::invoke_joinpoint(lease.target(), method, args);
        lease.release()?;
        result
    }

    fn fixed_chain(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        let fixed = self
            .callbacks
            .fixed
            .get(&method.key())
            .or_else(|| {
                self.callbacks
                    .fixed
                    .iter()
                    .find(|(key, _)| key.name == method.name() && key.parameter_types == method.parameter_types())
                    .map(|(_, fixed)| fixed)
            });
        let Some(fixed) = fixed else {
            return self.dynamic_advised(this, method, args);
        };

        let target = fixed.target.as_ref();
        let value = MethodInvocation::new(
            this,
            target,
            method,
            args.to_vec(),
            Some(Arc::clone(&fixed.target_class)),
            &fixed.chain,
        )
        .proceed()?;
        process_return_type(this, target, method, value)
    }

    fn equals(&self, this: &ObjectRef, other: Option<&Value>) -> Value {
        let equal = match other.and_then(Value::as_object) {
            Some(other) if other.ptr_eq(this) => true,
            Some(other) => other
                .downcast_ref::<CglibProxyInstance>()
                .map(|o| utils::equals_in_proxy(&self.config, &o.config))
                .unwrap_or(false),
            None => false,
        };
        Value::Bool(equal)
    }
}

impl Invocable for CglibProxyInstance {
    fn class(&self) -> Arc<ClassInfo> {
        Arc::clone(&self.class)
    }

    fn invoke(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        match self.callback_kind(method) {
            CallbackKind::AopProxy => self.dynamic_advised(this, method, args),
            CallbackKind::InvokeTarget => self.invoke_target(this, method, args),
            CallbackKind::NoOverride => Ok(Value::Void),
            CallbackKind::DispatchTarget => {
                utils::invoke_joinpoint(self.callbacks.static_target.as_ref(), method, args)
            }
            CallbackKind::DispatchAdvised => invoke_advised_method(&self.config, method),
            CallbackKind::InvokeEquals => Ok(self.equals(this, args.first())),
            CallbackKind::InvokeHashCode => Ok(proxy_hash_code(PROXY_TYPE, &self.config)),
            CallbackKind::FixedChain => self.fixed_chain(this, method, args),
            CallbackKind::NotOverridden => self.invoke_unadvised(method, args),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 子类代理为该方法选择的回调；不是子类代理时返回 None
pub fn callback_kind(proxy: &ObjectRef, method: &Method) -> Option<CallbackKind> {
    proxy
        .downcast_ref::<CglibProxyInstance>()
        .map(|p| p.callback_kind(method))
}
