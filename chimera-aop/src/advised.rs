//! 代理配置（AdvisedSupport）
//!
//! 持有目标源、有序切面列表、被代理接口集合以及行为开关。
//! 切面顺序决定拦截顺序。配置冻结之前可以修改，每次修改都会清空按方法缓存的拦截器链。

use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::chain::{AdvisorChainFactory, ChainElement, DefaultAdvisorChainFactory};
use crate::config::ProxyConfig;
use crate::error::{AopConfigError, AopConfigResult};
use crate::interfaces;
use crate::target_source::{EmptyTargetSource, SingletonTargetSource, TargetSource};
use chimera_core::{ClassInfo, Method, MethodKey, ObjectRef};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodCacheKey {
    method: MethodKey,
    target_class: Option<String>,
}

struct AdvisedState {
    target_source: Arc<dyn TargetSource>,
    advisors: Arc<[Advisor]>,
    interfaces: Vec<Arc<ClassInfo>>,
    config: ProxyConfig,
    pre_filtered: bool,
    proxy_loader: Option<String>,
}

/// 代理配置
pub struct AdvisedSupport {
    state: RwLock<AdvisedState>,
    method_cache: Mutex<HashMap<MethodCacheKey, Arc<[ChainElement]>>>,
    chain_factory: RwLock<Arc<dyn AdvisorChainFactory>>,
}

impl AdvisedSupport {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AdvisedState {
                target_source: Arc::new(EmptyTargetSource::new()),
                advisors: Arc::from(Vec::new()),
                interfaces: Vec::new(),
                config: ProxyConfig::default(),
                pre_filtered: false,
                proxy_loader: None,
            }),
            method_cache: Mutex::new(HashMap::new()),
            chain_factory: RwLock::new(Arc::new(DefaultAdvisorChainFactory::new())),
        }
    }

    // ------------------------------------------------------------------
    // 目标
    // ------------------------------------------------------------------

    /// 使用固定目标
    pub fn set_target(&self, target: ObjectRef) {
        self.set_target_source(Arc::new(SingletonTargetSource::new(target)));
    }

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        self.state.write().target_source = target_source;
        self.advice_changed();
    }

    /// 只指定目标类，没有目标对象
    pub fn set_target_class(&self, target_class: Arc<ClassInfo>) {
        self.set_target_source(Arc::new(EmptyTargetSource::for_class(target_class)));
    }

    pub fn target_source(&self) -> Arc<dyn TargetSource> {
        Arc::clone(&self.state.read().target_source)
    }

    pub fn target_class(&self) -> Option<Arc<ClassInfo>> {
        self.state.read().target_source.target_class()
    }

    // ------------------------------------------------------------------
    // 接口
    // ------------------------------------------------------------------

    pub fn set_interfaces(&self, interfaces: Vec<Arc<ClassInfo>>) -> AopConfigResult<()> {
        for ifc in &interfaces {
            ensure_interface(ifc)?;
        }
        self.state.write().interfaces = interfaces;
        self.advice_changed();
        Ok(())
    }

    pub fn add_interface(&self, interface: Arc<ClassInfo>) -> AopConfigResult<()> {
        ensure_interface(&interface)?;
        {
            let mut state = self.state.write();
            if state.interfaces.iter().any(|i| i.name() == interface.name()) {
                return Ok(());
            }
            state.interfaces.push(interface);
        }
        self.advice_changed();
        Ok(())
    }

    pub fn remove_interface(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            let before = state.interfaces.len();
            state.interfaces.retain(|i| i.name() != name);
            state.interfaces.len() != before
        };
        if removed {
            self.advice_changed();
        }
        removed
    }

    pub fn proxied_interfaces(&self) -> Vec<Arc<ClassInfo>> {
        self.state.read().interfaces.clone()
    }

    pub fn is_interface_proxied(&self, name: &str) -> bool {
        self.state
            .read()
            .interfaces
            .iter()
            .any(|i| i.is_assignable_to(name))
    }

    /// 是否没有用户提供的接口（只有代理标记接口也算没有）
    pub fn has_no_user_supplied_interfaces(&self) -> bool {
        let state = self.state.read();
        match state.interfaces.as_slice() {
            [] => true,
            [only] => only.is_assignable_to(interfaces::CHIMERA_PROXY),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // 切面
    // ------------------------------------------------------------------

    /// 当前切面列表的快照
    pub fn advisors(&self) -> Arc<[Advisor]> {
        Arc::clone(&self.state.read().advisors)
    }

    pub fn advisor_count(&self) -> usize {
        self.state.read().advisors.len()
    }

    /// 添加应用于所有方法的通知；引入通知会包装为引入切面
    pub fn add_advice(&self, advice: Advice) -> AopConfigResult<()> {
        let pos = self.advisor_count();
        self.add_advice_at(pos, advice)
    }

    pub fn add_advice_at(&self, pos: usize, advice: Advice) -> AopConfigResult<()> {
        let advisor = if advice.is_introduction() {
            Advisor::introduction(advice)?
        } else {
            Advisor::always(advice)
        };
        self.add_advisor_at(pos, advisor)
    }

    pub fn add_advisor(&self, advisor: Advisor) -> AopConfigResult<()> {
        let pos = self.advisor_count();
        self.add_advisor_at(pos, advisor)
    }

    pub fn add_advisors(&self, advisors: impl IntoIterator<Item = Advisor>) -> AopConfigResult<()> {
        for advisor in advisors {
            self.add_advisor(advisor)?;
        }
        Ok(())
    }

    pub fn add_advisor_at(&self, pos: usize, advisor: Advisor) -> AopConfigResult<()> {
        let supported = self.chain_factory.read().supports_advice(advisor.advice());
        if !supported {
            return Err(AopConfigError::UnknownAdviceType(
                advisor.advice().type_name().to_string(),
            ));
        }
        {
            let mut state = self.state.write();
            if state.config.frozen {
                return Err(AopConfigError::Frozen);
            }
            if pos > state.advisors.len() {
                return Err(AopConfigError::AdvisorIndexOutOfRange {
                    index: pos,
                    count: state.advisors.len(),
                });
            }
            for ifc in advisor.introduced_interfaces() {
                if !state.interfaces.iter().any(|i| i.name() == ifc.name()) {
                    state.interfaces.push(Arc::clone(ifc));
                }
            }
            let mut advisors = state.advisors.to_vec();
            tracing::debug!("Adding advisor {:?} at position {}", advisor, pos);
            advisors.insert(pos, advisor);
            state.advisors = Arc::from(advisors);
        }
        self.advice_changed();
        Ok(())
    }

    /// 按实例移除切面
    pub fn remove_advisor(&self, advisor: &Advisor) -> AopConfigResult<bool> {
        match self.index_of(advisor) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn remove_advisor_at(&self, index: usize) -> AopConfigResult<Advisor> {
        let removed = {
            let mut state = self.state.write();
            if state.config.frozen {
                return Err(AopConfigError::Frozen);
            }
            if index >= state.advisors.len() {
                return Err(AopConfigError::AdvisorIndexOutOfRange {
                    index,
                    count: state.advisors.len(),
                });
            }
            let mut advisors = state.advisors.to_vec();
            let removed = advisors.remove(index);
            // 引入切面带来的接口一并移除
            for ifc in removed.introduced_interfaces() {
                state.interfaces.retain(|i| i.name() != ifc.name());
            }
            state.advisors = Arc::from(advisors);
            removed
        };
        self.advice_changed();
        Ok(removed)
    }

    /// 按通知实例移除
    pub fn remove_advice(&self, advice: &Advice) -> AopConfigResult<bool> {
        match self.index_of_advice(advice) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn index_of(&self, advisor: &Advisor) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.same_instance(advisor))
    }

    pub fn index_of_advice(&self, advice: &Advice) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.advice().same_instance(advice))
    }

    /// 替换切面，返回是否找到了旧切面
    pub fn replace_advisor(&self, old: &Advisor, new: Advisor) -> AopConfigResult<bool> {
        let Some(index) = self.index_of(old) else {
            return Ok(false);
        };
        self.remove_advisor_at(index)?;
        self.add_advisor_at(index, new)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // 开关
    // ------------------------------------------------------------------

    pub fn proxy_config(&self) -> ProxyConfig {
        self.state.read().config
    }

    pub fn apply_config(&self, config: ProxyConfig) {
        self.state.write().config = config;
        self.advice_changed();
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.state.write().config.proxy_target_class = value;
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.state.read().config.proxy_target_class
    }

    pub fn set_optimize(&self, value: bool) {
        self.state.write().config.optimize = value;
    }

    pub fn is_optimize(&self) -> bool {
        self.state.read().config.optimize
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.state.write().config.expose_proxy = value;
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.state.read().config.expose_proxy
    }

    pub fn set_frozen(&self, value: bool) {
        self.state.write().config.frozen = value;
    }

    pub fn is_frozen(&self) -> bool {
        self.state.read().config.frozen
    }

    pub fn set_opaque(&self, value: bool) {
        self.state.write().config.opaque = value;
    }

    pub fn is_opaque(&self) -> bool {
        self.state.read().config.opaque
    }

    /// 切面已按目标类预先筛选过，解析时跳过类过滤
    pub fn set_pre_filtered(&self, value: bool) {
        self.state.write().pre_filtered = value;
        self.advice_changed();
    }

    pub fn is_pre_filtered(&self) -> bool {
        self.state.read().pre_filtered
    }

    /// 生成代理所在的加载单元
    pub fn set_proxy_loader(&self, loader: Option<String>) {
        self.state.write().proxy_loader = loader;
    }

    pub fn proxy_loader(&self) -> Option<String> {
        self.state.read().proxy_loader.clone()
    }

    // ------------------------------------------------------------------
    // 拦截器链
    // ------------------------------------------------------------------

    pub fn set_advisor_chain_factory(&self, factory: Arc<dyn AdvisorChainFactory>) {
        *self.chain_factory.write() = factory;
        self.advice_changed();
    }

    /// 方法的拦截器链，按 (方法, 目标类) 缓存
    pub fn interceptors_and_dynamic_advice(
        &self,
        method: &Method,
        target_class: Option<&Arc<ClassInfo>>,
    ) -> AopConfigResult<Arc<[ChainElement]>> {
        let key = MethodCacheKey {
            method: method.key(),
            target_class: target_class.map(|c| c.name().to_string()),
        };
        if let Some(cached) = self.method_cache.lock().get(&key) {
            return Ok(Arc::clone(cached));
        }

        let factory = Arc::clone(&self.chain_factory.read());
        let chain: Arc<[ChainElement]> =
            Arc::from(factory.interceptors_and_dynamic_advice(self, method, target_class)?);
        self.method_cache.lock().insert(key, Arc::clone(&chain));
        Ok(chain)
    }

    /// 切面或接口变化后清空链缓存
    pub fn advice_changed(&self) {
        self.method_cache.lock().clear();
    }

    /// 没有任何切面且目标源是默认的空目标源
    pub fn is_empty_configuration(&self) -> bool {
        let state = self.state.read();
        state.advisors.is_empty()
            && state
                .target_source
                .as_any()
                .downcast_ref::<EmptyTargetSource>()
                .map(EmptyTargetSource::is_default)
                .unwrap_or(false)
    }

    pub fn to_proxy_config_string(&self) -> String {
        let state = self.state.read();
        format!(
            "{}; {} interfaces [{}]; {} advisors [{}]; target source [{}]",
            state.config,
            state.interfaces.len(),
            state
                .interfaces
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>()
                .join(", "),
            state.advisors.len(),
            state
                .advisors
                .iter()
                .map(|a| format!("{:?}", a))
                .collect::<Vec<_>>()
                .join(", "),
            state.target_source.describe()
        )
    }
}

impl Default for AdvisedSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdvisedSupport: {}", self.to_proxy_config_string())
    }
}

fn ensure_interface(class: &ClassInfo) -> AopConfigResult<()> {
    if class.is_interface() {
        Ok(())
    } else {
        Err(AopConfigError::IntroductionNotInterface(class.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{IntroductionInfo, MethodInterceptor};
    use crate::invocation::MethodInvocation;
    use chimera_core::{Throwable, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn passthrough() -> Advice {
        Advice::around(|inv| inv.proceed())
    }

    struct Lockable;

    impl MethodInterceptor for Lockable {
        fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
            invocation.proceed()
        }
    }

    impl IntroductionInfo for Lockable {
        fn interfaces(&self) -> Vec<Arc<ClassInfo>> {
            vec![ClassInfo::interface("app.Lockable").build()]
        }
    }

    struct CountingFactory(AtomicUsize);

    impl AdvisorChainFactory for CountingFactory {
        fn interceptors_and_dynamic_advice(
            &self,
            config: &AdvisedSupport,
            method: &Method,
            target_class: Option<&Arc<ClassInfo>>,
        ) -> AopConfigResult<Vec<ChainElement>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            DefaultAdvisorChainFactory::new().interceptors_and_dynamic_advice(config, method, target_class)
        }
    }

    #[test]
    fn test_advisor_list_management() {
        let config = AdvisedSupport::new();
        let a = Advisor::always(passthrough());
        let b = Advisor::always(passthrough());
        let c = Advisor::always(passthrough());

        config.add_advisor(a.clone()).unwrap();
        config.add_advisor(c.clone()).unwrap();
        config.add_advisor_at(1, b.clone()).unwrap();
        assert_eq!(config.index_of(&b), Some(1));

        let err = config.add_advisor_at(7, Advisor::always(passthrough())).err().unwrap();
        assert!(matches!(err, AopConfigError::AdvisorIndexOutOfRange { index: 7, count: 3 }));

        assert!(config.remove_advisor(&a).unwrap());
        assert!(!config.remove_advisor(&a).unwrap());
        assert_eq!(config.advisor_count(), 2);

        let d = Advisor::always(passthrough());
        assert!(config.replace_advisor(&c, d.clone()).unwrap());
        assert_eq!(config.index_of(&d), Some(1));
        assert!(config.remove_advice(b.advice()).unwrap());
        assert_eq!(config.advisor_count(), 1);
    }

    #[test]
    fn test_frozen_rejects_changes() {
        let config = AdvisedSupport::new();
        config.add_advice(passthrough()).unwrap();
        config.set_frozen(true);

        assert!(matches!(config.add_advice(passthrough()), Err(AopConfigError::Frozen)));
        assert!(matches!(config.remove_advisor_at(0), Err(AopConfigError::Frozen)));
        assert_eq!(config.advisor_count(), 1);
    }

    #[test]
    fn test_introduction_adds_and_removes_interfaces() {
        let config = AdvisedSupport::new();
        let advice = Advice::introduction(Lockable);
        config.add_advice(advice.clone()).unwrap();
        assert!(config.is_interface_proxied("app.Lockable"));

        config.remove_advice(&advice).unwrap();
        assert!(!config.is_interface_proxied("app.Lockable"));
    }

    #[test]
    fn test_interfaces_must_be_interfaces() {
        let config = AdvisedSupport::new();
        let err = config.add_interface(ClassInfo::class("app.Impl").build()).err().unwrap();
        assert!(matches!(err, AopConfigError::IntroductionNotInterface(_)));
        assert!(config.has_no_user_supplied_interfaces());

        config.add_interface(crate::interfaces::chimera_proxy()).unwrap();
        assert!(config.has_no_user_supplied_interfaces());
        config.add_interface(ClassInfo::interface("app.Api").build()).unwrap();
        assert!(!config.has_no_user_supplied_interfaces());
        assert!(config.remove_interface("app.Api"));
    }

    struct Timing;

    struct TimingAdapter;

    impl crate::adapter::AdvisorAdapter for TimingAdapter {
        fn supports_advice(&self, advice: &Advice) -> bool {
            advice.downcast_custom::<Timing>().is_some()
        }

        fn interceptor(&self, _advisor: &Advisor) -> Option<Arc<dyn MethodInterceptor>> {
            Some(Arc::new(crate::advice::FnInterceptor::new(|inv| inv.proceed())))
        }
    }

    #[test]
    fn test_advice_support_follows_chain_factory_registry() {
        let default_config = AdvisedSupport::new();
        let err = default_config.add_advice(Advice::custom(Timing)).unwrap_err();
        assert!(matches!(err, AopConfigError::UnknownAdviceType(_)));

        let registry = Arc::new(crate::adapter::AdvisorAdapterRegistry::new());
        registry.register_adapter(Arc::new(TimingAdapter));
        let config = AdvisedSupport::new();
        config.set_advisor_chain_factory(Arc::new(DefaultAdvisorChainFactory::with_registry(registry)));
        config.add_advice(Advice::custom(Timing)).unwrap();
        assert_eq!(config.advisors().len(), 1);
    }

    #[test]
    fn test_chain_cache_is_cleared_on_change() {
        let class = ClassInfo::class("app.Service").method(Method::new("run")).build();
        let method = class.find_method("run", Some(0)).unwrap();
        let config = AdvisedSupport::new();
        let factory = Arc::new(CountingFactory(AtomicUsize::new(0)));
        config.set_advisor_chain_factory(factory.clone());
        config.add_advice(passthrough()).unwrap();

        config.interceptors_and_dynamic_advice(&method, Some(&class)).unwrap();
        config.interceptors_and_dynamic_advice(&method, Some(&class)).unwrap();
        assert_eq!(factory.0.load(Ordering::SeqCst), 1);

        config.add_advice(passthrough()).unwrap();
        let chain = config.interceptors_and_dynamic_advice(&method, Some(&class)).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(factory.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_configuration_and_config_string() {
        let config = AdvisedSupport::new();
        assert!(config.is_empty_configuration());
        config.set_target_class(ClassInfo::class("app.Service").build());
        assert!(!config.is_empty_configuration());
        config.set_expose_proxy(true);
        let description = config.to_proxy_config_string();
        assert!(description.contains("expose_proxy=true"));
        assert!(description.contains("app.Service"));
    }
}
