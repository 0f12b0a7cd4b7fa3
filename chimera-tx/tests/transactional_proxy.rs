//! 通过代理执行事务方法

use chimera_aop::prelude::*;
use chimera_aop_macros::proxyable;
use chimera_core::lang;
use chimera_tx::error::TRANSACTION_SYSTEM_EXCEPTION;
use chimera_tx::prelude::*;
use chimera_tx::{
    CallbackPreferringPlatformTransactionManager, MapTransactionManagerRegistry, TransactionAspectSupport,
    TransactionCallback, TransactionDefinition, TransactionHandle, TransactionManagerRegistry,
    TransactionStats,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct OrderService {
    failure: Throwable,
    placed: AtomicUsize,
}

impl OrderService {
    fn failing_with(failure: Throwable) -> Self {
        Self {
            failure,
            placed: AtomicUsize::new(0),
        }
    }
}

#[proxyable(name = "it.OrderService")]
impl OrderService {
    pub fn place(&self) -> Result<String, Throwable> {
        self.placed.fetch_add(1, Ordering::SeqCst);
        let status = current_transaction_status()?;
        Ok(status.name().unwrap_or_default().to_string())
    }

    pub fn fail(&self) -> Result<i32, Throwable> {
        Err(self.failure.clone())
    }

    pub fn cancel(&self) -> Result<i32, Throwable> {
        current_transaction_status()?.set_rollback_only();
        Err(self.failure.clone())
    }
}

fn stock_exception(message: &str) -> Throwable {
    let class = ClassInfo::exception("it.InsufficientStockException", &lang::exception());
    Throwable::new(class, message)
}

#[derive(Default)]
struct RecordingManager {
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_commit: bool,
    fail_rollback: bool,
    callback: bool,
}

impl RecordingManager {
    fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl PlatformTransactionManager for RecordingManager {
    fn get_transaction(&self, definition: &TransactionDefinition) -> TransactionResult<Arc<TransactionStatus>> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TransactionStatus::new(
            definition,
            Some(TransactionHandle::begin()),
            true,
        )))
    }

    fn commit(&self, _status: &TransactionStatus) -> TransactionResult<()> {
        if self.fail_commit {
            return Err(TransactionError::System("commit failed".to_string()));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, _status: &TransactionStatus) -> TransactionResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            return Err(TransactionError::System("rollback failed".to_string()));
        }
        Ok(())
    }

    fn as_callback_preferring(&self) -> Option<&dyn CallbackPreferringPlatformTransactionManager> {
        if self.callback {
            Some(self)
        } else {
            None
        }
    }
}

impl CallbackPreferringPlatformTransactionManager for RecordingManager {
    fn execute(
        &self,
        attribute: &TransactionAttribute,
        callback: &mut TransactionCallback<'_>,
    ) -> Result<Value, Throwable> {
        let status = self.get_transaction(attribute.definition())?;
        match callback(&status) {
            Ok(value) => {
                self.commit(&status)?;
                Ok(value)
            }
            Err(ex) => {
                self.rollback(&status)?;
                Err(ex)
            }
        }
    }
}

fn transactional_proxy(
    service: OrderService,
    manager: Arc<RecordingManager>,
    attributes: NameMatchTransactionAttributeSource,
) -> ObjectRef {
    let factory = ProxyFactory::new(ObjectRef::new(service));
    factory
        .add_advice(Advice::interceptor(TransactionInterceptor::new(manager, attributes)))
        .unwrap();
    factory.get_proxy().unwrap()
}

fn proxy_with_support(service: OrderService, support: TransactionAspectSupport) -> ObjectRef {
    let factory = ProxyFactory::new(ObjectRef::new(service));
    factory
        .add_advice(Advice::interceptor(TransactionInterceptor::with_support(support)))
        .unwrap();
    factory.get_proxy().unwrap()
}

/// 按类型查找时计数
struct CountingRegistry {
    manager: Arc<RecordingManager>,
    lookups: AtomicUsize,
}

impl TransactionManagerRegistry for CountingRegistry {
    fn manager(&self, name: &str) -> TransactionResult<Arc<dyn PlatformTransactionManager>> {
        Err(TransactionError::NoTransactionManager(name.to_string()))
    }

    fn unique_manager(&self) -> TransactionResult<Arc<dyn PlatformTransactionManager>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.manager.clone())
    }
}

#[test]
fn test_runtime_failure_rolls_back_and_reaches_caller() {
    init_logging();
    let failure = Throwable::runtime("payment declined");
    let manager = Arc::new(RecordingManager::default());
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager.clone(),
        NameMatchTransactionAttributeSource::new()
            .with("fail", TransactionAttribute::new().rollback_for(lang::RUNTIME_EXCEPTION)),
    );

    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.same_instance(&failure));
    assert_eq!(manager.rollbacks(), 1);
    assert_eq!(manager.commits(), 0);
}

#[test]
fn test_successful_call_commits_with_status_in_scope() {
    let manager = Arc::new(RecordingManager::default());
    let proxy = transactional_proxy(
        OrderService::failing_with(Throwable::runtime("unused")),
        manager.clone(),
        NameMatchTransactionAttributeSource::new().with("place", TransactionAttribute::new()),
    );

    assert_eq!(proxy.call("place", &[]).unwrap(), Value::from("it.OrderService.place"));
    assert_eq!(manager.commits(), 1);
    assert!(current_transaction_status().is_err());
}

#[test]
fn test_checked_failure_commits_by_default() {
    let failure = stock_exception("out of stock");
    let manager = Arc::new(RecordingManager::default());
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager.clone(),
        NameMatchTransactionAttributeSource::new().with("fail", TransactionAttribute::new()),
    );

    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.same_instance(&failure));
    assert_eq!(manager.commits(), 1);
    assert_eq!(manager.rollbacks(), 0);
}

#[test]
fn test_no_rollback_rule_commits_runtime_failure() {
    let failure = Throwable::illegal_state("already shipped");
    let manager = Arc::new(RecordingManager::default());
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager.clone(),
        NameMatchTransactionAttributeSource::new()
            .with("fail", "PROPAGATION_REQUIRED,+IllegalStateException".parse().unwrap()),
    );

    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.same_instance(&failure));
    assert_eq!(manager.commits(), 1);
    assert_eq!(manager.rollbacks(), 0);
}

#[test]
fn test_rollback_failure_carries_application_exception() {
    init_logging();
    let failure = Throwable::runtime("payment declined");
    let manager = Arc::new(RecordingManager {
        fail_rollback: true,
        ..RecordingManager::default()
    });
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager.clone(),
        NameMatchTransactionAttributeSource::new().with("fail", TransactionAttribute::new()),
    );

    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.is_instance_of(TRANSACTION_SYSTEM_EXCEPTION));
    assert!(err.application_exception().unwrap().same_instance(&failure));
    assert_eq!(manager.rollbacks(), 1);
}

#[test]
fn test_non_transactional_method_is_not_wrapped() {
    let manager = Arc::new(RecordingManager::default());
    let proxy = transactional_proxy(
        OrderService::failing_with(Throwable::runtime("unused")),
        manager.clone(),
        NameMatchTransactionAttributeSource::new().with("fail", TransactionAttribute::new()),
    );

    let err = proxy.call("place", &[]).unwrap_err();
    assert!(err.is_instance_of("chimera.tx.NoTransactionException"));
    assert_eq!(manager.begun.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_manager_rolls_back_checked_failure_by_rule() {
    let failure = stock_exception("out of stock");
    let manager = Arc::new(RecordingManager {
        callback: true,
        ..RecordingManager::default()
    });
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager.clone(),
        NameMatchTransactionAttributeSource::new()
            .with("fail", TransactionAttribute::new().rollback_for("InsufficientStockException")),
    );

    // 包装只用于穿过回调，调用方拿到的仍是原异常
    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.same_instance(&failure));
    assert_eq!(manager.rollbacks(), 1);
    assert_eq!(manager.commits(), 0);
}

#[test]
fn test_callback_manager_commits_then_rethrows() {
    let failure = stock_exception("out of stock");
    let manager = Arc::new(RecordingManager {
        callback: true,
        ..RecordingManager::default()
    });
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager.clone(),
        NameMatchTransactionAttributeSource::new().with("fail", TransactionAttribute::new()),
    );

    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.same_instance(&failure));
    assert_eq!(manager.commits(), 1);
    assert_eq!(manager.rollbacks(), 0);
}

#[test]
fn test_callback_commit_failure_overrides_application_exception() {
    init_logging();
    let failure = stock_exception("out of stock");
    let manager = Arc::new(RecordingManager {
        callback: true,
        fail_commit: true,
        ..RecordingManager::default()
    });
    let proxy = transactional_proxy(
        OrderService::failing_with(failure.clone()),
        manager,
        NameMatchTransactionAttributeSource::new().with("fail", TransactionAttribute::new()),
    );

    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.is_instance_of(TRANSACTION_SYSTEM_EXCEPTION));
    assert!(err.application_exception().unwrap().same_instance(&failure));
}

#[test]
fn test_qualifier_selects_registered_manager() {
    let orders = Arc::new(RecordingManager::default());
    let audit = Arc::new(RecordingManager::default());
    let registry = MapTransactionManagerRegistry::new()
        .with("orders", orders.clone())
        .with("audit", audit.clone());
    let support = TransactionAspectSupport::new()
        .with_registry(Arc::new(registry))
        .with_transaction_attributes(
            NameMatchTransactionAttributeSource::new()
                .with("place", TransactionAttribute::new().qualifier("audit"))
                .with("fail", TransactionAttribute::new()),
        );
    support.validate().unwrap();

    let factory = ProxyFactory::new(ObjectRef::new(OrderService::failing_with(Throwable::runtime("x"))));
    factory
        .add_advice(Advice::interceptor(TransactionInterceptor::with_support(support)))
        .unwrap();
    let proxy = factory.get_proxy().unwrap();

    proxy.call("place", &[]).unwrap();
    assert_eq!(audit.commits(), 1);
    assert_eq!(orders.commits(), 0);

    // 两个候选且没有限定名
    let err = proxy.call("fail", &[]).unwrap_err();
    assert!(err.is_instance_of("chimera.beans.NoUniqueBeanDefinitionException"));
}

#[test]
fn test_rollback_only_is_honored_when_committing_despite_failure() {
    let failure = stock_exception("cancelled by customer");
    let manager = Arc::new(ResourcelessTransactionManager::new());
    let factory = ProxyFactory::new(ObjectRef::new(OrderService::failing_with(failure.clone())));
    factory
        .add_advice(Advice::interceptor(TransactionInterceptor::new(
            manager.clone(),
            NameMatchTransactionAttributeSource::new().with("cancel", TransactionAttribute::new()),
        )))
        .unwrap();
    let proxy = factory.get_proxy().unwrap();

    // 受检异常不触发回滚规则，但方法已标记只回滚
    let err = proxy.call("cancel", &[]).unwrap_err();
    assert!(err.same_instance(&failure));
    assert_eq!(
        manager.stats(),
        TransactionStats {
            begun: 1,
            committed: 0,
            rolled_back: 1,
            savepoint_rollbacks: 0,
        }
    );
    assert!(!manager.has_active_transaction());
}

#[test]
fn test_configured_manager_name_wins_over_static_manager() {
    let named = Arc::new(RecordingManager::default());
    let fallback = Arc::new(RecordingManager::default());
    let registry = MapTransactionManagerRegistry::new()
        .with("orders", named.clone())
        .with("audit", Arc::new(RecordingManager::default()));
    let support = TransactionAspectSupport::new()
        .with_registry(Arc::new(registry))
        .with_transaction_manager(fallback.clone())
        .with_transaction_manager_name("orders")
        .with_transaction_attributes(
            NameMatchTransactionAttributeSource::new().with("place", TransactionAttribute::new()),
        );
    let proxy = proxy_with_support(OrderService::failing_with(Throwable::runtime("x")), support);

    proxy.call("place", &[]).unwrap();
    assert_eq!(named.begun.load(Ordering::SeqCst), 1);
    assert_eq!(named.commits(), 1);
    assert_eq!(fallback.begun.load(Ordering::SeqCst), 0);
}

#[test]
fn test_static_manager_wins_over_lookup_by_type() {
    let fallback = Arc::new(RecordingManager::default());
    let registry = Arc::new(CountingRegistry {
        manager: Arc::new(RecordingManager::default()),
        lookups: AtomicUsize::new(0),
    });
    let support = TransactionAspectSupport::new()
        .with_registry(registry.clone())
        .with_transaction_manager(fallback.clone())
        .with_transaction_attributes(
            NameMatchTransactionAttributeSource::new().with("place", TransactionAttribute::new()),
        );
    let proxy = proxy_with_support(OrderService::failing_with(Throwable::runtime("x")), support);

    proxy.call("place", &[]).unwrap();
    assert_eq!(fallback.commits(), 1);
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
}

#[test]
fn test_lookup_by_type_is_cached() {
    let registry = Arc::new(CountingRegistry {
        manager: Arc::new(RecordingManager::default()),
        lookups: AtomicUsize::new(0),
    });
    let support = TransactionAspectSupport::new()
        .with_registry(registry.clone())
        .with_transaction_attributes(
            NameMatchTransactionAttributeSource::new().with("place", TransactionAttribute::new()),
        );
    let proxy = proxy_with_support(OrderService::failing_with(Throwable::runtime("x")), support);

    proxy.call("place", &[]).unwrap();
    proxy.call("place", &[]).unwrap();
    assert_eq!(registry.manager.commits(), 2);
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
}
