//! 订单服务的声明式事务演示
//!
//! 运行：`cargo run -p tx-demo`，配置来自 `application.toml` 和 `CHIMERA_*` 环境变量。

use anyhow::Context;
use chimera_aop::prelude::*;
use chimera_aop::{aop_context, utils};
use chimera_aop_macros::proxyable;
use chimera_core::{lang, Environment, EnvironmentPropertySource, LoggingConfig, TomlPropertySource};
use chimera_tx::prelude::*;
use chimera_tx::{MapTransactionManagerRegistry, TransactionAspectSupport, TransactionSettings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const OUT_OF_STOCK_EXCEPTION: &str = "demo.OutOfStockException";

// ==================== 服务层 ====================

struct InventoryService {
    stock: Mutex<HashMap<String, i32>>,
}

impl InventoryService {
    fn with_stock(rows: &[(&str, i32)]) -> Self {
        Self {
            stock: Mutex::new(rows.iter().map(|(sku, n)| (sku.to_string(), *n)).collect()),
        }
    }
}

#[proxyable(name = "demo.InventoryService")]
impl InventoryService {
    pub fn stock_of(&self, sku: String) -> i32 {
        self.stock.lock().get(&sku).copied().unwrap_or(0)
    }

    pub fn reserve(&self, sku: String, quantity: i32) -> Result<i32, Throwable> {
        let status = current_transaction_status()?;
        tracing::info!("Reserving {} x {} in transaction {:?}", quantity, sku, status.name());

        let mut stock = self.stock.lock();
        match stock.get_mut(&sku) {
            Some(available) if *available >= quantity => {
                *available -= quantity;
                Ok(*available)
            }
            _ => {
                let class = ClassInfo::exception(OUT_OF_STOCK_EXCEPTION, &lang::exception());
                Err(Throwable::new(class, format!("not enough {} in stock", sku)))
            }
        }
    }

    /// 经由代理调用 `reserve`，自调用同样经过事务拦截
    pub fn place_order(&self, sku: String, quantity: i32) -> Result<i32, Throwable> {
        let proxy = aop_context::current_proxy()?;
        let remaining = proxy.call("reserve", &[Value::from(sku), Value::from(quantity)])?;
        Ok(remaining.as_i32().unwrap_or_default())
    }
}

// ==================== 装配 ====================

fn load_environment() -> anyhow::Result<Environment> {
    let env = Environment::new().with_source(EnvironmentPropertySource::new("CHIMERA_"));
    for path in ["demos/tx-demo/application.toml", "application.toml"] {
        if std::path::Path::new(path).exists() {
            let source = TomlPropertySource::from_file(path).with_context(|| format!("reading {}", path))?;
            env.add_property_source(Box::new(source));
            break;
        }
    }
    Ok(env)
}

fn inventory_proxy(env: &Environment, manager: Arc<ResourcelessTransactionManager>) -> anyhow::Result<ObjectRef> {
    let settings = TransactionSettings::from_environment(env)?;
    let registry = MapTransactionManagerRegistry::new().with("orders", manager);

    let mut support = TransactionAspectSupport::new()
        .with_registry(Arc::new(registry))
        .with_transaction_attributes(settings.attribute_source()?);
    if let Some(name) = &settings.transaction_manager {
        support = support.with_transaction_manager_name(name);
    }
    let interceptor = TransactionInterceptor::validated(support)?;

    let factory = ProxyFactory::new(ObjectRef::new(InventoryService::with_stock(&[("book", 3), ("pen", 10)])));
    factory.add_advice(Advice::around(|inv| {
        tracing::debug!("-> {}", inv.joinpoint_identification());
        inv.proceed()
    }))?;
    factory.add_advice(Advice::interceptor(interceptor))?;

    // place_order 依赖当前代理；配置可能冻结切面，放在最后
    let config = ProxyConfig {
        expose_proxy: true,
        ..ProxyConfig::from_environment(env)?
    };
    let factory = factory.with_config(config);
    Ok(factory.get_proxy()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = load_environment()?;
    LoggingConfig::from_environment(&env).init()?;

    let manager = Arc::new(ResourcelessTransactionManager::new());
    let inventory = inventory_proxy(&env, manager.clone())?;
    tracing::info!(
        "Inventory proxy ready (class proxy: {})",
        utils::is_cglib_proxy(&inventory)
    );

    let remaining = inventory.call("place_order", &[Value::from("book"), Value::from(2)])?;
    tracing::info!("Order placed, {} book(s) left", remaining.as_i32().unwrap_or_default());

    match inventory.call("place_order", &[Value::from("book"), Value::from(5)]) {
        Ok(_) => tracing::warn!("Expected the second order to fail"),
        Err(err) => tracing::info!("Order rejected: {}", err),
    }

    // 事务绑定在线程上，每个阻塞任务各自开启事务
    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let inventory = inventory.clone();
            tokio::task::spawn_blocking(move || {
                inventory.call("place_order", &[Value::from("pen"), Value::from(1)])
            })
        })
        .collect();
    for task in tasks {
        task.await??;
    }

    let pens = inventory.call("stock_of", &[Value::from("pen")])?;
    tracing::info!("{} pen(s) left", pens.as_i32().unwrap_or_default());
    tracing::info!("Transaction stats: {:?}", manager.stats());
    Ok(())
}
