//! 配置环境
//!
//! `Environment` 按优先级聚合多个 `PropertySource`，键使用点分形式
//! （如 `chimera.aop.expose-proxy`）。`bind` 把某个前缀下的配置反序列化为强类型结构，
//! AOP 的 `ProxyConfig` 和事务的 `TransactionSettings` 都通过它加载。

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// 配置值
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 转换为 TOML 值用于反序列化；字符串形式的布尔值和整数会被还原
    fn to_toml(&self) -> toml::Value {
        match self {
            ConfigValue::String(s) => {
                if let Ok(b) = s.parse::<bool>() {
                    toml::Value::Boolean(b)
                } else if let Ok(i) = s.parse::<i64>() {
                    toml::Value::Integer(i)
                } else {
                    toml::Value::String(s.clone())
                }
            }
            ConfigValue::Int(i) => toml::Value::Integer(*i),
            ConfigValue::Float(f) => toml::Value::Float(*f),
            ConfigValue::Bool(b) => toml::Value::Boolean(*b),
            ConfigValue::Array(items) => {
                toml::Value::Array(items.iter().map(ConfigValue::to_toml).collect())
            }
        }
    }
}

/// 配置源
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    fn keys(&self) -> Vec<String>;

    /// 数字越大优先级越高
    fn priority(&self) -> i32 {
        0
    }
}

/// 配置管理器
#[derive(Default)]
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field(
                "sources",
                &self.sources.read().iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加配置源，按优先级降序保存
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn with_source(self, source: impl PropertySource + 'static) -> Self {
        self.add_property_source(Box::new(source));
        self
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        None
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// 前缀下的所有键值（已去掉前缀），高优先级的源覆盖低优先级的源
    pub fn properties_under(&self, prefix: &str) -> BTreeMap<String, ConfigValue> {
        let dotted = format!("{}.", prefix);
        let mut result = BTreeMap::new();
        let sources = self.sources.read();
        // 从低优先级到高优先级依次覆盖
        for source in sources.iter().rev() {
            for key in source.keys() {
                if let Some(rest) = key.strip_prefix(&dotted) {
                    if let Some(value) = source.get(&key) {
                        result.insert(rest.to_string(), value);
                    }
                }
            }
        }
        result
    }

    /// 把前缀下的配置绑定到强类型结构
    ///
    /// 键中的 `.` 会展开为嵌套表，例如 `chimera.tx.attributes.get*` 在前缀
    /// `chimera.tx` 下成为 `attributes` 表里的 `get*` 项。
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> CoreResult<T> {
        let mut root = toml::Table::new();
        for (key, value) in self.properties_under(prefix) {
            insert_nested(&mut root, &key, value.to_toml());
        }
        toml::Value::Table(root)
            .try_into()
            .map_err(|e: toml::de::Error| CoreError::Bind {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })
    }
}

fn insert_nested(table: &mut toml::Table, key: &str, value: toml::Value) {
    match key.split_once('.') {
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if let toml::Value::Table(child) = entry {
                insert_nested(child, rest, value);
            }
        }
        None => {
            table.insert(key.to_string(), value);
        }
    }
}

/// 环境变量配置源
///
/// `CHIMERA_AOP_EXPOSE_PROXY` 对应键 `chimera.aop.expose-proxy` 或 `chimera.aop.expose.proxy`。
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    fn key_to_env(&self, key: &str) -> String {
        let body = key.replace(['.', '-'], "_").to_uppercase();
        // 键本身以 "chimera." 开头时不重复拼接前缀
        if body.starts_with(&self.prefix) {
            body
        } else {
            format!("{}{}", self.prefix, body)
        }
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| k.to_lowercase().replace('_', "."))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, path.display().to_string())
    }

    pub fn parse(content: &str, name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let table: toml::Table = toml::from_str(content).map_err(|source| CoreError::ConfigParse {
            name: name.clone(),
            source,
        })?;

        let mut properties = HashMap::new();
        for (key, value) in &table {
            flatten(value, key.clone(), &mut properties);
        }

        Ok(Self {
            name,
            properties,
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 展平嵌套表：`{ aop = { frozen = true } }` → `aop.frozen`
fn flatten(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                flatten(child, format!("{}.{}", prefix, key), result);
            }
        }
        other => {
            result.insert(prefix, toml_to_config(other));
        }
    }
}

fn toml_to_config(value: &toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s.clone()),
        toml::Value::Integer(i) => ConfigValue::Int(*i),
        toml::Value::Float(f) => ConfigValue::Float(*f),
        toml::Value::Boolean(b) => ConfigValue::Bool(*b),
        toml::Value::Array(items) => ConfigValue::Array(items.iter().map(toml_to_config).collect()),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        // 数组中的表没有点分键，按字符串保留
        toml::Value::Table(table) => ConfigValue::String(table.to_string()),
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（测试或运行时覆盖）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
