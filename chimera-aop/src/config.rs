//! 代理行为开关
//!
//! 可以直接构造，也可以从配置环境的 `chimera.aop.*` 绑定：
//! ```toml
//! [chimera.aop]
//! proxy-target-class = true
//! expose-proxy = true
//! frozen = false
//! ```

use chimera_core::{CoreResult, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROXY_CONFIG_PREFIX: &str = "chimera.aop";

/// 代理配置开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// 直接代理目标类（子类代理），而不是只代理接口
    pub proxy_target_class: bool,

    /// 允许激进优化（选择子类代理）
    pub optimize: bool,

    /// 把代理暴露到线程上下文，供 `AopContext::current_proxy()` 获取
    pub expose_proxy: bool,

    /// 配置冻结后不能再修改切面，允许缓存和快速路径
    pub frozen: bool,

    /// 代理不实现 `Advised` 接口
    pub opaque: bool,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置环境读取 `chimera.aop.*`
    pub fn from_environment(env: &Environment) -> CoreResult<Self> {
        let config: ProxyConfig = env.bind(PROXY_CONFIG_PREFIX)?;
        tracing::debug!("Loaded proxy config: {}", config);
        Ok(config)
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proxy_target_class={}; optimize={}; opaque={}; expose_proxy={}; frozen={}",
            self.proxy_target_class, self.optimize, self.opaque, self.expose_proxy, self.frozen
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{ConfigValue, MapPropertySource, TomlPropertySource};

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = ProxyConfig::from_environment(&Environment::new()).unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn test_bind_from_toml_with_override() {
        let toml = TomlPropertySource::parse(
            r#"
            [chimera.aop]
            proxy-target-class = true
            frozen = true
            "#,
            "application.toml",
        )
        .unwrap();
        let env = Environment::new().with_source(toml).with_source(
            MapPropertySource::new("overrides")
                .with_property("chimera.aop.expose-proxy", ConfigValue::String("true".into())),
        );

        let config = ProxyConfig::from_environment(&env).unwrap();
        assert!(config.proxy_target_class);
        assert!(config.frozen);
        assert!(config.expose_proxy);
        assert!(!config.opaque);
        assert!(config.to_string().contains("expose_proxy=true"));
    }
}
