//! AOP 错误类型
//!
//! - `AopConfigError` - 代理构建期的配置错误，同步、致命
//! - `AopError` - 调用期的框架错误，转换为 `Throwable` 后与应用异常走同一通道

use chimera_core::{lang, ClassInfo, Throwable};
use once_cell::sync::Lazy;
use std::sync::Arc;
use thiserror::Error;

pub const AOP_CONFIG_EXCEPTION: &str = "chimera.aop.AopConfigException";
pub const AOP_INVOCATION_EXCEPTION: &str = "chimera.aop.AopInvocationException";

static AOP_CONFIG_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(AOP_CONFIG_EXCEPTION, &lang::runtime_exception()));

static AOP_INVOCATION_EXCEPTION_CLASS: Lazy<Arc<ClassInfo>> =
    Lazy::new(|| ClassInfo::exception(AOP_INVOCATION_EXCEPTION, &lang::runtime_exception()));

pub fn aop_config_exception() -> Arc<ClassInfo> {
    Arc::clone(&AOP_CONFIG_EXCEPTION_CLASS)
}

pub fn aop_invocation_exception() -> Arc<ClassInfo> {
    Arc::clone(&AOP_INVOCATION_EXCEPTION_CLASS)
}

/// 代理配置错误
#[derive(Debug, Error)]
pub enum AopConfigError {
    #[error("No advisors and no target source specified")]
    NoAdvisorsOrTarget,

    #[error("Target source cannot determine target class: either an interface or a target is required for proxy creation")]
    NoTargetClass,

    #[error("Could not generate class-based proxy of [{class}]: {source}")]
    CodeGeneration {
        class: String,
        #[source]
        source: GenerationError,
    },

    #[error("Cannot modify advisors or interfaces: configuration is frozen")]
    Frozen,

    #[error("Advice of type [{0}] is neither a supported subinterface of Advice nor handled by a registered adapter")]
    UnknownAdviceType(String),

    #[error("[{0}] is not an interface and cannot be introduced")]
    IntroductionNotInterface(String),

    #[error("Advisor index {index} is out of bounds: only {count} advisors defined")]
    AdvisorIndexOutOfRange { index: usize, count: usize },
}

/// 子类代理生成失败的原因
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("cannot subclass final class {0}")]
    FinalClass(String),

    #[error("could not obtain static target: {0}")]
    Target(#[source] Throwable),
}

pub type AopConfigResult<T> = Result<T, AopConfigError>;

impl From<AopConfigError> for Throwable {
    fn from(err: AopConfigError) -> Self {
        match &err {
            AopConfigError::CodeGeneration {
                source: GenerationError::Target(cause),
                ..
            } => Throwable::with_cause(aop_config_exception(), err.to_string(), cause.clone()),
            _ => Throwable::new(aop_config_exception(), err.to_string()),
        }
    }
}

/// 调用期错误
#[derive(Debug, Error)]
pub enum AopError {
    #[error("Cannot find current proxy: set 'expose-proxy' to true on the proxy configuration to make it available, and ensure that current_proxy() is invoked in the same thread as the proxied call")]
    NoCurrentProxy,

    #[error("Null return value from advice does not match primitive return type for: {method}")]
    NullPrimitiveReturn { method: String },

    #[error("Target source returned no target for method invocation: {method}")]
    NoTarget { method: String },
}

impl From<AopError> for Throwable {
    fn from(err: AopError) -> Self {
        let class = match &err {
            AopError::NoCurrentProxy | AopError::NoTarget { .. } => lang::illegal_state_exception(),
            AopError::NullPrimitiveReturn { .. } => aop_invocation_exception(),
        };
        Throwable::new(class, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_become_unchecked_throwables() {
        let config: Throwable = AopConfigError::NoTargetClass.into();
        assert!(config.is_instance_of(AOP_CONFIG_EXCEPTION));
        assert!(config.is_unchecked());

        let invocation: Throwable = AopError::NullPrimitiveReturn {
            method: "app.Counter.count()".into(),
        }
        .into();
        assert!(invocation.is_instance_of(AOP_INVOCATION_EXCEPTION));

        let no_proxy: Throwable = AopError::NoCurrentProxy.into();
        assert!(no_proxy.is_instance_of(lang::ILLEGAL_STATE_EXCEPTION));
    }

    #[test]
    fn test_code_generation_keeps_cause() {
        let err = AopConfigError::CodeGeneration {
            class: "app.Sealed".into(),
            source: GenerationError::FinalClass("app.Sealed".into()),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "cannot subclass final class app.Sealed");
    }
}
