//! 事务定义：传播行为、隔离级别、超时、只读

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 使用底层资源的默认超时
pub const TIMEOUT_DEFAULT: i32 = -1;

/// 传播行为
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Propagation {
    /// 加入当前事务，没有则新建
    #[default]
    Required,
    /// 有事务则加入，没有则以非事务方式执行
    Supports,
    /// 必须已有事务
    Mandatory,
    /// 挂起当前事务并新建
    RequiresNew,
    /// 挂起当前事务，以非事务方式执行
    NotSupported,
    /// 不允许存在事务
    Never,
    /// 在当前事务中建立保存点，没有则新建
    Nested,
}

impl Propagation {
    pub const PREFIX: &'static str = "PROPAGATION_";

    pub fn constant_name(&self) -> &'static str {
        match self {
            Propagation::Required => "PROPAGATION_REQUIRED",
            Propagation::Supports => "PROPAGATION_SUPPORTS",
            Propagation::Mandatory => "PROPAGATION_MANDATORY",
            Propagation::RequiresNew => "PROPAGATION_REQUIRES_NEW",
            Propagation::NotSupported => "PROPAGATION_NOT_SUPPORTED",
            Propagation::Never => "PROPAGATION_NEVER",
            Propagation::Nested => "PROPAGATION_NESTED",
        }
    }
}

impl FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        match name {
            "REQUIRED" => Ok(Propagation::Required),
            "SUPPORTS" => Ok(Propagation::Supports),
            "MANDATORY" => Ok(Propagation::Mandatory),
            "REQUIRES_NEW" => Ok(Propagation::RequiresNew),
            "NOT_SUPPORTED" => Ok(Propagation::NotSupported),
            "NEVER" => Ok(Propagation::Never),
            "NESTED" => Ok(Propagation::Nested),
            _ => Err(format!("unknown propagation behavior '{}'", s)),
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constant_name())
    }
}

/// 隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Isolation {
    /// 使用底层资源的默认级别
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    pub const PREFIX: &'static str = "ISOLATION_";

    pub fn constant_name(&self) -> &'static str {
        match self {
            Isolation::Default => "ISOLATION_DEFAULT",
            Isolation::ReadUncommitted => "ISOLATION_READ_UNCOMMITTED",
            Isolation::ReadCommitted => "ISOLATION_READ_COMMITTED",
            Isolation::RepeatableRead => "ISOLATION_REPEATABLE_READ",
            Isolation::Serializable => "ISOLATION_SERIALIZABLE",
        }
    }
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        match name {
            "DEFAULT" => Ok(Isolation::Default),
            "READ_UNCOMMITTED" => Ok(Isolation::ReadUncommitted),
            "READ_COMMITTED" => Ok(Isolation::ReadCommitted),
            "REPEATABLE_READ" => Ok(Isolation::RepeatableRead),
            "SERIALIZABLE" => Ok(Isolation::Serializable),
            _ => Err(format!("unknown isolation level '{}'", s)),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constant_name())
    }
}

/// 事务定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    pub isolation: Isolation,
    /// 秒，`TIMEOUT_DEFAULT` 表示不设置
    pub timeout: i32,
    pub read_only: bool,
    /// 监控和日志使用的名称
    pub name: Option<String>,
}

impl TransactionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_propagation(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation: Isolation::Default,
            timeout: TIMEOUT_DEFAULT,
            read_only: false,
            name: None,
        }
    }
}

impl fmt::Display for TransactionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.propagation, self.isolation)?;
        if self.timeout != TIMEOUT_DEFAULT {
            write!(f, ",timeout_{}", self.timeout)?;
        }
        if self.read_only {
            write!(f, ",readOnly")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_names_parse_with_or_without_prefix() {
        assert_eq!("PROPAGATION_REQUIRES_NEW".parse::<Propagation>().unwrap(), Propagation::RequiresNew);
        assert_eq!("NESTED".parse::<Propagation>().unwrap(), Propagation::Nested);
        assert_eq!("ISOLATION_SERIALIZABLE".parse::<Isolation>().unwrap(), Isolation::Serializable);
        assert!("PROPAGATION_SOMETIMES".parse::<Propagation>().is_err());
    }

    #[test]
    fn test_definition_display() {
        let mut def = TransactionDefinition::with_propagation(Propagation::Supports);
        assert_eq!(def.to_string(), "PROPAGATION_SUPPORTS,ISOLATION_DEFAULT");
        def.timeout = 10;
        def.read_only = true;
        assert_eq!(def.to_string(), "PROPAGATION_SUPPORTS,ISOLATION_DEFAULT,timeout_10,readOnly");
    }
}
