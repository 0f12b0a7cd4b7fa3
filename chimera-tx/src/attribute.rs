//! 事务属性与回滚规则
//!
//! 文本形式：`PROPAGATION_REQUIRED,ISOLATION_DEFAULT,timeout_10,readOnly,-CheckedException,+OtherException`
//! - `-X`：异常类名包含 `X` 时回滚
//! - `+X`：异常类名包含 `X` 时提交
//!
//! 多条规则匹配时，继承层次上离异常类最近的规则胜出；没有规则匹配时，非受检异常回滚、受检异常提交。

use crate::definition::{Isolation, Propagation, TransactionDefinition, TIMEOUT_DEFAULT};
use crate::error::TransactionError;
use chimera_core::{lang, Throwable};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 回滚规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRule {
    exception_name: String,
    rollback: bool,
}

impl RollbackRule {
    /// 匹配时回滚
    pub fn rollback_on(exception_name: impl Into<String>) -> Self {
        Self {
            exception_name: exception_name.into(),
            rollback: true,
        }
    }

    /// 匹配时提交
    pub fn no_rollback_on(exception_name: impl Into<String>) -> Self {
        Self {
            exception_name: exception_name.into(),
            rollback: false,
        }
    }

    pub fn exception_name(&self) -> &str {
        &self.exception_name
    }

    pub fn is_rollback(&self) -> bool {
        self.rollback
    }

    /// 异常类到匹配类的继承距离，未匹配返回 None
    pub fn depth(&self, exception: &Throwable) -> Option<usize> {
        let mut current = Some(Arc::clone(exception.class()));
        let mut depth = 0;
        while let Some(class) = current {
            if class.name().contains(&self.exception_name) {
                return Some(depth);
            }
            if class.name() == lang::THROWABLE {
                return None;
            }
            current = class.superclass().cloned();
            depth += 1;
        }
        None
    }
}

impl fmt::Display for RollbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.rollback { '-' } else { '+' };
        write!(f, "{}{}", sign, self.exception_name)
    }
}

/// 基于规则的事务属性
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionAttribute {
    definition: TransactionDefinition,
    qualifier: Option<String>,
    descriptor: Option<String>,
    rules: Vec<RollbackRule>,
}

impl TransactionAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_propagation(propagation: Propagation) -> Self {
        Self {
            definition: TransactionDefinition::with_propagation(propagation),
            ..Self::default()
        }
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.definition.propagation = propagation;
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.definition.isolation = isolation;
        self
    }

    pub fn timeout(mut self, seconds: i32) -> Self {
        self.definition.timeout = seconds;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.definition.read_only = true;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = Some(name.into());
        self
    }

    /// 选择事务管理器的限定名
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn rule(mut self, rule: RollbackRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rollback_for(self, exception_name: impl Into<String>) -> Self {
        self.rule(RollbackRule::rollback_on(exception_name))
    }

    pub fn no_rollback_for(self, exception_name: impl Into<String>) -> Self {
        self.rule(RollbackRule::no_rollback_on(exception_name))
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    pub fn get_propagation(&self) -> Propagation {
        self.definition.propagation
    }

    pub fn get_isolation(&self) -> Isolation {
        self.definition.isolation
    }

    pub fn get_timeout(&self) -> i32 {
        self.definition.timeout
    }

    pub fn is_read_only(&self) -> bool {
        self.definition.read_only
    }

    pub fn get_name(&self) -> Option<&str> {
        self.definition.name.as_deref()
    }

    pub fn get_qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref().filter(|q| !q.is_empty())
    }

    /// 属性来源的描述（通常是声明它的方法）
    pub fn descriptor(&self) -> Option<&str> {
        self.descriptor.as_deref()
    }

    pub fn set_descriptor(&mut self, descriptor: impl Into<String>) {
        self.descriptor = Some(descriptor.into());
    }

    pub fn rules(&self) -> &[RollbackRule] {
        &self.rules
    }

    /// 给定异常是否应当回滚
    pub fn rollback_on(&self, exception: &Throwable) -> bool {
        tracing::trace!(
            "Applying rules to determine whether transaction should rollback on {}",
            exception
        );
        let winner = self
            .rules
            .iter()
            .filter_map(|rule| rule.depth(exception).map(|depth| (depth, rule)))
            .min_by_key(|(depth, _)| *depth)
            .map(|(_, rule)| rule);

        match winner {
            Some(rule) => {
                tracing::trace!("Winning rollback rule is: {}", rule);
                rule.is_rollback()
            }
            None => {
                tracing::trace!("No relevant rollback rule found: applying default rules");
                exception.is_unchecked()
            }
        }
    }
}

fn invalid(value: &str, reason: impl Into<String>) -> TransactionError {
    TransactionError::InvalidAttribute {
        value: value.to_string(),
        reason: reason.into(),
    }
}

impl FromStr for TransactionAttribute {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut attribute = TransactionAttribute::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token.starts_with(Propagation::PREFIX) {
                attribute.definition.propagation = token.parse().map_err(|e: String| invalid(s, e))?;
            } else if token.starts_with(Isolation::PREFIX) {
                attribute.definition.isolation = token.parse().map_err(|e: String| invalid(s, e))?;
            } else if let Some(seconds) = token.strip_prefix("timeout_") {
                let timeout: i32 = seconds
                    .parse()
                    .map_err(|_| invalid(s, format!("timeout '{}' is not a number", seconds)))?;
                if timeout < TIMEOUT_DEFAULT {
                    return Err(TransactionError::InvalidTimeout(timeout));
                }
                attribute.definition.timeout = timeout;
            } else if token == "readOnly" {
                attribute.definition.read_only = true;
            } else if let Some(name) = token.strip_prefix('+') {
                attribute.rules.push(RollbackRule::no_rollback_on(name));
            } else if let Some(name) = token.strip_prefix('-') {
                attribute.rules.push(RollbackRule::rollback_on(name));
            } else {
                return Err(invalid(s, format!("unrecognized token '{}'", token)));
            }
        }
        Ok(attribute)
    }
}

impl fmt::Display for TransactionAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition)?;
        for rule in &self.rules {
            write!(f, ",{}", rule)?;
        }
        Ok(())
    }
}
