//! 事务属性来源
//!
//! 给定方法和目标类，返回事务属性；返回 None 表示该方法不在事务中执行。

use crate::attribute::TransactionAttribute;
use crate::error::TransactionResult;
use chimera_aop::pointcut::pattern_matches;
use chimera_core::{ClassInfo, Method};
use std::sync::Arc;

pub trait TransactionAttributeSource: Send + Sync + 'static {
    fn transaction_attribute(
        &self,
        method: &Method,
        target_class: Option<&Arc<ClassInfo>>,
    ) -> Option<Arc<TransactionAttribute>>;
}

/// 按方法名（支持 `*` 通配符）匹配属性
///
/// 精确名称优先；多个通配符匹配时取最长的模式。
#[derive(Debug, Default)]
pub struct NameMatchTransactionAttributeSource {
    entries: Vec<(String, Arc<TransactionAttribute>)>,
}

impl NameMatchTransactionAttributeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: impl Into<String>, attribute: TransactionAttribute) {
        let pattern = pattern.into();
        tracing::debug!("Adding transactional method [{}] with attribute [{}]", pattern, attribute);
        self.entries.retain(|(existing, _)| *existing != pattern);
        self.entries.push((pattern, Arc::new(attribute)));
    }

    pub fn with(mut self, pattern: impl Into<String>, attribute: TransactionAttribute) -> Self {
        self.add(pattern, attribute);
        self
    }

    /// 从 `模式 -> 文本形式属性` 的映射构建
    pub fn from_properties<I, K, V>(properties: I) -> TransactionResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut source = Self::new();
        for (pattern, value) in properties {
            source.add(pattern, value.as_ref().parse()?);
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransactionAttributeSource for NameMatchTransactionAttributeSource {
    fn transaction_attribute(
        &self,
        method: &Method,
        _target_class: Option<&Arc<ClassInfo>>,
    ) -> Option<Arc<TransactionAttribute>> {
        let name = method.name();
        if let Some((_, attribute)) = self.entries.iter().find(|(pattern, _)| pattern == name) {
            return Some(Arc::clone(attribute));
        }
        self.entries
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, name))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, attribute)| Arc::clone(attribute))
    }
}

/// 对所有方法返回同一个属性
pub struct MatchAlwaysTransactionAttributeSource {
    attribute: Arc<TransactionAttribute>,
}

impl MatchAlwaysTransactionAttributeSource {
    pub fn new(attribute: TransactionAttribute) -> Self {
        Self {
            attribute: Arc::new(attribute),
        }
    }
}

impl Default for MatchAlwaysTransactionAttributeSource {
    fn default() -> Self {
        Self::new(TransactionAttribute::new())
    }
}

impl TransactionAttributeSource for MatchAlwaysTransactionAttributeSource {
    fn transaction_attribute(
        &self,
        method: &Method,
        _target_class: Option<&Arc<ClassInfo>>,
    ) -> Option<Arc<TransactionAttribute>> {
        // Object 上的方法不参与事务
        if method.declaring_class() == chimera_core::lang::OBJECT {
            return None;
        }
        Some(Arc::clone(&self.attribute))
    }
}

/// 依次询问多个来源，返回第一个非空结果
pub struct CompositeTransactionAttributeSource {
    sources: Vec<Arc<dyn TransactionAttributeSource>>,
}

impl CompositeTransactionAttributeSource {
    pub fn new(sources: Vec<Arc<dyn TransactionAttributeSource>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn TransactionAttributeSource>] {
        &self.sources
    }
}

impl TransactionAttributeSource for CompositeTransactionAttributeSource {
    fn transaction_attribute(
        &self,
        method: &Method,
        target_class: Option<&Arc<ClassInfo>>,
    ) -> Option<Arc<TransactionAttribute>> {
        self.sources
            .iter()
            .find_map(|source| source.transaction_attribute(method, target_class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Propagation;
    use chimera_core::lang;

    fn method(name: &str) -> Method {
        Method::new(name)
    }

    #[test]
    fn test_exact_name_beats_wildcards() {
        let source = NameMatchTransactionAttributeSource::from_properties([
            ("*", "PROPAGATION_SUPPORTS"),
            ("get*", "PROPAGATION_REQUIRED,readOnly"),
            ("get_order", "PROPAGATION_REQUIRES_NEW"),
        ])
        .unwrap();

        let exact = source.transaction_attribute(&method("get_order"), None).unwrap();
        assert_eq!(exact.get_propagation(), Propagation::RequiresNew);
        let longest = source.transaction_attribute(&method("get_user"), None).unwrap();
        assert!(longest.is_read_only());
        let fallback = source.transaction_attribute(&method("save"), None).unwrap();
        assert_eq!(fallback.get_propagation(), Propagation::Supports);
    }

    #[test]
    fn test_unmatched_method_is_not_transactional() {
        let source = NameMatchTransactionAttributeSource::new()
            .with("save*", TransactionAttribute::new());
        assert!(source.transaction_attribute(&method("load"), None).is_none());
    }

    #[test]
    fn test_invalid_property_is_reported() {
        assert!(NameMatchTransactionAttributeSource::from_properties([("*", "PROPAGATION_BOGUS")]).is_err());
    }

    #[test]
    fn test_match_always_and_composite() {
        let names: Arc<dyn TransactionAttributeSource> = Arc::new(
            NameMatchTransactionAttributeSource::new()
                .with("save", TransactionAttribute::with_propagation(Propagation::Mandatory)),
        );
        let always: Arc<dyn TransactionAttributeSource> =
            Arc::new(MatchAlwaysTransactionAttributeSource::default());
        let composite = CompositeTransactionAttributeSource::new(vec![names, always]);

        let save = composite.transaction_attribute(&method("save"), None).unwrap();
        assert_eq!(save.get_propagation(), Propagation::Mandatory);
        let other = composite.transaction_attribute(&method("load"), None).unwrap();
        assert_eq!(other.get_propagation(), Propagation::Required);

        let to_string = lang::object_method(lang::TO_STRING).unwrap();
        assert!(MatchAlwaysTransactionAttributeSource::default()
            .transaction_attribute(&to_string, None)
            .is_none());
    }
}
