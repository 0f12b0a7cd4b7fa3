//! 事务配置绑定
//!
//! ```toml
//! [chimera.tx]
//! transaction-manager = "orders"
//!
//! [chimera.tx.attributes]
//! "get*" = "PROPAGATION_SUPPORTS,readOnly"
//! "place*" = "PROPAGATION_REQUIRED,-app.OrderException"
//! ```

use crate::error::TransactionResult;
use crate::source::NameMatchTransactionAttributeSource;
use chimera_core::{CoreResult, Environment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRANSACTION_CONFIG_PREFIX: &str = "chimera.tx";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransactionSettings {
    /// 默认事务管理器名称
    pub transaction_manager: Option<String>,

    /// 方法名模式到属性描述
    pub attributes: BTreeMap<String, String>,
}

impl TransactionSettings {
    pub fn from_environment(env: &Environment) -> CoreResult<Self> {
        let settings: TransactionSettings = env.bind(TRANSACTION_CONFIG_PREFIX)?;
        tracing::debug!(
            "Loaded transaction settings: manager={:?}, {} attribute pattern(s)",
            settings.transaction_manager,
            settings.attributes.len()
        );
        Ok(settings)
    }

    pub fn attribute_source(&self) -> TransactionResult<NameMatchTransactionAttributeSource> {
        NameMatchTransactionAttributeSource::from_properties(&self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Propagation;
    use crate::error::TransactionError;
    use crate::source::TransactionAttributeSource;
    use chimera_core::{ClassInfo, Method, TomlPropertySource};

    #[test]
    fn test_bind_attributes_from_toml() {
        let toml = TomlPropertySource::parse(
            r#"
            [chimera.tx]
            transaction-manager = "orders"

            [chimera.tx.attributes]
            "get*" = "PROPAGATION_SUPPORTS,readOnly"
            "place" = "PROPAGATION_REQUIRES_NEW,timeout_5"
            "#,
            "application.toml",
        )
        .unwrap();
        let env = Environment::new().with_source(toml);

        let settings = TransactionSettings::from_environment(&env).unwrap();
        assert_eq!(settings.transaction_manager.as_deref(), Some("orders"));

        let source = settings.attribute_source().unwrap();
        assert_eq!(source.len(), 2);
        let class = ClassInfo::class("app.Orders")
            .method(Method::new("getTotal"))
            .method(Method::new("place"))
            .build();
        let get = class.find_method("getTotal", Some(0)).unwrap();
        let attribute = source.transaction_attribute(&get, Some(&class)).unwrap();
        assert_eq!(attribute.get_propagation(), Propagation::Supports);
        assert!(attribute.is_read_only());

        let place = class.find_method("place", Some(0)).unwrap();
        let attribute = source.transaction_attribute(&place, Some(&class)).unwrap();
        assert_eq!(attribute.get_timeout(), 5);
    }

    #[test]
    fn test_invalid_attribute_text_is_rejected() {
        let settings = TransactionSettings {
            transaction_manager: None,
            attributes: BTreeMap::from([("save*".to_string(), "PROPAGATION_SOMETIMES".to_string())]),
        };
        let err = settings.attribute_source().unwrap_err();
        assert!(matches!(err, TransactionError::InvalidAttribute { .. }));
    }
}
