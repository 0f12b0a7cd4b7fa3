// chimera-core: 运行时对象模型与基础设施
//
// 为 AOP 代理和事务拦截提供：
// - 类与方法元数据（代替运行时反射）
// - 可动态调用的对象引用、参数与返回值
// - 异常体系（受检 / 非受检）
// - 配置环境与日志初始化

pub mod class;
pub mod config;
pub mod error;
pub mod lang;
pub mod logging;
pub mod throwable;
pub mod value;

// 重新导出常用类型
pub use class::{
    ClassInfo, ClassInfoBuilder, ClassKind, Method, MethodKey, Modifiers, PrimitiveKind,
    ReturnType, Visibility,
};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{CoreError, CoreResult};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use throwable::Throwable;
pub use value::{FromValue, IntoValue, Invocable, ObjectRef, Value};

// 导出 once_cell，供 #[proxyable] 生成的代码使用
pub use once_cell;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::class::{ClassInfo, Method, MethodKey, ReturnType, Visibility};
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::lang;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::throwable::Throwable;
    pub use crate::value::{FromValue, IntoValue, Invocable, ObjectRef, Value};
}
