//! 运行时值与可调用对象
//!
//! - `Invocable` - 可以按 `Method` 元数据被调用的对象（普通目标对象和代理都实现它）
//! - `ObjectRef` - 指向 `Invocable` 的共享引用，按指针比较身份
//! - `Value` - 参数与返回值
//! - `FromValue` / `IntoValue` - Rust 类型与 `Value` 之间的转换（`#[proxyable]` 生成的代码使用）

use crate::class::{ClassInfo, Method, PrimitiveKind, ReturnType};
use crate::throwable::Throwable;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 可被动态调用的对象
pub trait Invocable: Send + Sync + 'static {
    /// 对象的运行时类
    fn class(&self) -> Arc<ClassInfo>;

    /// 调用方法
    ///
    /// `this` 是指向当前对象的引用，方法需要返回自身时使用它。
    fn invoke(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable>;

    fn as_any(&self) -> &dyn Any;
}

/// 对象引用
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Invocable>);

impl ObjectRef {
    pub fn new<T: Invocable>(object: T) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn Invocable>) -> Self {
        Self(object)
    }

    pub fn class(&self) -> Arc<ClassInfo> {
        self.0.class()
    }

    pub fn invoke(&self, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
        self.0.invoke(self, method, args)
    }

    /// 按方法名（和参数个数）在运行时类上查找方法后调用
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Throwable> {
        let class = self.class();
        let method = class.find_method(name, Some(args.len())).ok_or_else(|| {
            Throwable::illegal_argument(format!(
                "No method '{}' with {} argument(s) on {}",
                name,
                args.len(),
                class.name()
            ))
        })?;
        self.invoke(&method, args)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.addr() == other.addr()
    }

    /// 基于地址的身份哈希
    pub fn identity_hash(&self) -> u64 {
        self.addr() as u64
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.as_any().is::<T>()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.class().name(), self.addr())
    }
}

/// 参数或返回值
#[derive(Clone)]
pub enum Value {
    /// void 方法的返回值
    Void,
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Object(ObjectRef),
    /// 不可调用的任意数据
    Data(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn data<T: Any + Send + Sync>(value: T) -> Self {
        Value::Data(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            Value::Int(i) => Some(*i as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_data<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Data(data) => data.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// 值是否就是给定对象（身份比较）
    pub fn is_same_object(&self, object: &ObjectRef) -> bool {
        matches!(self, Value::Object(value) if value.ptr_eq(object))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "i32",
            Value::Long(_) => "i64",
            Value::Double(_) => "f64",
            Value::Str(_) => "String",
            Value::Object(_) => "object",
            Value::Data(_) => "data",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Data(a), Value::Data(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Long(l) => write!(f, "Long({})", l),
            Value::Double(d) => write!(f, "Double({})", d),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Object(o) => write!(f, "Object({:?})", o),
            Value::Data(_) => write!(f, "Data(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

/// 从 `Value` 取出参数
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, Throwable>;
}

/// 把返回值转换为 `Value`，并描述其返回类型
pub trait IntoValue {
    fn into_value(self) -> Value;

    fn return_type() -> ReturnType;
}

fn mismatch(expected: &str, value: &Value) -> Throwable {
    Throwable::illegal_argument(format!(
        "Argument type mismatch: expected {}, got {}",
        expected,
        value.type_name()
    ))
}

macro_rules! primitive_value {
    ($ty:ty, $variant:ident, $kind:ident) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, Throwable> {
                match value {
                    Value::$variant(v) => Ok(*v),
                    other => Err(mismatch(stringify!($ty), other)),
                }
            }
        }

        impl IntoValue for $ty {
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn return_type() -> ReturnType {
                ReturnType::Primitive(PrimitiveKind::$kind)
            }
        }
    };
}

primitive_value!(bool, Bool, Boolean);
primitive_value!(i32, Int, Int);
primitive_value!(i64, Long, Long);
primitive_value!(f64, Double, Double);

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, Throwable> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(mismatch("String", other)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }

    fn return_type() -> ReturnType {
        ReturnType::reference("String")
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: &Value) -> Result<Self, Throwable> {
        match value {
            Value::Object(o) => Ok(o.clone()),
            other => Err(mismatch("object", other)),
        }
    }
}

impl IntoValue for ObjectRef {
    fn into_value(self) -> Value {
        Value::Object(self)
    }

    fn return_type() -> ReturnType {
        ReturnType::reference(crate::lang::OBJECT)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, Throwable> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn return_type() -> ReturnType {
        ReturnType::reference(crate::lang::OBJECT)
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Void
    }

    fn return_type() -> ReturnType {
        ReturnType::Void
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, Throwable> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn return_type() -> ReturnType {
        match T::return_type() {
            // Option 包装的基本类型可以为空，按引用类型描述
            ReturnType::Primitive(kind) => ReturnType::reference(format!("Option<{}>", kind.name())),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang;

    struct Echo;

    impl Invocable for Echo {
        fn class(&self) -> Arc<ClassInfo> {
            ClassInfo::class("test.Echo")
                .method(Method::new("me").returns(ReturnType::reference("test.Echo")))
                .method(Method::new("twice").param("i32").returns(i32::return_type()))
                .build()
        }

        fn invoke(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value, Throwable> {
            match method.name() {
                "me" => Ok(Value::Object(this.clone())),
                "twice" => Ok((i32::from_value(&args[0])? * 2).into_value()),
                _ => Err(Throwable::runtime("unknown")),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_call_by_name() {
        let echo = ObjectRef::new(Echo);
        assert_eq!(echo.call("twice", &[Value::Int(21)]).unwrap(), Value::Int(42));
        let err = echo.call("missing", &[]).unwrap_err();
        assert!(err.is_instance_of(lang::ILLEGAL_ARGUMENT_EXCEPTION));
    }

    #[test]
    fn test_this_identity() {
        let echo = ObjectRef::new(Echo);
        let me = echo.call("me", &[]).unwrap();
        assert!(me.is_same_object(&echo));
        assert!(!me.is_same_object(&ObjectRef::new(Echo)));
        assert!(echo.is::<Echo>());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Option::<i32>::from_value(&Value::Null).unwrap(), None);
        assert!(i32::from_value(&Value::Str("x".into())).is_err());
        assert_eq!(Option::<String>::None.into_value(), Value::Null);
        assert!(!<Option<i32>>::return_type().is_primitive());
        assert!(i64::return_type().is_primitive());
        assert!(<()>::return_type().is_void());
    }
}
