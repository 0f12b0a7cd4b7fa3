//! 通知（Advice）定义
//!
//! 通知的种类是封闭的 `AdviceKind`，执行前统一由适配器注册表转换为 `MethodInterceptor`：
//! - `Interceptor` - 环绕通知，直接参与调用链
//! - `Before` - 前置通知
//! - `AfterReturning` - 返回后通知
//! - `Throws` - 异常通知
//! - `Introduction` - 引入（为代理增加接口）
//! - `Custom` - 由自定义 `AdvisorAdapter` 识别的其他种类

use crate::invocation::MethodInvocation;
use chimera_core::{ClassInfo, Method, ObjectRef, Throwable, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 环绕通知
///
/// 调用 `invocation.proceed()` 进入链中的下一个拦截器（或最终的目标方法）；
/// 不调用则短路。
pub trait MethodInterceptor: Send + Sync + 'static {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable>;
}

/// 前置通知，返回错误会阻止目标方法执行
pub trait MethodBeforeAdvice: Send + Sync + 'static {
    fn before(
        &self,
        method: &Method,
        args: &[Value],
        target: Option<&ObjectRef>,
    ) -> Result<(), Throwable>;
}

/// 返回后通知，只在正常返回时调用
pub trait AfterReturningAdvice: Send + Sync + 'static {
    fn after_returning(
        &self,
        return_value: &Value,
        method: &Method,
        args: &[Value],
        target: Option<&ObjectRef>,
    ) -> Result<(), Throwable>;
}

/// 异常通知
///
/// 通知本身返回错误时，该错误代替原异常向外传播。
pub trait ThrowsAdvice: Send + Sync + 'static {
    /// 是否处理该异常（默认处理所有异常）
    fn handles(&self, _exception: &Throwable) -> bool {
        true
    }

    fn after_throwing(
        &self,
        method: &Method,
        args: &[Value],
        target: Option<&ObjectRef>,
        exception: &Throwable,
    ) -> Result<(), Throwable>;
}

/// 引入信息：为代理额外增加的接口
pub trait IntroductionInfo: Send + Sync + 'static {
    fn interfaces(&self) -> Vec<Arc<ClassInfo>>;

    fn implements_interface(&self, name: &str) -> bool {
        self.interfaces()
            .iter()
            .any(|ifc| ifc.name() == name || ifc.is_assignable_to(name))
    }
}

/// 通知的种类
#[derive(Clone)]
pub enum AdviceKind {
    Interceptor(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    Throws(Arc<dyn ThrowsAdvice>),
    Introduction {
        interceptor: Arc<dyn MethodInterceptor>,
        info: Arc<dyn IntroductionInfo>,
    },
    Custom(Arc<dyn Any + Send + Sync>),
}

/// 通知
///
/// 克隆共享同一个实例。`type_name` 记录构造时的具体类型，用于配置的逻辑相等比较。
#[derive(Clone)]
pub struct Advice {
    kind: AdviceKind,
    type_id: TypeId,
    type_name: &'static str,
}

/// 通知实例的身份（共享指针地址）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdviceId(usize);

impl Advice {
    fn of<T: 'static>(kind: AdviceKind) -> Self {
        Self {
            kind,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn interceptor<T: MethodInterceptor>(interceptor: T) -> Self {
        Self::shared_interceptor(Arc::new(interceptor))
    }

    /// 使用已共享的拦截器实例
    pub fn shared_interceptor<T: MethodInterceptor>(interceptor: Arc<T>) -> Self {
        Self::of::<T>(AdviceKind::Interceptor(interceptor))
    }

    /// 用闭包定义环绕通知
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&mut MethodInvocation<'_>) -> Result<Value, Throwable> + Send + Sync + 'static,
    {
        Self::interceptor(FnInterceptor::new(f))
    }

    pub fn before<T: MethodBeforeAdvice>(advice: T) -> Self {
        Self::of::<T>(AdviceKind::Before(Arc::new(advice)))
    }

    pub fn after_returning<T: AfterReturningAdvice>(advice: T) -> Self {
        Self::of::<T>(AdviceKind::AfterReturning(Arc::new(advice)))
    }

    pub fn throws<T: ThrowsAdvice>(advice: T) -> Self {
        Self::of::<T>(AdviceKind::Throws(Arc::new(advice)))
    }

    pub fn introduction<T>(interceptor: T) -> Self
    where
        T: MethodInterceptor + IntroductionInfo,
    {
        let shared = Arc::new(interceptor);
        Self::of::<T>(AdviceKind::Introduction {
            interceptor: shared.clone(),
            info: shared,
        })
    }

    /// 自定义种类，需要注册能识别它的 `AdvisorAdapter`
    pub fn custom<T: Any + Send + Sync>(advice: T) -> Self {
        Self::of::<T>(AdviceKind::Custom(Arc::new(advice)))
    }

    pub fn kind(&self) -> &AdviceKind {
        &self.kind
    }

    /// 具体通知类型
    pub fn advice_type(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self.kind, AdviceKind::Introduction { .. })
    }

    pub fn introduction_info(&self) -> Option<&Arc<dyn IntroductionInfo>> {
        match &self.kind {
            AdviceKind::Introduction { info, .. } => Some(info),
            _ => None,
        }
    }

    /// 自定义通知的具体值
    pub fn downcast_custom<T: Any>(&self) -> Option<&T> {
        match &self.kind {
            AdviceKind::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn id(&self) -> AdviceId {
        let addr = match &self.kind {
            AdviceKind::Interceptor(i) => Arc::as_ptr(i) as *const () as usize,
            AdviceKind::Before(a) => Arc::as_ptr(a) as *const () as usize,
            AdviceKind::AfterReturning(a) => Arc::as_ptr(a) as *const () as usize,
            AdviceKind::Throws(a) => Arc::as_ptr(a) as *const () as usize,
            AdviceKind::Introduction { interceptor, .. } => {
                Arc::as_ptr(interceptor) as *const () as usize
            }
            AdviceKind::Custom(c) => Arc::as_ptr(c) as *const () as usize,
        };
        AdviceId(addr)
    }

    /// 是否为同一个通知实例
    pub fn same_instance(&self, other: &Advice) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AdviceKind::Interceptor(_) => "Interceptor",
            AdviceKind::Before(_) => "Before",
            AdviceKind::AfterReturning(_) => "AfterReturning",
            AdviceKind::Throws(_) => "Throws",
            AdviceKind::Introduction { .. } => "Introduction",
            AdviceKind::Custom(_) => "Custom",
        };
        write!(f, "{}({})", kind, self.type_name)
    }
}

/// 闭包形式的环绕通知
pub struct FnInterceptor<F>(F);

impl<F> FnInterceptor<F>
where
    F: Fn(&mut MethodInvocation<'_>) -> Result<Value, Throwable> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(&mut MethodInvocation<'_>) -> Result<Value, Throwable> + Send + Sync + 'static,
{
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, Throwable> {
        (self.0)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Audit;

    impl MethodBeforeAdvice for Audit {
        fn before(&self, _: &Method, _: &[Value], _: Option<&ObjectRef>) -> Result<(), Throwable> {
            Ok(())
        }
    }

    #[test]
    fn test_clone_shares_instance() {
        let advice = Advice::before(Audit);
        let copy = advice.clone();
        assert!(advice.same_instance(&copy));
        assert!(!advice.same_instance(&Advice::before(Audit)));
        assert_eq!(advice.advice_type(), Advice::before(Audit).advice_type());
    }

    #[test]
    fn test_custom_downcast() {
        let advice = Advice::custom(42u8);
        assert_eq!(advice.downcast_custom::<u8>(), Some(&42));
        assert!(advice.downcast_custom::<u16>().is_none());
        assert!(!advice.is_introduction());
        assert!(format!("{:?}", advice).starts_with("Custom("));
    }
}
