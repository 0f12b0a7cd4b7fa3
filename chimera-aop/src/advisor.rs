//! 切面（Advisor）
//!
//! 切面把通知和"在哪里应用"组合在一起：
//! - `Pointcut` - 切点 + 通知
//! - `Introduction` - 只有类过滤器，为匹配的类无条件引入接口
//! - `Unconditional` - 不做任何过滤，直接适配

use crate::advice::Advice;
use crate::error::{AopConfigError, AopConfigResult};
use crate::pointcut::{ClassFilter, MethodMatcher, Pointcut};
use chimera_core::ClassInfo;
use std::fmt;
use std::sync::Arc;

/// 切面
#[derive(Clone)]
pub enum Advisor {
    Pointcut {
        pointcut: Pointcut,
        advice: Advice,
    },
    Introduction {
        class_filter: ClassFilter,
        advice: Advice,
        interfaces: Vec<Arc<ClassInfo>>,
    },
    Unconditional {
        advice: Advice,
    },
}

impl Advisor {
    pub fn new(pointcut: Pointcut, advice: Advice) -> Self {
        Advisor::Pointcut { pointcut, advice }
    }

    /// 应用于所有方法
    pub fn always(advice: Advice) -> Self {
        Self::new(Pointcut::TRUE, advice)
    }

    /// 按方法名匹配（支持 `*` 通配符）
    pub fn name_match<I, S>(names: I, advice: Advice) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Pointcut::for_methods(MethodMatcher::names(names)), advice)
    }

    /// 按正则表达式匹配 `声明类型.方法名`，任意一个模式匹配即可
    pub fn regexp(patterns: &[&str], advice: Advice) -> Result<Self, regex::Error> {
        let mut matcher: Option<MethodMatcher> = None;
        for pattern in patterns {
            let next = MethodMatcher::name_regex(pattern)?;
            matcher = Some(match matcher {
                Some(existing) => existing.or(next),
                None => next,
            });
        }
        let matcher = matcher.unwrap_or_else(|| MethodMatcher::True.not());
        Ok(Self::new(Pointcut::for_methods(matcher), advice))
    }

    /// 引入切面，接口取自通知的 `IntroductionInfo`
    pub fn introduction(advice: Advice) -> AopConfigResult<Self> {
        Self::introduction_for(ClassFilter::True, advice)
    }

    pub fn introduction_for(class_filter: ClassFilter, advice: Advice) -> AopConfigResult<Self> {
        let interfaces = advice
            .introduction_info()
            .map(|info| info.interfaces())
            .ok_or_else(|| AopConfigError::UnknownAdviceType(advice.type_name().to_string()))?;

        for ifc in &interfaces {
            if !ifc.is_interface() {
                return Err(AopConfigError::IntroductionNotInterface(ifc.name().to_string()));
            }
        }

        Ok(Advisor::Introduction {
            class_filter,
            advice,
            interfaces,
        })
    }

    pub fn unconditional(advice: Advice) -> Self {
        Advisor::Unconditional { advice }
    }

    pub fn advice(&self) -> &Advice {
        match self {
            Advisor::Pointcut { advice, .. }
            | Advisor::Introduction { advice, .. }
            | Advisor::Unconditional { advice } => advice,
        }
    }

    pub fn pointcut(&self) -> Option<&Pointcut> {
        match self {
            Advisor::Pointcut { pointcut, .. } => Some(pointcut),
            _ => None,
        }
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self, Advisor::Introduction { .. })
    }

    /// 引入的接口（非引入切面为空）
    pub fn introduced_interfaces(&self) -> &[Arc<ClassInfo>] {
        match self {
            Advisor::Introduction { interfaces, .. } => interfaces,
            _ => &[],
        }
    }

    /// 是否为同一个切面实例（同一个通知实例）
    pub fn same_instance(&self, other: &Advisor) -> bool {
        self.advice().same_instance(other.advice())
    }
}

/// 逻辑相等：通知类型相同且切点相等
impl PartialEq for Advisor {
    fn eq(&self, other: &Self) -> bool {
        if self.advice().advice_type() != other.advice().advice_type() {
            return false;
        }
        match (self, other) {
            (Advisor::Pointcut { pointcut: a, .. }, Advisor::Pointcut { pointcut: b, .. }) => a == b,
            (
                Advisor::Introduction {
                    class_filter: fa,
                    interfaces: ia,
                    ..
                },
                Advisor::Introduction {
                    class_filter: fb,
                    interfaces: ib,
                    ..
                },
            ) => fa == fb && ia == ib,
            (Advisor::Unconditional { .. }, Advisor::Unconditional { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisor::Pointcut { pointcut, advice } => {
                write!(f, "PointcutAdvisor({:?}, {:?})", pointcut, advice)
            }
            Advisor::Introduction {
                advice, interfaces, ..
            } => write!(
                f,
                "IntroductionAdvisor({:?}, [{}])",
                advice,
                interfaces
                    .iter()
                    .map(|i| i.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Advisor::Unconditional { advice } => write!(f, "Advisor({:?})", advice),
        }
    }
}
