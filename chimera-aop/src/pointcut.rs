//! 切点（Pointcut）系统
//!
//! 切点由类过滤器 `ClassFilter` 和方法匹配器 `MethodMatcher` 组成。
//! 方法匹配器可以是静态的（代理构建时即可判定），也可以是运行时的
//! （每次调用时根据实际参数再判定一次）。

use chimera_core::{ClassInfo, Method, Value};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

type ClassPredicate = Arc<dyn Fn(&ClassInfo) -> bool + Send + Sync>;
type MethodPredicate = Arc<dyn Fn(&Method, &ClassInfo) -> bool + Send + Sync>;
type IntroductionAwarePredicate = Arc<dyn Fn(&Method, &ClassInfo, bool) -> bool + Send + Sync>;
type ArgumentPredicate = Arc<dyn Fn(&Method, &ClassInfo, &[Value]) -> bool + Send + Sync>;

/// 简单的模式匹配（支持 * 通配符）
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `User*` - 以 User 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
pub fn pattern_matches(pattern: &str, target: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains('*') {
        return pattern == target;
    }

    // 将 * 转换为正则表达式，其余字符按字面量匹配
    let regex_pattern = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    let regex_pattern = format!("^{}$", regex_pattern);

    Regex::new(&regex_pattern)
        .map(|regex| regex.is_match(target))
        .unwrap_or(false)
}

/// 类过滤器
#[derive(Clone)]
pub enum ClassFilter {
    /// 匹配所有类
    True,

    /// 按类名匹配（完整名或简单名），支持 `*` 通配符
    TypePattern(String),

    /// 使用正则表达式匹配完整类名
    TypeRegex(Regex),

    /// 可赋值给指定类型（子类或实现类）
    Assignable(String),

    /// 自定义匹配函数
    Custom(ClassPredicate),

    And(Box<ClassFilter>, Box<ClassFilter>),
    Or(Box<ClassFilter>, Box<ClassFilter>),
    Not(Box<ClassFilter>),
}

impl ClassFilter {
    pub fn type_pattern(pattern: impl Into<String>) -> Self {
        ClassFilter::TypePattern(pattern.into())
    }

    pub fn type_regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(ClassFilter::TypeRegex(Regex::new(pattern)?))
    }

    pub fn assignable(type_name: impl Into<String>) -> Self {
        ClassFilter::Assignable(type_name.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ClassInfo) -> bool + Send + Sync + 'static,
    {
        ClassFilter::Custom(Arc::new(f))
    }

    pub fn matches(&self, class: &ClassInfo) -> bool {
        match self {
            ClassFilter::True => true,
            ClassFilter::TypePattern(pattern) => {
                pattern_matches(pattern, class.name()) || pattern_matches(pattern, class.simple_name())
            }
            ClassFilter::TypeRegex(regex) => regex.is_match(class.name()),
            ClassFilter::Assignable(name) => class.is_assignable_to(name),
            ClassFilter::Custom(f) => f(class),
            ClassFilter::And(left, right) => left.matches(class) && right.matches(class),
            ClassFilter::Or(left, right) => left.matches(class) || right.matches(class),
            ClassFilter::Not(inner) => !inner.matches(class),
        }
    }

    pub fn and(self, other: ClassFilter) -> Self {
        ClassFilter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: ClassFilter) -> Self {
        ClassFilter::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        ClassFilter::Not(Box::new(self))
    }
}

impl PartialEq for ClassFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClassFilter::True, ClassFilter::True) => true,
            (ClassFilter::TypePattern(a), ClassFilter::TypePattern(b)) => a == b,
            (ClassFilter::TypeRegex(a), ClassFilter::TypeRegex(b)) => a.as_str() == b.as_str(),
            (ClassFilter::Assignable(a), ClassFilter::Assignable(b)) => a == b,
            (ClassFilter::Custom(a), ClassFilter::Custom(b)) => Arc::ptr_eq(a, b),
            (ClassFilter::And(a1, a2), ClassFilter::And(b1, b2))
            | (ClassFilter::Or(a1, a2), ClassFilter::Or(b1, b2)) => a1 == b1 && a2 == b2,
            (ClassFilter::Not(a), ClassFilter::Not(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ClassFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassFilter::True => write!(f, "True"),
            ClassFilter::TypePattern(p) => write!(f, "TypePattern({})", p),
            ClassFilter::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            ClassFilter::Assignable(t) => write!(f, "Assignable({})", t),
            ClassFilter::Custom(_) => write!(f, "Custom(...)"),
            ClassFilter::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            ClassFilter::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            ClassFilter::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 方法匹配器
#[derive(Clone)]
pub enum MethodMatcher {
    /// 匹配所有方法
    True,

    /// 按方法名匹配，支持 `*` 通配符
    NamePattern(String),

    /// 使用正则表达式匹配 `声明类型.方法名`
    NameRegex(Regex),

    /// 参数类型列表完全一致
    Parameters(Vec<String>),

    /// 自定义静态匹配函数
    Custom(MethodPredicate),

    /// 静态匹配时考虑是否存在匹配的引入（引入可能改变方法的可匹配性）
    IntroductionAware(IntroductionAwarePredicate),

    /// 运行时匹配：`filter` 先做静态预筛，`check` 在每次调用时根据实际参数判定
    Runtime {
        filter: Box<MethodMatcher>,
        check: ArgumentPredicate,
    },

    And(Box<MethodMatcher>, Box<MethodMatcher>),
    Or(Box<MethodMatcher>, Box<MethodMatcher>),
    Not(Box<MethodMatcher>),
}

impl MethodMatcher {
    pub fn name_pattern(pattern: impl Into<String>) -> Self {
        MethodMatcher::NamePattern(pattern.into())
    }

    pub fn name_regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(MethodMatcher::NameRegex(Regex::new(pattern)?))
    }

    /// 匹配任意一个名称模式
    pub fn names<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        patterns
            .into_iter()
            .map(|p| MethodMatcher::NamePattern(p.into()))
            .reduce(MethodMatcher::or)
            .unwrap_or_else(|| MethodMatcher::True.not())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Method, &ClassInfo) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Custom(Arc::new(f))
    }

    pub fn introduction_aware<F>(f: F) -> Self
    where
        F: Fn(&Method, &ClassInfo, bool) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::IntroductionAware(Arc::new(f))
    }

    /// 运行时匹配器，静态预筛通过后每次调用再检查参数
    pub fn runtime<F>(filter: MethodMatcher, check: F) -> Self
    where
        F: Fn(&Method, &ClassInfo, &[Value]) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Runtime {
            filter: Box::new(filter),
            check: Arc::new(check),
        }
    }

    /// 静态匹配
    pub fn matches(&self, method: &Method, class: &ClassInfo) -> bool {
        self.matches_with_introductions(method, class, false)
    }

    /// 静态匹配，`has_introductions` 表示是否有引入切面适用于该类
    pub fn matches_with_introductions(
        &self,
        method: &Method,
        class: &ClassInfo,
        has_introductions: bool,
    ) -> bool {
        match self {
            MethodMatcher::True => true,
            MethodMatcher::NamePattern(pattern) => pattern_matches(pattern, method.name()),
            MethodMatcher::NameRegex(regex) => {
                regex.is_match(&format!("{}.{}", method.declaring_class(), method.name()))
                    || regex.is_match(&format!("{}.{}", class.name(), method.name()))
            }
            MethodMatcher::Parameters(types) => method.parameter_types() == types.as_slice(),
            MethodMatcher::Custom(f) => f(method, class),
            MethodMatcher::IntroductionAware(f) => f(method, class, has_introductions),
            MethodMatcher::Runtime { filter, .. } => {
                filter.matches_with_introductions(method, class, has_introductions)
            }
            MethodMatcher::And(left, right) => {
                left.matches_with_introductions(method, class, has_introductions)
                    && right.matches_with_introductions(method, class, has_introductions)
            }
            MethodMatcher::Or(left, right) => {
                left.matches_with_introductions(method, class, has_introductions)
                    || right.matches_with_introductions(method, class, has_introductions)
            }
            // 运行时匹配器在静态阶段无法判定，取反后只能保守地认为可能匹配
            MethodMatcher::Not(inner) => {
                inner.is_runtime()
                    || !inner.matches_with_introductions(method, class, has_introductions)
            }
        }
    }

    /// 是否需要在每次调用时根据参数再判定
    pub fn is_runtime(&self) -> bool {
        match self {
            MethodMatcher::Runtime { .. } => true,
            MethodMatcher::And(left, right) | MethodMatcher::Or(left, right) => {
                left.is_runtime() || right.is_runtime()
            }
            MethodMatcher::Not(inner) => inner.is_runtime(),
            _ => false,
        }
    }

    /// 是否包含引入感知的匹配器
    pub fn is_introduction_aware(&self) -> bool {
        match self {
            MethodMatcher::IntroductionAware(_) => true,
            MethodMatcher::Runtime { filter, .. } => filter.is_introduction_aware(),
            MethodMatcher::And(left, right) | MethodMatcher::Or(left, right) => {
                left.is_introduction_aware() || right.is_introduction_aware()
            }
            MethodMatcher::Not(inner) => inner.is_introduction_aware(),
            _ => false,
        }
    }

    /// 运行时匹配（静态预筛已通过）
    pub fn matches_runtime(&self, method: &Method, class: &ClassInfo, args: &[Value]) -> bool {
        match self {
            MethodMatcher::Runtime { check, .. } => check(method, class, args),
            MethodMatcher::And(left, right) => {
                left.matches_runtime(method, class, args) && right.matches_runtime(method, class, args)
            }
            MethodMatcher::Or(left, right) => {
                left.matches_runtime(method, class, args) || right.matches_runtime(method, class, args)
            }
            MethodMatcher::Not(inner) => !inner.matches_runtime(method, class, args),
            other => other.matches(method, class),
        }
    }

    pub fn and(self, other: MethodMatcher) -> Self {
        MethodMatcher::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: MethodMatcher) -> Self {
        MethodMatcher::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        MethodMatcher::Not(Box::new(self))
    }
}

impl PartialEq for MethodMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MethodMatcher::True, MethodMatcher::True) => true,
            (MethodMatcher::NamePattern(a), MethodMatcher::NamePattern(b)) => a == b,
            (MethodMatcher::NameRegex(a), MethodMatcher::NameRegex(b)) => a.as_str() == b.as_str(),
            (MethodMatcher::Parameters(a), MethodMatcher::Parameters(b)) => a == b,
            (MethodMatcher::Custom(a), MethodMatcher::Custom(b)) => Arc::ptr_eq(a, b),
            (MethodMatcher::IntroductionAware(a), MethodMatcher::IntroductionAware(b)) => {
                Arc::ptr_eq(a, b)
            }
            (
                MethodMatcher::Runtime { filter: fa, check: ca },
                MethodMatcher::Runtime { filter: fb, check: cb },
            ) => fa == fb && Arc::ptr_eq(ca, cb),
            (MethodMatcher::And(a1, a2), MethodMatcher::And(b1, b2))
            | (MethodMatcher::Or(a1, a2), MethodMatcher::Or(b1, b2)) => a1 == b1 && a2 == b2,
            (MethodMatcher::Not(a), MethodMatcher::Not(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::True => write!(f, "True"),
            MethodMatcher::NamePattern(p) => write!(f, "NamePattern({})", p),
            MethodMatcher::NameRegex(r) => write!(f, "NameRegex({})", r.as_str()),
            MethodMatcher::Parameters(p) => write!(f, "Parameters({})", p.join(", ")),
            MethodMatcher::Custom(_) => write!(f, "Custom(...)"),
            MethodMatcher::IntroductionAware(_) => write!(f, "IntroductionAware(...)"),
            MethodMatcher::Runtime { filter, .. } => write!(f, "Runtime({:?})", filter),
            MethodMatcher::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            MethodMatcher::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            MethodMatcher::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 切点
#[derive(Clone, PartialEq)]
pub struct Pointcut {
    class_filter: ClassFilter,
    method_matcher: MethodMatcher,
}

impl Pointcut {
    /// 匹配所有类的所有方法
    pub const TRUE: Pointcut = Pointcut {
        class_filter: ClassFilter::True,
        method_matcher: MethodMatcher::True,
    };

    pub fn new(class_filter: ClassFilter, method_matcher: MethodMatcher) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    pub fn for_class(class_filter: ClassFilter) -> Self {
        Self::new(class_filter, MethodMatcher::True)
    }

    pub fn for_methods(method_matcher: MethodMatcher) -> Self {
        Self::new(ClassFilter::True, method_matcher)
    }

    pub fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    pub fn method_matcher(&self) -> &MethodMatcher {
        &self.method_matcher
    }

    /// 静态判定切点是否适用于方法
    pub fn matches(&self, method: &Method, class: &ClassInfo) -> bool {
        self.class_filter.matches(class) && self.method_matcher.matches(method, class)
    }

    /// 创建 execution 表达式
    ///
    /// 例如：`execution("* UserService.get_user(..)")`
    /// 格式：`返回类型 类型名.方法名(参数)`，可以带 `execution(...)` 外壳。
    /// 参数部分 `(..)` 表示任意参数，`()` 表示无参，`(i64, String)` 要求参数类型完全一致。
    /// 返回类型只支持 `*`。
    pub fn execution(expression: &str) -> Self {
        let expression = expression.trim();
        let expression = expression
            .strip_prefix("execution(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(expression);

        // 解析表达式: "* UserService.get_user(..)"
        let parts: Vec<&str> = expression.splitn(2, char::is_whitespace).collect();
        if parts.len() < 2 {
            tracing::warn!("Malformed execution expression '{}', matching all methods", expression);
            return Pointcut::TRUE;
        }

        let signature = parts[1].trim();
        let (name_part, params) = match signature.find('(') {
            Some(open) => {
                let params = signature[open + 1..].trim_end_matches(')').trim();
                (&signature[..open], Some(params))
            }
            None => (signature, None),
        };

        let params_matcher = match params {
            None | Some("..") => None,
            Some("") => Some(MethodMatcher::Parameters(Vec::new())),
            Some(list) => Some(MethodMatcher::Parameters(
                list.split(',').map(|p| p.trim().to_string()).collect(),
            )),
        };

        let (class_filter, name_matcher) = match name_part.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => (
                ClassFilter::TypePattern(type_pattern.to_string()),
                MethodMatcher::NamePattern(method_pattern.to_string()),
            ),
            None => (
                ClassFilter::True,
                MethodMatcher::NamePattern(name_part.to_string()),
            ),
        };

        let method_matcher = match params_matcher {
            Some(params) => name_matcher.and(params),
            None => name_matcher,
        };

        Pointcut::new(class_filter, method_matcher)
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointcut({:?}, {:?})", self.class_filter, self.method_matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> std::sync::Arc<ClassInfo> {
        ClassInfo::class("app.UserService")
            .method(Method::new("get_user").param("i64"))
            .method(Method::new("save").param("String").param("i32"))
            .build()
    }

    fn method(class: &ClassInfo, name: &str) -> Method {
        class.find_method(name, None).unwrap()
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("get*", "get_user"));
        assert!(pattern_matches("*Service", "UserService"));
        assert!(pattern_matches("*Ser*", "UserService"));
        assert!(!pattern_matches("get", "get_user"));
        // 其他正则元字符按字面量处理
        assert!(pattern_matches("a.b*", "a.bc"));
        assert!(!pattern_matches("a.b*", "axbc"));
    }

    #[test]
    fn test_execution_expression() {
        let class = service();
        let pc = Pointcut::execution("* *Service.get*(..)");
        assert!(pc.matches(&method(&class, "get_user"), &class));
        assert!(!pc.matches(&method(&class, "save"), &class));

        let typed = Pointcut::execution("execution(* UserService.save(String, i32))");
        assert!(typed.matches(&method(&class, "save"), &class));

        let wrong_params = Pointcut::execution("* UserService.save()");
        assert!(!wrong_params.matches(&method(&class, "save"), &class));

        assert_eq!(Pointcut::execution("garbage"), Pointcut::TRUE);
    }

    #[test]
    fn test_runtime_matcher() {
        let class = service();
        let m = method(&class, "get_user");
        let matcher = MethodMatcher::runtime(MethodMatcher::name_pattern("get*"), |_, _, args| {
            args.first().and_then(|a| a.as_i64()) == Some(1)
        });

        assert!(matcher.is_runtime());
        assert!(matcher.matches(&m, &class));
        assert!(matcher.matches_runtime(&m, &class, &[Value::Long(1)]));
        assert!(!matcher.matches_runtime(&m, &class, &[Value::Long(2)]));

        // 取反后静态阶段只能认为可能匹配
        let negated = matcher.clone().not();
        assert!(negated.is_runtime());
        assert!(negated.matches(&m, &class));
        assert!(negated.matches_runtime(&m, &class, &[Value::Long(2)]));
    }

    #[test]
    fn test_composition_and_equality() {
        let class = service();
        let save = method(&class, "save");
        let matcher = MethodMatcher::names(["get*", "save"]);
        assert!(matcher.matches(&save, &class));
        assert!(!MethodMatcher::names(Vec::<String>::new()).matches(&save, &class));

        let filter = ClassFilter::assignable("app.UserService").and(ClassFilter::type_pattern("User*"));
        assert!(filter.matches(&class));
        assert!(!filter.clone().not().matches(&class));

        assert_eq!(filter.clone(), filter);
        let custom = ClassFilter::custom(|_| true);
        assert_eq!(custom.clone(), custom);
        assert_ne!(custom, ClassFilter::custom(|_| true));
    }

    #[test]
    fn test_introduction_aware_matcher() {
        let class = service();
        let m = method(&class, "save");
        let matcher = MethodMatcher::introduction_aware(|_, _, has_introductions| has_introductions);
        assert!(matcher.is_introduction_aware());
        assert!(!matcher.matches(&m, &class));
        assert!(matcher.matches_with_introductions(&m, &class, true));
    }

    #[test]
    fn test_name_regex_uses_declaring_type() {
        let class = service();
        let matcher = MethodMatcher::name_regex(r"app\.UserService\.get_.*").unwrap();
        assert!(matcher.matches(&method(&class, "get_user"), &class));
        assert!(!matcher.matches(&method(&class, "save"), &class));
    }
}
