//! 运行时类型元数据
//!
//! Rust 没有运行时反射，这里用显式的元数据描述"类"和"方法"：
//! - `ClassInfo` - 类/接口的名称、继承关系、声明的方法、所属加载单元
//! - `Method` - 方法签名、返回类型、修饰符
//! - `MethodKey` - 方法的稳定标识（声明类型、方法名、参数类型列表）
//!
//! 代理生成、切点匹配、返回值处理都只依赖这些元数据。

use crate::lang;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 方法可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    /// 包可见（仅同一加载单元内可以覆盖）
    Package,
    Private,
}

/// 方法修饰符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
}

impl Modifiers {
    pub const PUBLIC: Modifiers = Modifiers {
        visibility: Visibility::Public,
        is_static: false,
        is_final: false,
    };

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    pub fn is_package_visible(&self) -> bool {
        self.visibility == Visibility::Package
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::PUBLIC
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match self.visibility {
            Visibility::Public => parts.push("public"),
            Visibility::Protected => parts.push("protected"),
            Visibility::Private => parts.push("private"),
            Visibility::Package => {}
        }
        if self.is_static {
            parts.push("static");
        }
        if self.is_final {
            parts.push("final");
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// 基本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "bool",
            PrimitiveKind::Byte => "i8",
            PrimitiveKind::Short => "i16",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Int => "i32",
            PrimitiveKind::Long => "i64",
            PrimitiveKind::Float => "f32",
            PrimitiveKind::Double => "f64",
        }
    }
}

/// 方法返回类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Void,
    Primitive(PrimitiveKind),
    /// 引用类型（按类型名描述）
    Reference(String),
}

impl ReturnType {
    pub fn reference(type_name: impl Into<String>) -> Self {
        ReturnType::Reference(type_name.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ReturnType::Void)
    }

    /// 非 void 的基本类型，不能承载 null
    pub fn is_primitive(&self) -> bool {
        matches!(self, ReturnType::Primitive(_))
    }

    /// 返回类型能否静态地引用给定类的实例（即方法可能返回 `this`）
    pub fn may_alias(&self, class: &ClassInfo) -> bool {
        match self {
            ReturnType::Reference(name) => class.is_assignable_to(name),
            _ => false,
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => write!(f, "()"),
            ReturnType::Primitive(kind) => write!(f, "{}", kind.name()),
            ReturnType::Reference(name) => write!(f, "{}", name),
        }
    }
}

/// 方法的稳定标识：声明类型 + 方法名 + 有序参数类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub declaring_class: String,
    pub name: String,
    pub parameter_types: Vec<String>,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.declaring_class,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

/// 方法元数据
///
/// 相等性只看 `MethodKey`，修饰符和返回类型不参与比较。
#[derive(Debug, Clone)]
pub struct Method {
    declaring_class: String,
    name: String,
    parameter_types: Vec<String>,
    return_type: ReturnType,
    modifiers: Modifiers,
    raw_target_access: bool,
}

impl Method {
    /// 创建 public、无参、返回 void 的方法描述
    ///
    /// 声明类型在加入 `ClassInfo` 时自动填充。
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            declaring_class: String::new(),
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: ReturnType::Void,
            modifiers: Modifiers::PUBLIC,
            raw_target_access: false,
        }
    }

    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.parameter_types.push(type_name.into());
        self
    }

    pub fn params<I, S>(mut self, type_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types
            .extend(type_names.into_iter().map(Into::into));
        self
    }

    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.modifiers.visibility = visibility;
        self
    }

    pub fn final_method(mut self) -> Self {
        self.modifiers.is_final = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub(crate) fn declared_by(mut self, class_name: &str, raw_target_access: bool) -> Self {
        self.declaring_class = class_name.to_string();
        self.raw_target_access = raw_target_access;
        self
    }

    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    pub fn get_modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.is_public()
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.is_final
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.is_private()
    }

    /// 声明类型是否选择退出"返回 this 时替换为代理"的处理
    pub fn is_raw_target_access(&self) -> bool {
        self.raw_target_access
    }

    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring_class: self.declaring_class.clone(),
            name: self.name.clone(),
            parameter_types: self.parameter_types.clone(),
        }
    }

    /// 方法名和参数类型相同（忽略声明类型）
    pub fn same_signature(&self, other: &Method) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }

    pub fn is_equals_method(&self) -> bool {
        self.name == lang::EQUALS && self.parameter_types.len() == 1
    }

    pub fn is_hash_code_method(&self) -> bool {
        self.name == lang::HASH_CODE && self.parameter_types.is_empty()
    }

    pub fn is_to_string_method(&self) -> bool {
        self.name == lang::TO_STRING && self.parameter_types.is_empty()
    }

    pub fn is_finalize_method(&self) -> bool {
        self.name == lang::FINALIZE && self.parameter_types.is_empty()
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_class == other.declaring_class
            && self.name == other.name
            && self.parameter_types == other.parameter_types
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_class.hash(state);
        self.name.hash(state);
        self.parameter_types.hash(state);
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifiers = self.modifiers.to_string();
        if !modifiers.is_empty() {
            write!(f, "{} ", modifiers)?;
        }
        write!(
            f,
            "fn {}::{}({}) -> {}",
            self.declaring_class,
            self.name,
            self.parameter_types.join(", "),
            self.return_type
        )
    }
}

/// 类的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Concrete,
    Interface,
    /// 基于接口生成的代理类
    JdkProxy,
    /// 通过子类化生成的代理类
    Generated,
}

/// 类元数据
pub struct ClassInfo {
    name: String,
    kind: ClassKind,
    is_final: bool,
    superclass: Option<Arc<ClassInfo>>,
    interfaces: Vec<Arc<ClassInfo>>,
    methods: Vec<Method>,
    loader: Option<String>,
}

impl ClassInfo {
    /// 开始描述一个具体类（默认父类为 `Object`）
    pub fn class(name: impl Into<String>) -> ClassInfoBuilder {
        ClassInfoBuilder::new(name.into(), ClassKind::Concrete)
    }

    /// 开始描述一个接口
    pub fn interface(name: impl Into<String>) -> ClassInfoBuilder {
        ClassInfoBuilder::new(name.into(), ClassKind::Interface)
    }

    /// 开始描述指定种类的类
    pub fn builder(name: impl Into<String>, kind: ClassKind) -> ClassInfoBuilder {
        ClassInfoBuilder::new(name.into(), kind)
    }

    /// 快捷方式：声明一个异常类
    pub fn exception(name: impl Into<String>, parent: &Arc<ClassInfo>) -> Arc<ClassInfo> {
        Self::class(name).extends(Arc::clone(parent)).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 去掉包路径后的简单名称
    pub fn simple_name(&self) -> &str {
        self.name.rsplit(|c| c == '.' || c == ':').next().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn is_jdk_proxy(&self) -> bool {
        self.kind == ClassKind::JdkProxy
    }

    pub fn is_generated(&self) -> bool {
        self.kind == ClassKind::Generated
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn superclass(&self) -> Option<&Arc<ClassInfo>> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<ClassInfo>] {
        &self.interfaces
    }

    pub fn declared_methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn loader(&self) -> Option<&str> {
        self.loader.as_deref()
    }

    pub fn is_object(&self) -> bool {
        self.name == lang::OBJECT
    }

    /// 生成的子类返回其用户类（父类），其余返回自身
    pub fn user_class(self: &Arc<Self>) -> Arc<ClassInfo> {
        match (&self.kind, &self.superclass) {
            (ClassKind::Generated, Some(parent)) => Arc::clone(parent),
            _ => Arc::clone(self),
        }
    }

    /// 当前类能否赋值给名为 `type_name` 的类型
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        if type_name == lang::OBJECT || self.name == type_name {
            return true;
        }
        if self
            .interfaces
            .iter()
            .any(|ifc| ifc.is_assignable_to(type_name))
        {
            return true;
        }
        self.superclass
            .as_ref()
            .map(|parent| parent.is_assignable_to(type_name))
            .unwrap_or(false)
    }

    /// 递归收集所有实现的接口（去重，保持声明顺序）
    pub fn all_interfaces(&self) -> Vec<Arc<ClassInfo>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        self.collect_interfaces(&mut seen, &mut result);
        result
    }

    fn collect_interfaces(&self, seen: &mut HashSet<String>, result: &mut Vec<Arc<ClassInfo>>) {
        for ifc in &self.interfaces {
            if seen.insert(ifc.name.clone()) {
                result.push(Arc::clone(ifc));
            }
            ifc.collect_interfaces(seen, result);
        }
        if let Some(parent) = &self.superclass {
            parent.collect_interfaces(seen, result);
        }
    }

    /// 所有实例方法：自身 → 父类链 → 接口，同签名只保留最先出现（最具体）的那个
    pub fn all_methods(&self) -> Vec<Method> {
        fn push(method: &Method, result: &mut Vec<Method>) {
            if !result.iter().any(|m| m.same_signature(method)) {
                result.push(method.clone());
            }
        }

        let mut result: Vec<Method> = Vec::new();

        let mut current: Option<&ClassInfo> = Some(self);
        while let Some(class) = current {
            for method in &class.methods {
                push(method, &mut result);
            }
            current = class.superclass.as_deref();
        }
        for ifc in self.all_interfaces() {
            for method in &ifc.methods {
                push(method, &mut result);
            }
        }
        result
    }

    /// 按名称查找方法（可选参数个数）
    pub fn find_method(&self, name: &str, arity: Option<usize>) -> Option<Method> {
        self.all_methods().into_iter().find(|m| {
            m.name() == name && arity.map(|n| m.parameter_count() == n).unwrap_or(true)
        })
    }

    /// 是否声明或继承了同签名的方法
    pub fn has_method(&self, method: &Method) -> bool {
        self.all_methods().iter().any(|m| m.same_signature(method))
    }

    /// 在继承链中查找名为 `name` 的类或接口
    pub fn find_type(self: &Arc<Self>, name: &str) -> Option<Arc<ClassInfo>> {
        if self.name == name {
            return Some(Arc::clone(self));
        }
        if let Some(found) = self.all_interfaces().into_iter().find(|i| i.name == name) {
            return Some(found);
        }
        self.superclass.as_ref().and_then(|parent| parent.find_type(name))
    }
}

impl PartialEq for ClassInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.loader == other.loader
    }
}

impl Eq for ClassInfo {}

impl Hash for ClassInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.loader.hash(state);
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("superclass", &self.superclass.as_ref().map(|c| c.name()))
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_interface() { "interface" } else { "class" };
        write!(f, "{} {}", kind, self.name)
    }
}

/// `ClassInfo` 构建器
pub struct ClassInfoBuilder {
    name: String,
    kind: ClassKind,
    is_final: bool,
    root: bool,
    superclass: Option<Arc<ClassInfo>>,
    interfaces: Vec<Arc<ClassInfo>>,
    methods: Vec<Method>,
    loader: Option<String>,
}

impl ClassInfoBuilder {
    fn new(name: String, kind: ClassKind) -> Self {
        Self {
            name,
            kind,
            is_final: false,
            root: false,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            loader: None,
        }
    }

    pub fn extends(mut self, superclass: Arc<ClassInfo>) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn implements(mut self, interface: Arc<ClassInfo>) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn implements_all(mut self, interfaces: impl IntoIterator<Item = Arc<ClassInfo>>) -> Self {
        self.interfaces.extend(interfaces);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn loader(mut self, loader: impl Into<String>) -> Self {
        self.loader = Some(loader.into());
        self
    }

    /// 继承体系的根（不自动补 `Object` 父类）
    pub(crate) fn root(mut self) -> Self {
        self.root = true;
        self
    }

    pub fn build(self) -> Arc<ClassInfo> {
        let superclass = match (self.kind, self.superclass) {
            (ClassKind::Interface, _) => None,
            (_, Some(parent)) => Some(parent),
            (_, None) if self.root => None,
            (_, None) => Some(lang::object()),
        };

        let raw_target_access = self.name == lang::RAW_TARGET_ACCESS
            || self
                .interfaces
                .iter()
                .any(|ifc| ifc.is_assignable_to(lang::RAW_TARGET_ACCESS))
            || superclass
                .as_ref()
                .map(|p| p.is_assignable_to(lang::RAW_TARGET_ACCESS))
                .unwrap_or(false);

        let methods = self
            .methods
            .into_iter()
            .map(|m| m.declared_by(&self.name, raw_target_access))
            .collect();

        Arc::new(ClassInfo {
            name: self.name,
            kind: self.kind,
            is_final: self.is_final,
            superclass,
            interfaces: self.interfaces,
            methods,
            loader: self.loader,
        })
    }
}
