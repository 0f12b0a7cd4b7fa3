//! 工具函数

use quote::ToTokens;
use syn::{Attribute, GenericArgument, PathArguments, ReturnType, Type};

/// 类型的紧凑文本形式，用作方法描述中的参数类型名
pub fn type_name(ty: &impl ToTokens) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}

/// 方法返回值的形态
pub enum Output {
    /// 没有返回值
    Unit,
    /// 直接返回 `T`
    Plain(Type),
    /// 返回 `Result<T, E>`，E 可以转换为 `Throwable`
    Fallible(Type),
}

pub fn output_of(output: &ReturnType) -> Output {
    let ty = match output {
        ReturnType::Default => return Output::Unit,
        ReturnType::Type(_, ty) => &**ty,
    };
    if let Type::Tuple(tuple) = ty {
        if tuple.elems.is_empty() {
            return Output::Unit;
        }
    }
    match result_ok_type(ty) {
        Some(inner) => Output::Fallible(inner),
        None => Output::Plain(ty.clone()),
    }
}

/// `Result<T, E>` 中的 `T`
fn result_ok_type(ty: &Type) -> Option<Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty.clone()),
        _ => None,
    })
}

/// 移除名为 `name` 的属性，返回是否存在
pub fn strip_attr(attrs: &mut Vec<Attribute>, name: &str) -> bool {
    let before = attrs.len();
    attrs.retain(|attr| !attr.path().is_ident(name));
    attrs.len() != before
}
