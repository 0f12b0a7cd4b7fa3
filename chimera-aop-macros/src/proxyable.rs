//! `#[proxyable]` 的代码生成

use crate::utils::{output_of, strip_attr, type_name, Output};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::{
    Error, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, Path, Result, Signature,
    Type, Visibility,
};

#[derive(Default)]
pub struct ProxyableArgs {
    name: Option<LitStr>,
    interfaces: Vec<Path>,
    extends: Option<Path>,
    loader: Option<LitStr>,
    sealed: bool,
}

impl ProxyableArgs {
    pub fn parse(&mut self, meta: ParseNestedMeta) -> Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("interfaces") {
            meta.parse_nested_meta(|inner| {
                self.interfaces.push(inner.path);
                Ok(())
            })
        } else if meta.path.is_ident("extends") {
            self.extends = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("loader") {
            self.loader = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("sealed") {
            self.sealed = true;
            Ok(())
        } else {
            Err(meta.error("unsupported proxyable argument"))
        }
    }
}

/// 一个参数：要么是按位置取出的值，要么是当前对象的引用
enum Param {
    Value { binding: Ident, ty: Type },
    This,
}

struct MethodSpec {
    ident: Ident,
    params: Vec<Param>,
    output: Output,
    visibility: TokenStream,
    is_final: bool,
}

impl MethodSpec {
    fn from_fn(method: &ImplItemFn, is_final: bool) -> Result<Self> {
        let sig = &method.sig;
        check_signature(sig)?;

        let mut params = Vec::new();
        let mut position = 0usize;
        for input in sig.inputs.iter().skip(1) {
            let FnArg::Typed(pat_type) = input else {
                continue;
            };
            if is_this_param(&pat_type.pat, &pat_type.ty) {
                params.push(Param::This);
                continue;
            }
            params.push(Param::Value {
                binding: format_ident!("__arg{}", position),
                ty: (*pat_type.ty).clone(),
            });
            position += 1;
        }

        let visibility = match &method.vis {
            Visibility::Public(_) => quote!(Public),
            Visibility::Restricted(_) => quote!(Package),
            Visibility::Inherited => quote!(Private),
        };

        Ok(Self {
            ident: sig.ident.clone(),
            params,
            output: output_of(&sig.output),
            visibility,
            is_final,
        })
    }

    fn value_params(&self) -> impl Iterator<Item = (&Ident, &Type)> {
        self.params.iter().filter_map(|p| match p {
            Param::Value { binding, ty } => Some((binding, ty)),
            Param::This => None,
        })
    }

    fn arity(&self) -> usize {
        self.value_params().count()
    }

    /// `chimera_core::Method` 构造表达式
    fn descriptor(&self) -> TokenStream {
        let name = self.ident.to_string();
        let param_types = self.value_params().map(|(_, ty)| type_name(ty));
        let return_type = match &self.output {
            Output::Unit => quote!(::chimera_core::ReturnType::Void),
            Output::Plain(ty) | Output::Fallible(ty) => {
                quote!(<#ty as ::chimera_core::IntoValue>::return_type())
            }
        };
        let visibility = &self.visibility;
        let final_marker = self.is_final.then(|| quote!(.final_method()));
        quote! {
            ::chimera_core::Method::new(#name)
                #(.param(#param_types))*
                .returns(#return_type)
                .visibility(::chimera_core::Visibility::#visibility)
                #final_marker
        }
    }

    /// `invoke` 中的一个匹配分支
    fn dispatch_arm(&self) -> TokenStream {
        let name = self.ident.to_string();
        let ident = &self.ident;
        let arity = self.arity();
        let extract = self.value_params().enumerate().map(|(index, (binding, ty))| {
            quote! {
                let #binding = <#ty as ::chimera_core::FromValue>::from_value(&__args[#index])?;
            }
        });
        let call_args = self.params.iter().map(|p| match p {
            Param::Value { binding, .. } => quote!(#binding),
            Param::This => quote!(__this),
        });
        let call = quote!(self.#ident(#(#call_args),*));
        let convert = match &self.output {
            Output::Unit => quote! {
                #call;
                Ok(::chimera_core::Value::Void)
            },
            Output::Plain(_) => quote! {
                Ok(::chimera_core::IntoValue::into_value(#call))
            },
            Output::Fallible(_) => quote! {
                #call
                    .map(::chimera_core::IntoValue::into_value)
                    .map_err(::std::convert::Into::into)
            },
        };
        quote! {
            (#name, #arity) => {
                #(#extract)*
                #convert
            }
        }
    }
}

fn check_signature(sig: &Signature) -> Result<()> {
    if sig.asyncness.is_some() {
        return Err(Error::new_spanned(
            sig.asyncness,
            "#[proxyable] methods are invoked synchronously and cannot be async",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &sig.generics,
            "#[proxyable] methods cannot be generic",
        ));
    }
    Ok(())
}

fn is_this_param(pat: &Pat, ty: &Type) -> bool {
    let Pat::Ident(pat_ident) = pat else {
        return false;
    };
    if pat_ident.ident != "this" {
        return false;
    }
    matches!(ty, Type::Reference(reference) if type_name(&reference.elem).ends_with("ObjectRef"))
}

pub fn impl_proxyable(args: ProxyableArgs, mut item: ItemImpl) -> Result<TokenStream> {
    if item.trait_.is_some() {
        return Err(Error::new_spanned(
            &item.self_ty,
            "#[proxyable] must be placed on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &item.generics,
            "#[proxyable] does not support generic types",
        ));
    }

    let mut methods = Vec::new();
    for impl_item in item.items.iter_mut() {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let is_final = strip_attr(&mut method.attrs, "final_method");
        let Some(receiver) = method.sig.receiver() else {
            continue;
        };
        if receiver.reference.is_none() || receiver.mutability.is_some() {
            return Err(Error::new_spanned(
                receiver,
                "#[proxyable] methods must take &self",
            ));
        }
        methods.push(MethodSpec::from_fn(method, is_final)?);
    }

    let self_ty = &item.self_ty;
    let class_name = args
        .name
        .unwrap_or_else(|| LitStr::new(&type_name(self_ty), Span::call_site()));
    let interfaces = &args.interfaces;
    let extends = args.extends.map(|parent| quote!(.extends(#parent())));
    let loader = args.loader.map(|loader| quote!(.loader(#loader)));
    let sealed = args.sealed.then(|| quote!(.final_class()));
    let descriptors = methods.iter().map(MethodSpec::descriptor);
    let arms = methods.iter().map(MethodSpec::dispatch_arm);

    Ok(quote! {
        #item

        impl #self_ty {
            /// 运行时类描述
            pub fn class_info() -> ::std::sync::Arc<::chimera_core::ClassInfo> {
                static CLASS_INFO: ::chimera_core::once_cell::sync::Lazy<
                    ::std::sync::Arc<::chimera_core::ClassInfo>,
                > = ::chimera_core::once_cell::sync::Lazy::new(|| {
                    ::chimera_core::ClassInfo::class(#class_name)
                        #(.implements(#interfaces()))*
                        #extends
                        #loader
                        #sealed
                        #(.method(#descriptors))*
                        .build()
                });
                ::std::sync::Arc::clone(&CLASS_INFO)
            }
        }

        impl ::chimera_core::Invocable for #self_ty {
            fn class(&self) -> ::std::sync::Arc<::chimera_core::ClassInfo> {
                Self::class_info()
            }

            #[allow(unused_variables)]
            fn invoke(
                &self,
                __this: &::chimera_core::ObjectRef,
                __method: &::chimera_core::Method,
                __args: &[::chimera_core::Value],
            ) -> ::std::result::Result<::chimera_core::Value, ::chimera_core::Throwable> {
                match (__method.name(), __args.len()) {
                    #(#arms)*
                    _ => Err(::chimera_core::Throwable::illegal_argument(format!(
                        "No method '{}' taking {} argument(s) on {}",
                        __method.name(),
                        __args.len(),
                        #class_name
                    ))),
                }
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    })
}
