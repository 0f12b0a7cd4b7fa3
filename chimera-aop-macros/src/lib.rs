//! Chimera AOP 过程宏
//!
//! 提供 `#[proxyable]`：为普通的 `impl` 块生成运行时类描述和动态调用分发，
//! 让结构体可以作为代理目标放进 `ObjectRef`。

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl};

mod proxyable;
mod utils;

/// `#[proxyable]` 属性宏
///
/// 作用于固有 `impl` 块。每个接收 `&self` 的方法都会登记到生成的 `class_info()` 中，
/// 并通过 `Invocable::invoke` 按方法名和参数个数分发。
///
/// 参数：
/// - `name = "app.OrderService"`：类名，默认使用类型名
/// - `interfaces(orders_api, ...)`：返回 `Arc<ClassInfo>` 的函数路径
/// - `extends = base_class`：父类描述
/// - `loader = "plugin-a"`：加载单元
/// - `sealed`：类不可被继承
///
/// 方法上的 `#[final_method]` 把方法标记为不可覆盖。
/// 名为 `this`、类型为 `&ObjectRef` 的参数会收到当前对象的引用，不计入方法签名。
///
/// 使用示例：
/// ```ignore
/// use chimera_aop_macros::proxyable;
/// use chimera_core::{ObjectRef, Throwable};
///
/// #[derive(Default)]
/// pub struct OrderService;
///
/// #[proxyable(name = "app.OrderService", interfaces(order_api))]
/// impl OrderService {
///     pub fn place_order(&self, id: i64) -> Result<String, Throwable> {
///         Ok(format!("order-{}", id))
///     }
///
///     pub fn fluent(&self, this: &ObjectRef) -> ObjectRef {
///         this.clone()
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn proxyable(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = proxyable::ProxyableArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as ItemImpl);
    proxyable::impl_proxyable(args, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
