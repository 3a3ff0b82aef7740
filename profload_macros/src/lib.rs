//! Attribute macros that remove the derive boilerplate from metric and
//! aggregate declarations.
//!
//! Both expand to the serde/`Debug`/`Clone`/`PartialEq` derive set the
//! `profload` traits require. `#[metric]` also registers the type as a
//! `profload::Metric`.
use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

extern crate proc_macro;

/// Declare a struct as a single measurement.
///
/// ```rust, ignore
/// use profload::macros::metric;
///
/// #[metric]
/// struct Sample {
///     latency: std::time::Duration,
///     success: bool,
/// }
/// ```
#[proc_macro_attribute]
pub fn metric(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let ident = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let expanded = quote! {
        #[derive(
            ::serde::Serialize,
            ::serde::Deserialize,
            ::std::cmp::PartialEq,
            ::std::fmt::Debug,
            ::std::clone::Clone
        )]
        #ast

        impl #impl_generics ::profload::Metric for #ident #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

/// Declare a struct as an aggregate. `Default` is derived too, so
/// `Aggregate::new` can simply return `Self::default()`.
#[proc_macro_attribute]
pub fn aggregate(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let expanded = quote! {
        #[derive(
            ::serde::Serialize,
            ::serde::Deserialize,
            ::std::cmp::PartialEq,
            ::std::fmt::Debug,
            ::std::clone::Clone,
            ::std::default::Default
        )]
        #ast
    };

    TokenStream::from(expanded)
}
