//! `#[derive(Error)]` implementation.
//!
//! Every variant (or the struct itself) carries an `#[error("...")]`
//! attribute. The message is a format string that may reference tuple
//! fields positionally (`{0}`) and named fields by name (`{reg}`):
//!
//! ```ignore
//! use neovm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum Fault {
//!     #[error("register {0} is not a {1}-bit register")]
//!     WrongBank(u8, usize),
//!     #[error("stack{width} overflow")]
//!     StackOverflow { width: usize },
//!     #[error("unlock without lock")]
//!     UnlockWithoutLock,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let message = message_of(
                        &variant.attrs,
                        &variant.ident,
                        &format!("variant `{}`", variant.ident),
                    )?;
                    Ok(variant_arm(&variant.ident, &variant.fields, &message))
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data) => {
            let message = message_of(&input.attrs, name, &format!("type `{}`", name))?;
            struct_body(&data.fields, &message)
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds the `match` arm that formats one enum variant.
fn variant_arm(ident: &syn::Ident, fields: &Fields, message: &str) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! {
            Self::#ident => write!(f, #message),
        },
        Fields::Unnamed(unnamed) => {
            let bindings: Vec<_> = (0..unnamed.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let message = positional_to_named(message, bindings.len());
            quote! {
                Self::#ident(#(#bindings),*) => write!(f, #message, #(#bindings = #bindings),*),
            }
        }
        Fields::Named(named) => {
            let bindings: Vec<_> = named.named.iter().map(|field| &field.ident).collect();
            quote! {
                Self::#ident { #(#bindings),* } => write!(f, #message, #(#bindings = #bindings),*),
            }
        }
    }
}

/// Builds the `fmt` body for a struct error.
fn struct_body(fields: &Fields, message: &str) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! { write!(f, #message) },
        Fields::Named(named) => {
            let bindings: Vec<_> = named.named.iter().map(|field| &field.ident).collect();
            quote! { write!(f, #message, #(#bindings = self.#bindings),*) }
        }
        Fields::Unnamed(unnamed) => {
            let bindings: Vec<_> = (0..unnamed.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let indices: Vec<_> = (0..unnamed.unnamed.len()).map(syn::Index::from).collect();
            let message = positional_to_named(message, bindings.len());
            quote! { write!(f, #message, #(#bindings = self.#indices),*) }
        }
    }
}

/// Reads the string literal out of the `#[error("...")]` attribute.
fn message_of<T: ToTokens>(attrs: &[Attribute], target: &T, what: &str) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            format!("{what} is missing an #[error(\"...\")] attribute"),
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(message)) => Ok(message.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "the #[error] message must be a single string literal",
        )),
    }
}

/// Rewrites `{0}`, `{1:x}`, ... into `{f0}`, `{f1:x}`, ... so tuple fields
/// can be passed to `write!` as named arguments.
fn positional_to_named(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in 0..count {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::positional_to_named;

    #[test]
    fn rewrites_positional_placeholders() {
        assert_eq!(positional_to_named("bad {0} at {1}", 2), "bad {f0} at {f1}");
    }

    #[test]
    fn keeps_format_specs() {
        assert_eq!(positional_to_named("opcode {0:#010x}", 1), "opcode {f0:#010x}");
    }

    #[test]
    fn leaves_named_placeholders_alone() {
        assert_eq!(positional_to_named("stack{width} full", 0), "stack{width} full");
    }
}
