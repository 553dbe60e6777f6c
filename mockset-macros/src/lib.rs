//! Procedural macros for the mockset project.
//!
//! - `#[derive(Record)]` implements `mockset::Record`, resolving the record name and the identity
//!   key members at compile time.
//! - `#[derive(RecordContext)]` implements `mockset::RecordContext`, listing the record-set
//!   members a preparer installs record sets into.

#[allow(unused_extern_crates)]
extern crate self as mockset_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, ExprLit, Fields, Ident, Lit, LitStr, Meta, PathArguments, Token,
    Type, ext::IdentExt, parse_macro_input, punctuated::Punctuated,
};

/// Derive macro for the `Record` trait.
///
/// Supports the following attributes:
/// - `#[record(name = "...")]` - overrides the record name used by key conventions
/// - `#[key]` - marks an identity key field; several marked fields form a composite key, in
///   declaration order
///
/// Without `#[key]`, the key is the field serialized as `id`, else `<Name>Id` or `<Name>_id`
/// (all case-insensitive). Serde `rename` and `rename_all` attributes are honoured. When the
/// serialized field names cannot be known at compile time (`flatten`), the key is inferred at
/// runtime from a record's serialized form instead.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize, Record)]
/// #[record(name = "Line")]
/// struct OrderLine {
///     #[key]
///     order_id: i64,
///     #[key]
///     line_no: i32,
///     sku: String,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record, key))]
pub fn record_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_record(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive macro for the `RecordContext` trait.
///
/// Every named field of type `RecordSet<T>` becomes a writable member. Supports the following
/// attributes:
/// - `#[record_context(name = "...")]` - the type name passed to the mocking engine
/// - `#[record_context(readonly(orders = RecordSet<Order>, ...))]` - getter-only members, installed
///   by arrangement; each also gets an accessor method resolving it on the engine
/// - `#[record_context(set_accessor)]` - the context exposes the generic set accessor, generated as
///   `record_set::<T>(engine)`
/// - `#[mock_handle]` - the `Option<MockHandle>` field storing the context's mock instance
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default, RecordContext)]
/// #[record_context(set_accessor, readonly(orders = RecordSet<Order>))]
/// struct ShopContext {
///     people: RecordSet<Person>,
///     #[mock_handle]
///     mock: Option<MockHandle>,
/// }
///
/// let orders = shop.orders(&engine).unwrap();
/// let people = shop.record_set::<Person>(&engine).unwrap();
/// ```
#[proc_macro_derive(RecordContext, attributes(record_context, mock_handle))]
pub fn record_context_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_record_context(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut record_name = ident.to_string();
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                record_name = meta.value()?.parse::<LitStr>()?.value();
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `name`"))
            }
        })?;
    }

    let key_members = match key_members(input, &record_name)? {
        Some(members) => quote! { ::core::option::Option::Some(&[#(#members),*]) },
        None => quote! { ::core::option::Option::None },
    };

    Ok(quote! {
        impl #impl_generics ::mockset::Record for #ident #ty_generics #where_clause {
            fn record_name() -> &'static str {
                #record_name
            }

            fn key_members() -> ::core::option::Option<&'static [&'static str]> {
                #key_members
            }
        }
    })
}

/// The serialized names of the key members, or `None` if they are only known at runtime.
fn key_members(input: &DeriveInput, record_name: &str) -> syn::Result<Option<Vec<String>>> {
    let Data::Struct(data) = &input.data else {
        return Ok(None);
    };
    let Fields::Named(fields) = &data.fields else {
        return Ok(None);
    };

    let casing = rename_all(&input.attrs)?;
    let marked = fields
        .named
        .iter()
        .filter(|field| field.attrs.iter().any(|attr| attr.path().is_ident("key")))
        .map(|field| serialized_name(field, casing))
        .collect::<Vec<_>>();
    if !marked.is_empty() {
        return Ok(Some(marked));
    }

    let flattened = fields.named.iter().any(|field| {
        serde_metas(&field.attrs)
            .iter()
            .any(|meta| meta.path().is_ident("flatten"))
    });
    if flattened {
        return Ok(None);
    }

    let names = fields
        .named
        .iter()
        .map(|field| serialized_name(field, casing))
        .collect::<Vec<_>>();
    let candidates = [
        "id".to_string(),
        format!("{record_name}Id"),
        format!("{record_name}_id"),
    ];
    let found = candidates.iter().find_map(|candidate| {
        names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(candidate))
            .cloned()
    });

    Ok(Some(found.into_iter().collect()))
}

/// A serde `rename_all` rule, as applied to field names.
#[derive(Clone, Copy)]
enum Casing {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl Casing {
    fn parse(rule: &LitStr) -> syn::Result<Self> {
        Ok(match rule.value().as_str() {
            "lowercase" => Casing::Lower,
            "UPPERCASE" => Casing::Upper,
            "PascalCase" => Casing::Pascal,
            "camelCase" => Casing::Camel,
            "snake_case" => Casing::Snake,
            "SCREAMING_SNAKE_CASE" => Casing::ScreamingSnake,
            "kebab-case" => Casing::Kebab,
            "SCREAMING-KEBAB-CASE" => Casing::ScreamingKebab,
            other => {
                return Err(syn::Error::new_spanned(
                    rule,
                    format!("unknown serde rename rule `{other}`"),
                ));
            }
        })
    }

    /// Renames a snake_case field name.
    fn apply(self, field: &str) -> String {
        match self {
            Casing::Lower | Casing::Snake => field.to_string(),
            Casing::Upper | Casing::ScreamingSnake => field.to_ascii_uppercase(),
            Casing::Pascal => {
                let mut pascal = String::with_capacity(field.len());
                let mut capitalize = true;
                for ch in field.chars() {
                    if ch == '_' {
                        capitalize = true;
                    } else if capitalize {
                        pascal.push(ch.to_ascii_uppercase());
                        capitalize = false;
                    } else {
                        pascal.push(ch);
                    }
                }
                pascal
            }
            Casing::Camel => {
                let pascal = Casing::Pascal.apply(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            Casing::Kebab => field.replace('_', "-"),
            Casing::ScreamingKebab => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

/// The container's `rename_all` rule for serialization, if any.
fn rename_all(attrs: &[syn::Attribute]) -> syn::Result<Option<Casing>> {
    let mut casing = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if meta.input.peek(Token![=]) {
                    casing = Some(Casing::parse(&meta.value()?.parse::<LitStr>()?)?);
                } else {
                    meta.parse_nested_meta(|side| {
                        if side.path.is_ident("serialize") {
                            casing = Some(Casing::parse(&side.value()?.parse::<LitStr>()?)?);
                        } else {
                            side.value()?.parse::<LitStr>()?;
                        }
                        Ok(())
                    })?;
                }
            } else if meta.input.peek(Token![=]) {
                meta.value()?.parse::<Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                let _skipped;
                syn::parenthesized!(_skipped in meta.input);
            }
            Ok(())
        })?;
    }

    Ok(casing)
}

fn serialized_name(field: &syn::Field, casing: Option<Casing>) -> String {
    let explicit = serde_metas(&field.attrs).iter().find_map(|meta| match meta {
        Meta::NameValue(nv) if nv.path.is_ident("rename") => match &nv.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(name),
                ..
            }) => Some(name.value()),
            _ => None,
        },
        _ => None,
    });
    if let Some(name) = explicit {
        return name;
    }

    let name = field
        .ident
        .as_ref()
        .map(|ident| ident.unraw().to_string())
        .unwrap_or_default();
    match casing {
        Some(casing) => casing.apply(&name),
        None => name,
    }
}

fn serde_metas(attrs: &[syn::Attribute]) -> Vec<Meta> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("serde"))
        .filter_map(|attr| {
            attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                .ok()
        })
        .flatten()
        .collect()
}

struct ReadOnlyMember {
    name: Ident,
    ty: Type,
}

fn expand_record_context(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut context_name = ident.to_string();
    let mut set_accessor = false;
    let mut readonly = Vec::<ReadOnlyMember>::new();
    for attr in input
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("record_context"))
    {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                context_name = meta.value()?.parse::<LitStr>()?.value();
                Ok(())
            } else if meta.path.is_ident("set_accessor") {
                set_accessor = true;
                Ok(())
            } else if meta.path.is_ident("readonly") {
                meta.parse_nested_meta(|member| {
                    let name = member
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| member.error("expected a member name"))?;
                    let ty = member.value()?.parse::<Type>()?;
                    readonly.push(ReadOnlyMember { name, ty });
                    Ok(())
                })
            } else {
                Err(meta.error(
                    "unsupported record_context attribute, expected `name`, `set_accessor` or `readonly`",
                ))
            }
        })?;
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            ident,
            "`RecordContext` can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            ident,
            "`RecordContext` requires named fields",
        ));
    };

    let mut writable = Vec::new();
    let mut handle_field = None;
    for field in &fields.named {
        let Some(name) = &field.ident else { continue };

        if field.attrs.iter().any(|attr| attr.path().is_ident("mock_handle")) {
            handle_field = Some(name.clone());
        } else if is_record_set(&field.ty) {
            writable.push((name.clone(), field.ty.clone()));
        }
    }

    if handle_field.is_none() && (set_accessor || !readonly.is_empty()) {
        return Err(syn::Error::new_spanned(
            ident,
            "read-only members and `set_accessor` need a `#[mock_handle] Option<MockHandle>` field",
        ));
    }

    let writable_members = writable.iter().map(|(name, ty)| {
        let member = name.to_string();
        quote! {
            ::mockset::RecordMember {
                name: #member,
                element: ::mockset::ElementType::of::<#ty>(),
                slot: ::mockset::MemberSlot::Writable(&mut self.#name),
            }
        }
    });
    let readonly_members = readonly.iter().map(|ReadOnlyMember { name, ty }| {
        let member = name.to_string();
        quote! {
            ::mockset::RecordMember {
                name: #member,
                element: ::mockset::ElementType::of::<#ty>(),
                slot: ::mockset::MemberSlot::ReadOnly,
            }
        }
    });

    let (mock_handle, attach_mock) = match &handle_field {
        Some(field) => (
            quote! { self.#field.as_ref() },
            quote! { self.#field = ::core::option::Option::Some(handle); },
        ),
        None => (
            quote! { ::core::option::Option::None },
            quote! { let _ = handle; },
        ),
    };

    let readonly_accessors = readonly.iter().map(|ReadOnlyMember { name, ty }| {
        let member = name.to_string();
        let field = &handle_field;
        quote! {
            /// The record set arranged as this member's return value.
            pub fn #name(
                &self,
                engine: &dyn ::mockset::MockEngine,
            ) -> ::core::option::Option<#ty> {
                let owner = self.#field.as_ref()?;
                engine
                    .arranged(&::mockset::MemberAccess::property(owner, #member))?
                    .downcast_ref::<#ty>()
                    .cloned()
            }
        }
    });
    let set_accessor_fn = set_accessor.then(|| {
        let field = &handle_field;
        quote! {
            /// The record set the generic accessor returns for element type `T`.
            pub fn record_set<T: ::mockset::Record>(
                &self,
                engine: &dyn ::mockset::MockEngine,
            ) -> ::core::option::Option<::mockset::RecordSet<T>> {
                let owner = self.#field.as_ref()?;
                engine
                    .arranged(&::mockset::MemberAccess::generic_set(
                        owner,
                        ::core::any::TypeId::of::<T>(),
                    ))?
                    .downcast_ref::<::mockset::RecordSet<T>>()
                    .cloned()
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::mockset::RecordContext for #ident #ty_generics #where_clause {
            fn context_name() -> &'static str {
                #context_name
            }

            fn record_members(&mut self) -> ::std::vec::Vec<::mockset::RecordMember<'_>> {
                ::std::vec![#(#writable_members,)* #(#readonly_members,)*]
            }

            fn mock_handle(&self) -> ::core::option::Option<&::mockset::MockHandle> {
                #mock_handle
            }

            fn attach_mock(&mut self, handle: ::mockset::MockHandle) {
                #attach_mock
            }

            fn exposes_set_accessor(&self) -> bool {
                #set_accessor
            }
        }

        impl #impl_generics #ident #ty_generics #where_clause {
            #(#readonly_accessors)*
            #set_accessor_fn
        }
    })
}

/// Returns `true` for `RecordSet<T>`, however the path to it is spelled.
fn is_record_set(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };

    path.path.segments.last().is_some_and(|segment| {
        segment.ident == "RecordSet"
            && matches!(segment.arguments, PathArguments::AngleBracketed(_))
    })
}
