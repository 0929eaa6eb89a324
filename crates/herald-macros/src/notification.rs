//! Notification derive macro implementation, **parent-in-child** design.
//!
//! # Struct-level attributes `#[notification(...)]`
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `implements` | `implements(dyn TimerEvent, dyn Audited)` | Interface types, in declaration order |
//! | `crate` | `crate = "herald_core"` | Path used in generated code |
//!
//! `implements` is not closed over supertraits. For `trait Audited: Logged`,
//! list both `dyn Audited` and `dyn Logged` if handlers of either should be
//! reached.
//!
//! # Field-level attributes `#[notification(...)]`
//!
//! | Key | Description |
//! |-----|-------------|
//! | `parent` | Marks this field as the base-type value (at most one) |

use proc_macro2::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{
    Attribute, Data, DeriveInput, Fields, Ident, Index, Member, Path, Token, Type, parenthesized,
    spanned::Spanned,
};

// ============================================================================
// Attribute structures
// ============================================================================

struct TypeAttrs {
    implements: Vec<Type>,
    krate: Path,
}

struct ParentField {
    member: Member,
    ty: Type,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_notification(input: &DeriveInput) -> syn::Result<TokenStream> {
    let attrs = parse_type_attrs(&input.attrs)?;

    let parent = match &input.data {
        Data::Struct(data) => find_parent(&data.fields)?,
        Data::Enum(data) => {
            for variant in &data.variants {
                if find_parent(&variant.fields)?.is_some() {
                    return Err(syn::Error::new(
                        variant.span(),
                        "#[notification(parent)] is only supported on struct fields",
                    ));
                }
            }
            None
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Notification cannot be derived for unions",
            ));
        }
    };

    Ok(generate(input, &attrs, parent.as_ref()))
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_type_attrs(attrs: &[Attribute]) -> syn::Result<TypeAttrs> {
    let mut implements = Vec::new();
    let mut krate: Option<Path> = None;

    for attr in attrs {
        if !attr.path().is_ident("notification") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("implements") {
                let content;
                parenthesized!(content in meta.input);
                let types = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
                implements.extend(types);
                Ok(())
            } else if meta.path.is_ident("crate") {
                krate = Some(meta.value()?.parse::<syn::LitStr>()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `implements(...)` or `crate = \"...\"`"))
            }
        })?;
    }

    Ok(TypeAttrs {
        implements,
        krate: krate.unwrap_or_else(|| syn::parse_quote!(::herald::core)),
    })
}

fn is_parent(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut parent = false;
    for attr in attrs {
        if !attr.path().is_ident("notification") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("parent") {
                parent = true;
                Ok(())
            } else {
                Err(meta.error("expected `parent`"))
            }
        })?;
    }
    Ok(parent)
}

fn find_parent(fields: &Fields) -> syn::Result<Option<ParentField>> {
    let mut found: Option<ParentField> = None;

    for (index, field) in fields.iter().enumerate() {
        if !is_parent(&field.attrs)? {
            continue;
        }
        if found.is_some() {
            return Err(syn::Error::new(
                field.span(),
                "only one field may be marked #[notification(parent)]",
            ));
        }
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(Index {
                index: index as u32,
                span: field.span(),
            }),
        };
        found = Some(ParentField {
            member,
            ty: field.ty.clone(),
        });
    }

    Ok(found)
}

// ============================================================================
// Code generation
// ============================================================================

fn generate(input: &DeriveInput, attrs: &TypeAttrs, parent: Option<&ParentField>) -> TokenStream {
    let name: &Ident = &input.ident;
    let krate = &attrs.krate;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // ── parent ──
    let parent_impl = parent.map(|ParentField { member, ty }| {
        quote! {
            fn parent(&self) -> ::std::option::Option<::std::sync::Arc<dyn #krate::Notification>> {
                ::std::option::Option::Some(::std::sync::Arc::new(
                    <#ty as ::std::clone::Clone>::clone(&self.#member),
                ))
            }
        }
    });

    // ── interfaces / view ──
    let implements = &attrs.implements;
    let interfaces_impl = (!implements.is_empty()).then(|| {
        quote! {
            fn interfaces(&self) -> ::std::vec::Vec<#krate::NotificationType> {
                ::std::vec![#(#krate::NotificationType::of::<#implements>()),*]
            }
        }
    });

    let view_impl = quote! {
        fn view(
            self: ::std::sync::Arc<Self>,
            ty: #krate::NotificationType,
        ) -> ::std::option::Option<#krate::NotificationView> {
            if ty.is::<Self>() {
                return ::std::option::Option::Some(#krate::NotificationView::new(self));
            }
            #(
                if ty.is::<#implements>() {
                    return ::std::option::Option::Some(#krate::NotificationView::new(
                        self as ::std::sync::Arc<#implements>,
                    ));
                }
            )*
            ::std::option::Option::None
        }
    };

    let notification_impl = quote! {
        impl #impl_generics #krate::Notification for #name #ty_generics #where_clause {
            fn notification_type(&self) -> #krate::NotificationType {
                #krate::NotificationType::of::<Self>()
            }

            #parent_impl
            #interfaces_impl
            #view_impl

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };

    // ── Deref / DerefMut ──
    let deref_impls = parent.map(|ParentField { member, ty }| {
        quote! {
            impl #impl_generics ::std::ops::Deref for #name #ty_generics #where_clause {
                type Target = #ty;
                #[inline]
                fn deref(&self) -> &Self::Target {
                    &self.#member
                }
            }

            impl #impl_generics ::std::ops::DerefMut for #name #ty_generics #where_clause {
                #[inline]
                fn deref_mut(&mut self) -> &mut Self::Target {
                    &mut self.#member
                }
            }
        }
    });

    quote! {
        #notification_impl
        #deref_impls
    }
}
