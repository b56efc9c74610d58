extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DataEnum, DeriveInput, Fields, Generics,
    Ident, Index, Type,
};

/// Field attributes parsed from `#[refpack(...)]` annotations
///
/// * `skip` - The field is not pickled; on unpickle it is set to `Default::default()`
#[derive(Debug, Clone, Default)]
struct FieldAttributes {
    skip: bool,
}

/// Extract and parse `#[refpack(...)]` attribute values from field attributes
fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut field_attrs = FieldAttributes::default();
    for attr in attrs {
        if attr.path().is_ident("refpack") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    field_attrs.skip = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown refpack attribute, expected `skip`"))
                }
            })?;
        }
    }
    Ok(field_attrs)
}

/// One field of a struct or variant, in declaration order.
struct FieldInfo {
    /// `self.<member>` accessor for struct fields.
    member: TokenStream2,
    /// Pattern binding used when destructuring an enum variant.
    binding: Ident,
    /// Field name for named fields.
    ident: Option<Ident>,
    ty: Type,
    attrs: FieldAttributes,
}

fn collect_fields(fields: &Fields) -> syn::Result<Vec<FieldInfo>> {
    let mut infos = Vec::new();
    for (i, f) in fields.iter().enumerate() {
        let member = match &f.ident {
            Some(ident) => quote! { #ident },
            None => {
                let index = Index::from(i);
                quote! { #index }
            }
        };
        infos.push(FieldInfo {
            member,
            binding: Ident::new(&format!("__field{}", i), Span::call_site()),
            ident: f.ident.clone(),
            ty: f.ty.clone(),
            attrs: get_field_attributes(&f.attrs)?,
        });
    }
    Ok(infos)
}

/// Adds `bound` to every type parameter and `self_bound` to `Self`.
fn add_bounds(
    mut generics: Generics,
    bound: TokenStream2,
    self_bound: TokenStream2,
) -> Generics {
    let params: Vec<Ident> = generics.type_params().map(|p| p.ident.clone()).collect();
    let where_clause = generics.make_where_clause();
    for param in params {
        where_clause.predicates.push(parse_quote! { #param: #bound });
    }
    where_clause.predicates.push(parse_quote! { Self: #self_bound });
    generics
}

/// Statements that unpickle each field, in order, into a constructor expression for `path`.
fn construct(path: TokenStream2, fields: &Fields, infos: &[FieldInfo]) -> TokenStream2 {
    let values = infos.iter().map(|info| {
        let ty = &info.ty;
        if info.attrs.skip {
            quote! { ::core::default::Default::default() }
        } else {
            quote! { <#ty as refpack::Unpickler>::unpickle(state)? }
        }
    });
    match fields {
        Fields::Named(_) => {
            let idents = infos.iter().map(|info| &info.ident);
            quote! { #path { #( #idents: #values, )* } }
        }
        Fields::Unnamed(_) => quote! { #path( #( #values, )* ) },
        Fields::Unit => quote! { #path },
    }
}

/// Derive macro for implementing the `Pickler` trait
///
/// Structs are written as a 0 header followed by their fields in declaration order. Enums are
/// written as the variant index + 1 followed by the variant's fields. Once written, the value is
/// registered in the identity table, so pickling the same instance again in one session emits a
/// back-reference.
///
/// # Supported Attributes
///
/// * `#[refpack(skip)]` - Skip field during pickling
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Pickle)]
/// struct MyStruct {
///     field1: i32,
///     #[refpack(skip)]
///     field2: String,
/// }
/// ```
#[proc_macro_derive(Pickle, attributes(refpack))]
pub fn derive_pickle(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_pickle(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_pickle(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let generics = add_bounds(
        input.generics.clone(),
        quote! { refpack::Pickler },
        quote! { 'static },
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match &input.data {
        Data::Struct(s) => {
            let infos = collect_fields(&s.fields)?;
            let field_pickle = infos.iter().filter(|info| !info.attrs.skip).map(|info| {
                let member = &info.member;
                quote! { refpack::Pickler::pickle(&self.#member, state)?; }
            });
            quote! {
                if state.write_identity_ref(self)? {
                    return Ok(());
                }
                state.write_struct_header();
                #(#field_pickle)*
                state.add_identity_ref(self);
                Ok(())
            }
        }
        Data::Enum(e) if e.variants.is_empty() => quote! { match *self {} },
        Data::Enum(e) => {
            let arms = pickle_variant_arms(name, e)?;
            quote! {
                if state.write_identity_ref(self)? {
                    return Ok(());
                }
                match self {
                    #(#arms)*
                }
                state.add_identity_ref(self);
                Ok(())
            }
        }
        Data::Union(u) => {
            return Err(syn::Error::new_spanned(
                u.union_token,
                "Pickle cannot be derived for unions",
            ))
        }
    };

    Ok(quote! {
        impl #impl_generics refpack::Pickler for #name #ty_generics #where_clause {
            fn pickle<'__refpack>(
                &'__refpack self,
                state: &mut refpack::PickleState<'__refpack>,
            ) -> refpack::Result<()> {
                #body
            }
        }
    })
}

fn pickle_variant_arms(name: &Ident, e: &DataEnum) -> syn::Result<Vec<TokenStream2>> {
    let mut arms = Vec::new();
    for (index, v) in e.variants.iter().enumerate() {
        let variant_ident = &v.ident;
        let infos = collect_fields(&v.fields)?;
        let kept: Vec<&FieldInfo> = infos.iter().filter(|info| !info.attrs.skip).collect();
        let bindings: Vec<&Ident> = kept.iter().map(|info| &info.binding).collect();
        let pattern = match &v.fields {
            Fields::Named(_) => {
                let idents = kept.iter().map(|info| &info.ident);
                quote! { #name::#variant_ident { #( #idents: #bindings, )* .. } }
            }
            Fields::Unnamed(_) => {
                let slots = infos.iter().map(|info| {
                    if info.attrs.skip {
                        quote! { _ }
                    } else {
                        let binding = &info.binding;
                        quote! { #binding }
                    }
                });
                quote! { #name::#variant_ident( #(#slots),* ) }
            }
            Fields::Unit => quote! { #name::#variant_ident },
        };
        arms.push(quote! {
            #pattern => {
                state.write_enum_header(#index)?;
                #( refpack::Pickler::pickle(#bindings, state)?; )*
            }
        });
    }
    Ok(arms)
}

/// Derive macro for implementing the `Unpickler` trait
///
/// Reads the header written by `#[derive(Pickle)]`: a back-reference resolves to the instance
/// registered earlier in the session, anything else is decoded field by field and then registered.
/// Owned decodes keep a clone in the identity table, so the type must implement `Clone`; decodes
/// through `Rc<T>` register the `Rc` itself.
///
/// # Supported Attributes
///
/// * `#[refpack(skip)]` - Field is not read; it is set to `Default::default()`
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Unpickle, Clone)]
/// struct MyStruct {
///     field1: i32,
///     #[refpack(skip)]
///     field2: String,
/// }
/// ```
#[proc_macro_derive(Unpickle, attributes(refpack))]
pub fn derive_unpickle(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_unpickle(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_unpickle(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let generics = add_bounds(
        input.generics.clone(),
        quote! { refpack::Unpickler },
        quote! { ::core::clone::Clone + 'static },
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    // Reads the header and fresh content into a `refpack::Decoded<Self>`.
    let decode = match &input.data {
        Data::Struct(s) => {
            let infos = collect_fields(&s.fields)?;
            let value = construct(quote! { #name }, &s.fields, &infos);
            quote! {
                match state.read_struct_header::<Self>()? {
                    refpack::Header::Ref(index) => refpack::Decoded::Ref(index),
                    refpack::Header::Fresh(_) => refpack::Decoded::Fresh(#value),
                }
            }
        }
        Data::Enum(e) => {
            let mut indices = Vec::new();
            let mut values = Vec::new();
            for (index, v) in e.variants.iter().enumerate() {
                let variant_ident = &v.ident;
                let infos = collect_fields(&v.fields)?;
                indices.push(index);
                values.push(construct(quote! { #name::#variant_ident }, &v.fields, &infos));
            }
            let arms = izip!(indices.iter(), values.iter()).map(|(index, value)| {
                quote! { #index => #value, }
            });
            quote! {
                match state.read_enum_header::<Self>()? {
                    refpack::Header::Ref(index) => refpack::Decoded::Ref(index),
                    refpack::Header::Fresh(variant) => refpack::Decoded::Fresh(match variant {
                        #(#arms)*
                        index => {
                            return Err(refpack::EnumDecodeError::UnknownVariant {
                                index,
                                enum_name: stringify!(#name),
                            }
                            .into())
                        }
                    }),
                }
            }
        }
        Data::Union(u) => {
            return Err(syn::Error::new_spanned(
                u.union_token,
                "Unpickle cannot be derived for unions",
            ))
        }
    };

    Ok(quote! {
        impl #impl_generics refpack::Unpickler for #name #ty_generics #where_clause {
            fn unpickle(state: &mut refpack::UnpickleState) -> refpack::Result<Self> {
                let decoded = #decode;
                state.finish(decoded)
            }

            fn unpickle_rc(
                state: &mut refpack::UnpickleState,
            ) -> refpack::Result<::std::rc::Rc<Self>> {
                let decoded = #decode;
                state.finish_rc(decoded)
            }
        }
    })
}
