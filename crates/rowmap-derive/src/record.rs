//! Record derive macro implementation

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr, Result};

struct RecordField<'a> {
    ident: &'a Ident,
    tags: Vec<(String, String)>,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut record_fields = Vec::new();
    for field in fields {
        if let Some(parsed) = parse_field(field)? {
            record_fields.push(parsed);
        }
    }

    let type_name = name.to_string();
    let descriptors = record_fields.iter().map(|f| {
        let field_name = f.ident.to_string();
        let tags = f.tags.iter().map(|(k, v)| quote! { (#k, #v) });
        quote! {
            ::rowmap::FieldDescriptor {
                name: #field_name,
                tags: &[#(#tags),*],
            }
        }
    });

    let value_arms = record_fields.iter().enumerate().map(|(index, f)| {
        let ident = f.ident;
        quote! {
            #index => ::core::option::Option::Some(::rowmap::ToValue::to_value(&self.#ident)),
        }
    });

    let slots = record_fields.iter().map(|f| {
        let ident = f.ident;
        quote! {
            ::core::option::Option::Some(&mut self.#ident as &mut dyn ::rowmap::FieldSlot)
        }
    });

    Ok(quote! {
        impl #impl_generics ::rowmap::Record for #name #ty_generics #where_clause {
            fn descriptor() -> &'static ::rowmap::RecordDescriptor {
                static DESCRIPTOR: ::rowmap::RecordDescriptor = ::rowmap::RecordDescriptor {
                    type_name: #type_name,
                    fields: &[#(#descriptors),*],
                };
                &DESCRIPTOR
            }

            fn record_descriptor(&self) -> &'static ::rowmap::RecordDescriptor {
                <Self as ::rowmap::Record>::descriptor()
            }

            fn field_value(&self, index: usize) -> ::core::option::Option<::rowmap::Value> {
                match index {
                    #(#value_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn field_slots(
                &mut self,
            ) -> ::std::vec::Vec<::core::option::Option<&mut dyn ::rowmap::FieldSlot>> {
                ::std::vec![#(#slots),*]
            }
        }

        impl #impl_generics ::rowmap::Destination for #name #ty_generics #where_clause {
            fn shape() -> ::rowmap::Shape {
                ::rowmap::record::single_shape::<Self>()
            }

            fn load(
                &mut self,
                cursor: &mut dyn ::rowmap::RowCursor,
                engine: &::rowmap::Materializer<'_>,
            ) -> ::rowmap::OrmResult<usize> {
                ::rowmap::record::load_single(self, cursor, engine)
            }
        }
    })
}

/// Parse `#[orm(...)]` on one field. `None` when the field is skipped.
fn parse_field(field: &Field) -> Result<Option<RecordField<'_>>> {
    let Some(ident) = field.ident.as_ref() else {
        return Err(syn::Error::new_spanned(field, "expected a named field"));
    };

    let mut skip = false;
    let mut tags: Vec<(String, String)> = Vec::new();
    for attr in &field.attrs {
        if !attr.path().is_ident("orm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                return Ok(());
            }
            let Some(key) = meta.path.get_ident() else {
                return Err(meta.error("expected `key = \"value\"` or `skip`"));
            };
            let key = key.to_string();
            let value: LitStr = meta.value()?.parse()?;
            if tags.iter().any(|(k, _)| *k == key) {
                return Err(meta.error(format!("duplicate tag `{key}`")));
            }
            tags.push((key, value.value()));
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }
    Ok(Some(RecordField { ident, tags }))
}
