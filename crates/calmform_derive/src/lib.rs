use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{}Fields", model_ident);

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut fields_methods = Vec::new();
    let mut value_inserts = Vec::new();

    for field in named_fields {
        let key = match field_key(&field) {
            Ok(Some(key)) => key,
            Ok(None) => continue,
            Err(error) => return error.to_compile_error().into(),
        };
        let Some(field_ident) = field.ident else {
            continue;
        };

        fields_methods.push(quote! {
            pub const fn #field_ident(&self) -> #calmform::form::FieldKey {
                #calmform::form::FieldKey::new(#key)
            }
        });

        value_inserts.push(quote! {
            snapshot.insert(
                #calmform::form::FieldKey::new(#key),
                #calmform::form::ToFieldValue::to_field_value(&self.#field_ident),
            );
        });
    }

    quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #calmform::form::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn values(&self) -> #calmform::form::FormSnapshot {
                let mut snapshot = #calmform::form::FormSnapshot::new();
                #(#value_inserts)*
                snapshot
            }
        }
    }
    .into()
}

/// Resolves the field key, honouring `#[form(key = "...")]` and `#[form(skip)]`.
fn field_key(field: &Field) -> syn::Result<Option<String>> {
    let Some(ident) = field.ident.as_ref() else {
        return Ok(None);
    };
    let mut key = ident.to_string();
    let mut skip = false;
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                let value: LitStr = meta.value()?.parse()?;
                key = value.value();
                Ok(())
            } else if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `key` or `skip`"))
            }
        })?;
    }
    Ok((!skip).then_some(key))
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
