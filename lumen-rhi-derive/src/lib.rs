#![allow(non_snake_case)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned};

/// Turns a struct into a device-owned Vulkan wrapper.
///
/// The struct must declare a `name: String` field. The macro injects
/// `pub(crate) device: ::ash::Device`, a `name()` accessor, and the sealed
/// `crate::device::DeviceObject` impl used by `Drop` implementations.
#[proc_macro_attribute]
pub fn DeviceObject(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as syn::ItemStruct);
    let ident = input.ident.clone();
    let generics = input.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut output_struct = input.clone();

    let syn::Fields::Named(fields_named) = &mut output_struct.fields else {
        return syn::Error::new(
            output_struct.span(),
            "DeviceObject only supports structs with named fields",
        )
        .to_compile_error()
        .into();
    };

    let has_field = |name: &str| {
        fields_named
            .named
            .iter()
            .any(|f| f.ident.as_ref().is_some_and(|id| id == name))
    };

    if has_field("device") {
        return syn::Error::new(
            fields_named.span(),
            "DeviceObject: remove the `device` field; the macro injects `pub(crate) device: ash::Device`",
        )
        .to_compile_error()
        .into();
    }

    if !has_field("name") {
        return syn::Error::new(
            fields_named.span(),
            "DeviceObject: a `name: String` field is required for debug labels",
        )
        .to_compile_error()
        .into();
    }

    let device_field: syn::Field = syn::parse_quote! {
        pub(crate) device: ::ash::Device
    };
    fields_named.named.push(device_field);

    let expanded = quote! {
        #output_struct

        impl #impl_generics #ident #ty_generics #where_clause {
            /// Debug label this object was created with.
            #[inline]
            pub fn name(&self) -> &str { &self.name }
        }

        impl #impl_generics crate::device::sealed::Sealed for #ident #ty_generics #where_clause {}

        impl #impl_generics crate::device::DeviceObject for #ident #ty_generics #where_clause {
            #[inline]
            fn device(&self) -> &::ash::Device { &self.device }
        }
    };

    expanded.into()
}
