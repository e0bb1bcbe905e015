// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;

/// Derives `fn parse(msg: impl Iterator<Item = &u8>) -> Result<Self>` for
/// a `#[repr(u8)]` enum that also derives `FromPrimitive`. The generated
/// parser consumes one byte through the caller's `next!` macro and maps an
/// unknown discriminant through the caller's `OptionContext`.
#[proc_macro_derive(Parse)]
pub fn parse_derive(input: TokenStream) -> TokenStream {
    let ast: syn::DeriveInput = syn::parse(input).unwrap();

    let name = &ast.ident;
    let trace_msg = format!("parse {}: {{:#x}}", name);
    let context_msg = format!("Unknown {} value", name);
    let gen = quote! {
        impl #name {
            pub fn parse<'a>(
                mut msg: impl Iterator<Item = &'a u8>,
            ) -> Result<Self> {
                let val = next!(msg);
                log::trace!(#trace_msg, val);
                Self::from_u8(val).context(#context_msg)
            }
        }
    };

    gen.into()
}
