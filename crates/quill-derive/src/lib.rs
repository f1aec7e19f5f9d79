//! `#[derive(Model)]`: generates `Schema` and `ModelAccessor` impls for a
//! record struct from its fields and `#[schema(...)]` attributes, the way
//! hand-written reflection code for that struct would otherwise have to be
//! maintained by hand.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod model;
mod parser;

/// Implements `quill_core::schema::Schema` and `quill_core::model::ModelAccessor`
/// for a struct of named fields.
///
/// Struct-level `#[schema(...)]` keys: `table_name = "..."` (defaults to the
/// snake_case, pluralized-by-convention type name... actually not pluralized,
/// callers name their own table), `soft_deletes`, `timestamps`.
///
/// Field-level `#[schema(...)]` keys: `ignore`, `primary_key`,
/// `auto_increment`, `column_name = "..."`, `max_length = N`, `nullable`,
/// `default = "..."`.
#[proc_macro_derive(Model, attributes(schema))]
pub fn derive_model(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    match model::expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
