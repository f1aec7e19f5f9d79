//! Codegen for `#[derive(Model)]`.
//!
//! Records deriving `Model` must also derive `Default` and `Clone`:
//! `from_row` starts from `Self::default()` and fills in the columns a
//! result row actually carries, and `column_values` clones every field out
//! into an owned `Value`.

use crate::parser::{self, FieldAttrs};
use convert_case::{Case, Casing};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Type};

struct ColumnSpec {
    field_ident: syn::Ident,
    inner_ty: Type,
    is_option: bool,
    column_name: String,
    is_pk: bool,
    attrs: FieldAttrs,
}

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let struct_attrs = parser::parse_struct_attrs(&input.attrs)?;
    let fields = parser::struct_fields(&input)?;
    let ident = &input.ident;

    let table_name = struct_attrs
        .table_name
        .unwrap_or_else(|| ident.to_string().to_case(Case::Snake));
    let soft_deletes = struct_attrs.soft_deletes;
    let timestamps = struct_attrs.timestamps;

    let mut columns = Vec::new();
    let mut primary_key: Option<(syn::Ident, String, Type)> = None;

    for field in &fields {
        let attrs = parser::parse_field_attrs(&field.attrs)?;
        if attrs.ignore {
            continue;
        }
        let field_ident = field.ident.clone().expect("named field");
        let (is_option, inner_ty) = parser::check_option_type(&field.ty);
        let column_name = attrs.column_name.clone().unwrap_or_else(|| field_ident.to_string());
        let is_pk = attrs.primary_key || column_name == "id";
        if is_pk && primary_key.is_none() {
            primary_key = Some((field_ident.clone(), column_name.clone(), field.ty.clone()));
        }
        columns.push(ColumnSpec {
            field_ident,
            inner_ty,
            is_option,
            column_name,
            is_pk,
            attrs,
        });
    }

    let (pk_ident, pk_column, pk_ty) = primary_key.ok_or_else(|| {
        syn::Error::new_spanned(
            ident,
            "Model requires a field named `id` or one annotated #[schema(primary_key)]",
        )
    })?;

    let column_infos = columns.iter().map(column_info_tokens);
    let from_row_assignments = columns.iter().map(field_from_row_tokens);
    let column_value_entries = columns
        .iter()
        .filter(|c| !(c.is_pk && c.attrs.auto_increment))
        .map(|c| {
            let field_ident = &c.field_ident;
            let column_name = &c.column_name;
            quote! { (#column_name, ::quill_core::value::Value::from(self.#field_ident.clone())) }
        });

    Ok(quote! {
        #[automatically_derived]
        impl ::quill_core::schema::Schema for #ident {
            type PrimaryKey = #pk_ty;

            const TABLE_NAME: &'static str = #table_name;
            const PRIMARY_KEY_NAME: &'static str = #pk_column;
            const SOFT_DELETES: bool = #soft_deletes;
            const TIMESTAMPS: bool = #timestamps;

            fn columns() -> &'static [::quill_core::schema::ColumnInfo] {
                static COLUMNS: ::std::sync::OnceLock<::std::vec::Vec<::quill_core::schema::ColumnInfo>> =
                    ::std::sync::OnceLock::new();
                COLUMNS.get_or_init(|| vec![ #(#column_infos),* ]).as_slice()
            }

            fn primary_key(&self) -> Self::PrimaryKey {
                self.#pk_ident.clone()
            }
        }

        #[automatically_derived]
        impl ::quill_core::model::ModelAccessor for #ident {
            fn from_row(
                row: &::quill_core::driver::Row,
                index: &::std::collections::HashMap<&str, usize>,
            ) -> Self {
                let mut model = Self::default();
                #(#from_row_assignments)*
                model
            }

            fn column_values(&self) -> ::std::vec::Vec<(&'static str, ::quill_core::value::Value)> {
                vec![ #(#column_value_entries),* ]
            }
        }
    })
}

fn base_column_type(inner_name: &str, is_byte_vec: bool) -> TokenStream {
    if is_byte_vec {
        return quote! { ::quill_core::schema::ColumnType::Blob };
    }
    match inner_name {
        "i8" | "u8" => quote! { ::quill_core::schema::ColumnType::TinyInt },
        "i16" | "u16" => quote! { ::quill_core::schema::ColumnType::SmallInt },
        "i32" | "u32" => quote! { ::quill_core::schema::ColumnType::Int },
        "i64" | "u64" | "isize" | "usize" => quote! { ::quill_core::schema::ColumnType::BigInt },
        "f32" => quote! { ::quill_core::schema::ColumnType::Float },
        "f64" => quote! { ::quill_core::schema::ColumnType::Double },
        "bool" => quote! { ::quill_core::schema::ColumnType::Boolean },
        "String" => quote! { ::quill_core::schema::ColumnType::Varchar },
        "NaiveDate" => quote! { ::quill_core::schema::ColumnType::Date },
        "NaiveDateTime" => quote! { ::quill_core::schema::ColumnType::DateTime },
        "DateTime" => quote! { ::quill_core::schema::ColumnType::Timestamp },
        _ => quote! { ::quill_core::schema::ColumnType::Unknown },
    }
}

fn column_info_tokens(c: &ColumnSpec) -> TokenStream {
    let column_name = &c.column_name;
    let inner_name = parser::type_name(&c.inner_ty);
    let is_byte_vec = parser::is_byte_vec(&c.inner_ty);
    let base_ty = base_column_type(&inner_name, is_byte_vec);
    let nullable = c.is_option || c.attrs.nullable;
    let is_pk = c.is_pk;
    let auto_increment = c.attrs.auto_increment;
    let max_length = match c.attrs.max_length {
        Some(n) => quote! { Some(#n) },
        None => quote! { None },
    };
    let default = match &c.attrs.default {
        Some(lit) => quote! { Some(::quill_core::value::Value::Text(#lit.to_string())) },
        None => quote! { None },
    };

    quote! {
        ::quill_core::schema::ColumnInfo {
            name: #column_name,
            column_type: ::quill_core::schema::ColumnType::promote_text(#column_name, #base_ty),
            nullable: #nullable,
            primary_key: #is_pk,
            auto_increment: #auto_increment,
            default: #default,
            max_length: #max_length,
        }
    }
}

/// Per-field `from_row` assignment: leaves the field at its `Default` value
/// if the column is absent from the result set or fails to parse.
fn field_from_row_tokens(c: &ColumnSpec) -> TokenStream {
    let field_ident = &c.field_ident;
    let column_name = &c.column_name;
    let inner_ty = &c.inner_ty;
    let inner_name = parser::type_name(inner_ty);
    let is_option = c.is_option;
    let is_byte_vec = parser::is_byte_vec(inner_ty);

    let parse_ok: TokenStream = if inner_name == "bool" {
        quote! { Some(cell == "1" || cell.eq_ignore_ascii_case("true")) }
    } else if is_byte_vec {
        quote! { ::quill_core::value::decode_hex(cell) }
    } else if inner_name == "String" {
        quote! { Some(cell.to_string()) }
    } else if inner_name == "DateTime" {
        quote! {
            ::quill_core::chrono::DateTime::parse_from_rfc3339(cell)
                .ok()
                .map(|dt| dt.with_timezone(&::quill_core::chrono::Utc))
        }
    } else {
        quote! { cell.parse::<#inner_ty>().ok() }
    };

    if is_option {
        quote! {
            if let Some(&idx) = index.get(#column_name) {
                if let Some(cell) = row.get(idx) {
                    model.#field_ident = #parse_ok;
                }
            }
        }
    } else {
        quote! {
            if let Some(&idx) = index.get(#column_name) {
                if let Some(cell) = row.get(idx) {
                    if let Some(parsed) = #parse_ok {
                        model.#field_ident = parsed;
                    }
                }
            }
        }
    }
}
