//! Attribute and type-shape parsing shared by the `Model` derive.

use syn::{Attribute, Data, DeriveInput, Field, Fields, GenericArgument, PathArguments, Type};

/// Struct-level `#[schema(...)]` keys.
#[derive(Default)]
pub struct StructAttrs {
    pub table_name: Option<String>,
    pub soft_deletes: bool,
    pub timestamps: bool,
}

/// Field-level `#[schema(...)]` keys.
#[derive(Default, Clone)]
pub struct FieldAttrs {
    pub ignore: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub column_name: Option<String>,
    pub max_length: Option<u32>,
    pub nullable: bool,
    pub default: Option<String>,
}

pub fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<StructAttrs> {
    let mut out = StructAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table_name") {
                out.table_name = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("soft_deletes") {
                out.soft_deletes = true;
            } else if meta.path.is_ident("timestamps") {
                out.timestamps = true;
            } else {
                return Err(meta.error("unrecognized #[schema(...)] key on struct"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

pub fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore") {
                out.ignore = true;
            } else if meta.path.is_ident("primary_key") {
                out.primary_key = true;
            } else if meta.path.is_ident("auto_increment") {
                out.auto_increment = true;
            } else if meta.path.is_ident("nullable") {
                out.nullable = true;
            } else if meta.path.is_ident("column_name") {
                out.column_name = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("default") {
                out.default = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("max_length") {
                out.max_length = Some(meta.value()?.parse::<syn::LitInt>()?.base10_parse()?);
            } else {
                return Err(meta.error("unrecognized #[schema(...)] key on field"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// Extracts the named fields of a struct; enums and tuple structs have no
/// column names to reflect.
pub fn struct_fields(input: &DeriveInput) -> syn::Result<Vec<Field>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields.named.iter().cloned().collect()),
            _ => Err(syn::Error::new_spanned(
                input,
                "Model can only be derived for structs with named fields",
            )),
        },
        _ => Err(syn::Error::new_spanned(input, "Model can only be derived for structs")),
    }
}

/// `Option<T>` -> `(true, T)`; anything else -> `(false, original)`.
pub fn check_option_type(ty: &Type) -> (bool, Type) {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return (true, inner.clone());
                    }
                }
            }
        }
    }
    (false, ty.clone())
}

/// The last path segment of a type, e.g. `i64`, `String`, `Vec`, `DateTime`.
pub fn type_name(ty: &Type) -> String {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            return segment.ident.to_string();
        }
    }
    "Unknown".to_string()
}

/// True if `ty` is exactly `Vec<u8>`.
pub fn is_byte_vec(ty: &Type) -> bool {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Vec" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(Type::Path(inner))) = args.args.first() {
                        return inner.path.is_ident("u8");
                    }
                }
            }
        }
    }
    false
}
