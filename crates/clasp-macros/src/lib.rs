use proc_macro::TokenStream;
use proc_macro2::{Literal, Span};
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, ExprUnary, Fields, GenericArgument, Ident, Lit,
    LitBool, LitChar, LitStr, PathArguments, Result, Token, Type, UnOp, meta::ParseNestedMeta,
    parse_macro_input,
};

/// Derive `clasp::Command` for a struct with named fields.
///
/// ```ignore
/// /// Compile the project.
/// #[derive(Debug, Default, clasp::Command)]
/// #[command(name = "build", alias = "b", example = "tool build -o out src")]
/// struct Build {
///     /// Output directory.
///     #[option(long = "output", short = 'o', required)]
///     output: String,
///     #[option(short = 'j', default = 4)]
///     jobs: u32,
///     #[option(long = "define", short = 'D')]
///     defines: Vec<String>,
///     #[value(required)]
///     source: String,
///     #[value]
///     extra: Vec<String>,
/// }
/// ```
///
/// Struct attribute keys: `name`, `alias`, `help`, `description`, `parent`,
/// `default`, `hidden`, `help_order`, `example`, `ignore_unknown_options`,
/// `ignore_additional_values`.
///
/// Field attributes: `#[option(long, short, required, default, help,
/// help_order, hidden)]` and `#[value(order, name, required, default, help)]`.
/// Fields without either attribute are left at their `Default` value.
#[proc_macro_derive(Command, attributes(command, option, value))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_command(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct CommandSpec {
    name: Option<String>,
    aliases: Vec<String>,
    help: Option<String>,
    description: Option<String>,
    parent: Option<Type>,
    is_default: bool,
    hidden: bool,
    help_order: i32,
    examples: Vec<String>,
    ignore_unknown_options: Option<bool>,
    ignore_additional_values: Option<bool>,
}

#[derive(Default)]
struct OptionSpec {
    long: Vec<String>,
    short: Vec<char>,
    required: bool,
    default: Option<Expr>,
    help: Option<String>,
    help_order: i32,
    hidden: bool,
}

#[derive(Default)]
struct ValueSpec {
    order: Option<i32>,
    name: Option<String>,
    required: bool,
    default: Option<Expr>,
    help: Option<String>,
}

enum Binding {
    Option(OptionSpec),
    Value(ValueSpec),
}

/// How a field stores what it receives.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Optional,
    List,
}

struct FieldSpec<'a> {
    ident: &'a Ident,
    target: String,
    shape: Shape,
    inner: &'a Type,
    doc: Doc,
    binding: Binding,
}

fn expand_command(input: &DeriveInput) -> Result<proc_macro2::TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "#[derive(Command)] needs named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "#[derive(Command)] only supports structs",
            ));
        }
    };

    let mut spec = CommandSpec::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("command")) {
        attr.parse_nested_meta(|meta| parse_command_key(&mut spec, &meta))?;
    }
    let doc = Doc::from_attrs(&input.attrs);

    let mut specs = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let Some(binding) = parse_binding(&field.attrs)? else {
            continue;
        };
        let (shape, inner) = shape_of(&field.ty);
        specs.push(FieldSpec {
            ident,
            target: unraw(ident),
            shape,
            inner,
            doc: Doc::from_attrs(&field.attrs),
            binding,
        });
    }

    let name = spec
        .name
        .clone()
        .unwrap_or_else(|| command_name(&input.ident.to_string()));
    let meta_expr = meta_expr(&spec, &doc, &name, &specs)?;
    let set_arms = specs.iter().map(set_arm);
    let parent_fn = spec.parent.as_ref().map(|parent| {
        quote! {
            fn parent() -> ::std::option::Option<::std::any::TypeId> {
                ::std::option::Option::Some(::std::any::TypeId::of::<#parent>())
            }
        }
    });

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::clasp::Command for #ident #ty_generics #where_clause {
            fn meta() -> ::clasp::metadata::CommandMeta {
                #meta_expr
            }

            #parent_fn

            #[allow(unused_variables)]
            fn set(
                &mut self,
                target: &str,
                value: ::clasp::Value,
            ) -> ::std::result::Result<(), ::clasp::BindError> {
                match target {
                    #(#set_arms)*
                    other => ::std::result::Result::Err(
                        ::clasp::BindError::UnknownTarget(other.to_string()),
                    ),
                }
            }
        }
    })
}

fn parse_command_key(spec: &mut CommandSpec, meta: &ParseNestedMeta<'_>) -> Result<()> {
    let key = meta_key(meta)?;
    match key.as_str() {
        "name" => spec.name = Some(lit_str(meta)?),
        "alias" => spec.aliases.push(lit_str(meta)?),
        "help" => spec.help = Some(lit_str(meta)?),
        "description" => spec.description = Some(lit_str(meta)?),
        "parent" => spec.parent = Some(meta.value()?.parse::<Type>()?),
        "default" => spec.is_default = flag(meta)?,
        "hidden" => spec.hidden = flag(meta)?,
        "help_order" => spec.help_order = lit_i32(meta)?,
        "example" => spec.examples.push(lit_str(meta)?),
        "ignore_unknown_options" => spec.ignore_unknown_options = Some(flag(meta)?),
        "ignore_additional_values" => spec.ignore_additional_values = Some(flag(meta)?),
        other => return Err(meta.error(format!("unknown command attribute: {other}"))),
    }
    Ok(())
}

fn parse_binding(attrs: &[Attribute]) -> Result<Option<Binding>> {
    let mut binding = None;
    for attr in attrs {
        let is_option = attr.path().is_ident("option");
        if !is_option && !attr.path().is_ident("value") {
            continue;
        }
        if binding.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                "a field takes one #[option] or #[value] attribute",
            ));
        }
        // `#[value]` with no arguments is allowed.
        let has_args = matches!(attr.meta, syn::Meta::List(_));
        if is_option {
            let mut spec = OptionSpec::default();
            if has_args {
                attr.parse_nested_meta(|meta| parse_option_key(&mut spec, &meta))?;
            }
            binding = Some(Binding::Option(spec));
        } else {
            let mut spec = ValueSpec::default();
            if has_args {
                attr.parse_nested_meta(|meta| parse_value_key(&mut spec, &meta))?;
            }
            binding = Some(Binding::Value(spec));
        }
    }
    Ok(binding)
}

fn parse_option_key(spec: &mut OptionSpec, meta: &ParseNestedMeta<'_>) -> Result<()> {
    let key = meta_key(meta)?;
    match key.as_str() {
        "long" => spec.long.push(lit_str(meta)?),
        "short" => spec.short.push(meta.value()?.parse::<LitChar>()?.value()),
        "required" => spec.required = flag(meta)?,
        "default" => spec.default = Some(meta.value()?.parse::<Expr>()?),
        "help" => spec.help = Some(lit_str(meta)?),
        "help_order" => spec.help_order = lit_i32(meta)?,
        "hidden" => spec.hidden = flag(meta)?,
        other => return Err(meta.error(format!("unknown option attribute: {other}"))),
    }
    Ok(())
}

fn parse_value_key(spec: &mut ValueSpec, meta: &ParseNestedMeta<'_>) -> Result<()> {
    let key = meta_key(meta)?;
    match key.as_str() {
        "order" => spec.order = Some(lit_i32(meta)?),
        "name" => spec.name = Some(lit_str(meta)?),
        "required" => spec.required = flag(meta)?,
        "default" => spec.default = Some(meta.value()?.parse::<Expr>()?),
        "help" => spec.help = Some(lit_str(meta)?),
        other => return Err(meta.error(format!("unknown value attribute: {other}"))),
    }
    Ok(())
}

fn meta_key(meta: &ParseNestedMeta<'_>) -> Result<String> {
    meta.path
        .get_ident()
        .map(|i| i.to_string())
        .ok_or_else(|| meta.error("expected a plain key"))
}

fn lit_str(meta: &ParseNestedMeta<'_>) -> Result<String> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}

/// `key` alone means true; `key = bool` sets it explicitly.
fn flag(meta: &ParseNestedMeta<'_>) -> Result<bool> {
    if meta.input.peek(Token![=]) {
        Ok(meta.value()?.parse::<LitBool>()?.value())
    } else {
        Ok(true)
    }
}

fn lit_i32(meta: &ParseNestedMeta<'_>) -> Result<i32> {
    let expr = meta.value()?.parse::<Expr>()?;
    match &expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(n), ..
        }) => n.base10_parse::<i32>(),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr: inner,
            ..
        }) => match inner.as_ref() {
            Expr::Lit(ExprLit {
                lit: Lit::Int(n), ..
            }) => n.base10_parse::<i32>().map(|n| -n),
            _ => Err(syn::Error::new_spanned(&expr, "expected an integer")),
        },
        _ => Err(syn::Error::new_spanned(&expr, "expected an integer")),
    }
}

/// Doc comment text: the first paragraph is the short help, the rest the
/// long description.
#[derive(Default)]
struct Doc {
    summary: String,
    body: String,
}

impl Doc {
    fn from_attrs(attrs: &[Attribute]) -> Self {
        let lines: Vec<String> = attrs
            .iter()
            .filter(|a| a.path().is_ident("doc"))
            .filter_map(|a| match &a.meta {
                syn::Meta::NameValue(nv) => match &nv.value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(s), ..
                    }) => Some(s.value().trim().to_string()),
                    _ => None,
                },
                _ => None,
            })
            .collect();

        let split = lines.iter().position(|l| l.is_empty()).unwrap_or(lines.len());
        let summary = lines[..split].join(" ");
        let body = lines[split..]
            .iter()
            .skip_while(|l| l.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        Self { summary, body }
    }
}

fn meta_expr(
    spec: &CommandSpec,
    doc: &Doc,
    name: &str,
    fields: &[FieldSpec<'_>],
) -> Result<proc_macro2::TokenStream> {
    let name = LitStr::new(name, Span::call_site());
    let mut calls = Vec::new();

    for alias in &spec.aliases {
        calls.push(quote! { .alias(#alias) });
    }
    let help = spec.help.clone().unwrap_or_else(|| doc.summary.clone());
    if !help.is_empty() {
        calls.push(quote! { .help(#help) });
    }
    let description = spec.description.clone().unwrap_or_else(|| doc.body.clone());
    if !description.is_empty() {
        calls.push(quote! { .description(#description) });
    }
    if spec.hidden {
        calls.push(quote! { .hidden() });
    }
    if spec.is_default {
        calls.push(quote! { .default_command() });
    }
    if spec.help_order != 0 {
        let order = spec.help_order;
        calls.push(quote! { .help_order(#order) });
    }
    for example in &spec.examples {
        calls.push(quote! { .example(#example) });
    }
    if let Some(ignore) = spec.ignore_unknown_options {
        calls.push(quote! { .ignore_unknown_options(#ignore) });
    }
    if let Some(ignore) = spec.ignore_additional_values {
        calls.push(quote! { .ignore_additional_values(#ignore) });
    }

    for field in fields {
        let target = &field.target;
        let inner = field.inner;
        let kind = quote! { <#inner as ::clasp::Bindable>::kind() };
        let multiple = (field.shape == Shape::List).then(|| quote! { .multiple() });
        match &field.binding {
            Binding::Option(opt) => {
                let mut names = Vec::new();
                let longs = if opt.long.is_empty() && opt.short.is_empty() {
                    vec![target.replace('_', "-")]
                } else {
                    opt.long.clone()
                };
                for long in longs {
                    names.push(quote! { .long(#long) });
                }
                for short in &opt.short {
                    names.push(quote! { .short(#short) });
                }
                let required = opt.required.then(|| quote! { .required() });
                let default = opt.default.as_ref().map(default_expr).transpose()?;
                let default = default.map(|d| quote! { .default_value(#d) });
                let help = opt.help.clone().unwrap_or_else(|| field.doc.summary.clone());
                let help_order = opt.help_order;
                let hidden = opt.hidden.then(|| quote! { .hidden() });
                calls.push(quote! {
                    .option(
                        ::clasp::metadata::option(#target)
                            #(#names)*
                            .kind(#kind)
                            #multiple
                            #required
                            #default
                            .help(#help)
                            .help_order(#help_order)
                            #hidden
                    )
                });
            }
            Binding::Value(val) => {
                let display = val.name.clone().unwrap_or_else(|| target.clone());
                let order = val.order.map(|o| quote! { .order(#o) });
                let required = val.required.then(|| quote! { .required() });
                let default = val.default.as_ref().map(default_expr).transpose()?;
                let default = default.map(|d| quote! { .default_value(#d) });
                let help = val.help.clone().unwrap_or_else(|| field.doc.summary.clone());
                calls.push(quote! {
                    .value(
                        ::clasp::metadata::value(#target)
                            .name(#display)
                            #order
                            .kind(#kind)
                            #multiple
                            #required
                            #default
                            .help(#help)
                    )
                });
            }
        }
    }

    Ok(quote! {
        ::clasp::metadata::meta(#name)
            #(#calls)*
            .build()
    })
}

/// Turn a literal default into a `clasp::Value` expression. The value is
/// coerced to the slot's kind when the command tree is built.
fn default_expr(expr: &Expr) -> Result<proc_macro2::TokenStream> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Str(s) => Ok(quote! { ::clasp::Value::Str(::std::string::String::from(#s)) }),
            Lit::Bool(b) => Ok(quote! { ::clasp::Value::Bool(#b) }),
            Lit::Int(n) => match n.base10_parse::<i64>() {
                Ok(v) => {
                    let v = Literal::i64_suffixed(v);
                    Ok(quote! { ::clasp::Value::Int(#v) })
                }
                Err(_) => {
                    let v = Literal::u64_suffixed(n.base10_parse::<u64>()?);
                    Ok(quote! { ::clasp::Value::UInt(#v) })
                }
            },
            Lit::Float(f) => {
                let v = Literal::f64_suffixed(f.base10_parse::<f64>()?);
                Ok(quote! { ::clasp::Value::Float(#v) })
            }
            _ => Err(syn::Error::new_spanned(expr, "unsupported default literal")),
        },
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr: inner,
            ..
        }) => match inner.as_ref() {
            Expr::Lit(ExprLit {
                lit: Lit::Int(n), ..
            }) => {
                let v = Literal::i64_suffixed(-n.base10_parse::<i64>()?);
                Ok(quote! { ::clasp::Value::Int(#v) })
            }
            Expr::Lit(ExprLit {
                lit: Lit::Float(f), ..
            }) => {
                let v = Literal::f64_suffixed(-f.base10_parse::<f64>()?);
                Ok(quote! { ::clasp::Value::Float(#v) })
            }
            _ => Err(syn::Error::new_spanned(expr, "unsupported default")),
        },
        Expr::Array(array) => {
            let items = array
                .elems
                .iter()
                .map(default_expr)
                .collect::<Result<Vec<_>>>()?;
            Ok(quote! { ::clasp::Value::List(::std::vec![#(#items),*]) })
        }
        _ => Err(syn::Error::new_spanned(
            expr,
            "default must be a literal or an array of literals",
        )),
    }
}

fn set_arm(field: &FieldSpec<'_>) -> proc_macro2::TokenStream {
    let ident = field.ident;
    let target = &field.target;
    let inner = field.inner;
    let convert = quote! { <#inner as ::clasp::Bindable>::from_value(value)? };
    let store = match field.shape {
        Shape::Scalar => quote! { self.#ident = #convert; },
        Shape::Optional => quote! { self.#ident = ::std::option::Option::Some(#convert); },
        Shape::List => quote! { self.#ident.push(#convert); },
    };
    quote! {
        #target => {
            #store
            ::std::result::Result::Ok(())
        }
    }
}

/// Detect `Option<T>` and `Vec<T>` by their last path segment.
fn shape_of(ty: &Type) -> (Shape, &Type) {
    let Type::Path(path) = ty else {
        return (Shape::Scalar, ty);
    };
    let Some(last) = path.path.segments.last() else {
        return (Shape::Scalar, ty);
    };
    let shape = match last.ident.to_string().as_str() {
        "Option" => Shape::Optional,
        "Vec" => Shape::List,
        _ => return (Shape::Scalar, ty),
    };
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return (Shape::Scalar, ty);
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => (shape, inner),
        _ => (Shape::Scalar, ty),
    }
}

fn unraw(ident: &Ident) -> String {
    let s = ident.to_string();
    s.strip_prefix("r#").map(str::to_string).unwrap_or(s)
}

/// `RemoteAddCommand` becomes `remote-add`.
fn command_name(type_name: &str) -> String {
    let base = type_name
        .strip_suffix("Command")
        .filter(|b| !b.is_empty())
        .unwrap_or(type_name);
    let mut out = String::new();
    for (idx, c) in base.chars().enumerate() {
        if c.is_uppercase() {
            if idx > 0 {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else if c == '_' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_are_kebab_case_without_suffix() {
        assert_eq!(command_name("BuildCommand"), "build");
        assert_eq!(command_name("RemoteAdd"), "remote-add");
        assert_eq!(command_name("Command"), "command");
    }

    #[test]
    fn collection_and_optional_fields_are_detected() {
        let ty: Type = syn::parse_quote!(Vec<String>);
        assert!(shape_of(&ty).0 == Shape::List);
        let ty: Type = syn::parse_quote!(std::option::Option<u8>);
        assert!(shape_of(&ty).0 == Shape::Optional);
        let ty: Type = syn::parse_quote!(PathBuf);
        assert!(shape_of(&ty).0 == Shape::Scalar);
    }

    #[test]
    fn doc_comments_split_into_summary_and_body() {
        let input: DeriveInput = syn::parse_quote! {
            /// Compile the
            /// project.
            ///
            /// Longer text.
            struct Build;
        };
        let doc = Doc::from_attrs(&input.attrs);
        assert_eq!(doc.summary, "Compile the project.");
        assert_eq!(doc.body, "Longer text.");
    }

    #[test]
    fn unknown_keys_are_compile_errors() {
        let input: DeriveInput = syn::parse_quote! {
            #[command(nmae = "oops")]
            struct Build;
        };
        let err = expand_command(&input).err().unwrap();
        assert!(err.to_string().contains("unknown command attribute: nmae"));
    }

    #[test]
    fn tuple_structs_are_rejected() {
        let input: DeriveInput = syn::parse_quote! {
            struct Build(String);
        };
        assert!(expand_command(&input).is_err());
    }
}
