//! Call-site macro surface: `log!`/`trace!`/`debug!`/`info!`/.../`critical!`.
//!
//! Grounded on the frontend's documented contract (`ttlog::frontend::Frontend::log`):
//! every expansion builds one `'static MacroMetadata` for its call site,
//! monomorphizes a `DecodeFn` for its argument tuple, and forwards to
//! `Frontend::log`. No engine semantics live here; this crate only saves a
//! call site from writing that boilerplate by hand, the same role
//! duck-ttlog's own proc-macro crate plays alongside its engine.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Expr, Ident, LitStr, Token};

/// `log!(Level, frontend_expr, logger_expr, "fmt {}", args...)`.
struct LogInvocation {
  level: Ident,
  frontend: Expr,
  logger: Expr,
  format: LitStr,
  args: Vec<Expr>,
}

impl Parse for LogInvocation {
  fn parse(input: ParseStream) -> syn::Result<Self> {
    let level: Ident = input.parse()?;
    input.parse::<Token![,]>()?;
    let frontend: Expr = input.parse()?;
    input.parse::<Token![,]>()?;
    let logger: Expr = input.parse()?;
    input.parse::<Token![,]>()?;
    let format: LitStr = input.parse()?;

    let mut args = Vec::new();
    while input.parse::<Token![,]>().is_ok() {
      if input.is_empty() {
        break;
      }
      args.push(input.parse()?);
    }

    Ok(Self { level, frontend, logger, format, args })
  }
}

/// Expands to a `'static MacroMetadata` plus a `Frontend::log` call. Every
/// argument is converted through `ToString` and carried as a `String`, so
/// the monomorphized argument tuple (and the `DecodeFn` the frontend's
/// wire format stores a pointer to) depends only on the argument count,
/// not each argument's original type.
#[proc_macro]
pub fn log(input: TokenStream) -> TokenStream {
  let LogInvocation { level, frontend, logger, format, args } = parse_macro_input!(input as LogInvocation);

  let level_variant = Ident::new(&level.to_string(), Span::call_site());
  let arg_types = args.iter().map(|_| quote! { String });
  let arg_conversions = args.iter().map(|a| quote! { ::std::string::ToString::to_string(&(#a)) });

  let expanded = quote! {
    {
      static __TTLOG_METADATA: ::ttlog::metadata::MacroMetadata = ::ttlog::metadata::MacroMetadata::new(
        concat!(file!(), ":", line!()),
        module_path!(),
        #format,
        "",
        ::ttlog::level::LogLevel::#level_variant,
        ::ttlog::metadata::EventKind::Log,
      );
      ::ttlog::frontend::Frontend::log(
        #frontend,
        #logger,
        &__TTLOG_METADATA,
        ::ttlog::codec::decode_fn::<(#(#arg_types,)*)>(),
        (#(#arg_conversions,)*),
      )
    }
  };

  expanded.into()
}

macro_rules! level_macro {
  ($name:ident, $variant:ident) => {
    #[proc_macro]
    pub fn $name(input: TokenStream) -> TokenStream {
      prefix_level(input, stringify!($variant))
    }
  };
}

fn prefix_level(input: TokenStream, variant: &str) -> TokenStream {
  let args = proc_macro2::TokenStream::from(input);
  let level = Ident::new(variant, Span::call_site());
  log(quote! { #level, #args }.into())
}

level_macro!(trace, TraceL1);
level_macro!(debug, Debug);
level_macro!(info, Info);
level_macro!(notice, Notice);
level_macro!(warn, Warning);
level_macro!(error, Error);
level_macro!(critical, Critical);
