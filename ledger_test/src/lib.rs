use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one, set up logging,
/// and inject dependencies.
///
/// The only injectable dependency is a [`rocket::local::asynchronous::Client`]
/// for the server returned by `crate::test_rocket()`, which keeps its audit
/// trail in memory. Every test gets a fresh ledger.
#[proc_macro_attribute]
pub fn ledger_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    if !args.is_empty() {
        return syn::Error::new(args.span(), "`ledger_test` takes no arguments")
            .into_compile_error()
            .into();
    }

    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the arguments to inject and reject invalid function signatures.
    let test_args = match check_sig(&item_fn.sig) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["ballot_ledger"],
                None,
                None,
            );

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let rocket_client = rocket::local::asynchronous::Client::tracked(crate::test_rocket())
                    .await
                    .unwrap();
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, and extract the parameters to inject.
fn check_sig(sig: &Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args = vec![];
    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                let is_client = type_path
                    .path
                    .segments
                    .last()
                    .map_or(false, |segment| segment.ident == "Client");
                if is_client {
                    if !args.is_empty() {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                        ));
                    }
                    args.push(quote! { rocket_client });
                    continue;
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected `client_ident: Client`",
        ));
    }

    Ok(args)
}
