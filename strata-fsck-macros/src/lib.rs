use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Seconds a test may run before the watchdog aborts it.
const WATCHDOG_SECS: u64 = 60;

/// Attribute macro for async checker tests.
///
/// Installs the tracing subscriber and runs the body under a watchdog
/// timeout. Checksum scans are allowed to hang by contract, so a scheduler
/// bug that wedges a test has to fail the suite instead of freezing it.
/// Extra arguments pass through to `#[tokio::test]`:
///
/// #[strata_fsck::test(flavor = "multi_thread")]
/// async fn my_test() { ... }
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let tokio_args = proc_macro2::TokenStream::from(attr);
    let tokio_attr = if tokio_args.is_empty() {
        quote! { #[tokio::test] }
    } else {
        quote! { #[tokio::test(#tokio_args)] }
    };

    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let name = &input.sig.ident;

    let output = quote! {
        #tokio_attr
        #vis #sig {
            strata_fsck::trace::with_test_tracing(stringify!(#name), || async move {
                let watchdog = std::time::Duration::from_secs(#WATCHDOG_SECS);
                match tokio::time::timeout(watchdog, async move { #block }).await {
                    Ok(value) => value,
                    Err(_) => panic!(
                        "test {} did not finish within {:?}",
                        stringify!(#name),
                        watchdog
                    ),
                }
            })
            .await
        }
    };
    output.into()
}
