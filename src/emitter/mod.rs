//! Terminal stages: markup and text emitters writing to an [`Output`].

mod escape;
mod markup;
mod output;
mod text;

pub use escape::{escape_attribute, escape_html_attribute, escape_html_text, escape_text};
pub use markup::{Flavor, MarkupEmitter};
pub use output::{
    Charset, Destination, DestinationResolver, FileResolver, Output, SharedBuffer, SharedString,
};
pub use text::TextEmitter;

use log::debug;

use crate::context::PipelineContext;
use crate::diagnostics::Diagnostic;
use crate::options::SharedProperties;

/// Resolves the configured encoding for `output`.
///
/// An unsupported name is reported once as `SESU0007`; the output then uses
/// UTF-8 and the recorded `encoding` property says so.
pub(crate) fn resolve_charset(
    props: &SharedProperties,
    ctx: &PipelineContext,
    output: &mut Output,
) -> Charset {
    let (name, bom) = {
        let p = props.borrow();
        (p.encoding().to_owned(), p.byte_order_mark())
    };
    let charset = match Charset::for_name(&name) {
        Some(charset) => charset,
        None => {
            ctx.report(Diagnostic::warning(
                "SESU0007",
                format!("encoding '{name}' is not supported; falling back to UTF-8"),
            ));
            props.borrow_mut().set_encoding("UTF-8");
            Charset::Utf8
        }
    };
    debug!("output encoding {} (requested '{name}')", charset.name());
    output.set_charset(charset, bom);
    charset
}
