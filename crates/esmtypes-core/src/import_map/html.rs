//! Import-map extraction from HTML documents.

use scraper::{Html, Selector};

/// Return the raw text of the first `<script type="importmap">` element.
///
/// Only the first matching element in document order is considered. Its body
/// must be a single text node, otherwise there is no map. The text is
/// returned verbatim for the caller to parse.
#[must_use]
pub fn extract(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script[type]").ok()?;

    let script = document.select(&selector).find(|script| {
        script
            .value()
            .attr("type")
            .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("importmap"))
    })?;

    let mut children = script.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    let text: &str = only.value().as_text()?;
    Some(text.to_string())
}
