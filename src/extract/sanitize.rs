//! Markup cleanup before content search.

use once_cell::sync::Lazy;
use scraper::node::Text;
use scraper::{Html, Node, Selector};

/// Structural and non-content elements removed wholesale.
const DENYLIST: &str = "script, style, noscript, template, iframe, object, embed, img, picture, \
     video, audio, canvas, button, input, select, textarea, nav, footer, header, aside, form, \
     figure, svg, path, meta, link";

static DENYLIST_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(DENYLIST).expect("valid denylist selector"));
static HIDDEN_CANDIDATES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[style], [hidden], [aria-hidden=true]").expect("valid hidden selector"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid anchor selector"));

/// Remove denylisted and hidden elements, then replace every hyperlink with
/// its plain text.
pub fn sanitize(doc: &mut Html) {
    let mut doomed: Vec<_> = doc.select(&DENYLIST_SELECTOR).map(|el| el.id()).collect();
    doomed.extend(
        doc.select(&HIDDEN_CANDIDATES)
            .filter(|el| is_hidden(el.value().attr("style"), el.value().attr("hidden"), el.value().attr("aria-hidden")))
            .map(|el| el.id()),
    );
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    let anchors: Vec<_> = doc
        .select(&ANCHORS)
        .map(|el| (el.id(), el.text().collect::<String>()))
        .collect();
    for (id, text) in anchors {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.insert_before(Node::Text(Text { text: text.into() }));
            node.detach();
        }
    }
}

fn is_hidden(style: Option<&str>, hidden: Option<&str>, aria_hidden: Option<&str>) -> bool {
    if hidden.is_some() || aria_hidden.is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return true;
    }
    style.is_some_and(|s| {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none") || compact.contains("visibility:hidden")
    })
}
