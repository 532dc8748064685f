use scraper::{ElementRef, Html};

/// Strips status HTML down to plain text: `<br>` becomes a newline, every
/// other element is dropped but its text content kept, nodes concatenated
/// in document order. Unlike `cairn_fetch`'s page-text extractor (which
/// also inserts newlines at block boundaries for readability), a status
/// body is short enough that only the explicit `<br>` breaks matter.
pub fn strip_html(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    let mut out = String::new();
    if let Some(root) = ElementRef::wrap(fragment.tree.root()) {
        walk(root, &mut out);
    }
    out
}

fn walk(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if child_el.value().name() == "br" {
                out.push('\n');
                continue;
            }
            walk(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s2_literal() {
        let stripped = strip_html("<p>@bot hello <br>world</p>");
        assert_eq!(stripped, "@bot hello \nworld");
    }

    #[test]
    fn nested_elements_keep_text_only() {
        let stripped = strip_html("<p>a <strong>b</strong> c</p>");
        assert_eq!(stripped, "a b c");
    }
}
