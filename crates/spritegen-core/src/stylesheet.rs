use crate::model::SpriteElement;
use std::fmt::Write;

/// One CSS rule for a positioned element.
/// Shape: `.name {background-image: url('url?fp');background-position: -Xpx -Ypx;width: Wpx;height: Hpx;}`.
pub fn rule(element: &SpriteElement, url: &str, fingerprint: &str) -> String {
    let (x, y) = element.content_origin();
    format!(
        ".{} {{background-image: url('{}?{}');background-position: -{}px -{}px;width: {}px;height: {}px;}}",
        element.name,
        url,
        fingerprint,
        x,
        y,
        element.width(),
        element.height(),
    )
}

/// Stylesheet with one rule per element, in the order given (placement order), newline separated.
pub fn emit(elements: &[SpriteElement], url: &str, fingerprint: &str) -> String {
    let mut css = String::new();
    for e in elements {
        // writing into a String cannot fail
        let _ = writeln!(css, "{}", rule(e, url, fingerprint));
    }
    css
}
