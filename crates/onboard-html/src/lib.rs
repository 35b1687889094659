//! HTML splicing helpers for generated build reports.
//!
//! Test reports written by the build tool reference their stylesheets with
//! relative `<link>` tags, which break once the HTML is served from another
//! origin. These helpers embed the stylesheet text directly in the document.

/// Wrap stylesheet text in a `<style>` element.
pub fn style_block(css: &str) -> String {
    format!("<style>{css}</style>")
}

/// Splice a `<style>` block containing `css` into an HTML document.
///
/// The block lands at the best location available:
///
/// 1. Immediately before `</head>` if present
/// 2. After the `<body>` opening tag if present
/// 3. Prepended to the document otherwise
///
/// Only the first `</head>` is used.
///
/// # Example
///
/// ```
/// use onboard_html::inline_stylesheet;
///
/// let html = "<html><head><title>Report</title></head><body>ok</body></html>";
/// let result = inline_stylesheet(html, "body { color: red; }");
/// assert!(result.contains("<style>body { color: red; }</style></head>"));
/// ```
pub fn inline_stylesheet(html: &str, css: &str) -> String {
    let block = style_block(css);

    if let Some(pos) = find_ignore_case(html, "</head>") {
        let mut result = String::with_capacity(html.len() + block.len());
        result.push_str(&html[..pos]);
        result.push_str(&block);
        result.push_str(&html[pos..]);
        result
    } else if let Some(pos) = find_ignore_case(html, "<body") {
        match html[pos..].find('>') {
            Some(close) => {
                let insert_at = pos + close + 1;
                let mut result = String::with_capacity(html.len() + block.len() + 1);
                result.push_str(&html[..insert_at]);
                result.push('\n');
                result.push_str(&block);
                result.push_str(&html[insert_at..]);
                result
            },
            None => format!("{block}\n{html}"),
        }
    } else {
        format!("{block}\n{html}")
    }
}

/// Join several stylesheets in order, separated by a single space.
pub fn join_stylesheets<I, S>(sheets: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sheets
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

// Tag names are ASCII, so byte offsets from the lowered copy are valid in the original.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}
