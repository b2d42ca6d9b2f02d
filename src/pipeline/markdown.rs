//! Markdown rendering: normalized HTML → canonical Markdown text.
//!
//! Structural conversion (headings, lists, emphasis, links, images,
//! tables) is delegated to [`htmd`]; this module only owns the
//! whitespace canonicalization applied afterwards. OneNote's HTML is
//! generated markup — absolutely positioned divs, empty paragraphs,
//! per-element styles — and the raw conversion is full of stray blank
//! lines and trailing spaces. Canonicalization is a single line-by-line
//! pass, so the same normalized HTML always yields byte-identical
//! Markdown.

use crate::error::ExportError;
use htmd::HtmlToMarkdown;

/// Convert normalized HTML to canonical Markdown.
pub fn render(html: &str) -> Result<String, ExportError> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "head", "title", "meta", "link"])
        .build();
    let markdown = converter
        .convert(html)
        .map_err(|e| ExportError::Internal(format!("markdown conversion failed: {e}")))?;
    Ok(tidy(&markdown))
}

/// Canonicalize whitespace: trim trailing spaces per line, collapse runs
/// of blank lines to a single blank line, and drop leading/trailing blank
/// lines from the document.
pub fn tidy(markdown: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = false;
    for line in markdown.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if !prev_blank {
                lines.push("");
            }
            prev_blank = true;
        } else {
            lines.push(line);
            prev_blank = false;
        }
    }

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_collapses_blank_runs() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(tidy(input), "a\n\nb");
    }

    #[test]
    fn tidy_strips_document_edges() {
        let input = "\n\n\nhello\n\n\n";
        assert_eq!(tidy(input), "hello");
    }

    #[test]
    fn tidy_trims_trailing_whitespace() {
        assert_eq!(tidy("hello   \nworld\t"), "hello\nworld");
    }

    #[test]
    fn tidy_whitespace_only_lines_count_as_blank() {
        assert_eq!(tidy("a\n   \n\t\nb"), "a\n\nb");
    }

    #[test]
    fn tidy_empty_input() {
        assert_eq!(tidy(""), "");
        assert_eq!(tidy("\n\n\n"), "");
    }

    #[test]
    fn render_is_deterministic() {
        let html = "<h1>Title</h1><p>one</p><p>two</p>";
        let a = render(html).expect("render");
        let b = render(html).expect("render");
        assert_eq!(a, b);
    }

    #[test]
    fn render_preserves_structure() {
        let html = "<h2>Section</h2><ul><li>one</li><li>two</li></ul>\
                    <p><b>bold</b> and <a href=\"https://example.org/doc\">a link</a></p>";
        let md = render(html).expect("render");
        assert!(md.contains("## Section"), "got: {md}");
        assert!(md.contains("one"), "got: {md}");
        assert!(md.contains("**bold**"), "got: {md}");
        assert!(md.contains("[a link](https://example.org/doc)"), "got: {md}");
    }

    #[test]
    fn render_keeps_images() {
        let html = r#"<p><img src="images/pic.png" alt="a pic"></p>"#;
        let md = render(html).expect("render");
        assert!(md.contains("![a pic](images/pic.png)"), "got: {md}");
    }

    #[test]
    fn render_drops_script_and_style() {
        let html = "<p>keep</p><script>var x = 1;</script><style>p{}</style>";
        let md = render(html).expect("render");
        assert!(md.contains("keep"));
        assert!(!md.contains("var x"));
        assert!(!md.contains("p{}"));
    }
}
