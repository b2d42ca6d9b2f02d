//! HTML normalization: OneNote markup → clean convertible HTML.
//!
//! OneNote page bodies carry authoring-tool artefacts that survive a naive
//! HTML→Markdown conversion as noise: machine-generated image alt text,
//! bold styling expressed as `style="font-weight:bold"` spans instead of
//! semantic elements, pasted links whose visible text just repeats the
//! URL, and image sources pointing at the authenticated Graph content
//! endpoint. Each pass here fixes one of those.
//!
//! ## Shape of the pipeline
//!
//! The passes are exposed as two string→string transforms,
//! [`prepare`] and [`apply_images`], with the image downloads happening
//! between them. kuchiki's DOM is `Rc`-based and must not be held across
//! an await point inside a `Send` future, so the document is parsed,
//! mutated and serialized synchronously on each side of the download
//! step. Image elements are correlated positionally: [`prepare`] reports
//! sources in document order and [`apply_images`] rewrites the n-th
//! `<img>` with the n-th download result.

use crate::error::ExportError;
use html5ever::{local_name, namespace_url, ns, QualName};
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use url::Url;

/// Alt text inserted by OneNote's OCR, not authored content.
pub const GENERATED_ALT_PREFIX: &str = "Machine generated alternative text:";

/// Host whose image URLs require a bearer credential to fetch.
const GRAPH_CONTENT_HOST: &str = "graph.microsoft.com";

/// Provider data attributes that are meaningless once the image is local.
const STALE_DATA_ATTRS: [&str; 3] = ["data-src-type", "data-fullres-src", "data-fullres-src-type"];

/// A remote image referenced by the page, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub url: String,
    pub needs_auth: bool,
}

/// Run the synchronous normalization passes and collect image sources.
///
/// Returns the rewritten HTML plus one entry per `<img>` element in
/// document order; `None` marks an image with no usable source URL.
pub fn prepare(html: &str) -> Result<(String, Vec<Option<ImageSource>>), ExportError> {
    let document = kuchiki::parse_html().one(html);
    scrub_generated_alt(&document);
    promote_bold_spans(&document);
    simplify_links(&document);
    let sources = collect_image_sources(&document);
    Ok((serialize(&document)?, sources))
}

/// Rewrite `<img>` sources with the download results from the fetch step.
///
/// `resolved` is positional: the n-th entry belongs to the n-th `<img>`.
/// `None` entries (failed or sourceless images) are left untouched so the
/// reader at least keeps the remote reference.
pub fn apply_images(html: &str, resolved: &[Option<String>]) -> Result<String, ExportError> {
    let document = kuchiki::parse_html().one(html);
    rewrite_image_sources(&document, resolved);
    serialize(&document)
}

fn serialize(document: &NodeRef) -> Result<String, ExportError> {
    let mut out = Vec::new();
    document
        .serialize(&mut out)
        .map_err(|e| ExportError::Internal(format!("HTML serialization failed: {e}")))?;
    String::from_utf8(out).map_err(|e| ExportError::Internal(format!("non-UTF-8 HTML: {e}")))
}

// ── Pass 1: alt-text scrub ───────────────────────────────────────────────

/// Clear alt text that begins with the OCR marker phrase.
fn scrub_generated_alt(document: &NodeRef) {
    let Ok(images) = document.select("img") else {
        return;
    };
    for img in images {
        let mut attrs = img.attributes.borrow_mut();
        if attrs
            .get("alt")
            .is_some_and(|alt| alt.starts_with(GENERATED_ALT_PREFIX))
        {
            attrs.insert("alt", String::new());
        }
    }
}

// ── Pass 2: bold-span promotion ──────────────────────────────────────────

/// Replace spans whose inline style declares bold weight with a `<b>`
/// element holding the span's children.
fn promote_bold_spans(document: &NodeRef) {
    let Ok(spans) = document.select("span") else {
        return;
    };
    // Collected up front: replacing nodes while the selector iterates
    // would walk a tree that is being restructured underneath it.
    let spans: Vec<_> = spans.collect();
    for span in spans {
        let bold = span
            .attributes
            .borrow()
            .get("style")
            .is_some_and(declares_bold);
        if !bold {
            continue;
        }
        let node = span.as_node();
        let replacement = NodeRef::new_element(
            QualName::new(None, ns!(html), local_name!("b")),
            Vec::<(kuchiki::ExpandedName, kuchiki::Attribute)>::new(),
        );
        for child in node.children().collect::<Vec<_>>() {
            child.detach();
            replacement.append(child);
        }
        node.insert_before(replacement);
        node.detach();
    }
}

/// True when an inline style declares `font-weight: bold` or its numeric
/// equivalent `700`.
fn declares_bold(style: &str) -> bool {
    style.split(';').any(|decl| {
        let Some((name, value)) = decl.split_once(':') else {
            return false;
        };
        name.trim().eq_ignore_ascii_case("font-weight")
            && matches!(value.trim().to_ascii_lowercase().as_str(), "bold" | "700")
    })
}

// ── Pass 3: image source collection / rewriting ──────────────────────────

/// One entry per `<img>` in document order; `data-fullres-src` wins over
/// `src` when both are present.
fn collect_image_sources(document: &NodeRef) -> Vec<Option<ImageSource>> {
    let Ok(images) = document.select("img") else {
        return Vec::new();
    };
    images
        .map(|img| {
            let attrs = img.attributes.borrow();
            let url = attrs
                .get("data-fullres-src")
                .filter(|s| !s.is_empty())
                .or_else(|| attrs.get("src").filter(|s| !s.is_empty()))
                .map(str::to_string)?;
            let needs_auth = is_graph_content_url(&url);
            Some(ImageSource { url, needs_auth })
        })
        .collect()
}

fn rewrite_image_sources(document: &NodeRef, resolved: &[Option<String>]) {
    let Ok(images) = document.select("img") else {
        return;
    };
    for (img, local) in images.zip(resolved.iter()) {
        let Some(local) = local else {
            continue;
        };
        let mut attrs = img.attributes.borrow_mut();
        attrs.insert("src", local.clone());
        for attr in STALE_DATA_ATTRS {
            attrs.remove(attr);
        }
    }
}

fn is_graph_content_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == GRAPH_CONTENT_HOST))
        .unwrap_or(false)
}

// ── Pass 4: link simplification ──────────────────────────────────────────

/// Replace anchors whose visible text exactly equals their href with a
/// plain text node, dropping the redundant markup of pasted links.
fn simplify_links(document: &NodeRef) {
    let Ok(anchors) = document.select("a") else {
        return;
    };
    let anchors: Vec<_> = anchors.collect();
    for anchor in anchors {
        let href = match anchor.attributes.borrow().get("href") {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => continue,
        };
        let node = anchor.as_node();
        if node.text_contents().trim() == href {
            node.insert_before(NodeRef::new_text(href));
            node.detach();
        }
    }
}
