//! Page-hierarchy reconstruction.
//!
//! The Graph pages listing is flat: each record carries a nesting `level`
//! (0 = top of the section) and an `order` sort key, and the parent/child
//! relationships have to be rebuilt from those. The listing is not
//! guaranteed to be well formed — pages can arrive whose parent was
//! deleted, filtered out, or simply never returned — so the builder is
//! deliberately lenient: a page with no reachable parent is demoted to a
//! root instead of failing the export. A diagnostic is logged per demotion
//! so malformed notebooks are visible without being fatal.
//!
//! ## Parent resolution
//!
//! After a stable `(order, level)` sort, the parent of a level-L page is
//! the most recently processed page at level L−1 (reverse scan over
//! everything seen so far). This is O(n²) worst case, which is fine for
//! the hundreds of pages a real section holds.

use serde::Deserialize;
use tracing::warn;

/// One record of the flat pages listing, as returned by the Graph API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPage {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub order: i64,
}

/// A page with its reconstructed children, in sibling order.
///
/// Invariant: every child's `level` is exactly `level + 1`, except for
/// demoted orphans, which appear as roots at whatever level the listing
/// gave them.
#[derive(Debug, Clone)]
pub struct PageNode {
    pub id: String,
    pub title: String,
    pub level: u32,
    pub order: i64,
    pub children: Vec<PageNode>,
}

impl PageNode {
    /// Number of pages in this subtree, including the page itself.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(PageNode::count).sum::<usize>()
    }
}

/// Total number of pages across a forest of roots.
pub fn count_pages(roots: &[PageNode]) -> usize {
    roots.iter().map(PageNode::count).sum()
}

struct Slot {
    page: RawPage,
    children: Vec<usize>,
}

/// Fold the flat listing into an ordered forest of root pages.
pub fn build_page_tree(mut pages: Vec<RawPage>) -> Vec<PageNode> {
    pages.sort_by_key(|p| (p.order, p.level));

    let mut slots: Vec<Slot> = pages
        .into_iter()
        .map(|page| Slot {
            page,
            children: Vec::new(),
        })
        .collect();

    let mut roots: Vec<usize> = Vec::new();
    for i in 0..slots.len() {
        let level = slots[i].page.level;
        if level == 0 {
            roots.push(i);
            continue;
        }
        // Most recently processed page one level up.
        match (0..i).rev().find(|&j| slots[j].page.level + 1 == level) {
            Some(parent) => slots[parent].children.push(i),
            None => {
                warn!(
                    title = %slots[i].page.title,
                    level,
                    "page has no reachable parent; treating it as a root"
                );
                roots.push(i);
            }
        }
    }

    roots
        .into_iter()
        .map(|idx| adopt(&mut slots, idx))
        .collect()
}

/// Materialize the slot at `idx` into an owned node. Children always sit
/// at higher indices than their parent, so taking the slot's contents and
/// recursing never revisits a consumed slot.
fn adopt(slots: &mut [Slot], idx: usize) -> PageNode {
    let page = std::mem::take(&mut slots[idx].page);
    let child_indices = std::mem::take(&mut slots[idx].children);
    let children = child_indices
        .into_iter()
        .map(|c| adopt(slots, c))
        .collect();
    PageNode {
        id: page.id,
        title: page.title,
        level: page.level,
        order: page.order,
        children,
    }
}
