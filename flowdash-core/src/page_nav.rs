//! Page-button sequencing for a pagination bar.

use crate::pagination::total_pages;
use std::fmt;

/// Pages are listed individually up to this count; beyond it the bar compresses
/// with ellipses to seven slots.
const MAX_UNCOMPRESSED_PAGES: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToken {
    Page(usize),
    Ellipsis,
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Page(page) => write!(f, "{}", page),
            PageToken::Ellipsis => f.write_str("…"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    First,
    Prev,
    Next,
    Last,
    Page(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNav {
    pub total_pages: usize,
    pub current_page: usize,
    pub tokens: Vec<PageToken>,
}

impl PageNav {
    pub fn new(total_items: usize, page_size: usize, current_page: usize) -> Self {
        let total_pages = total_pages(total_items, page_size);
        Self {
            total_pages,
            current_page,
            tokens: page_tokens(total_pages, current_page),
        }
    }

    pub fn first_enabled(&self) -> bool {
        self.current_page != 1
    }

    pub fn prev_enabled(&self) -> bool {
        self.current_page != 1
    }

    pub fn next_enabled(&self) -> bool {
        self.current_page != self.total_pages
    }

    pub fn last_enabled(&self) -> bool {
        self.current_page != self.total_pages
    }

    /// Resolves a navigation request to the page to switch to, clamped into
    /// `[1, total_pages]`. `None` when the result is the current page.
    pub fn target(&self, target: NavTarget) -> Option<usize> {
        let requested = match target {
            NavTarget::First => 1,
            NavTarget::Prev => self.current_page.saturating_sub(1),
            NavTarget::Next => self.current_page.saturating_add(1),
            NavTarget::Last => self.total_pages,
            NavTarget::Page(page) => page,
        };
        let next = requested.clamp(1, self.total_pages);
        (next != self.current_page).then_some(next)
    }

    /// Invokes `on_change` with the resolved page unless it is a no-op.
    pub fn navigate<F: FnOnce(usize)>(&self, target: NavTarget, on_change: F) -> bool {
        match self.target(target) {
            Some(page) => {
                on_change(page);
                true
            }
            None => false,
        }
    }

    pub fn status_text(&self) -> String {
        format!("Page {} of {}", self.current_page, self.total_pages)
    }
}

pub fn page_tokens(total_pages: usize, current_page: usize) -> Vec<PageToken> {
    use PageToken::{Ellipsis, Page};

    let tp = total_pages.max(1);
    let c = current_page;

    if tp <= MAX_UNCOMPRESSED_PAGES {
        return (1..=tp).map(Page).collect();
    }
    if c <= 4 {
        return vec![Page(1), Page(2), Page(3), Page(4), Page(5), Ellipsis, Page(tp)];
    }
    if c >= tp - 3 {
        return vec![
            Page(1),
            Ellipsis,
            Page(tp - 4),
            Page(tp - 3),
            Page(tp - 2),
            Page(tp - 1),
            Page(tp),
        ];
    }
    vec![Page(1), Ellipsis, Page(c - 1), Page(c), Page(c + 1), Ellipsis, Page(tp)]
}
