use serde::Deserialize;

/// The two shapes a list endpoint answers with: a bare array when no
/// `limit` was asked for, or one page with a link to the next.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Paged { results: Vec<T>, next: Option<String> },
}

/// One normalized page of a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_page.is_none()
    }
}

impl<T> From<ListEnvelope<T>> for Page<T> {
    fn from(envelope: ListEnvelope<T>) -> Self {
        match envelope {
            ListEnvelope::Bare(items) => Page { items, next_page: None },
            ListEnvelope::Paged { results, next } => Page {
                items: results,
                next_page: next.filter(|n| !n.is_empty()),
            },
        }
    }
}
