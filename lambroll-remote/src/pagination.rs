//! Marker-based paging.

use std::future::Future;

use anyhow::Result;
use futures_util::{stream, Stream, TryStreamExt};

/// One page of a list operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Absent or empty on the last page.
    pub next_marker: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Page {
            items,
            next_marker: None,
        }
    }
}

/// Stream the pages produced by `fetch`, starting without a marker and
/// following `next_marker` until it runs out.
pub fn pages<T, F, Fut>(mut fetch: F) -> impl Stream<Item = Result<Vec<T>>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    // None: done. Some(marker): fetch the page at marker.
    stream::try_unfold(Some(None), move |state: Option<Option<String>>| {
        let next = state.map(&mut fetch);
        async move {
            let Some(page) = next else {
                return Ok(None);
            };
            let page = page.await?;
            let next_state = page.next_marker.filter(|m| !m.is_empty()).map(Some);
            Ok(Some((page.items, next_state)))
        }
    })
}

/// Fetch every page and concatenate the items.
pub async fn collect_all<T, F, Fut>(fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    pages(fetch).try_concat().await
}
