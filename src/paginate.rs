//! Offset pagination for SensorThings collections.
//!
//! The service caps every response at `$top` items and reports no total count, so pages
//! are requested at increasing `$skip` offsets until one comes back empty. Servers may cap
//! `$top` below the requested size, so the offset advances by the rows actually received
//! and a short page is not taken as the end.

use crate::error::{Result, StaError};
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page_size: u64,
    /// Offsets at or past this value are never requested.
    pub max_offset: u64,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page_size: 5000,
            max_offset: 10_000_000,
        }
    }
}

/// Collect every item of a paged collection. `fetch` receives the offset to request.
///
/// Fails with [`StaError::PaginationLimit`] instead of returning a truncated result when
/// more pages remain at `max_offset`.
pub async fn collect_pages<T, F, Fut>(url: &str, window: PageWindow, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut offset = 0u64;
    loop {
        if offset >= window.max_offset {
            warn!(%url, offset, "pagination limit reached");
            return Err(StaError::PaginationLimit {
                url: url.to_string(),
                offset,
            });
        }
        let page = fetch(offset).await?;
        let rows = page.len() as u64;
        debug!(%url, offset, rows, "fetched page");
        items.extend(page);
        if rows == 0 {
            break;
        }
        offset += rows;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn window(page_size: u64, max_offset: u64) -> PageWindow {
        PageWindow {
            page_size,
            max_offset,
        }
    }

    #[tokio::test]
    async fn every_item_is_collected_exactly_once() {
        let source: Vec<u32> = (0..12).collect();
        let offsets = RefCell::new(Vec::new());
        let items = collect_pages("mem://obs", window(5, 1000), |offset| {
            offsets.borrow_mut().push(offset);
            let page: Vec<u32> = source.iter().copied().skip(offset as usize).take(5).collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, source);
        assert_eq!(offsets.into_inner(), vec![0, 5, 10, 12]);
    }

    #[tokio::test]
    async fn full_last_page_is_followed_by_an_empty_one() {
        let source: Vec<u32> = (0..10).collect();
        let calls = RefCell::new(0);
        let items = collect_pages("mem://obs", window(5, 1000), |offset| {
            *calls.borrow_mut() += 1;
            let page: Vec<u32> = source.iter().copied().skip(offset as usize).take(5).collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 10);
        assert_eq!(*calls.borrow(), 3);
        assert_eq!(items, source);
    }

    #[tokio::test]
    async fn pages_capped_below_page_size_are_followed() {
        let source: Vec<u32> = (0..10).collect();
        let offsets = RefCell::new(Vec::new());
        // server hands out at most 3 items no matter what $top asks for
        let items = collect_pages("mem://obs", window(5, 1000), |offset| {
            offsets.borrow_mut().push(offset);
            let page: Vec<u32> = source.iter().copied().skip(offset as usize).take(3).collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, source);
        assert_eq!(offsets.into_inner(), vec![0, 3, 6, 9, 10]);
    }

    #[tokio::test]
    async fn empty_collection_stops_after_one_request() {
        let calls = RefCell::new(0);
        let items: Vec<u32> = collect_pages("mem://obs", window(5000, 10_000_000), |_| {
            *calls.borrow_mut() += 1;
            async { Ok(Vec::new()) }
        })
        .await
        .unwrap();

        assert!(items.is_empty());
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn endless_source_hits_the_limit() {
        let result = collect_pages("mem://obs", window(2, 6), |_| async { Ok(vec![1u8, 2]) }).await;
        match result {
            Err(StaError::PaginationLimit { offset, .. }) => assert_eq!(offset, 6),
            other => panic!("expected pagination limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let result: Result<Vec<u8>> = collect_pages("mem://obs", PageWindow::default(), |_| async {
            Err(StaError::NoDatastream("7".into()))
        })
        .await;
        assert!(matches!(result, Err(StaError::NoDatastream(_))));
    }
}
