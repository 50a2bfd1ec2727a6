//! Continuation-token pagination with a hard result cap.

use std::future::Future;

use tracing::debug;

use crate::error::InventoryError;

/// One page of a paged collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque token for the next page; `None` or empty means no more pages.
    pub continuation: Option<String>,
}

/// Fetch pages until the server signals the end, accumulating items.
///
/// `fetch` receives `None` for the first page and the previous page's
/// continuation token afterwards. Enumeration stops on an absent/empty token
/// or an empty page. If more than `max` items accumulate the call fails with
/// [`InventoryError::TooManyResources`]; results are never truncated.
pub async fn collect_pages<T, F, Fut>(max: usize, mut fetch: F) -> Result<Vec<T>, InventoryError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, InventoryError>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(token.take()).await?;
        pages += 1;
        let page_len = page.items.len();
        items.extend(page.items);

        if items.len() > max {
            return Err(InventoryError::TooManyResources {
                max,
                seen: items.len(),
            });
        }

        match page.continuation {
            Some(next) if !next.is_empty() && page_len > 0 => token = Some(next),
            _ => break,
        }
    }

    debug!(pages, items = items.len(), "paged enumeration complete");
    Ok(items)
}
