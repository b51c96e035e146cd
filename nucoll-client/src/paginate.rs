//! Cursor and max-id pagination.
//!
//! Both drains are strictly sequential: the next page is only requested once
//! the previous one has been decoded, so a failure never leaves a half-merged
//! page behind.

use crate::error::{ClientError, Result};
use crate::model::{IdsPage, MembersPage, Tweet, UserObject};
use std::future::Future;
use tracing::debug;

/// Upper bound on pages drained from a single endpoint. A well-behaved API
/// reaches cursor 0 long before this.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// A decoded page from a cursor-paginated endpoint.
pub trait CursorPage {
    type Item;

    fn next_cursor(&self) -> u64;
    fn into_items(self) -> Vec<Self::Item>;
}

impl CursorPage for IdsPage {
    type Item = u64;

    fn next_cursor(&self) -> u64 {
        self.next_cursor
    }

    fn into_items(self) -> Vec<u64> {
        self.ids
    }
}

impl CursorPage for MembersPage {
    type Item = UserObject;

    fn next_cursor(&self) -> u64 {
        self.next_cursor
    }

    fn into_items(self) -> Vec<UserObject> {
        self.users
    }
}

/// Request pages until the cursor comes back as zero and return every item in
/// page order. The first request is made with no cursor.
pub async fn drain_cursor<P, F, Fut>(max_pages: usize, mut fetch_page: F) -> Result<Vec<P::Item>>
where
    P: CursorPage,
    F: FnMut(Option<u64>) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<u64> = None;

    for page_number in 0..max_pages {
        let page = fetch_page(cursor).await?;
        let next = page.next_cursor();
        let page_items = page.into_items();
        debug!(
            "page {} returned {} items, next cursor {}",
            page_number,
            page_items.len(),
            next
        );
        items.extend(page_items);

        if next == 0 {
            return Ok(items);
        }
        if cursor == Some(next) {
            return Err(ClientError::Pagination(format!(
                "cursor {} returned twice in a row",
                next
            )));
        }
        cursor = Some(next);
    }

    Err(ClientError::Pagination(format!(
        "no final page after {} pages",
        max_pages
    )))
}

/// The `max_id` for the page after `page`: one below the lowest ID seen.
///
/// Assumes numeric IDs decrease along a timeline. `None` once the bottom is
/// reached.
pub fn next_max_id(page: &[Tweet]) -> Option<u64> {
    page.iter().map(|t| t.id).min()?.checked_sub(1)
}

/// Walk a timeline-shaped endpoint backwards until it returns an empty page,
/// handing every page to `sink` as it arrives. Returns the number of posts seen.
pub async fn drain_max_id<F, Fut, S, E>(
    max_pages: usize,
    mut fetch_page: F,
    mut sink: S,
) -> std::result::Result<usize, E>
where
    F: FnMut(Option<u64>) -> Fut,
    Fut: Future<Output = Result<Vec<Tweet>>>,
    S: FnMut(Vec<Tweet>) -> std::result::Result<(), E>,
    E: From<ClientError>,
{
    let mut max_id: Option<u64> = None;
    let mut seen = 0;

    for _ in 0..max_pages {
        let page = fetch_page(max_id).await?;
        if page.is_empty() {
            return Ok(seen);
        }
        seen += page.len();
        let next = next_max_id(&page);
        sink(page)?;

        match next {
            Some(id) => max_id = Some(id),
            None => return Ok(seen),
        }
    }

    Err(ClientError::Pagination(format!("timeline did not end after {} pages", max_pages)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn ids_page(ids: &[u64], next_cursor: u64) -> IdsPage {
        IdsPage {
            ids: ids.to_vec(),
            next_cursor,
        }
    }

    fn tweet(id: u64) -> Tweet {
        Tweet {
            id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_drain_cursor_concatenates_in_page_order() {
        let pages = vec![
            ids_page(&[1, 2, 3], 30),
            ids_page(&[4, 5], 20),
            ids_page(&[6], 0),
        ];
        let requested: RefCell<Vec<Option<u64>>> = RefCell::new(Vec::new());
        let mut remaining = pages.into_iter();

        let ids = drain_cursor(DEFAULT_MAX_PAGES, |cursor| {
            requested.borrow_mut().push(cursor);
            let page = remaining.next().unwrap();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(*requested.borrow(), vec![None, Some(30), Some(20)]);
    }

    #[tokio::test]
    async fn test_drain_cursor_single_page() {
        let ids = drain_cursor(DEFAULT_MAX_PAGES, |_| async { Ok(ids_page(&[9], 0)) })
            .await
            .unwrap();
        assert_eq!(ids, vec![9]);
    }

    #[tokio::test]
    async fn test_drain_cursor_stops_at_first_error() {
        let mut calls = 0;
        let result = drain_cursor(DEFAULT_MAX_PAGES, |_| {
            calls += 1;
            let call = calls;
            async move {
                if call == 1 {
                    Ok(ids_page(&[1], 7))
                } else {
                    Err(ClientError::Pagination("boom".to_string()))
                }
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_drain_cursor_rejects_repeated_cursor() {
        let result = drain_cursor(DEFAULT_MAX_PAGES, |_| async { Ok(ids_page(&[1], 5)) }).await;
        assert!(matches!(result, Err(ClientError::Pagination(_))));
    }

    #[tokio::test]
    async fn test_drain_cursor_is_bounded() {
        let mut next = 0;
        let result = drain_cursor(3, |_| {
            next += 1;
            let cursor = next;
            async move { Ok(ids_page(&[cursor], cursor)) }
        })
        .await;
        assert!(matches!(result, Err(ClientError::Pagination(_))));
        assert_eq!(next, 3);
    }

    #[test]
    fn test_next_max_id() {
        assert_eq!(next_max_id(&[tweet(50), tweet(20), tweet(31)]), Some(19));
        assert_eq!(next_max_id(&[tweet(0)]), None);
        assert_eq!(next_max_id(&[]), None);
    }

    #[tokio::test]
    async fn test_drain_max_id_walks_backwards() {
        let requested: RefCell<Vec<Option<u64>>> = RefCell::new(Vec::new());
        let mut collected = Vec::new();

        let seen = drain_max_id(
            DEFAULT_MAX_PAGES,
            |max_id| {
                requested.borrow_mut().push(max_id);
                let page = match max_id {
                    None => vec![tweet(100), tweet(90)],
                    Some(89) => vec![tweet(80)],
                    _ => vec![],
                };
                async move { Ok(page) }
            },
            |page: Vec<Tweet>| -> Result<()> {
                collected.extend(page.into_iter().map(|t| t.id));
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(seen, 3);
        assert_eq!(collected, vec![100, 90, 80]);
        assert_eq!(*requested.borrow(), vec![None, Some(89), Some(79)]);
    }
}
