use crate::error::{ClientError, Result};
use crate::model::{IdsPage, MembersPage, SearchPage, Tweet, UserObject, digits_only};
use crate::paginate::{DEFAULT_MAX_PAGES, drain_cursor, drain_max_id, next_max_id};
use crate::transport::RateLimitedTransport;
use std::fmt;
use tracing::{debug, info};

/// Maximum accounts per `users/lookup` call.
pub const LOOKUP_BATCH_SIZE: usize = 100;
/// Posts requested per timeline page.
pub const TIMELINE_PAGE_SIZE: usize = 200;
/// Posts requested per search or list page.
pub const SEARCH_PAGE_SIZE: usize = 100;
pub const MEMBERS_PAGE_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Friends,
    Followers,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Friends => "friends",
            Relation::Followers => "followers",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where `tweets` collects posts from.
#[derive(Debug, Clone, PartialEq)]
pub enum PostSource {
    /// Timeline of a handle, retweets included.
    Timeline(String),
    /// Recent results of a free-text search.
    Search(String),
    /// Statuses of a list owned by a handle.
    List { slug: String, owner: String },
    /// Replies addressed to `handle` that answer post `post_id`.
    Replies { handle: String, post_id: u64 },
}

/// `user_id=` for numeric tokens, `screen_name=` otherwise.
pub fn account_param(token: &str) -> (&'static str, String) {
    if digits_only(token) {
        ("user_id", token.to_string())
    } else {
        ("screen_name", token.trim_start_matches('@').to_string())
    }
}

pub struct ApiClient {
    transport: RateLimitedTransport,
    max_pages: usize,
}

impl ApiClient {
    pub fn new(transport: RateLimitedTransport) -> Self {
        Self {
            transport,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn transport(&self) -> &RateLimitedTransport {
        &self.transport
    }

    /// Every friend or follower ID of `token` (numeric ID or handle), in page order.
    pub async fn ids(&self, relation: Relation, token: &str) -> Result<Vec<u64>> {
        let path = format!("1.1/{}/ids.json", relation.as_str());
        let account = account_param(token);

        let ids = drain_cursor(self.max_pages, |cursor| {
            let mut params = vec![(account.0, account.1.clone())];
            if let Some(cursor) = cursor {
                params.push(("cursor", cursor.to_string()));
            }
            let url = self.transport.endpoint(&path, &params);
            async move { self.transport.get_json::<IdsPage>(url?).await }
        })
        .await?;

        debug!("{} {} of {}", ids.len(), relation, token);
        Ok(ids)
    }

    /// Members of list `slug` owned by `owner`, stamped with the list name as
    /// relation and the owner as subject.
    pub async fn members(&self, slug: &str, owner: &str) -> Result<Vec<UserObject>> {
        let mut users = drain_cursor(self.max_pages, |cursor| {
            let mut params = vec![
                ("slug", slug.to_string()),
                ("owner_screen_name", owner.to_string()),
                ("count", MEMBERS_PAGE_SIZE.to_string()),
                ("skip_status", "true".to_string()),
            ];
            if let Some(cursor) = cursor {
                params.push(("cursor", cursor.to_string()));
            }
            let url = self.transport.endpoint("1.1/lists/members.json", &params);
            async move { self.transport.get_json::<MembersPage>(url?).await }
        })
        .await?;

        for user in users.iter_mut() {
            user.relation = slug.to_string();
            user.subject = owner.to_string();
        }
        Ok(users)
    }

    /// Hydrate a single account. Relation and subject are left empty.
    pub async fn show(&self, token: &str) -> Result<UserObject> {
        let url = self
            .transport
            .endpoint("1.1/users/show.json", &[account_param(token)])?;
        self.transport.get_json(url).await
    }

    /// Hydrate up to [`LOOKUP_BATCH_SIZE`] accounts in one call. The first token
    /// decides whether the batch is looked up by ID or by handle.
    pub async fn lookup(&self, batch: &[String]) -> Result<Vec<UserObject>> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        if batch.len() > LOOKUP_BATCH_SIZE {
            return Err(ClientError::Pagination(format!(
                "lookup batch of {} exceeds {}",
                batch.len(),
                LOOKUP_BATCH_SIZE
            )));
        }

        let key = account_param(first).0;
        let joined = batch
            .iter()
            .map(|t| t.trim_start_matches('@'))
            .collect::<Vec<_>>()
            .join(",");
        let url = self
            .transport
            .endpoint("1.1/users/lookup.json", &[(key, joined)])?;
        self.transport.get_json(url).await
    }

    /// Followers of `handle` who replied to it within the last `max_count`
    /// posts of their timeline.
    pub async fn retweeters_of(&self, handle: &str, max_count: usize) -> Result<Vec<u64>> {
        let followers = self.ids(Relation::Followers, handle).await?;
        let mut matched = Vec::new();

        for follower in followers {
            match self.replied_to(follower, handle, max_count).await {
                Ok(true) => matched.push(follower),
                Ok(false) => {}
                // protected timelines answer 401
                Err(ClientError::Unauthorized(status)) => {
                    info!("skipping timeline of {} ({})", follower, status);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(matched)
    }

    /// Walk `follower`'s timeline backwards looking for a reply to `handle`.
    ///
    /// Stops at the first match, on a short page or once `max_count` posts
    /// have been scanned.
    pub async fn replied_to(&self, follower: u64, handle: &str, max_count: usize) -> Result<bool> {
        let target = handle.trim_start_matches('@');
        let mut scanned = 0;
        let mut max_id: Option<u64> = None;

        while scanned < max_count {
            let url = self.transport.endpoint(
                "1.1/statuses/user_timeline.json",
                &timeline_params(("user_id", follower.to_string()), max_id),
            )?;
            let page: Vec<Tweet> = self.transport.get_json(url).await?;
            if page.is_empty() {
                break;
            }
            info!("processed {} tweets from {}", page.len(), follower);

            if page
                .iter()
                .any(|t| t.in_reply_to_screen_name.eq_ignore_ascii_case(target))
            {
                return Ok(true);
            }
            if page.len() < TIMELINE_PAGE_SIZE {
                break;
            }
            scanned += page.len();
            match next_max_id(&page) {
                Some(id) => max_id = Some(id),
                None => break,
            }
        }
        Ok(false)
    }

    /// One page of posts from `source` at or below `max_id`.
    pub async fn posts_page(&self, source: &PostSource, max_id: Option<u64>) -> Result<Vec<Tweet>> {
        let count = SEARCH_PAGE_SIZE.to_string();
        let (path, mut params, searched) = match source {
            PostSource::Timeline(handle) => (
                "1.1/statuses/user_timeline.json",
                timeline_params(
                    ("screen_name", handle.trim_start_matches('@').to_string()),
                    None,
                ),
                false,
            ),
            PostSource::Search(query) => (
                "1.1/search/tweets.json",
                vec![
                    ("q", query.clone()),
                    ("result_type", "recent".to_string()),
                    ("count", count),
                ],
                true,
            ),
            PostSource::List { slug, owner } => (
                "1.1/lists/statuses.json",
                vec![
                    ("slug", slug.clone()),
                    ("owner_screen_name", owner.clone()),
                    ("count", count),
                ],
                false,
            ),
            PostSource::Replies { handle, post_id } => (
                "1.1/search/tweets.json",
                vec![
                    ("q", format!("to:{}", handle.trim_start_matches('@'))),
                    ("result_type", "recent".to_string()),
                    ("count", count),
                    ("since_id", post_id.to_string()),
                ],
                true,
            ),
        };
        if let Some(max_id) = max_id {
            params.push(("max_id", max_id.to_string()));
        }

        let url = self.transport.endpoint(path, &params)?;
        if searched {
            Ok(self.transport.get_json::<SearchPage>(url).await?.statuses)
        } else {
            self.transport.get_json(url).await
        }
    }

    /// Drain `source` newest-first, handing each page to `sink`. Reply sources
    /// only pass on posts answering the requested post.
    pub async fn posts<S, E>(&self, source: &PostSource, mut sink: S) -> std::result::Result<usize, E>
    where
        S: FnMut(Vec<Tweet>) -> std::result::Result<(), E>,
        E: From<ClientError>,
    {
        let reply_to = match source {
            PostSource::Replies { post_id, .. } => Some(*post_id),
            _ => None,
        };

        drain_max_id(
            self.max_pages,
            |max_id| self.posts_page(source, max_id),
            |mut page| {
                if let Some(post_id) = reply_to {
                    page.retain(|t| t.in_reply_to_tweet == post_id);
                }
                info!("processed {} tweets", page.len());
                sink(page)
            },
        )
        .await
    }
}

fn timeline_params(account: (&'static str, String), max_id: Option<u64>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        account,
        ("count", TIMELINE_PAGE_SIZE.to_string()),
        ("include_rts", "true".to_string()),
    ];
    if let Some(max_id) = max_id {
        params.push(("max_id", max_id.to_string()));
    }
    params
}
