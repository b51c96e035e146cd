use serde::{Deserialize, Deserializer, Serialize};

/// A hydrated account.
///
/// `relation` is one of "friends", "followers", "retweeter" or a list name; `subject` is the handle
/// the relation holds for. Neither comes from the API: they are stamped by the collector. An empty
/// `subject` marks a root (ego) account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserObject {
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub screen_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub protected: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub verified: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub friends_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub followers_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub listed_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub statuses_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub profile_image_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub location: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub subject: String,
}

impl UserObject {
    pub fn is_root(&self) -> bool {
        self.subject.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TweetUser {
    #[serde(default, deserialize_with = "nullable")]
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    pub id: u64,
    #[serde(default)]
    pub user: TweetUser,
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    #[serde(rename = "in_reply_to_status_id", default, deserialize_with = "nullable")]
    pub in_reply_to_tweet: u64,
    #[serde(rename = "in_reply_to_user_id", default, deserialize_with = "nullable")]
    pub in_reply_to_user: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub in_reply_to_screen_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub retweet_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub favorite_count: u64,
}

/// One page of an ID-listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IdsPage {
    #[serde(default)]
    pub ids: Vec<u64>,
    #[serde(default)]
    pub next_cursor: u64,
}

/// One page of list members.
#[derive(Debug, Clone, Deserialize)]
pub struct MembersPage {
    #[serde(default)]
    pub users: Vec<UserObject>,
    #[serde(default)]
    pub next_cursor: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub statuses: Vec<Tweet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub code: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrors {
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

impl ApiErrors {
    pub fn summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// The API sends `null` for absent strings and counters.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// True when `s` is a non-empty run of ASCII digits.
pub fn digits_only(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_only() {
        assert!(digits_only("123"));
        assert!(!digits_only("@jdevoo"));
        assert!(!digits_only(""));
        assert!(!digits_only("-1"));
    }

    #[test]
    fn test_user_object_tolerates_nulls() {
        let json = r#"{
            "id": 18446744073709551615,
            "screen_name": "jdevoo",
            "protected": false,
            "verified": null,
            "friends_count": 12,
            "followers_count": 34,
            "listed_count": 1,
            "statuses_count": 900,
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "url": null,
            "profile_image_url": "http://pbs.twimg.com/a.jpg",
            "location": null
        }"#;
        let user: UserObject = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, u64::MAX);
        assert_eq!(user.url, "");
        assert!(!user.verified);
        assert!(user.is_root());
    }

    #[test]
    fn test_tweet_reply_fields() {
        let json = r#"{
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "id": 42,
            "user": {"screen_name": "alice"},
            "text": "@bob hi",
            "in_reply_to_status_id": 41,
            "in_reply_to_user_id": null,
            "in_reply_to_screen_name": "bob",
            "retweet_count": 0,
            "favorite_count": 3
        }"#;
        let tweet: Tweet = serde_json::from_str(json).unwrap();
        assert_eq!(tweet.in_reply_to_tweet, 41);
        assert_eq!(tweet.in_reply_to_user, 0);
        assert_eq!(tweet.user.screen_name, "alice");
    }

    #[test]
    fn test_api_errors_summary() {
        let errs: ApiErrors =
            serde_json::from_str(r#"{"errors":[{"message":"Bad Authentication data.","code":215}]}"#)
                .unwrap();
        assert_eq!(errs.summary().unwrap(), "Bad Authentication data. (215)");
    }
}
