use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{CommunitySource, EngagementError, Post, PostPage, RedditConfig, SubredditCandidate};

const BASE_URL: &str = "https://www.reddit.com";
const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_SECS: u64 = 10;

/// Reddit "Listing" envelope shared by every public JSON endpoint.
#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SubredditData {
    display_name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    public_description: Option<String>,
    #[serde(default)]
    subscribers: Option<u64>,
    #[serde(default)]
    over18: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    created_utc: f64,
    #[serde(default)]
    num_comments: u64,
}

impl From<SubredditData> for SubredditCandidate {
    fn from(d: SubredditData) -> Self {
        Self {
            name: d.display_name,
            title: d.title.unwrap_or_default(),
            description: d.public_description.unwrap_or_default(),
            subscribers: d.subscribers.unwrap_or(0),
            over18: d.over18.unwrap_or(false),
        }
    }
}

impl From<PostData> for Post {
    fn from(d: PostData) -> Self {
        Self {
            created_utc: d.created_utc as i64,
            num_comments: d.num_comments,
        }
    }
}

/// Client for Reddit's unauthenticated `.json` endpoints.
pub struct RedditClient {
    agent: ureq::Agent,
    user_agent: String,
    rate_limit_ms: u64,
    search_limit: String,
}

impl RedditClient {
    pub fn new(config: &RedditConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            user_agent: config.user_agent.clone(),
            rate_limit_ms: config.rate_limit_ms,
            search_limit: config.search_limit.to_string(),
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, EngagementError> {
        for attempt in 1..=MAX_ATTEMPTS {
            thread::sleep(Duration::from_millis(self.rate_limit_ms));
            log::debug!("GET {url} {query:?}");

            let mut resp = self
                .agent
                .get(url)
                .header("User-Agent", &self.user_agent)
                .query_pairs(query.iter().copied())
                .call()?;

            match resp.status().as_u16() {
                200..=299 => return Ok(resp.body_mut().read_json()?),
                429 => {
                    let wait = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<f64>().ok())
                        .map(|secs| secs.ceil() as u64)
                        .unwrap_or(DEFAULT_RETRY_SECS);
                    log::warn!("Rate limited by Reddit (attempt {attempt}), waiting {wait}s");
                    thread::sleep(Duration::from_secs(wait));
                }
                status => {
                    return Err(EngagementError::Status {
                        status,
                        url: url.to_string(),
                    });
                }
            }
        }
        Err(EngagementError::RateLimited(url.to_string()))
    }
}

impl CommunitySource for RedditClient {
    fn search_subreddits(&self, query: &str) -> Result<Vec<SubredditCandidate>, EngagementError> {
        let url = format!("{BASE_URL}/subreddits/search.json");
        let listing: Listing<SubredditData> =
            self.get_json(&url, &[("q", query), ("limit", self.search_limit.as_str())])?;
        Ok(listing.data.children.into_iter().map(|t| t.data.into()).collect())
    }

    fn new_posts(&self, subreddit: &str, after: Option<&str>) -> Result<PostPage, EngagementError> {
        let url = format!("{BASE_URL}/r/{subreddit}/new.json");
        let mut query = vec![("limit", "100")];
        if let Some(cursor) = after {
            query.push(("after", cursor));
        }
        let listing: Listing<PostData> = self.get_json(&url, &query)?;
        Ok(PostPage {
            posts: listing.data.children.into_iter().map(|t| t.data.into()).collect(),
            after: listing.data.after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subreddit_listing_deserialize() {
        let json = r#"{"kind": "Listing", "data": {"after": null, "children": [
            {"kind": "t5", "data": {"display_name": "TaylorSwift", "title": "Taylor Swift",
             "public_description": "The subreddit for Taylor Swift", "subscribers": 500000, "over18": false}},
            {"kind": "t5", "data": {"display_name": "Quarantined", "subscribers": null}}
        ]}}"#;
        let listing: Listing<SubredditData> = serde_json::from_str(json).unwrap();
        let subs: Vec<SubredditCandidate> =
            listing.data.children.into_iter().map(|t| t.data.into()).collect();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].subscribers, 500_000);
        assert_eq!(subs[1].subscribers, 0);
        assert_eq!(subs[1].title, "");
        assert!(!subs[1].over18);
    }

    #[test]
    fn test_post_listing_deserialize() {
        let json = r#"{"kind": "Listing", "data": {"after": "t3_abc", "children": [
            {"kind": "t3", "data": {"created_utc": 1699999999.0, "num_comments": 12, "title": "New album!"}}
        ]}}"#;
        let listing: Listing<PostData> = serde_json::from_str(json).unwrap();
        assert_eq!(listing.data.after.as_deref(), Some("t3_abc"));
        let post: Post = listing.data.children.into_iter().next().unwrap().data.into();
        assert_eq!(post.created_utc, 1_699_999_999);
        assert_eq!(post.num_comments, 12);
    }
}
