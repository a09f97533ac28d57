use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest_oauth1::OAuthClientProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{SearchPage, SocialReader, SocialWriter};
use crate::config::Credentials;
use crate::error::TwitterError;
use crate::models::{AuthorMetadata, CandidatePost, Mention, PostId};

const API_BASE: &str = "https://api.twitter.com/2";
const MAX_MENTION_PAGES: usize = 5;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize, Default)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize, Default)]
struct Meta {
    #[serde(default)]
    next_token: Option<String>,
    #[serde(default)]
    result_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    public_metrics: TweetMetrics,
}

#[derive(Debug, Deserialize, Default)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    public_metrics: UserMetrics,
}

#[derive(Debug, Deserialize, Default)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Serialize)]
struct NewTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

impl ApiTweet {
    fn into_candidate(self) -> Result<CandidatePost, TwitterError> {
        Ok(CandidatePost {
            id: PostId::new(&self.id)?,
            author_id: self.author_id.unwrap_or_default(),
            text: self.text,
            created_at: self.created_at,
            like_count: self.public_metrics.like_count,
            retweet_count: self.public_metrics.retweet_count,
            conversation_id: self.conversation_id,
        })
    }

    fn into_mention(self) -> Result<Mention, TwitterError> {
        Ok(Mention {
            id: PostId::new(&self.id)?,
            author_id: self.author_id.unwrap_or_default(),
            text: self.text,
            created_at: self.created_at,
            conversation_id: self.conversation_id,
        })
    }
}

/// Twitter API v2 client. Reads use the app bearer token, writes are signed
/// with the account's OAuth 1.0a user credentials.
pub struct Twitter {
    client: reqwest::Client,
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
    bearer_token: String,
}

impl Twitter {
    pub fn new(credentials: &Credentials) -> Self {
        Twitter {
            client: reqwest::Client::new(),
            consumer_key: credentials.twitter_consumer_key.clone(),
            consumer_secret: credentials.twitter_consumer_secret.clone(),
            access_token: credentials.twitter_access_token.clone(),
            access_token_secret: credentials.twitter_access_token_secret.clone(),
            bearer_token: credentials.twitter_bearer_token.clone(),
        }
    }

    fn secrets(&self) -> reqwest_oauth1::Secrets<'_> {
        reqwest_oauth1::Secrets::new(self.consumer_key.as_str(), self.consumer_secret.as_str())
            .token(self.access_token.as_str(), self.access_token_secret.as_str())
    }

    /// Id of the account the OAuth credentials belong to.
    pub async fn get_user_id(&self) -> Result<String, TwitterError> {
        let endpoint = "/users/me";
        let response = self
            .client
            .clone()
            .oauth1(self.secrets())
            .get(format!("{API_BASE}{endpoint}"))
            .send()
            .await?;
        let body: ApiResponse<ApiUser> = Self::decode(endpoint, response).await?;
        body.data
            .map(|user| user.id)
            .ok_or(TwitterError::MissingData("/users/me"))
    }

    async fn get_json<T>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, TwitterError>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!(endpoint, "GET");
        let response = self
            .client
            .get(format!("{API_BASE}{endpoint}"))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await?;
        Self::decode(endpoint, response).await
    }

    async fn create_tweet(&self, tweet: &NewTweet<'_>) -> Result<PostId, TwitterError> {
        let endpoint = "/tweets";
        let payload = serde_json::to_string(tweet)?;
        let response = self
            .client
            .clone()
            .oauth1(self.secrets())
            .post(format!("{API_BASE}{endpoint}"))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        let body: ApiResponse<CreatedTweet> = Self::decode(endpoint, response).await?;
        let created = body.data.ok_or(TwitterError::MissingData("/tweets"))?;
        Ok(PostId::new(created.id)?)
    }

    async fn decode<T>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, TwitterError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 429 {
            warn!(endpoint, "rate limited");
            return Err(TwitterError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TwitterError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                // Log the raw payload shape so schema drift is diagnosable
                if let Ok(raw) = serde_json::from_str::<Value>(&body) {
                    warn!(endpoint, error = %e, raw = %raw, "unexpected response shape");
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl SocialReader for Twitter {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> anyhow::Result<SearchPage> {
        let mut params = vec![
            ("query", query.to_string()),
            ("max_results", max_results.clamp(10, 100).to_string()),
            (
                "tweet.fields",
                "author_id,created_at,public_metrics,conversation_id".to_string(),
            ),
            ("expansions", "author_id".to_string()),
            ("user.fields", "public_metrics".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("next_token", token.to_string()));
        }

        let body: ApiResponse<Vec<ApiTweet>> =
            self.get_json("/tweets/search/recent", &params).await?;
        debug!(
            result_count = body.meta.result_count.unwrap_or(0),
            "search page received"
        );

        let posts = body
            .data
            .unwrap_or_default()
            .into_iter()
            .map(ApiTweet::into_candidate)
            .collect::<Result<Vec<_>, _>>()?;
        let authors = body
            .includes
            .users
            .into_iter()
            .map(|u| AuthorMetadata {
                id: u.id,
                followers_count: u.public_metrics.followers_count,
            })
            .collect();

        Ok(SearchPage {
            posts,
            authors,
            next_token: body.meta.next_token,
        })
    }

    async fn mentions_since(
        &self,
        user_id: &str,
        since_id: Option<&PostId>,
        max_results: u32,
    ) -> anyhow::Result<Vec<Mention>> {
        let endpoint = format!("/users/{user_id}/mentions");
        let mut mentions = Vec::new();
        let mut pagination_token: Option<String> = None;

        for page in 1..=MAX_MENTION_PAGES {
            let mut params = vec![
                ("max_results", max_results.clamp(5, 100).to_string()),
                (
                    "tweet.fields",
                    "author_id,created_at,conversation_id".to_string(),
                ),
            ];
            if let Some(since) = since_id {
                params.push(("since_id", since.to_string()));
            }
            if let Some(token) = &pagination_token {
                params.push(("pagination_token", token.clone()));
            }

            let body: ApiResponse<Vec<ApiTweet>> = self.get_json(&endpoint, &params).await?;
            for tweet in body.data.unwrap_or_default() {
                mentions.push(tweet.into_mention()?);
            }

            pagination_token = next_mentions_page(page, body.meta.next_token);
            if pagination_token.is_none() {
                break;
            }
        }

        Ok(mentions)
    }
}

#[async_trait]
impl SocialWriter for Twitter {
    async fn post_tweet(&self, text: &str) -> anyhow::Result<PostId> {
        Ok(self.create_tweet(&NewTweet { text, reply: None }).await?)
    }

    async fn reply(&self, text: &str, in_reply_to: &PostId) -> anyhow::Result<PostId> {
        let tweet = NewTweet {
            text,
            reply: Some(ReplySettings {
                in_reply_to_tweet_id: in_reply_to.as_str(),
            }),
        };
        Ok(self.create_tweet(&tweet).await?)
    }
}

/// Token for the next mentions page, or `None` to stop paging.
///
/// Pages arrive newest first, so stopping at the cap with a token still
/// pending drops the oldest unseen mentions.
fn next_mentions_page(pages_fetched: usize, next_token: Option<String>) -> Option<String> {
    let token = next_token?;
    if pages_fetched >= MAX_MENTION_PAGES {
        warn!(
            pages = pages_fetched,
            "mention backlog exceeds page cap, oldest unseen mentions will be skipped"
        );
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_payload_maps_to_candidates_and_authors() {
        let raw = r#"{
            "data": [
                {
                    "id": "1846372819463528449",
                    "text": "anyone tried rust for embedded?",
                    "author_id": "11",
                    "created_at": "2024-10-16T01:02:03.000Z",
                    "conversation_id": "1846372819463528449",
                    "public_metrics": {"like_count": 12, "retweet_count": 3, "reply_count": 1, "quote_count": 0}
                },
                {"id": "1846372819463528450", "text": "no metrics", "author_id": "12"}
            ],
            "includes": {"users": [{"id": "11", "username": "a", "public_metrics": {"followers_count": 4200}}]},
            "meta": {"next_token": "abc", "result_count": 2}
        }"#;
        let body: ApiResponse<Vec<ApiTweet>> = serde_json::from_str(raw).unwrap();
        assert_eq!(body.meta.next_token.as_deref(), Some("abc"));
        assert_eq!(body.includes.users[0].public_metrics.followers_count, 4200);

        let posts: Vec<CandidatePost> = body
            .data
            .unwrap()
            .into_iter()
            .map(|t| t.into_candidate().unwrap())
            .collect();
        assert_eq!(posts[0].like_count, 12);
        assert_eq!(posts[0].retweet_count, 3);
        assert_eq!(posts[0].id.as_str(), "1846372819463528449");
        assert_eq!(posts[1].like_count, 0);
        assert!(posts[1].created_at.is_none());
    }

    #[test]
    fn empty_search_has_no_data() {
        let raw = r#"{"meta": {"result_count": 0}}"#;
        let body: ApiResponse<Vec<ApiTweet>> = serde_json::from_str(raw).unwrap();
        assert!(body.data.is_none());
        assert!(body.meta.next_token.is_none());
        assert!(body.includes.users.is_empty());
    }

    #[test]
    fn reply_payload_nests_the_target_id() {
        let target = PostId::new("123").unwrap();
        let tweet = NewTweet {
            text: "hello",
            reply: Some(ReplySettings {
                in_reply_to_tweet_id: target.as_str(),
            }),
        };
        let json: Value = serde_json::to_value(&tweet).unwrap();
        assert_eq!(json["reply"]["in_reply_to_tweet_id"], "123");

        let plain = serde_json::to_value(NewTweet {
            text: "hi",
            reply: None,
        })
        .unwrap();
        assert!(plain.get("reply").is_none());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let tweet = ApiTweet {
            id: "not-a-number".to_string(),
            text: String::new(),
            author_id: None,
            created_at: None,
            conversation_id: None,
            public_metrics: TweetMetrics::default(),
        };
        assert!(matches!(
            tweet.into_mention(),
            Err(TwitterError::Model(_))
        ));
    }

    #[test]
    fn mentions_paging_stops_at_the_page_cap() {
        assert_eq!(next_mentions_page(1, Some("t1".to_string())), Some("t1".to_string()));
        assert_eq!(next_mentions_page(2, None), None);
        assert_eq!(
            next_mentions_page(MAX_MENTION_PAGES - 1, Some("t4".to_string())),
            Some("t4".to_string())
        );
        assert_eq!(next_mentions_page(MAX_MENTION_PAGES, Some("t5".to_string())), None);
    }
}
