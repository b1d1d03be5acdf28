//! Forums, topics and posts, and the home feed built from them.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{error::DomainError, resources::Reaction, types::flag};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub visible: bool,
    #[serde(default, deserialize_with = "flag")]
    pub censor_words: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub forum_id: i64,
    pub title: String,
    pub created: i64,
    pub created_member_id: i64,
    #[serde(default)]
    pub total_replies: i64,
    #[serde(default)]
    pub total_views: i64,
    #[serde(default)]
    pub last_post_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub topic_id: i64,
    pub forum_id: i64,
    pub posted: i64,
    pub posted_member_id: i64,
    #[serde(default, deserialize_with = "flag")]
    pub first_post: bool,
    #[serde(default)]
    pub post_content: String,
}

/// Leading digits of a `12-topic-title` style identifier.
pub fn extract_id(raw: &str) -> Option<i64> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|id| *id > 0)
}

/// `12-topic-title`, the identifier form used in links.
pub fn slug(id: i64, title: &str) -> String {
    let mut words = String::new();
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            words.extend(ch.to_lowercase());
        } else if !words.ends_with('-') {
            words.push('-');
        }
    }
    let words = words.trim_matches('-');
    if words.is_empty() {
        id.to_string()
    } else {
        format!("{id}-{words}")
    }
}

/// Ordering applied to the home feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeFilter {
    /// Posts, most recent first.
    #[default]
    Latest,
    /// Topics, most recently started first.
    Newest,
    /// Topics, oldest first.
    Oldest,
    /// Posts, most liked first.
    Likes,
}

impl HomeFilter {
    pub const ALL: [HomeFilter; 4] = [
        HomeFilter::Latest,
        HomeFilter::Newest,
        HomeFilter::Oldest,
        HomeFilter::Likes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HomeFilter::Latest => "latest",
            HomeFilter::Newest => "newest",
            HomeFilter::Oldest => "oldest",
            HomeFilter::Likes => "likes",
        }
    }
}

impl FromStr for HomeFilter {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|filter| filter.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown home filter `{wanted}`")))
    }
}

impl fmt::Display for HomeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who did something, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub member_id: i64,
    pub timestamp: Option<i64>,
}

/// One topic as it appears in the feed, seen through one of its posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub topic_id: i64,
    pub forum_id: i64,
    pub post_id: Option<i64>,
    pub total_replies: i64,
    pub total_views: i64,
    pub starter: Activity,
    /// Absent while the topic only holds its opening post.
    pub replier: Option<Activity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub entries: Vec<FeedEntry>,
    /// More items exist past `limit`.
    pub load_more: bool,
}

/// Sort, cut to `limit` and describe the feed for `filter`.
///
/// `latest` and `likes` walk posts; `newest` and `oldest` walk topics. Posts
/// whose topic is gone are dropped.
pub fn home_feed(
    filter: HomeFilter,
    topics: &[Topic],
    posts: &[Post],
    likes: &[Reaction],
    limit: usize,
) -> Feed {
    match filter {
        HomeFilter::Latest => {
            let mut ordered: Vec<&Post> = posts.iter().collect();
            ordered.sort_by(|a, b| b.posted.cmp(&a.posted));
            post_feed(ordered, topics, limit)
        }
        HomeFilter::Likes => {
            let mut counts: HashMap<i64, usize> = HashMap::new();
            for like in likes.iter().filter(|like| like.content_type.eq_ignore_ascii_case("post")) {
                *counts.entry(like.content_id).or_default() += 1;
            }
            let mut ordered: Vec<&Post> = posts.iter().collect();
            ordered.sort_by(|a, b| {
                let liked = |post: &Post| counts.get(&post.id).copied().unwrap_or_default();
                liked(b).cmp(&liked(a))
            });
            post_feed(ordered, topics, limit)
        }
        HomeFilter::Newest | HomeFilter::Oldest => {
            let mut ordered: Vec<&Topic> = topics.iter().collect();
            if filter == HomeFilter::Newest {
                ordered.sort_by(|a, b| b.created.cmp(&a.created));
            } else {
                ordered.sort_by(|a, b| a.created.cmp(&b.created));
            }
            let load_more = ordered.len() > limit;
            let entries = ordered
                .into_iter()
                .take(limit)
                .map(|topic| topic_entry(topic, posts))
                .collect();
            Feed { entries, load_more }
        }
    }
}

fn post_feed(ordered: Vec<&Post>, topics: &[Topic], limit: usize) -> Feed {
    let load_more = ordered.len() > limit;
    let entries = ordered
        .into_iter()
        .take(limit)
        .filter_map(|post| {
            let topic = topics.iter().find(|topic| topic.id == post.topic_id)?;
            Some(FeedEntry {
                topic_id: topic.id,
                forum_id: post.forum_id,
                post_id: Some(post.id),
                total_replies: topic.total_replies,
                total_views: topic.total_views,
                starter: Activity {
                    member_id: topic.created_member_id,
                    timestamp: Some(topic.created),
                },
                replier: (!post.first_post).then_some(Activity {
                    member_id: post.posted_member_id,
                    timestamp: Some(post.posted),
                }),
            })
        })
        .collect();
    Feed { entries, load_more }
}

fn topic_entry(topic: &Topic, posts: &[Post]) -> FeedEntry {
    let in_topic = posts.iter().filter(|post| post.topic_id == topic.id).count();
    let last = topic
        .last_post_id
        .and_then(|id| posts.iter().find(|post| post.id == id));
    FeedEntry {
        topic_id: topic.id,
        forum_id: topic.forum_id,
        post_id: last.map(|post| post.id),
        total_replies: topic.total_replies,
        total_views: topic.total_views,
        starter: Activity {
            member_id: topic.created_member_id,
            timestamp: Some(topic.created),
        },
        replier: last.filter(|_| in_topic > 1).map(|post| Activity {
            member_id: post.posted_member_id,
            timestamp: Some(post.posted),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: i64, created: i64, last_post_id: i64) -> Topic {
        Topic {
            id,
            forum_id: 1,
            title: format!("Topic {id}"),
            created,
            created_member_id: 1,
            total_replies: 0,
            total_views: 0,
            last_post_id: Some(last_post_id),
        }
    }

    fn post(id: i64, topic_id: i64, posted: i64, first_post: bool) -> Post {
        Post {
            id,
            topic_id,
            forum_id: 1,
            posted,
            posted_member_id: 2,
            first_post,
            post_content: String::new(),
        }
    }

    fn like(post_id: i64) -> Reaction {
        Reaction {
            id: 0,
            member_id: 1,
            content_type: "post".into(),
            content_id: post_id,
            created_at: None,
        }
    }

    #[test]
    fn identifiers_come_from_the_leading_digits() {
        assert_eq!(extract_id("12-hello-world"), Some(12));
        assert_eq!(extract_id(" 7 "), Some(7));
        assert_eq!(extract_id("hello"), None);
        assert_eq!(extract_id("0-zero"), None);
        assert_eq!(slug(12, "Hello, World!"), "12-hello-world");
        assert_eq!(slug(3, "!!!"), "3");
    }

    #[test]
    fn filters_parse_case_insensitively() {
        assert_eq!("Likes".parse::<HomeFilter>().expect("likes"), HomeFilter::Likes);
        assert!("popular".parse::<HomeFilter>().is_err());
    }

    #[test]
    fn latest_orders_posts_and_marks_replies() {
        let topics = vec![topic(1, 100, 2)];
        let posts = vec![post(1, 1, 100, true), post(2, 1, 300, false), post(3, 9, 500, false)];

        let feed = home_feed(HomeFilter::Latest, &topics, &posts, &[], 10);
        assert_eq!(feed.entries.len(), 2, "orphaned posts are dropped");
        assert_eq!(feed.entries[0].post_id, Some(2));
        assert_eq!(
            feed.entries[0].replier,
            Some(Activity {
                member_id: 2,
                timestamp: Some(300)
            })
        );
        assert_eq!(feed.entries[1].replier, None);
        assert!(!feed.load_more);
    }

    #[test]
    fn topic_filters_sort_by_creation_and_page() {
        let topics = vec![topic(1, 100, 1), topic(2, 300, 2), topic(3, 200, 3)];
        let posts = vec![post(1, 1, 100, true), post(2, 2, 300, true), post(4, 2, 400, false)];

        let newest = home_feed(HomeFilter::Newest, &topics, &posts, &[], 2);
        let ids: Vec<i64> = newest.entries.iter().map(|entry| entry.topic_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(newest.load_more);

        let oldest = home_feed(HomeFilter::Oldest, &topics, &posts, &[], 3);
        let ids: Vec<i64> = oldest.entries.iter().map(|entry| entry.topic_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert!(!oldest.load_more);
        assert!(oldest.entries[2].replier.is_some(), "two posts in topic 2");
        assert!(oldest.entries[0].replier.is_none());
    }

    #[test]
    fn likes_rank_posts_by_post_likes_only() {
        let topics = vec![topic(1, 100, 3)];
        let posts = vec![post(1, 1, 100, true), post(2, 1, 200, false), post(3, 1, 300, false)];
        let mut likes = vec![like(2), like(2), like(3)];
        likes.push(Reaction {
            content_type: "topic".into(),
            ..like(1)
        });

        let feed = home_feed(HomeFilter::Likes, &topics, &posts, &likes, 10);
        let ids: Vec<Option<i64>> = feed.entries.iter().map(|entry| entry.post_id).collect();
        assert_eq!(ids, vec![Some(2), Some(3), Some(1)]);
    }
}
