//! Topic pages and the home feed, assembled from table snapshots.

use tracing::debug;

use crate::{
    application::{
        context::{RequestContext, unix_now},
        error::AppError,
        formatting::{format_date, format_number, plain_text, time_ago},
    },
    domain::{
        content::{Feed, FeedEntry, Forum, HomeFilter, Post, Topic, extract_id, home_feed, slug},
        error::DomainError,
        members::Member,
        resources::Reaction,
    },
    presentation::views::{
        Breadcrumb, FeedView, FilterOption, PostView, ReactionButton, TopicSnapshotView,
    },
};

/// Session key remembering the visitor's last feed filter.
pub const HOME_FILTER_KEY: &str = "HOME_FILTER";

const DEFAULT_FORUM_COLOR: &str = "#4a5568";
const DEFAULT_FORUM_TEXT_COLOR: &str = "#ffffff";

/// The filter the visitor last picked, else the forum default.
pub fn current_filter(ctx: &RequestContext) -> HomeFilter {
    ctx.session
        .as_ref()
        .and_then(|session| session.get_str(HOME_FILTER_KEY))
        .and_then(|name| name.parse().ok())
        .unwrap_or(ctx.settings.home_filter)
}

/// The feed for `filter`, one rendered-ready card per entry.
pub fn feed(ctx: &RequestContext, filter: HomeFilter) -> Result<FeedView, AppError> {
    let data = ctx.data()?;
    let tables = data.cache.get_all(&[
        ("topics", "topics"),
        ("posts", "posts"),
        ("forums", "forums"),
        ("members", "members"),
        ("likes", "likes"),
    ]);
    let topics: Vec<Topic> = tables.decode("topics")?;
    let posts: Vec<Post> = tables.decode("posts")?;
    let forums: Vec<Forum> = tables.decode("forums")?;
    let members: Vec<Member> = tables.decode("members")?;
    let likes: Vec<Reaction> = tables.decode("likes")?;

    let Feed { entries, load_more } =
        home_feed(filter, &topics, &posts, &likes, ctx.settings.items_per_page);
    let lookup = Lookup {
        ctx,
        topics: &topics,
        posts: &posts,
        forums: &forums,
        members: &members,
        now: unix_now(),
    };
    let items: Vec<TopicSnapshotView> = entries
        .iter()
        .filter_map(|entry| lookup.snapshot(entry))
        .collect();

    debug!(
        target = "bulletin_fusion::application::topics",
        request_id = %ctx.request_id,
        filter = filter.as_str(),
        items = items.len(),
        load_more,
        "Home feed assembled"
    );

    Ok(FeedView {
        filter: filter.as_str(),
        filter_name: ctx.localization.get("filterhelper", filter.as_str()),
        filters: HomeFilter::ALL
            .into_iter()
            .map(|option| FilterOption {
                value: option.as_str(),
                label: ctx.localization.get("filterhelper", option.as_str()),
                checked: option == filter,
            })
            .collect(),
        items,
        load_more,
    })
}

struct Lookup<'a> {
    ctx: &'a RequestContext,
    topics: &'a [Topic],
    posts: &'a [Post],
    forums: &'a [Forum],
    members: &'a [Member],
    now: i64,
}

impl Lookup<'_> {
    fn snapshot(&self, entry: &FeedEntry) -> Option<TopicSnapshotView> {
        let topic = self.topics.iter().find(|topic| topic.id == entry.topic_id)?;
        let forum = self.forums.iter().find(|forum| forum.id == entry.forum_id);
        let localization = &self.ctx.localization;

        let started_by = localization.replace_all(
            "topicsnapshot",
            "startedBy",
            &[
                ("displayName", self.member_name(entry.starter.member_id)),
                ("timestamp", self.when(entry.starter.timestamp)),
            ],
        );
        let replied = entry.replier.map(|replier| {
            localization.replace_all(
                "topicsnapshot",
                "replied",
                &[
                    ("displayName", self.member_name(replier.member_id)),
                    ("timestamp", self.when(replier.timestamp)),
                ],
            )
        });
        let content = entry
            .post_id
            .and_then(|id| self.posts.iter().find(|post| post.id == id))
            .or_else(|| {
                self.posts
                    .iter()
                    .find(|post| post.topic_id == topic.id && post.first_post)
            })
            .map(|post| post.post_content.as_str())
            .unwrap_or_default();

        Some(TopicSnapshotView {
            topic_title: topic.title.clone(),
            topic_url: topic_url(self.ctx, topic),
            forum_title: forum
                .map(|forum| forum.title.clone())
                .unwrap_or_else(|| localization.get("global", "unknown")),
            forum_color: forum
                .and_then(|forum| forum.color.clone())
                .unwrap_or_else(|| DEFAULT_FORUM_COLOR.to_string()),
            forum_text_color: forum
                .and_then(|forum| forum.text_color.clone())
                .unwrap_or_else(|| DEFAULT_FORUM_TEXT_COLOR.to_string()),
            started_by,
            replied,
            total_replies: format_number(entry.total_replies),
            total_views: format_number(entry.total_views),
            preview: plain_text(content, self.ctx.settings.post_preview_max_length),
        })
    }

    fn member_name(&self, id: i64) -> String {
        member_name(self.ctx, self.members, id)
    }

    fn when(&self, timestamp: Option<i64>) -> String {
        timestamp
            .map(|timestamp| timestamp_text(self.ctx, timestamp, self.now))
            .unwrap_or_default()
    }
}

/// Everything the topic page shows, minus the CSRF token.
pub struct TopicPage {
    pub topic: Topic,
    pub forum: Forum,
    pub started_by: String,
    pub started: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub like: ReactionButton,
    pub subscribe: ReactionButton,
    pub posts: Vec<PostView>,
}

/// Resolve `topic` (`12` or `12-some-title`) against the snapshot.
///
/// Unknown topics, and topics in hidden forums, are not found.
pub fn topic_page(ctx: &RequestContext) -> Result<TopicPage, AppError> {
    let requested = ctx.param("topic").unwrap_or_default();
    let id = extract_id(requested).ok_or_else(|| DomainError::not_found("topic"))?;

    let data = ctx.data()?;
    let tables = data.cache.get_all(&[
        ("topics", "topics"),
        ("forums", "forums"),
        ("members", "members"),
        ("posts", "posts"),
        ("likes", "likes"),
        ("subscriptions", "subscriptions"),
    ]);
    let topics: Vec<Topic> = tables.decode("topics")?;
    let topic = topics
        .into_iter()
        .find(|topic| topic.id == id)
        .ok_or_else(|| DomainError::not_found("topic"))?;
    let forums: Vec<Forum> = tables.decode("forums")?;
    let forum = forums
        .into_iter()
        .find(|forum| forum.id == topic.forum_id && forum.visible)
        .ok_or_else(|| DomainError::not_found("forum"))?;
    let members: Vec<Member> = tables.decode("members")?;
    let likes: Vec<Reaction> = tables.decode("likes")?;
    let subscriptions: Vec<Reaction> = tables.decode("subscriptions")?;
    let mut posts: Vec<Post> = tables.decode("posts")?;
    posts.retain(|post| post.topic_id == topic.id);
    posts.sort_by(|a, b| a.posted.cmp(&b.posted).then(a.id.cmp(&b.id)));

    let now = unix_now();
    let localization = &ctx.localization;
    let starter = member_name(ctx, &members, topic.created_member_id);

    let breadcrumbs = vec![
        Breadcrumb {
            label: localization.get("topics", "forumsBreadcrumb"),
            url: Some(ctx.url("home", "index", &[])),
        },
        Breadcrumb {
            label: forum.title.clone(),
            url: None,
        },
        Breadcrumb {
            label: topic.title.clone(),
            url: Some(topic_url(ctx, &topic)),
        },
    ];

    let button = |toggle: &'static str, label_key: &str, reactions: &[Reaction]| {
        let targeted: Vec<&Reaction> = reactions
            .iter()
            .filter(|reaction| reaction.targets("topic", topic.id))
            .collect();
        ReactionButton {
            toggle,
            content_type: "topic",
            content_id: topic.id,
            label: localization.get("topics", label_key),
            active: !ctx.member.is_guest()
                && targeted
                    .iter()
                    .any(|reaction| reaction.member_id == ctx.member.id),
            total: format_number(targeted.len() as i64),
        }
    };
    let like = button("like", "like", &likes);
    let subscribe = button("subscribe", "subscribe", &subscriptions);

    let posts = posts
        .iter()
        .map(|post| PostView {
            author: member_name(ctx, &members, post.posted_member_id),
            posted: timestamp_text(ctx, post.posted, now),
            content: plain_text(&post.post_content, usize::MAX),
        })
        .collect();

    Ok(TopicPage {
        started_by: localization.replace("topics", "startedBy", "displayName", &starter),
        started: timestamp_text(ctx, topic.created, now),
        breadcrumbs,
        like,
        subscribe,
        posts,
        topic,
        forum,
    })
}

pub fn topic_url(ctx: &RequestContext, topic: &Topic) -> String {
    ctx.url("topics", "view", &[("topic", &slug(topic.id, &topic.title))])
}

fn member_name(ctx: &RequestContext, members: &[Member], id: i64) -> String {
    members
        .iter()
        .find(|member| member.id == id)
        .map(|member| member.display().to_string())
        .unwrap_or_else(|| ctx.localization.get("global", "unknown"))
}

fn timestamp_text(ctx: &RequestContext, timestamp: i64, now: i64) -> String {
    if ctx.settings.time_ago {
        time_ago(&ctx.localization, timestamp, now)
    } else {
        format_date(timestamp)
    }
}
