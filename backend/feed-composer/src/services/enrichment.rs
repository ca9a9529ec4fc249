//! Response enrichment
//!
//! Turns composed candidates into client-facing items: author profile fields and
//! tags from the post metadata. Pure functions; the profile lookup happens in the
//! feed service.

use serde_json::Value;
use std::collections::HashMap;

use crate::models::{Candidate, FeedItem, Post, Profile, SourceKind};

/// Tags from the post metadata, either `{"tags": [...]}` or a bare array.
/// Anything malformed yields no tags.
pub fn parse_tags(metadata: Option<&str>) -> Vec<String> {
    let Some(raw) = metadata.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Vec::new();
    };

    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };

    let tags = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("tags") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    tags.iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn to_item(
    post: &Post,
    source: Option<SourceKind>,
    profiles: &HashMap<String, Profile>,
) -> FeedItem {
    let profile = profiles.get(&post.author);
    FeedItem {
        id: post.id,
        user_id: post.author.clone(),
        content: post.content.clone(),
        created_at: post.created_at.timestamp(),
        like_count: post.likes,
        heart_count: post.hearts,
        comment_count: post.comment_count,
        category: post.category.clone(),
        tags: parse_tags(post.metadata.as_deref()),
        reply_to: post.reply_to,
        source,
        author_display_name: profile.and_then(|p| p.display_name.clone()),
        author_avatar: profile.and_then(|p| p.avatar_url.clone()),
    }
}

/// Feed items in page order, each carrying its provenance tag
pub fn enrich_candidates(
    candidates: &[Candidate],
    profiles: &HashMap<String, Profile>,
) -> Vec<FeedItem> {
    candidates
        .iter()
        .map(|c| to_item(&c.post, Some(c.source), profiles))
        .collect()
}

pub fn enrich_posts(posts: &[Post], profiles: &HashMap<String, Profile>) -> Vec<FeedItem> {
    posts.iter().map(|p| to_item(p, None, profiles)).collect()
}

/// Distinct authors, first-seen order
pub fn authors_of<'a>(posts: impl IntoIterator<Item = &'a Post>) -> Vec<String> {
    let mut authors: Vec<String> = Vec::new();
    for post in posts {
        if !authors.contains(&post.author) {
            authors.push(post.author.clone());
        }
    }
    authors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(id: i64, author: &str, metadata: Option<&str>) -> Post {
        Post {
            id,
            author: author.to_string(),
            content: "hello".to_string(),
            category: Some("music".to_string()),
            metadata: metadata.map(str::to_string),
            reply_to: None,
            likes: 3,
            hearts: 1,
            comment_count: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_tags_accepts_object_and_array() {
        assert_eq!(
            parse_tags(Some(r#"{"tags": ["jazz", "live"], "mood": "calm"}"#)),
            vec!["jazz", "live"]
        );
        assert_eq!(parse_tags(Some(r#"["a", 1, "b"]"#)), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_metadata_yields_no_tags() {
        assert!(parse_tags(Some("{not json")).is_empty());
        assert!(parse_tags(Some(r#"{"tags": "jazz"}"#)).is_empty());
        assert!(parse_tags(Some("   ")).is_empty());
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn test_enrich_candidates_keeps_order_source_and_profile() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "ann".to_string(),
            Profile {
                username: "ann".to_string(),
                display_name: Some("Ann".to_string()),
                avatar_url: Some("https://cdn/ann.png".to_string()),
            },
        );
        let candidates = vec![
            Candidate::new(post(2, "ann", Some(r#"{"tags":["x"]}"#)), SourceKind::Friends),
            Candidate::new(post(1, "bob", None), SourceKind::Fallback),
        ];

        let items = enrich_candidates(&candidates, &profiles);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 2);
        assert_eq!(items[0].source, Some(SourceKind::Friends));
        assert_eq!(items[0].author_display_name.as_deref(), Some("Ann"));
        assert_eq!(items[0].tags, vec!["x"]);
        assert_eq!(items[1].source, Some(SourceKind::Fallback));
        assert!(items[1].author_avatar.is_none());
        assert_eq!(items[1].heart_count, 1);
    }

    #[test]
    fn test_authors_are_distinct() {
        let posts = vec![post(1, "ann", None), post(2, "bob", None), post(3, "ann", None)];
        assert_eq!(authors_of(&posts), vec!["ann", "bob"]);
    }
}
