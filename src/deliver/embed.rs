// src/deliver/embed.rs
//! Maps a [`Post`] into Discord embed structures.

use serde::{Deserialize, Serialize};

use crate::sources::types::{Engagement, Post, SourceName};

/// Discord blue.
pub const EMBED_COLOR: u32 = 3_447_003;

pub const TITLE_FALLBACK: &str = "News Update";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

/// Fixed-order engagement line for the primary embed's footer.
fn engagement_footer(e: &Engagement) -> String {
    format!(
        "👍 {} | 🔄 {} | 💬 {} | 📝 {}",
        e.likes, e.reposts, e.replies, e.quotes
    )
}

/// Build the ordered embed list for one post: always a primary embed,
/// plus an article-preview embed when the source item wrapped one.
///
/// The article preview's image and a primary-embed image are mutually
/// exclusive; the preview wins.
pub fn format_embeds(post: &Post) -> Vec<Embed> {
    let title = if post.title.is_empty() {
        TITLE_FALLBACK.to_string()
    } else {
        post.title.clone()
    };

    // Reduced single-embed form for everything that is not a Bluesky post.
    if post.origin != SourceName::Bluesky {
        return vec![Embed {
            title,
            description: post.content.clone(),
            url: post.post_url.clone(),
            color: EMBED_COLOR,
            footer: None,
            author: None,
            image: None,
        }];
    }

    let mut primary = Embed {
        title,
        description: post.content.clone(),
        url: post.post_url.clone(),
        color: EMBED_COLOR,
        footer: Some(EmbedFooter {
            text: engagement_footer(&post.engagement),
        }),
        author: Some(EmbedAuthor {
            name: format!("{} (@{})", post.author_name, post.author_handle),
            url: post.canonical_link.clone(),
            icon_url: post.author_avatar_url.clone(),
        }),
        image: None,
    };

    if let Some(article) = &post.article {
        let image = (!post.image_url.is_empty()).then(|| EmbedImage {
            url: post.image_url.clone(),
        });
        let preview = Embed {
            title: article.title.clone(),
            description: article.description.clone(),
            url: article.url.clone(),
            color: EMBED_COLOR,
            footer: None,
            author: None,
            image,
        };
        return vec![primary, preview];
    }

    if !post.image_url.is_empty() {
        primary.image = Some(EmbedImage {
            url: post.image_url.clone(),
        });
    }
    vec![primary]
}
