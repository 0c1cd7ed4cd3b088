use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single catalog entry as shown in the results table and details view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub info_link: Option<String>,
}

impl BookSummary {
    pub fn authors_line(&self) -> String {
        if self.authors.is_empty() {
            "Unknown author".to_string()
        } else {
            self.authors.join(", ")
        }
    }

    /// Link used by "Open in browser" and "Copy link".
    pub fn link(&self) -> String {
        self.info_link
            .clone()
            .unwrap_or_else(|| format!("https://books.google.com/books?id={}", self.id))
    }
}

/// One page as returned by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    pub items: Vec<BookSummary>,
    pub total_count: usize,
}

/// A fetched page together with the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultPage {
    pub query: String,
    pub offset: usize,
    pub page_size: usize,
    pub items: Vec<BookSummary>,
    pub total_count: usize,
}

/// Per-book favorite state. Lives only for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FavoriteStatus {
    #[default]
    NotFavorited,
    Pending,
    Favorited,
    Failed,
}

impl FavoriteStatus {
    pub fn is_favorited(self) -> bool {
        self == FavoriteStatus::Favorited
    }

    /// The add button stays usable unless a request is running or it succeeded.
    pub fn can_add(self) -> bool {
        matches!(self, FavoriteStatus::NotFavorited | FavoriteStatus::Failed)
    }

    /// State once an add (`added`) or remove request has answered.
    pub fn after_update(added: bool, result: &Result<()>) -> Self {
        match (result, added) {
            (Ok(()), true) => FavoriteStatus::Favorited,
            (Ok(()), false) => FavoriteStatus::NotFavorited,
            (Err(_), _) => FavoriteStatus::Failed,
        }
    }
}

// Wire format of the Google Books volumes endpoints

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumesResponse {
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Volume {
    pub id: String,
    #[serde(default)]
    pub volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumeInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    pub description: Option<String>,
    pub image_links: Option<ImageLinks>,
    pub info_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageLinks {
    pub small_thumbnail: Option<String>,
    pub thumbnail: Option<String>,
}

impl From<Volume> for BookSummary {
    fn from(volume: Volume) -> Self {
        let info = volume.volume_info;
        let thumbnail_url = info
            .image_links
            .and_then(|links| links.thumbnail.or(links.small_thumbnail));

        Self {
            id: volume.id,
            title: info.title,
            authors: info.authors,
            publisher: info.publisher,
            published_date: info.published_date,
            page_count: info.page_count,
            description: info.description,
            thumbnail_url,
            info_link: info.info_link,
        }
    }
}

impl From<VolumesResponse> for PageResponse {
    fn from(response: VolumesResponse) -> Self {
        Self {
            items: response.items.into_iter().map(BookSummary::from).collect(),
            total_count: response.total_items,
        }
    }
}
