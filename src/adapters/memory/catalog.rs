use crate::domain::video::{NewVideo, Video, VideoId};
use crate::ports::catalog::{CatalogError, VideoCatalog};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    last_id: u64,
    videos: HashMap<VideoId, (u64, Video)>,
}

/// Catalog with sequential numeric ids, like an auto-increment table.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<State>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoCatalog for InMemoryCatalog {
    async fn create(&self, video: NewVideo) -> Result<Video, CatalogError> {
        let mut state = self.state.lock().await;
        state.last_id += 1;
        let seq = state.last_id;
        let id = VideoId::parse(&seq.to_string()).map_err(CatalogError::backend)?;
        let video = video.into_video(id.clone(), Utc::now());
        state.videos.insert(id, (seq, video.clone()));
        Ok(video)
    }

    async fn get_video_record(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError> {
        let state = self.state.lock().await;
        Ok(state.videos.get(video_id).map(|(_, v)| v.clone()))
    }

    async fn list(&self) -> Result<Vec<Video>, CatalogError> {
        let state = self.state.lock().await;
        let mut videos: Vec<&(u64, Video)> = state.videos.values().collect();
        videos.sort_by(|a, b| {
            b.1.created_at
                .cmp(&a.1.created_at)
                .then_with(|| b.0.cmp(&a.0))
        });
        Ok(videos.into_iter().map(|(_, v)| v.clone()).collect())
    }

    async fn delete(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError> {
        let mut state = self.state.lock().await;
        Ok(state.videos.remove(video_id).map(|(_, v)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::video::Category;

    fn new_video(title: &str) -> NewVideo {
        NewVideo {
            title: title.into(),
            description: String::new(),
            category: Category::Vlog,
            source_path: format!("/media/sources/{}.mp4", title).into(),
            thumbnail_path: None,
        }
    }

    #[tokio::test]
    async fn test_sequential_ids_and_newest_first() {
        let catalog = InMemoryCatalog::new();
        let a = catalog.create(new_video("a")).await.unwrap();
        let b = catalog.create(new_video("b")).await.unwrap();
        assert_eq!(a.id.as_str(), "1");
        assert_eq!(b.id.as_str(), "2");

        let titles: Vec<String> = catalog
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.title)
            .collect();
        assert_eq!(titles, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_delete_does_not_reuse_ids() {
        let catalog = InMemoryCatalog::new();
        let a = catalog.create(new_video("a")).await.unwrap();
        assert_eq!(catalog.delete(&a.id).await.unwrap().map(|v| v.title), Some("a".into()));
        assert!(catalog.get_video_record(&a.id).await.unwrap().is_none());
        assert!(catalog.delete(&a.id).await.unwrap().is_none());

        let b = catalog.create(new_video("b")).await.unwrap();
        assert_eq!(b.id.as_str(), "2");
    }
}
