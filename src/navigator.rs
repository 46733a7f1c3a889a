//! 播放导航
//! 维护当前剧集列表与播放位置, 所有切集操作都经过 `go_to`

use crate::catalog::CatalogError;
use crate::resolver::resolve;
use crate::types::Episode;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 当前集的播放源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// 尚未加载剧集
    Empty,
    Playable(&'a str),
    /// 当前集没有可用地址
    Unavailable,
}

/// 一次剧集加载的凭证, `close` 或新的加载会使旧凭证失效
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed(String),
    /// 凭证已过期, 结果被丢弃
    Stale,
}

#[derive(Debug)]
pub struct PlaybackNavigator {
    episodes: Arc<[Episode]>,
    current: Option<usize>,
    generation: u64,
}

impl Default for PlaybackNavigator {
    fn default() -> Self {
        Self {
            episodes: Arc::from(Vec::<Episode>::new()),
            current: None,
            generation: 0,
        }
    }
}

impl PlaybackNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换剧集列表
    ///
    /// `start_index` 越界或缺省时从第一集开始, 空列表回到 Empty。
    pub fn load_list(&mut self, episodes: impl Into<Arc<[Episode]>>, start_index: Option<usize>) {
        self.episodes = episodes.into();
        self.current = match start_index {
            _ if self.episodes.is_empty() => None,
            Some(index) if index < self.episodes.len() => Some(index),
            _ => Some(0),
        };
        debug!(
            "加载剧集列表: {} 集, 当前 {:?}",
            self.episodes.len(),
            self.current
        );
        self.report_source();
    }

    /// 跳到指定集, 越界时不做任何改变
    pub fn go_to(&mut self, index: usize) -> bool {
        if index >= self.episodes.len() {
            return false;
        }
        self.current = Some(index);
        self.report_source();
        true
    }

    /// 下一集, 已是最后一集时不动
    pub fn next(&mut self) -> bool {
        match self.current {
            Some(index) => self.go_to(index + 1),
            None => false,
        }
    }

    /// 上一集, 已是第一集时不动
    pub fn previous(&mut self) -> bool {
        match self.current.and_then(|index| index.checked_sub(1)) {
            Some(index) => self.go_to(index),
            None => false,
        }
    }

    /// 播放器播完当前集时调用, 最后一集播完后停止
    pub fn on_playback_completed(&mut self) -> bool {
        if !self.has_next() {
            debug!("已是最后一集, 停止播放");
            return false;
        }
        self.next()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_episode(&self) -> Option<&Episode> {
        self.current.and_then(|index| self.episodes.get(index))
    }

    pub fn current_source(&self) -> Source<'_> {
        match self.current_episode() {
            None => Source::Empty,
            Some(episode) => match resolve(episode) {
                Some(url) => Source::Playable(url),
                None => Source::Unavailable,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.current
            .is_some_and(|index| index + 1 < self.episodes.len())
    }

    pub fn has_previous(&self) -> bool {
        self.current.is_some_and(|index| index > 0)
    }

    /// 开始一次异步加载
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket(self.generation)
    }

    /// 处理加载结果, 失败时导航器保持 Empty
    ///
    /// `chapter_id` 用于深链接定位, 找不到时从第一集开始。
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<Episode>, CatalogError>,
        chapter_id: Option<&str>,
    ) -> LoadOutcome {
        if ticket.0 != self.generation {
            debug!("丢弃过期的加载结果 (凭证 {}, 当前 {})", ticket.0, self.generation);
            return LoadOutcome::Stale;
        }

        match result {
            Ok(episodes) => {
                let start = chapter_id.and_then(|id| start_index_for(&episodes, id));
                self.load_list(episodes, start);
                LoadOutcome::Loaded
            }
            Err(e) => {
                warn!("加载剧集失败: {}", e);
                self.clear();
                LoadOutcome::Failed(e.to_string())
            }
        }
    }

    /// 离开播放页, 未完成的加载随之作废
    ///
    /// HTTP 接口每个请求新建导航器, 只有长期持有导航器的调用方需要它。
    #[allow(dead_code)]
    pub fn close(&mut self) {
        self.generation += 1;
        self.clear();
    }

    fn clear(&mut self) {
        self.episodes = Arc::from(Vec::<Episode>::new());
        self.current = None;
    }

    fn report_source(&self) {
        if let (Some(index), Source::Unavailable) = (self.current, self.current_source()) {
            info!("第 {} 集没有可用播放源", index + 1);
        }
    }

    /// 当前状态快照
    pub fn view(&self) -> Option<PlaybackView> {
        let index = self.current?;
        let episode = self.current_episode()?;
        let video_url = match self.current_source() {
            Source::Playable(url) => Some(url.to_string()),
            _ => None,
        };

        Some(PlaybackView {
            index,
            episode_number: index + 1,
            chapter_id: episode.chapter_id.clone(),
            chapter_name: episode.chapter_name.clone(),
            chapter_img: episode.chapter_img.clone(),
            available: video_url.is_some(),
            video_url,
            has_next: self.has_next(),
            has_previous: self.has_previous(),
            total: self.episodes.len(),
        })
    }
}

/// 按 chapterId 找到起始位置, 重复 id 取第一个
pub fn start_index_for(episodes: &[Episode], chapter_id: &str) -> Option<usize> {
    episodes.iter().position(|e| e.chapter_id == chapter_id)
}

/// 播放页需要的状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackView {
    pub index: usize,
    pub episode_number: usize,
    pub chapter_id: String,
    pub chapter_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_img: Option<String>,
    pub video_url: Option<String>,
    pub available: bool,
    pub has_next: bool,
    pub has_previous: bool,
    pub total: usize,
}
