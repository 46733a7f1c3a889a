//! 播放地址解析
//! 从单集的线路列表中选出唯一可播放的视频地址

use crate::types::{Episode, Mirror, VideoVariant};

/// 选出默认线路: 第一个标记为默认的线路, 否则取第一条
pub fn default_mirror(episode: &Episode) -> Option<&Mirror> {
    episode
        .cdn_list
        .iter()
        .find(|m| m.is_default)
        .or_else(|| episode.cdn_list.first())
}

/// 选出线路内的默认地址, 规则同上
pub fn default_variant(mirror: &Mirror) -> Option<&VideoVariant> {
    mirror
        .video_path_list
        .iter()
        .find(|v| v.is_default)
        .or_else(|| mirror.video_path_list.first())
}

/// 解析单集的播放地址
///
/// 没有线路或选中的线路没有地址时返回 `None`。
/// 选中线路为空时不会回退到其它线路。默认地址为空串时退回线路的第一个地址,
/// 仍为空则视为不可用。
pub fn resolve(episode: &Episode) -> Option<&str> {
    let mirror = default_mirror(episode)?;
    default_variant(mirror)
        .map(|v| v.video_path.as_str())
        .filter(|path| !path.is_empty())
        .or_else(|| {
            mirror
                .video_path_list
                .first()
                .map(|v| v.video_path.as_str())
                .filter(|path| !path.is_empty())
        })
}
