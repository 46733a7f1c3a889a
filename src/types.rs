//! 数据类型定义
//! 上游短剧接口的 JSON 结构

use serde::{Deserialize, Serialize};

/// 单集 (上游称 chapter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub chapter_id: String,
    #[serde(default)]
    pub chapter_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_img: Option<String>,
    /// 播放线路, 顺序即上游返回顺序
    #[serde(default)]
    pub cdn_list: Vec<Mirror>,
}

/// 播放线路 (CDN)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mirror {
    #[serde(default, deserialize_with = "truthy_flag")]
    pub is_default: bool,
    #[serde(default)]
    pub video_path_list: Vec<VideoVariant>,
}

/// 线路下的单个视频地址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoVariant {
    #[serde(default, deserialize_with = "truthy_flag")]
    pub is_default: bool,
    pub video_path: String,
}

/// 短剧基本信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DramaBasic {
    pub book_id: String,
    pub book_name: String,
    pub cover: String,
    pub cover_wap: String,
    pub introduction: String,
    pub tags: Vec<String>,
    /// 搜索接口返回的是 tagNames
    pub tag_names: Vec<String>,
    pub protagonist: String,
}

/// "为你推荐" 列表项
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForYouItem {
    pub tag_card_vo: TagCard,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagCard {
    pub tag_books: Vec<DramaBasic>,
}

/// 上游的 isDefault 可能是布尔, 0/1 或字符串, 按真值处理
fn truthy_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Null => false,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    })
}
