use serde::{Deserialize, Serialize};

/// 门户页面的 CSS 选择器
///
/// 默认值针对常见的搜索/列表布局，可在批量配置的 `portal` 段覆盖。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalProfile {
    pub search_input: String,
    pub search_button: String,
    pub listing_item: String,
    pub item_title: String,
    pub item_link: String,
    pub item_date: String,
    pub next_page: String,
}

impl Default for PortalProfile {
    fn default() -> Self {
        Self {
            search_input: "input[type=search], input[name=q], #search-bar".to_string(),
            search_button: "button[type=submit], #div-search-bar button".to_string(),
            listing_item: ".resultado, .resultados-wrapper > div, article".to_string(),
            item_title: "h5, h4, .title-marker, a".to_string(),
            item_link: "a[href]".to_string(),
            item_date: ".date, .publication-info, time".to_string(),
            next_page: "#rightArrow, .pagination-button.next, a[rel=next]".to_string(),
        }
    }
}
