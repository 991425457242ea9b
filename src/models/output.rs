use serde::{Deserialize, Serialize};

/// 某一级实际使用的选择
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub level: u8,
    #[serde(rename = "type")]
    pub key_type: String,
    pub key: String,
}

/// 列表中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub titulo: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_publicacao: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumo: Option<String>,
    pub hash: String,
}

/// 单个任务的输出文件内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    pub data: String,
    pub secao: String,
    pub selecoes: Vec<Selection>,
    pub query: String,
    pub total: usize,
    pub itens: Vec<Item>,
    pub enriquecido: bool,
}
