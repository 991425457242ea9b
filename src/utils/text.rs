//! 文本规范化工具

/// 去掉常见拉丁字母的重音符号
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// 规范化可见文本：小写、去重音、合并空白
///
/// 下拉框选项按文本匹配时两边都先经过这里。
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .flat_map(char::to_lowercase)
                .map(fold_accent)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 生成适合文件名的片段
pub fn slugify(text: &str) -> String {
    let normalized = normalize_text(text);
    let mut slug = String::with_capacity(normalized.len());
    let mut last_dash = false;
    for c in normalized.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "x".to_string()
    } else {
        slug
    }
}
