use super::AnalysisResult;
use crate::error::ResponseParseError;

const FENCE: &str = "```";

/// 去掉首尾的代码围栏
///
/// 支持三种形式：无围栏、```json 带语言标记、裸 ```。
/// 开头围栏所在的整行（包括语言标记）都会被丢弃。
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix(FENCE) else {
        return trimmed;
    };

    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        // 只有一行：```{...}``` 形式，没有语言标记
        None => after_open,
    };

    body.trim_end()
        .strip_suffix(FENCE)
        .unwrap_or(body)
        .trim()
}

pub fn parse_analysis(raw: &str) -> Result<AnalysisResult, ResponseParseError> {
    let payload = strip_code_fence(raw);
    if payload.is_empty() {
        return Err(ResponseParseError::Empty);
    }
    Ok(serde_json::from_str(payload)?)
}
