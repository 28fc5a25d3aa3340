use crate::llm::client::types::TokenUsage;
use crate::types::ChatMessage;

/// Token估算规则（字符数/token数）
#[derive(Debug, Clone)]
pub struct TokenCalculationRules {
    pub ascii_char_per_token: f64,
    pub cjk_char_per_token: f64,
    /// 每条消息的固定开销（角色标记等）
    pub per_message_overhead: u64,
}

impl Default for TokenCalculationRules {
    fn default() -> Self {
        Self {
            ascii_char_per_token: 4.0,
            cjk_char_per_token: 1.5,
            per_message_overhead: 4,
        }
    }
}

/// Token估算器：模型服务未返回用量时兜底使用
#[derive(Debug, Clone, Default)]
pub struct TokenEstimator {
    rules: TokenCalculationRules,
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 估算文本的token数量
    pub fn estimate_text(&self, text: &str) -> u64 {
        let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
            if is_cjk(c) {
                (cjk + 1, other)
            } else {
                (cjk, other + 1)
            }
        });

        let cjk_tokens = (cjk as f64 / self.rules.cjk_char_per_token).ceil() as u64;
        let other_tokens = (other as f64 / self.rules.ascii_char_per_token).ceil() as u64;
        cjk_tokens + other_tokens
    }

    /// 估算一组消息的token数量
    pub fn estimate_messages(&self, messages: &[ChatMessage]) -> u64 {
        messages
            .iter()
            .map(|message| {
                let calls: u64 = message
                    .tool_calls
                    .iter()
                    .map(|call| self.estimate_text(&call.arguments.to_string()))
                    .sum();
                self.estimate_text(&message.content) + calls + self.rules.per_message_overhead
            })
            .sum()
    }

    /// 根据请求与响应文本估算一次调用的用量
    pub fn estimate_usage(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        output: &str,
    ) -> TokenUsage {
        let input = system.map(|s| self.estimate_text(s)).unwrap_or(0)
            + self.estimate_messages(messages);
        TokenUsage::new(input, self.estimate_text(output))
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF |  // CJK统一汉字
        0x3400..=0x4DBF |  // CJK扩展A
        0x3040..=0x30FF |  // 日文假名
        0xAC00..=0xD7AF |  // 韩文音节
        0x20000..=0x2A6DF  // CJK扩展B
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_text_counts_cjk_denser() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.estimate_text(""), 0);
        assert_eq!(estimator.estimate_text("abcdefgh"), 2);
        assert_eq!(estimator.estimate_text("中文测"), 2);
    }

    #[test]
    fn test_estimate_usage_sums_input_and_output() {
        let estimator = TokenEstimator::new();
        let usage = estimator.estimate_usage(
            Some("abcd"),
            &[ChatMessage::user("abcd")],
            "abcdabcd",
        );
        assert_eq!(usage.input_tokens, 1 + 1 + 4);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.total_tokens, 8);
    }
}
