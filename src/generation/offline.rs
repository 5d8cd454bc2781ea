//! Deterministic offline backend.
//!
//! Used when no API key is configured. Picks a canned answer by keyword
//! (case-insensitive substring match on the latest user message) and emits
//! it one character per fragment, so the streaming path behaves the same as
//! with a live model.

use async_trait::async_trait;
use std::time::Duration;

use super::{FragmentSink, GenerationError, GenerationGateway, APOLOGY};
use crate::config::GenerationConfig;
use crate::models::{Message, Role};

const PRICING_ANSWER: &str = "We offer three pricing tiers: Starter ($29/month), Professional ($99/month), and Enterprise (custom pricing). Each tier includes different features and support levels. Would you like more details about any specific plan?";

const REFUND_ANSWER: &str = "We offer a 30-day money-back guarantee for all new customers. After that, refunds are handled on a case-by-case basis. You can contact our support team at support@helpdesk.ai to discuss your situation.";

const NOT_COVERED_ANSWER: &str = "I don't have information about shipping hardware devices in our current knowledge base. This topic isn't covered in our documentation. Please check our getting-started guide or contact support@helpdesk.ai for assistance with hardware-related questions.";

const API_KEY_ANSWER: &str = "To get your API key, go to Settings > API Keys and click \"Generate New Key\". Store it securely as you'll need it for integrations. Check our getting-started guide for more details.";

const GENERIC_ANSWER: &str = "Based on our knowledge base, here's what I can share. If this doesn't address your question, please refer to the provided sources below.";

/// Keyword rules, checked in order; the first hit wins.
const RULES: &[(&[&str], &str)] = &[
    (&["pricing", "price", "plan"], PRICING_ANSWER),
    (&["refund"], REFUND_ANSWER),
    (&["ship", "hardware", "device"], NOT_COVERED_ANSWER),
    (&["api", "key"], API_KEY_ANSWER),
];

pub struct OfflineGateway {
    delay: Duration,
}

impl OfflineGateway {
    pub fn new(config: &GenerationConfig) -> Self {
        Self::with_delay(Duration::from_millis(config.fragment_delay_ms))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Chooses the canned answer for `question` given the retrieved `context`.
pub fn canned_answer(question: &str, context: &str) -> String {
    let question = question.to_lowercase();
    for (keywords, answer) in RULES {
        if keywords.iter().any(|k| question.contains(k)) {
            return answer.to_string();
        }
    }

    if context.trim().is_empty() {
        APOLOGY.concat()
    } else {
        GENERIC_ANSWER.to_string()
    }
}

#[async_trait]
impl GenerationGateway for OfflineGateway {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(
        &self,
        messages: &[Message],
        context: &str,
        sink: FragmentSink,
    ) -> Result<(), GenerationError> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let answer = canned_answer(question, context);

        for ch in answer.chars() {
            if !sink.send(ch.to_string()).await {
                return Ok(());
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(())
    }
}
