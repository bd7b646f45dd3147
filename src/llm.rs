//! Gateway to the external ticket classifier.
//!
//! The classifier is optional: without a credential the gateway reports
//! [`Outcome::Unavailable`] without touching the network, and any failure
//! of the single classification attempt collapses to the same outcome.
//! Callers never see an error from here.

use derive_more::From;
use serde::Deserialize;
use serde_json::json;

use crate::config;

const CHAT_COMPLETIONS_URL: &str =
    "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4";

pub struct Classifier {
    http: reqwest::Client,
    api_key: Option<String>,
}

/// Result of a classification attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Suggestion { category: String, priority: String },
    Unavailable,
}

impl Classifier {
    pub fn new(config: config::Llm) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            api_key: config.api_key,
        })
    }

    /// Issues at most one classification request.
    pub async fn classify(&self, description: &str) -> Outcome {
        let Some(api_key) = &self.api_key else {
            return Outcome::Unavailable;
        };

        match self.request(api_key, description).await {
            Ok((category, priority)) => {
                Outcome::Suggestion { category, priority }
            }
            Err(e) => {
                tracing::warn!("ticket classification failed: {e:?}");
                Outcome::Unavailable
            }
        }
    }

    async fn request(
        &self,
        api_key: &str,
        description: &str,
    ) -> Result<(String, String), ClassifyError> {
        let body = json!({
            "model": MODEL,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a support ticket classifier.",
                },
                {
                    "role": "user",
                    "content": prompt(description),
                },
            ],
            "temperature": 0.3,
            "max_tokens": 100,
        });

        let completion = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatCompletion>()
            .await?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ClassifyError::NoChoices)?;
        parse_suggestion(&choice.message.content)
    }
}

fn prompt(description: &str) -> String {
    format!(
        "Analyze this support ticket description and suggest:\n\
         1. Category (billing, technical, account, or general)\n\
         2. Priority (low, medium, high, or critical)\n\
         \n\
         Description: {description}\n\
         \n\
         Respond in JSON format:\n\
         {{\"category\": \"...\", \"priority\": \"...\"}}"
    )
}

fn parse_suggestion(
    content: &str,
) -> Result<(String, String), ClassifyError> {
    #[derive(Deserialize)]
    struct Suggestion {
        category: String,
        priority: String,
    }

    let Suggestion { category, priority } = serde_json::from_str(content)?;
    Ok((category, priority))
}

#[derive(Debug, From)]
enum ClassifyError {
    #[from]
    Http(reqwest::Error),
    #[from]
    MalformedSuggestion(serde_json::Error),
    NoChoices,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_classifier_is_unavailable() {
        let classifier =
            Classifier::new(config::Llm::default()).unwrap();
        let outcome = classifier.classify("My invoice is wrong").await;
        assert_eq!(outcome, Outcome::Unavailable);
    }

    #[test]
    fn parses_well_formed_suggestion() {
        let content = r#"{"category": "billing", "priority": "high"}"#;
        assert!(matches!(
            parse_suggestion(content),
            Ok((category, priority))
                if category == "billing" && priority == "high",
        ));
    }

    #[test]
    fn rejects_suggestion_with_missing_fields() {
        let content = r#"{"category": "billing"}"#;
        assert!(parse_suggestion(content).is_err());
    }

    #[test]
    fn rejects_non_json_suggestion() {
        assert!(parse_suggestion("probably a billing issue").is_err());
    }

    #[test]
    fn prompt_embeds_the_description() {
        let prompt = prompt("VPN drops every hour");
        assert!(prompt.contains("Description: VPN drops every hour"));
        assert!(prompt.contains("Respond in JSON format"));
    }
}
