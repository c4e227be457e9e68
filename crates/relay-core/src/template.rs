//! Prompt templates for the supported model families.
//!
//! Every [`TemplateFormat`] is one row of a static table. The engine only
//! reads the table; adding a model family means adding a row.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::ConversationSession;

/// Placeholder replaced by the persona name inside fragments and tokens.
const NAME_PLACEHOLDER: &str = "{name}";

/// Textual framing convention expected by a backend model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateFormat {
    #[serde(rename = "alpaca")]
    Alpaca,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "chatml")]
    ChatMl,
    #[serde(rename = "pygmalion")]
    Pygmalion,
    #[serde(rename = "vicuna")]
    Vicuna,
    #[serde(rename = "llama3")]
    Llama3,
    #[serde(rename = "phi-3")]
    Phi3,
    #[serde(rename = "raw")]
    Raw,
}

/// Fragments and cleanup tokens for one format.
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
    /// Inserted before the user's text.
    pub user_prefix: &'static str,
    /// Appended after the user's text; opens the assistant turn.
    pub open_fragment: &'static str,
    /// Appended after the cleaned assistant text; opens the next user turn.
    pub close_fragment: &'static str,
    /// Removed from raw backend output. Role headers come before the bare
    /// control tokens they contain.
    pub cleanup: &'static [&'static str],
}

const FORMAT_TABLE: &[(TemplateFormat, FormatSpec)] = &[
    (
        TemplateFormat::Alpaca,
        FormatSpec {
            user_prefix: "",
            open_fragment: "\n### Response:\n",
            close_fragment: "\n### Instruction:\n",
            cleanup: &["### Instruction:", "### Response:", "### Input:"],
        },
    ),
    (
        TemplateFormat::Mistral,
        FormatSpec {
            user_prefix: "",
            open_fragment: " [/INST]",
            close_fragment: "</s>[INST] ",
            cleanup: &["[INST]", "[/INST]", "<s>", "</s>"],
        },
    ),
    (
        TemplateFormat::ChatMl,
        FormatSpec {
            user_prefix: "",
            open_fragment: "<|im_end|>\n<|im_start|>assistant\n",
            close_fragment: "<|im_end|>\n<|im_start|>user\n",
            cleanup: &[
                "<|im_start|>system",
                "<|im_start|>user",
                "<|im_start|>assistant",
                "<|im_end|>",
                "<|im_start|>",
            ],
        },
    ),
    (
        TemplateFormat::Pygmalion,
        FormatSpec {
            user_prefix: " ",
            open_fragment: "\n{name}:",
            close_fragment: "\nYou:",
            cleanup: &["{name}:", "You:"],
        },
    ),
    (
        TemplateFormat::Vicuna,
        FormatSpec {
            user_prefix: "",
            open_fragment: "\nASSISTANT: ",
            close_fragment: "</s>\nUSER: ",
            cleanup: &["</s>", "USER:", "ASSISTANT:"],
        },
    ),
    (
        TemplateFormat::Llama3,
        FormatSpec {
            user_prefix: "",
            open_fragment: "<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n",
            close_fragment: "<|eot_id|><|start_header_id|>user<|end_header_id|>\n\n",
            cleanup: &[
                "<|start_header_id|>system<|end_header_id|>",
                "<|start_header_id|>user<|end_header_id|>",
                "<|start_header_id|>assistant<|end_header_id|>",
                "<|begin_of_text|>",
                "<|eot_id|>",
                "<|start_header_id|>",
                "<|end_header_id|>",
            ],
        },
    ),
    (
        TemplateFormat::Phi3,
        FormatSpec {
            user_prefix: "",
            open_fragment: "<|end|>\n<|assistant|>\n",
            close_fragment: "<|end|>\n<|user|>\n",
            cleanup: &["<|system|>", "<|user|>", "<|assistant|>", "<|endoftext|>", "<|end|>"],
        },
    ),
    (
        TemplateFormat::Raw,
        FormatSpec {
            user_prefix: "",
            open_fragment: "\n",
            close_fragment: "\n",
            cleanup: &[],
        },
    ),
];

impl TemplateFormat {
    /// All supported formats.
    pub const ALL: [TemplateFormat; 8] = [
        Self::Alpaca,
        Self::Mistral,
        Self::ChatMl,
        Self::Pygmalion,
        Self::Vicuna,
        Self::Llama3,
        Self::Phi3,
        Self::Raw,
    ];

    /// The configuration name of this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alpaca => "alpaca",
            Self::Mistral => "mistral",
            Self::ChatMl => "chatml",
            Self::Pygmalion => "pygmalion",
            Self::Vicuna => "vicuna",
            Self::Llama3 => "llama3",
            Self::Phi3 => "phi-3",
            Self::Raw => "raw",
        }
    }

    /// The table row for this format.
    pub fn spec(self) -> &'static FormatSpec {
        FORMAT_TABLE
            .iter()
            .find(|(format, _)| *format == self)
            .map(|(_, spec)| spec)
            // The table is static and covers every variant (checked in tests).
            .unwrap_or(&FORMAT_TABLE[FORMAT_TABLE.len() - 1].1)
    }

    /// Closing fragment with the persona name substituted.
    pub fn close_fragment(self, persona_name: &str) -> String {
        render(self.spec().close_fragment, persona_name)
    }

    /// Remove this format's control tokens from a raw backend reply.
    ///
    /// Removal repeats until no token is left, so tokens that only appear
    /// after removing another one are also stripped. Surrounding whitespace
    /// is trimmed.
    pub fn clean_reply(self, raw: &str, persona_name: &str) -> String {
        let tokens: Vec<String> = self
            .spec()
            .cleanup
            .iter()
            .map(|token| render(token, persona_name))
            .filter(|token| !token.is_empty())
            .collect();

        let mut text = raw.to_string();
        loop {
            let before = text.len();
            for token in &tokens {
                if text.contains(token.as_str()) {
                    text = text.replace(token.as_str(), "");
                }
            }
            if text.len() == before {
                break;
            }
        }

        text.trim().to_string()
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownFormat(s.to_string()))
    }
}

fn render(fragment: &str, persona_name: &str) -> String {
    fragment.replace(NAME_PLACEHOLDER, persona_name)
}

/// Append the user's message to the session buffer and open the assistant turn.
pub fn append_user_turn(session: &mut ConversationSession, text: &str) {
    let spec = session.template_format().spec();
    let name = session.persona_name().to_string();
    let buffer = session.buffer_mut();
    buffer.push_str(spec.user_prefix);
    buffer.push_str(text);
    buffer.push_str(&render(spec.open_fragment, &name));
}

/// Clean a raw backend reply, store it in the buffer and close the turn.
///
/// Returns the cleaned text for delivery to the user.
pub fn append_assistant_turn(session: &mut ConversationSession, raw_reply: &str) -> String {
    let format = session.template_format();
    let name = session.persona_name().to_string();
    let cleaned = format.clean_reply(raw_reply, &name);
    let buffer = session.buffer_mut();
    buffer.push_str(&cleaned);
    buffer.push_str(&format.close_fragment(&name));
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaConfig;

    fn session_for(format: TemplateFormat, seed: &str) -> ConversationSession {
        PersonaConfig::new(format, "Aria", seed).new_session("alice@example.org")
    }

    #[test]
    fn test_table_covers_every_format() {
        for format in TemplateFormat::ALL {
            assert!(
                FORMAT_TABLE.iter().any(|(f, _)| *f == format),
                "missing table row for {}",
                format
            );
        }
        assert_eq!(FORMAT_TABLE.len(), TemplateFormat::ALL.len());
    }

    #[test]
    fn test_format_names_round_trip() {
        for format in TemplateFormat::ALL {
            assert_eq!(format.as_str().parse::<TemplateFormat>().unwrap(), format);
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format.as_str()));
        }
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let err = "gpt-neox".parse::<TemplateFormat>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat(ref name) if name == "gpt-neox"));
    }

    #[test]
    fn test_chatml_scenario() {
        let mut session = session_for(TemplateFormat::ChatMl, "<|im_start|>system\nBe kind.<|im_end|>\n<|im_start|>user\n");

        append_user_turn(&mut session, "Hello");
        assert!(session
            .prompt_buffer()
            .contains("user\nHello<|im_end|>\n<|im_start|>assistant\n"));

        let cleaned = append_assistant_turn(&mut session, "Hi there!<|im_end|>\n<|im_start|>user");
        assert_eq!(cleaned, "Hi there!");
        assert!(session
            .prompt_buffer()
            .ends_with("assistant\nHi there!<|im_end|>\n<|im_start|>user\n"));
    }

    #[test]
    fn test_every_format_ends_with_close_fragment() {
        for format in TemplateFormat::ALL {
            let mut session = session_for(format, "seed");
            append_user_turn(&mut session, "How are you?");
            append_assistant_turn(&mut session, "Fine, thanks.");

            let close = format.close_fragment("Aria");
            assert!(
                session.prompt_buffer().ends_with(&format!("Fine, thanks.{}", close)),
                "{} buffer was {:?}",
                format,
                session.prompt_buffer()
            );
        }
    }

    #[test]
    fn test_cleanup_removes_repeated_tokens() {
        for format in TemplateFormat::ALL {
            let tokens: Vec<String> = format
                .spec()
                .cleanup
                .iter()
                .map(|t| render(t, "Aria"))
                .collect();
            let mut raw = String::from("Sure.");
            for token in &tokens {
                raw.push_str(token);
                raw.push_str(" ok ");
                raw.push_str(token);
            }

            let cleaned = format.clean_reply(&raw, "Aria");
            for token in &tokens {
                assert!(
                    !cleaned.contains(token.as_str()),
                    "{} left {:?} in {:?}",
                    format,
                    token,
                    cleaned
                );
            }
            assert!(cleaned.starts_with("Sure."));
        }
    }

    #[test]
    fn test_cleanup_handles_nested_tokens() {
        let cleaned = TemplateFormat::ChatMl.clean_reply("ok<|im_<|im_end|>end|>", "Aria");
        assert_eq!(cleaned, "ok");
    }

    #[test]
    fn test_pygmalion_uses_persona_name() {
        let mut session = session_for(TemplateFormat::Pygmalion, "Aria's Persona: helpful\nYou:");
        append_user_turn(&mut session, "Hello");
        assert!(session.prompt_buffer().ends_with("You: Hello\nAria:"));

        let cleaned = append_assistant_turn(&mut session, " Hi!\nAria: How can I help?\nYou:");
        assert_eq!(cleaned, "Hi!\n How can I help?");
        assert!(session.prompt_buffer().ends_with("How can I help?\nYou:"));
    }

    #[test]
    fn test_alpaca_turns() {
        let mut session = session_for(TemplateFormat::Alpaca, "### Instruction:\n");
        append_user_turn(&mut session, "Name a color");
        let cleaned = append_assistant_turn(&mut session, "Blue\n### Instruction:");
        assert_eq!(cleaned, "Blue");
        assert_eq!(
            session.prompt_buffer(),
            "### Instruction:\nName a color\n### Response:\nBlue\n### Instruction:\n"
        );
    }

    #[test]
    fn test_raw_keeps_reply_verbatim() {
        let cleaned = TemplateFormat::Raw.clean_reply("  <|im_end|> stays  ", "Aria");
        assert_eq!(cleaned, "<|im_end|> stays");
    }
}
