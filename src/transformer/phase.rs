//! Phase-transition content rewriter.
//!
//! The upstream tags each streamed fragment with a phase (`thinking`,
//! `answer`, `tool_call`, or nothing) and mixes reasoning markup, answer
//! text, and wrapped tool-call JSON into the payload. [`PhaseRewriter`]
//! consumes one event at a time and emits a clean [`NormalizedDelta`],
//! applying the configured [`ThinkMode`] to reasoning markup.
//!
//! One rewriter instance is owned by exactly one stream; the previous
//! phase it remembers is how a pause in one phase is told apart from a
//! transition into another.

use crate::core::config::ThinkMode;
use crate::transformer::canonical::{NormalizedDelta, Phase, UpstreamEvent};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // tool_call phase: the metadata envelope around the tool-call JSON
    static ref TOOL_BLOCK_OPEN: Regex =
        Regex::new(r#"\n*<glm_block[^>]*>\{"type": "mcp", "data": \{"metadata": \{"#).unwrap();
    static ref TOOL_BLOCK_TAIL: Regex =
        Regex::new(r#"", "result": "".*</glm_block>"#).unwrap();
    // tail form seen when the upstream pauses a tool call mid-stream
    static ref PAUSED_TOOL_TAIL: Regex =
        Regex::new(r#"null, "display_result": "".*</glm_block>"#).unwrap();

    static ref DETAILS_BLOCK: Regex = Regex::new(r"(?s)<details[^>]*?>.*?</details>").unwrap();
    static ref SUMMARY_BLOCK: Regex = Regex::new(r"\n*<summary>.*?</summary>\n*").unwrap();
    static ref DETAILS_OPEN: Regex = Regex::new(r"<details[^>]*>\n*").unwrap();
    static ref DETAILS_CLOSE: Regex = Regex::new(r"\n*</details>").unwrap();
    static ref REASONING_SPLIT: Regex = Regex::new(r"(?s)^(.*?</reasoning>)(.*)$").unwrap();
    static ref REASONING_OPEN: Regex = Regex::new(r"<reasoning>\n*").unwrap();
    static ref REASONING_CLOSE: Regex = Regex::new(r"\n*</reasoning>").unwrap();
    static ref BLOCKQUOTE: Regex = Regex::new(r"(?m)^> ?").unwrap();
    static ref SUMMARY_TAG: Regex = Regex::new(r"(?s)<summary>.*?</summary>").unwrap();
    static ref DURATION_ATTR: Regex = Regex::new(r#"duration="(\d+)""#).unwrap();
}

/// Stateful per-stream rewriter. Create one at stream start, discard it
/// at stream end; it must never be shared between streams.
pub struct PhaseRewriter {
    mode: ThinkMode,
    previous: Option<Phase>,
}

impl PhaseRewriter {
    pub fn new(mode: ThinkMode) -> Self {
        Self {
            mode,
            previous: None,
        }
    }

    /// Rewrite one upstream event into zero or one normalized delta.
    pub fn rewrite(&mut self, event: &UpstreamEvent) -> NormalizedDelta {
        let mut phase = event.phase;
        let mut content = event.text.clone();

        if content.is_empty() {
            return NormalizedDelta::Empty;
        }

        if phase == Phase::ToolCall {
            content = TOOL_BLOCK_OPEN.replace_all(&content, "{").into_owned();
            content = TOOL_BLOCK_TAIL.replace_all(&content, "").into_owned();
        } else if phase == Phase::Other
            && self.previous == Some(Phase::ToolCall)
            && content.contains("glm_block")
        {
            // the upstream paused the tool call; this event is its continuation
            phase = Phase::ToolCall;
            content = PAUSED_TOOL_TAIL.replace_all(&content, "\"}").into_owned();
        }

        if phase == Phase::Thinking || (phase == Phase::Answer && content.contains("summary>")) {
            content = DETAILS_BLOCK.replace_all(&content, "").into_owned();
            content = content
                .replace("</thinking>", "")
                .replace("<Full>", "")
                .replace("</Full>", "");

            if phase == Phase::Thinking {
                content = SUMMARY_BLOCK.replace_all(&content, "\n\n").into_owned();
            }

            content = DETAILS_OPEN
                .replace_all(&content, "<reasoning>\n\n")
                .into_owned();
            content = DETAILS_CLOSE
                .replace_all(&content, "\n\n</reasoning>")
                .into_owned();

            // text preceding the reasoning close, kept for the details trailer
            let mut trailer_source = String::new();
            if phase == Phase::Answer {
                let split = REASONING_SPLIT
                    .captures(&content)
                    .map(|caps| (caps[1].to_string(), caps[2].to_string()));
                if let Some((before, after)) = split {
                    trailer_source = before;
                    if !after.trim().is_empty() {
                        if self.previous == Some(Phase::Thinking) {
                            // interrupted thinking: close it and continue with the answer
                            content =
                                format!("\n\n</reasoning>\n\n{}", after.trim_start_matches('\n'));
                        } else if self.previous == Some(Phase::Answer) {
                            // mid-answer pause carries no new information
                            content.clear();
                        }
                    } else {
                        content = "\n\n</reasoning>".to_string();
                    }
                }
            }

            content = self.apply_mode(phase, content, &trailer_source);
        }

        self.previous = Some(phase);

        if content.is_empty() {
            return NormalizedDelta::Empty;
        }
        if phase == Phase::ToolCall {
            return NormalizedDelta::ToolCallFragment(content);
        }
        if phase == Phase::Thinking && self.mode == ThinkMode::Reasoning {
            return NormalizedDelta::Reasoning(content);
        }
        NormalizedDelta::Answer(content)
    }

    fn apply_mode(&self, phase: Phase, mut content: String, trailer_source: &str) -> String {
        match self.mode {
            ThinkMode::Reasoning => {
                if phase == Phase::Thinking {
                    content = BLOCKQUOTE.replace_all(&content, "").into_owned();
                }
                content = SUMMARY_BLOCK.replace_all(&content, "").into_owned();
                content = REASONING_OPEN.replace_all(&content, "").into_owned();
                content = REASONING_CLOSE.replace_all(&content, "").into_owned();
            }
            ThinkMode::Think => {
                if phase == Phase::Thinking {
                    content = BLOCKQUOTE.replace_all(&content, "").into_owned();
                }
                content = SUMMARY_BLOCK.replace_all(&content, "").into_owned();
                content = content
                    .replace("<reasoning>", "<think>")
                    .replace("</reasoning>", "</think>");
            }
            ThinkMode::Strip => {
                content = SUMMARY_BLOCK.replace_all(&content, "").into_owned();
                content = REASONING_OPEN.replace_all(&content, "").into_owned();
                content = content.replace("</reasoning>", "");
            }
            ThinkMode::Details => {
                if phase == Phase::Thinking {
                    content = BLOCKQUOTE.replace_all(&content, "").into_owned();
                }
                content = content.replace("<reasoning>", "<details type=\"reasoning\" open><div>");

                let mut trailer = String::new();
                if phase == Phase::Answer {
                    let source = if trailer_source.is_empty() {
                        REASONING_SPLIT
                            .captures(&content)
                            .map(|caps| caps[1].to_string())
                            .unwrap_or_default()
                    } else {
                        trailer_source.to_string()
                    };
                    if let Some(summary) = SUMMARY_TAG.find(&source) {
                        trailer = format!("\n\n{}", summary.as_str());
                    } else if let Some(caps) = DURATION_ATTR.captures(&source) {
                        trailer =
                            format!("\n\n<summary>Thought for {} seconds</summary>", &caps[1]);
                    }
                }
                content =
                    content.replace("</reasoning>", &format!("</div>{}</details>", trailer));
            }
        }
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(phase: Phase, text: &str) -> UpstreamEvent {
        UpstreamEvent::new(phase, text)
    }

    #[test]
    fn test_reasoning_mode_strips_blockquote_marker() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
        let delta = rewriter.rewrite(&event(Phase::Thinking, "> hello\n"));
        assert_eq!(delta, NormalizedDelta::Reasoning("hello\n".to_string()));
    }

    #[test]
    fn test_reasoning_mode_strips_details_wrapper() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
        let delta = rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\n> Let me think\n",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Reasoning("Let me think\n".to_string())
        );
    }

    #[test]
    fn test_empty_event_yields_empty_for_every_phase() {
        for mode in [
            ThinkMode::Reasoning,
            ThinkMode::Think,
            ThinkMode::Strip,
            ThinkMode::Details,
        ] {
            let mut rewriter = PhaseRewriter::new(mode);
            for phase in [Phase::Thinking, Phase::Answer, Phase::ToolCall, Phase::Other] {
                assert_eq!(
                    rewriter.rewrite(&event(phase, "")),
                    NormalizedDelta::Empty
                );
            }
        }
    }

    #[test]
    fn test_think_mode_renames_reasoning_tags() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Think);
        let delta = rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\n> pondering\n",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Answer("<think>\n\npondering\n".to_string())
        );
    }

    #[test]
    fn test_strip_mode_keeps_inner_text() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Strip);
        let delta = rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\ninner thought",
        ));
        assert_eq!(delta, NormalizedDelta::Answer("inner thought".to_string()));
    }

    #[test]
    fn test_thinking_summary_replaced_with_blank_line() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Think);
        let delta = rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\n<summary>Thinking...</summary>\n> step one",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Answer("<think>\n\nstep one".to_string())
        );
    }

    #[test]
    fn test_interrupted_thinking_emits_close_and_answer() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Think);
        rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\n> musing",
        ));
        let delta = rewriter.rewrite(&event(
            Phase::Answer,
            "</summary></details>\n\nThe answer",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Answer("\n\n</think>\n\nThe answer".to_string())
        );
    }

    #[test]
    fn test_mid_answer_pause_is_suppressed() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Think);
        rewriter.rewrite(&event(Phase::Answer, "Hello"));
        let delta = rewriter.rewrite(&event(
            Phase::Answer,
            "</summary></details>\n\nrepeated text",
        ));
        assert_eq!(delta, NormalizedDelta::Empty);
    }

    #[test]
    fn test_close_without_trailing_text_emits_close_only() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Think);
        rewriter.rewrite(&event(Phase::Thinking, "> musing"));
        let delta = rewriter.rewrite(&event(Phase::Answer, "</summary></details>"));
        assert_eq!(delta, NormalizedDelta::Answer("\n\n</think>".to_string()));
    }

    #[test]
    fn test_details_mode_rewrites_opening_tag() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Details);
        let delta = rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\n> pondering\n",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Answer(
                "<details type=\"reasoning\" open><div>\n\npondering\n".to_string()
            )
        );
    }

    #[test]
    fn test_details_mode_synthesizes_duration_trailer() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Details);
        rewriter.rewrite(&event(
            Phase::Thinking,
            "<details type=\"reasoning\" open>\n> pondering\n",
        ));
        let delta = rewriter.rewrite(&event(
            Phase::Answer,
            "<summary duration=\"7\">Thought for 7 seconds</summary>\n</details>",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Answer(
                "\n\n</div>\n\n<summary>Thought for 7 seconds</summary></details>".to_string()
            )
        );
    }

    #[test]
    fn test_details_mode_repeats_summary_verbatim() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Details);
        rewriter.rewrite(&event(Phase::Thinking, "> musing"));
        let delta = rewriter.rewrite(&event(
            Phase::Answer,
            "<summary>Planned the trip</summary></details>\n\nHere it is",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::Answer(
                "\n\n</div>\n\n<summary>Planned the trip</summary></details>\n\nHere it is"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_tool_call_wrapper_stripped() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
        let delta = rewriter.rewrite(&event(
            Phase::ToolCall,
            "\n<glm_block view=\"mcp\">{\"type\": \"mcp\", \"data\": {\"metadata\": {\"id\": \"call_1\", ",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::ToolCallFragment("{\"id\": \"call_1\", ".to_string())
        );
    }

    #[test]
    fn test_tool_call_complete_tail_stripped() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
        let delta = rewriter.rewrite(&event(
            Phase::ToolCall,
            "args\", \"result\": \"\"}}</glm_block>",
        ));
        assert_eq!(delta, NormalizedDelta::ToolCallFragment("args".to_string()));
    }

    #[test]
    fn test_other_after_tool_call_is_reclassified() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
        rewriter.rewrite(&event(
            Phase::ToolCall,
            "\n<glm_block view=\"mcp\">{\"type\": \"mcp\", \"data\": {\"metadata\": {\"id\": \"call_1\"",
        ));
        let delta = rewriter.rewrite(&event(
            Phase::Other,
            "null, \"display_result\": \"\"}}</glm_block>",
        ));
        assert_eq!(
            delta,
            NormalizedDelta::ToolCallFragment("\"}".to_string())
        );
    }

    #[test]
    fn test_other_without_marker_passes_through() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
        let delta = rewriter.rewrite(&event(Phase::Other, "heartbeat"));
        assert_eq!(delta, NormalizedDelta::Answer("heartbeat".to_string()));
    }

    #[test]
    fn test_answer_without_summary_marker_passes_through() {
        let mut rewriter = PhaseRewriter::new(ThinkMode::Details);
        let delta = rewriter.rewrite(&event(Phase::Answer, "plain answer text"));
        assert_eq!(
            delta,
            NormalizedDelta::Answer("plain answer text".to_string())
        );
    }
}
