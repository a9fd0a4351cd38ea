use std::io::{self, Write};

use colloquy_client::{MeetingWithParticipants, Message, SenderType};
use colloquy_stream::{Citation, InFlightTurn};

/// Longest tool result shown inline
const RESULT_PREVIEW: usize = 80;

/// Writes turn snapshots as they arrive
///
/// Snapshots are cumulative, so only what was not printed before goes out.
pub struct TurnRenderer<W> {
    out: W,
    show_thinking: bool,
    text_len: usize,
    thinking_len: usize,
    tools_announced: usize,
    tools_resolved: Vec<bool>,
    header_written: bool,
}

impl<W: Write> TurnRenderer<W> {
    pub const fn new(out: W, show_thinking: bool) -> Self {
        Self {
            out,
            show_thinking,
            text_len: 0,
            thinking_len: 0,
            tools_announced: 0,
            tools_resolved: Vec::new(),
            header_written: false,
        }
    }

    /// Print whatever `turn` adds over the previous snapshot
    pub fn progress(&mut self, turn: &InFlightTurn) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "── {} ──", turn.participant.name)?;
            self.header_written = true;
        }

        if self.show_thinking && turn.thinking.len() > self.thinking_len {
            write!(self.out, "{}", &turn.thinking[self.thinking_len..])?;
            self.thinking_len = turn.thinking.len();
        }

        for tool in &turn.tools[self.tools_announced..] {
            writeln!(self.out, "\n  ⚙ {}({})", tool.name, serde_json::Value::Object(tool.arguments.clone()))?;
            self.tools_resolved.push(false);
        }
        self.tools_announced = turn.tools.len();

        for (tool, resolved) in turn.tools.iter().zip(self.tools_resolved.iter_mut()) {
            if let (Some(result), false) = (&tool.result, *resolved) {
                writeln!(self.out, "  ✓ {}: {}", tool.name, preview(result))?;
                *resolved = true;
            }
        }

        if turn.text.len() > self.text_len {
            write!(self.out, "{}", &turn.text[self.text_len..])?;
            self.text_len = turn.text.len();
        }

        self.out.flush()
    }

    /// Close the turn once the persisted message is known
    pub fn resolved(&mut self, message: Option<&Message>) -> io::Result<()> {
        writeln!(self.out)?;

        if let Some(message) = message {
            write_citations(&mut self.out, &message.citations)?;
        }

        self.out.flush()
    }

    /// Close a turn that did not complete
    pub fn interrupted(&mut self, reason: &str) -> io::Result<()> {
        writeln!(self.out, "\n[{reason}]")?;
        self.out.flush()
    }
}

/// Print a meeting header, its participants and transcript
pub fn write_meeting(out: &mut impl Write, meeting: &MeetingWithParticipants) -> io::Result<()> {
    writeln!(out, "{} ({})", meeting.meeting.name, meeting.meeting.id)?;
    if !meeting.meeting.agenda.is_empty() {
        writeln!(out, "Agenda: {}", meeting.meeting.agenda)?;
    }

    writeln!(out, "\nParticipants:")?;
    for participant in &meeting.participants {
        let provider = match participant.provider_config.provider.as_str() {
            "" => colloquy_ratelimit::DEFAULT_PROVIDER,
            provider => provider,
        };
        writeln!(
            out,
            "  {} [{}] {} via {}",
            participant.id, participant.color, participant.name, provider
        )?;
    }

    writeln!(out, "\nTranscript:")?;
    for message in &meeting.messages {
        let marker = match message.sender_type {
            SenderType::User => ">",
            SenderType::Ai => "*",
            SenderType::System => "#",
        };
        writeln!(out, "{marker} {}: {}", message.sender_name, message.content)?;
    }

    Ok(())
}

fn write_citations(out: &mut impl Write, citations: &[Citation]) -> io::Result<()> {
    if citations.is_empty() {
        return Ok(());
    }

    writeln!(out, "Sources:")?;
    for citation in citations {
        match (&citation.title, &citation.url) {
            (Some(title), Some(url)) => writeln!(out, "  - {title} <{url}>")?,
            (Some(title), None) => writeln!(out, "  - {title} ({})", citation.source)?,
            (None, Some(url)) => writeln!(out, "  - {} <{url}>", citation.source)?,
            (None, None) => writeln!(out, "  - {}", citation.source)?,
        }
    }

    Ok(())
}

/// First line of a tool result, shortened to [`RESULT_PREVIEW`] characters
fn preview(result: &str) -> String {
    let line = result.lines().next().unwrap_or_default();
    let mut chars = line.chars();
    let head: String = chars.by_ref().take(RESULT_PREVIEW).collect();

    if chars.next().is_some() || line.len() < result.trim_end().len() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use colloquy_stream::{ParticipantSnapshot, StreamEvent};
    use serde_json::Map;

    use super::*;

    fn turn() -> InFlightTurn {
        InFlightTurn::new(ParticipantSnapshot {
            id: "p-1".to_owned(),
            name: "Ada".to_owned(),
            color: "#6366f1".to_owned(),
        })
    }

    fn render(snapshots: &[InFlightTurn], show_thinking: bool) -> String {
        let mut out = Vec::new();
        let mut renderer = TurnRenderer::new(&mut out, show_thinking);
        for snapshot in snapshots {
            renderer.progress(snapshot).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_only_new_text() {
        let mut turn = turn();
        let mut snapshots = Vec::new();
        for chunk in ["Hel", "lo ", "wörld"] {
            turn.apply(StreamEvent::Text {
                content: chunk.to_owned(),
            })
            .unwrap();
            snapshots.push(turn.clone());
        }

        assert_eq!(render(&snapshots, false), "── Ada ──\nHello wörld");
    }

    #[test]
    fn announces_tools_once_and_results_once() {
        let mut turn = turn();
        let mut snapshots = Vec::new();

        turn.apply(StreamEvent::ToolCall {
            name: "search".to_owned(),
            arguments: Map::new(),
            call_id: None,
        })
        .unwrap();
        snapshots.push(turn.clone());
        snapshots.push(turn.clone());

        turn.apply(StreamEvent::ToolResult {
            name: "search".to_owned(),
            result: "3 hits\nmore".to_owned(),
            call_id: None,
        })
        .unwrap();
        snapshots.push(turn.clone());
        snapshots.push(turn.clone());

        let output = render(&snapshots, false);
        assert_eq!(output.matches("⚙ search({})").count(), 1);
        assert_eq!(output.matches("✓ search: 3 hits…").count(), 1);
    }

    #[test]
    fn thinking_hidden_unless_requested() {
        let mut turn = turn();
        turn.apply(StreamEvent::Thinking {
            content: "hmm".to_owned(),
        })
        .unwrap();

        assert!(!render(&[turn.clone()], false).contains("hmm"));
        assert!(render(&[turn], true).contains("hmm"));
    }

    #[test]
    fn preview_truncates_long_results() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(100)).chars().count(), RESULT_PREVIEW + 1);
    }

    #[test]
    fn citations_prefer_title_and_url() {
        let mut out = Vec::new();
        write_citations(
            &mut out,
            &[
                Citation {
                    source: "notes.md".to_owned(),
                    title: None,
                    url: None,
                    snippet: None,
                },
                Citation {
                    source: "web".to_owned(),
                    title: Some("Rust".to_owned()),
                    url: Some("https://www.rust-lang.org".to_owned()),
                    snippet: None,
                },
            ],
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Sources:\n  - notes.md\n  - Rust <https://www.rust-lang.org>\n"
        );
    }
}
