//! Line-oriented terminal rendering of a trace

use crate::geo::{haversine_km, Coordinate};
use crate::render::{RenderInstruction, RenderSink};
use crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use std::io::{self, Stdout, Write};
use tracing::warn;

/// Width of the separator printed when the view is cleared
const RULE_WIDTH: usize = 60;

/// Renders instructions as timestamped, colored lines
pub struct ConsoleSink<W: Write> {
    out: W,
    color: bool,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, fg: Option<Color>, bold: bool, text: &str) -> io::Result<()> {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        queue!(self.out, Print(format!("[{stamp}] ")))?;

        if self.color && bold {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        match fg {
            Some(color) if self.color => {
                queue!(self.out, SetForegroundColor(color), Print(text), ResetColor)?
            }
            _ => queue!(self.out, Print(text))?,
        }
        if self.color && bold {
            queue!(self.out, SetAttribute(Attribute::Reset))?;
        }

        queue!(self.out, Print("\n"))?;
        self.out.flush()
    }

    fn draw(&mut self, instruction: &RenderInstruction) -> io::Result<()> {
        match instruction {
            RenderInstruction::ClearAll => {
                queue!(self.out, Print("─".repeat(RULE_WIDTH)), Print("\n"))?;
                self.out.flush()
            }
            RenderInstruction::PlaceSelf { at } => {
                self.line(Some(Color::Cyan), true, &format!("◉ you are here {}", fmt_coord(*at)))
            }
            RenderInstruction::PlaceHop {
                hop_index,
                address,
                geo,
                at,
            } => {
                let org = geo.org.as_deref().map(|o| format!(" [{o}]")).unwrap_or_default();
                self.line(
                    Some(Color::Green),
                    false,
                    &format!(
                        "● hop {hop_index:>2}  {address:<15}  {}{org} {}",
                        geo.place_name(),
                        fmt_coord(*at)
                    ),
                )
            }
            RenderInstruction::DrawSegment { from, to } => self.line(
                Some(Color::DarkGreen),
                false,
                &format!("  ╰─ {:.0} km", haversine_km(*from, *to)),
            ),
            RenderInstruction::HighlightDestination { at } => self.line(
                Some(Color::Yellow),
                true,
                &format!("◎ destination {}", fmt_coord(*at)),
            ),
            RenderInstruction::Notify(notice) => {
                self.line(Some(Color::Magenta), true, &format!("★ {notice}"))
            }
            RenderInstruction::Log(text) => self.line(Some(Color::DarkGrey), false, text),
            RenderInstruction::SetStatus(text) => self.line(None, true, &format!("» {text}")),
        }
    }
}

impl<W: Write> RenderSink for ConsoleSink<W> {
    fn render(&mut self, instruction: &RenderInstruction) {
        if let Err(e) = self.draw(instruction) {
            warn!(error = %e, "console write failed");
        }
    }
}

fn fmt_coord(at: Coordinate) -> String {
    format!("({:.3}, {:.3})", at.lat, at.lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoInfo;
    use crate::render::Notice;

    fn rendered(instructions: &[RenderInstruction]) -> String {
        let mut sink = ConsoleSink::new(Vec::new(), false);
        for instruction in instructions {
            sink.render(instruction);
        }
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn hop_line_names_place_and_position() {
        let mut geo = GeoInfo::at(48.85, 2.35);
        geo.city = Some("Paris".into());
        geo.country = Some("France".into());
        geo.org = Some("AS3215 Orange".into());

        let out = rendered(&[RenderInstruction::PlaceHop {
            hop_index: 7,
            address: "193.252.1.1".into(),
            geo,
            at: Coordinate::new(48.9, 2.3),
        }]);

        assert!(out.contains("hop  7"));
        assert!(out.contains("193.252.1.1"));
        assert!(out.contains("Paris, France [AS3215 Orange]"));
        assert!(out.contains("(48.900, 2.300)"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn segment_shows_distance() {
        let out = rendered(&[RenderInstruction::DrawSegment {
            from: Coordinate::new(0.0, 0.0),
            to: Coordinate::new(0.0, 1.0),
        }]);
        assert!(out.contains("111 km"), "got {out}");
    }

    #[test]
    fn plain_output_has_no_escape_codes() {
        let out = rendered(&[
            RenderInstruction::ClearAll,
            RenderInstruction::SetStatus("Tracing".into()),
            RenderInstruction::Log("hop 2: * (no response)".into()),
            RenderInstruction::Notify(Notice::RaceStarted { challenge: None }),
        ]);
        assert!(!out.contains('\x1b'));
        assert_eq!(out.lines().count(), 4);
        assert!(out.contains("» Tracing"));
        assert!(out.contains("★ Race started"));
    }

    #[test]
    fn colored_output_uses_ansi() {
        let mut sink = ConsoleSink::new(Vec::new(), true);
        sink.render(&RenderInstruction::HighlightDestination {
            at: Coordinate::new(1.0, 1.0),
        });
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains('\x1b'));
        assert!(out.contains("destination"));
    }
}
