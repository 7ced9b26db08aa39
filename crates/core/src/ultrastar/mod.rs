//! Loader for UltraStar-style lyric timing files.
//!
//! ```text
//! #TITLE:Song
//! #BPM:300
//! #GAP:1200
//! : 0 4 5 Hel
//! : 4 4 5 lo
//! - 10
//! * 12 6 7 world
//! E
//! ```

use std::path::Path;

use crate::{Line, Note, NoteKind, Result, SingerId, SingerTimeline, SongTimingData, SyncError};

/// Reads a song from disk. `.json` files hold [`SongTimingData`] directly,
/// anything else is parsed as UltraStar text.
pub fn read_song_file(path: &Path) -> Result<SongTimingData> {
    let contents = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        SongTimingData::from_json_str(&contents)
    } else {
        parse_song(&contents)
    }
}

pub fn parse_song(text: &str) -> Result<SongTimingData> {
    let mut parser = Parser::default();

    for (index, raw) in text.trim_start_matches('\u{feff}').lines().enumerate() {
        let line_no = index + 1;
        let row = raw.trim_end();
        let Some(tag) = row.chars().next() else {
            continue;
        };
        let rest = &row[tag.len_utf8()..];

        match tag {
            '#' => parser.header(rest, line_no)?,
            ':' => parser.note(NoteKind::Normal, rest, line_no)?,
            '*' => parser.note(NoteKind::Golden, rest, line_no)?,
            'F' => parser.note(NoteKind::Freestyle, rest, line_no)?,
            'R' => parser.note(NoteKind::Rap, rest, line_no)?,
            'G' => parser.note(NoteKind::RapGolden, rest, line_no)?,
            '-' => parser.line_break(rest, line_no)?,
            'P' => parser.switch_singer(rest, line_no)?,
            'E' => break,
            _ => return Err(SyncError::parse(line_no, format!("unexpected row `{row}`"))),
        }
    }

    parser.finish()
}

#[derive(Debug, Default)]
struct Parser {
    title: Option<String>,
    artist: Option<String>,
    bpm: Option<f64>,
    gap: f64,
    videogap: f64,
    relative: bool,
    offset: f64,
    singer: SingerId,
    notes: Vec<Note>,
    lines: [Vec<Line>; 2],
    saw_duet_marker: bool,
}

impl Parser {
    fn header(&mut self, rest: &str, line_no: usize) -> Result<()> {
        let Some((key, value)) = rest.split_once(':') else {
            return Err(SyncError::parse(line_no, "header without `:`"));
        };
        let value = value.trim();

        match key.trim().to_ascii_uppercase().as_str() {
            "TITLE" => self.title = Some(value.to_string()),
            "ARTIST" => self.artist = Some(value.to_string()),
            "BPM" => self.bpm = Some(parse_decimal(value, line_no)?),
            "GAP" => self.gap = parse_decimal(value, line_no)?,
            "VIDEOGAP" => self.videogap = parse_decimal(value, line_no)? * 1_000.0,
            "RELATIVE" => self.relative = value.eq_ignore_ascii_case("yes"),
            _ => {}
        }
        Ok(())
    }

    fn note(&mut self, kind: NoteKind, rest: &str, line_no: usize) -> Result<()> {
        let (start, rest) = take_number(rest, line_no, "start beat")?;
        let (duration, rest) = take_number(rest, line_no, "duration")?;
        let (_pitch, rest) = take_number(rest, line_no, "pitch")?;
        if duration < 0.0 {
            return Err(SyncError::parse(line_no, "negative note duration"));
        }

        let mut chars = rest.chars();
        let text = match chars.next() {
            Some(c) if c.is_whitespace() => chars.as_str(),
            _ => rest,
        };

        self.notes.push(Note {
            start_beat: start + self.offset,
            duration,
            text: text.to_string(),
            singer: self.singer,
            kind,
        });
        Ok(())
    }

    fn line_break(&mut self, rest: &str, line_no: usize) -> Result<()> {
        let (first, rest) = take_number(rest, line_no, "line break beat")?;
        self.flush_line();

        if self.relative {
            let shift = if rest.trim().is_empty() {
                first
            } else {
                take_number(rest, line_no, "line break offset")?.0
            };
            self.offset += shift;
        }
        Ok(())
    }

    fn switch_singer(&mut self, rest: &str, line_no: usize) -> Result<()> {
        self.flush_line();
        self.saw_duet_marker = true;
        self.singer = match rest.trim() {
            "1" => SingerId::P1,
            "2" => SingerId::P2,
            other => {
                return Err(SyncError::parse(
                    line_no,
                    format!("unsupported singer marker `P{other}`"),
                ))
            }
        };
        self.offset = 0.0;
        Ok(())
    }

    fn flush_line(&mut self) {
        if self.notes.is_empty() {
            return;
        }
        let notes = std::mem::take(&mut self.notes);
        let start_beat = notes[0].start_beat;
        let mut end_beat = notes
            .iter()
            .map(Note::end_beat)
            .fold(start_beat, f64::max);
        if end_beat <= start_beat {
            end_beat = start_beat + 1.0;
        }

        self.lines[self.singer.index()].push(Line {
            start_beat,
            end_beat,
            notes,
        });
    }

    fn finish(mut self) -> Result<SongTimingData> {
        self.flush_line();
        let bpm = self
            .bpm
            .ok_or_else(|| SyncError::InvalidSong("missing #BPM header".to_string()))?;

        let [p1, p2] = self.lines;
        let mut singers = vec![SingerTimeline::new(SingerId::P1, p1)];
        if !p2.is_empty() {
            singers.push(SingerTimeline::new(SingerId::P2, p2));
        }

        Ok(SongTimingData {
            title: self.title,
            artist: self.artist,
            bpm,
            gap: self.gap,
            videogap: self.videogap,
            is_duet: singers.len() == 2 || self.saw_duet_marker,
            singers,
        })
    }
}

fn parse_decimal(value: &str, line_no: usize) -> Result<f64> {
    value
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| SyncError::parse(line_no, format!("`{value}` is not a number")))
}

/// Splits the next whitespace-separated integer off `input`.
fn take_number<'a>(input: &'a str, line_no: usize, what: &str) -> Result<(f64, &'a str)> {
    let trimmed = input.trim_start();
    let end = trimmed
        .find(char::is_whitespace)
        .unwrap_or(trimmed.len());
    let (token, rest) = trimmed.split_at(end);
    let value = token
        .parse::<i64>()
        .map_err(|_| SyncError::parse(line_no, format!("missing or invalid {what}")))?;
    Ok((value as f64, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_lines_and_note_kinds() {
        let song = parse_song(
            "#TITLE:Demo\n#ARTIST:Band\n#BPM:300,5\n#GAP:1200\n#VIDEOGAP:1.5\n\
             : 0 4 5 Hel\n: 4 4 5 lo\n- 10\n* 12 6 7  world\nF 20 2 0 ~\nE\n: 99 1 1 ignored\n",
        )
        .unwrap();

        assert_eq!(song.title.as_deref(), Some("Demo"));
        assert_eq!(song.bpm, 300.5);
        assert_eq!(song.gap, 1_200.0);
        assert_eq!(song.videogap, 1_500.0);
        assert!(!song.is_duet);

        let lines = &song.singers[0].lines;
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].start_beat, lines[0].end_beat), (0.0, 8.0));
        assert_eq!(lines[0].text(), "Hello");
        assert_eq!((lines[1].start_beat, lines[1].end_beat), (12.0, 22.0));
        assert_eq!(lines[1].notes[0].text, " world");
        assert_eq!(lines[1].notes[0].kind, NoteKind::Golden);
        assert_eq!(lines[1].notes[1].kind, NoteKind::Freestyle);
        assert!(song.singers[0].validate().is_ok());
    }

    #[test]
    fn parses_duets() {
        let song = parse_song(
            "#BPM:200\nP1\n: 0 4 0 one\n- 6\n: 8 4 0 two\nP2\n: 2 4 0 uno\nE\n",
        )
        .unwrap();

        assert!(song.is_duet);
        assert_eq!(song.singers.len(), 2);
        assert_eq!(song.singers[0].lines.len(), 2);
        assert_eq!(song.singers[1].singer, SingerId::P2);
        assert_eq!(song.singers[1].lines[0].notes[0].singer, SingerId::P2);
    }

    #[test]
    fn relative_mode_offsets_following_lines() {
        let song = parse_song("#BPM:200\n#RELATIVE:yes\n: 0 4 0 a\n- 6 10\n: 0 2 0 b\n").unwrap();
        let lines = &song.singers[0].lines;
        assert_eq!(lines[1].start_beat, 10.0);
        assert_eq!(lines[1].end_beat, 12.0);
    }

    #[test]
    fn reports_malformed_rows() {
        let err = parse_song("#BPM:200\n: 0 x 0 bad\n").unwrap_err();
        assert!(matches!(err, SyncError::Parse { line: 2, .. }));

        let err = parse_song("#BPM:200\n? what\n").unwrap_err();
        assert!(matches!(err, SyncError::Parse { line: 2, .. }));
    }

    #[test]
    fn requires_bpm() {
        assert!(matches!(
            parse_song(": 0 1 0 a\n"),
            Err(SyncError::InvalidSong(_))
        ));
    }
}
