//! PGN record decoding
//!
//! Reads one game at a time from a buffered stream positioned at the start of
//! a record, and replays the mainline to produce the board state of every ply.
//! Malformed tag pairs and unknown movetext tokens never fail a read; only
//! I/O errors propagate.

use log::debug;
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{anychar, char, multispace0, none_of},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};
use shakmaty::{fen::Fen, san::SanPlus, CastlingMode, Chess, EnPassantMode, Position};
use std::collections::HashMap;
use std::io::{self, BufRead};

const BOM: char = '\u{feff}';

/// Track whether a movetext line leaves us inside a `{ ... }` comment.
/// A `;` outside a brace comment hides the rest of the line.
pub(crate) fn comment_state_after(line: &[u8], mut in_comment: bool) -> bool {
    for &b in line {
        if in_comment {
            if b == b'}' {
                in_comment = false;
            }
        } else if b == b'{' {
            in_comment = true;
        } else if b == b';' {
            break;
        }
    }
    in_comment
}

/// True if the line opens a tag pair (`[Key "Value"]`)
pub(crate) fn is_tag_line(line: &[u8]) -> bool {
    let line = line.strip_prefix(b"\xef\xbb\xbf").unwrap_or(line);
    line.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'[')
}

/// One decoded game: its tag pairs and the SAN tokens of its mainline
#[derive(Debug, Clone, Default)]
pub struct GameRecord {
    headers: HashMap<String, String>,
    moves: Vec<String>,
}

impl GameRecord {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    /// Traceability opcode shared by every position of this game
    pub fn trace_tag(&self) -> String {
        let white = self.header("White").unwrap_or("?").replace('"', "\\\"");
        let black = self.header("Black").unwrap_or("?").replace('"', "\\\"");
        let date = self.header("Date").unwrap_or("????.??.??").replace('.', "-");
        let eco = self.header("ECO").unwrap_or("?");
        format!("id \"{} {} {} vs {}\";", eco, date, white, black)
    }

    /// Start replaying the mainline. Returns `None` when a `FEN` set-up tag
    /// is present but does not describe a legal position.
    pub fn replay(&self) -> Option<Replay<'_>> {
        let position = match self.header("FEN") {
            Some(fen) => {
                let mode = if self
                    .header("Variant")
                    .is_some_and(|v| v.contains("960"))
                {
                    CastlingMode::Chess960
                } else {
                    CastlingMode::Standard
                };
                let parsed = Fen::from_ascii(fen.trim().as_bytes()).ok()?;
                parsed.into_position::<Chess>(mode).ok()?
            }
            None => Chess::default(),
        };

        Some(Replay {
            position,
            moves: self.moves.iter(),
            exhausted: false,
        })
    }
}

/// Step-by-step walk through a game's mainline
pub struct Replay<'a> {
    position: Chess,
    moves: std::slice::Iter<'a, String>,
    exhausted: bool,
}

impl Replay<'_> {
    /// FEN of the current step, en passant square only when a capture is legal
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// Play the next mainline move. Returns false at the end of the game or
    /// at the first move that does not parse or is illegal; the replay stays
    /// exhausted afterwards.
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        let Some(token) = self.moves.next() else {
            self.exhausted = true;
            return false;
        };

        let played = token
            .parse::<SanPlus>()
            .ok()
            .and_then(|san_plus| san_plus.san.to_move(&self.position).ok());

        match played {
            Some(m) => {
                self.position.play_unchecked(&m);
                true
            }
            None => {
                debug!("Stopping replay at unplayable move '{}'", token);
                self.exhausted = true;
                false
            }
        }
    }
}

fn parse_escaped_char(input: &str) -> IResult<&str, char> {
    preceded(char('\\'), anychar).parse(input)
}

fn parse_unescaped_char(input: &str) -> IResult<&str, char> {
    none_of("\\\"").parse(input)
}

/// Parse a tag pair line: `[Key "Value"]`
fn parse_tag_pair(input: &str) -> IResult<&str, (&str, String)> {
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char('[').parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, key) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char('"').parse(input)?;
    let (input, chars) = many0(alt((parse_escaped_char, parse_unescaped_char))).parse(input)?;
    let (input, _) = char('"').parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(']').parse(input)?;
    Ok((input, (key, chars.into_iter().collect())))
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// Normalize a raw movetext token into a SAN candidate, or `None` for move
/// numbers, results and other non-move tokens.
fn san_candidate(token: &str) -> Option<String> {
    if is_result_token(token) {
        return None;
    }

    // Castling written with zeros
    let castling = token.trim_end_matches(['+', '#', '!', '?']);
    if castling == "0-0" || castling == "0-0-0" {
        return Some(castling.replace('0', "O"));
    }

    // "12." / "12..." / "12.e4"
    let rest = token.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = if rest.len() < token.len() {
        rest.trim_start_matches('.')
    } else {
        rest
    };

    let rest = rest.trim_end_matches(['!', '?']);
    if rest.is_empty() || is_result_token(rest) {
        return None;
    }
    Some(rest.to_string())
}

/// Extract the mainline SAN tokens from movetext, skipping comments,
/// variations, NAGs, move numbers and the result.
fn mainline_tokens(movetext: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut variation_depth = 0usize;
    let mut chars = movetext.chars().peekable();

    let flush = |current: &mut String, tokens: &mut Vec<String>, depth: usize| {
        if depth == 0 && !current.is_empty() {
            if let Some(san) = san_candidate(current) {
                tokens.push(san);
            }
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                flush(&mut current, &mut tokens, variation_depth);
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                }
            }
            ';' => {
                flush(&mut current, &mut tokens, variation_depth);
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                flush(&mut current, &mut tokens, variation_depth);
                variation_depth += 1;
            }
            ')' => {
                flush(&mut current, &mut tokens, variation_depth);
                variation_depth = variation_depth.saturating_sub(1);
            }
            '$' => {
                flush(&mut current, &mut tokens, variation_depth);
                while chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                    chars.next();
                }
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens, variation_depth),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens, variation_depth);

    tokens
}

#[derive(PartialEq)]
enum Section {
    Headers,
    Movetext,
}

/// Sequential PGN game reader over a buffered stream
pub struct RecordReader<R> {
    reader: R,
    pending: Option<Vec<u8>>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: None,
        }
    }

    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    /// Decode the next game. `Ok(None)` means no more records in the stream.
    pub fn read_record(&mut self) -> io::Result<Option<GameRecord>> {
        let mut headers = HashMap::new();
        let mut movetext = String::new();
        let mut section = Section::Headers;
        let mut seen_any = false;
        let mut in_comment = false;

        while let Some(raw) = self.next_line()? {
            let text = String::from_utf8_lossy(&raw);
            let trimmed = text.trim().trim_start_matches(BOM);

            if section == Section::Headers {
                if trimmed.starts_with('[') {
                    match parse_tag_pair(trimmed) {
                        Ok((_, (key, value))) => {
                            headers.insert(key.to_string(), value);
                        }
                        Err(e) => debug!("Ignoring malformed tag pair '{}': {}", trimmed, e),
                    }
                    seen_any = true;
                    continue;
                }
                if trimmed.is_empty() {
                    if seen_any {
                        section = Section::Movetext;
                    }
                    continue;
                }
                section = Section::Movetext;
                seen_any = true;
            } else if !in_comment && is_tag_line(&raw) {
                self.pending = Some(raw);
                break;
            }

            if trimmed.starts_with('%') {
                continue;
            }
            in_comment = comment_state_after(trimmed.as_bytes(), in_comment);
            movetext.push_str(trimmed);
            movetext.push('\n');
        }

        if !seen_any {
            return Ok(None);
        }

        Ok(Some(GameRecord {
            headers,
            moves: mainline_tokens(&movetext),
        }))
    }
}
