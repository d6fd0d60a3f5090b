use std::io::{self, BufRead, BufReader, Read};

use log::trace;

use crate::{core::config::CsvConfiguration, error::BinderError};

const BOM: char = '\u{feff}';

/// Fields of one logical record and the physical line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: Vec<String>,
    pub line: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unquoted,
    Quoted,
    /// A quote was seen inside a quoted field: either an escaped quote or
    /// the end of the quoted section.
    QuotePending,
    Comment,
}

/// Decoded characters of the input with one character of lookahead.
///
/// The input is pulled one physical line at a time, which keeps multi-byte
/// sequences whole and bounds memory by the longest line.
struct CharStream<R> {
    reader: BufReader<R>,
    bytes: Vec<u8>,
    chunk: String,
    pos: usize,
    first_chunk: bool,
}

impl<R> CharStream<R> {
    fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read> CharStream<R> {
    fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            bytes: Vec::new(),
            chunk: String::new(),
            pos: 0,
            first_chunk: true,
        }
    }

    fn fill(&mut self) -> io::Result<bool> {
        if self.pos < self.chunk.len() {
            return Ok(true);
        }

        self.bytes.clear();
        self.chunk.clear();
        self.pos = 0;

        if self.reader.read_until(b'\n', &mut self.bytes)? == 0 {
            return Ok(false);
        }

        let text = std::str::from_utf8(&self.bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.chunk.push_str(text);

        if self.first_chunk {
            self.first_chunk = false;
            if self.chunk.starts_with(BOM) {
                self.pos = BOM.len_utf8();
                return self.fill();
            }
        }
        Ok(true)
    }

    fn peek(&mut self) -> io::Result<Option<char>> {
        if !self.fill()? {
            return Ok(None);
        }
        Ok(self.chunk[self.pos..].chars().next())
    }

    fn next(&mut self) -> io::Result<Option<char>> {
        let current = self.peek()?;
        if let Some(c) = current {
            self.pos += c.len_utf8();
        }
        Ok(current)
    }

}

/// Splits a character stream into records of raw field strings.
///
/// Records are produced on demand, so the input may be unbounded. The
/// tokenizer never closes the stream it reads from; [`Tokenizer::into_inner`]
/// hands it back to the caller.
///
/// ```
/// use csv_binder::core::config::CsvConfiguration;
/// use csv_binder::item::csv::tokenizer::Tokenizer;
///
/// let data = "name,quote\nalice,\"She said \"\"hi\"\"\"\n";
/// let mut tokenizer = Tokenizer::new(data.as_bytes(), &CsvConfiguration::default());
///
/// let header = tokenizer.next_record().unwrap().unwrap();
/// assert_eq!(header.fields, vec!["name", "quote"]);
///
/// let record = tokenizer.next_record().unwrap().unwrap();
/// assert_eq!(record.fields, vec!["alice", "She said \"hi\""]);
/// assert_eq!(record.line, 2);
///
/// assert!(tokenizer.next_record().unwrap().is_none());
/// ```
pub struct Tokenizer<R> {
    chars: CharStream<R>,
    delimiter: char,
    quote: char,
    comment: Option<char>,
    trim: bool,
    strict: bool,
    /// Physical lines consumed so far.
    line: u64,
    done: bool,
}

fn is_terminator(c: char) -> bool {
    c == '\r' || c == '\n'
}

impl<R> Tokenizer<R> {
    /// Number of physical lines consumed so far, comment and blank lines included.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Returns the underlying reader. Buffered but unconsumed input is dropped.
    pub fn into_inner(self) -> R {
        self.chars.into_inner()
    }
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R, config: &CsvConfiguration) -> Self {
        Self {
            chars: CharStream::new(reader, config.buffer_capacity.max(1)),
            delimiter: config.delimiter,
            quote: config.quote,
            comment: config.allow_comments.then_some(config.comment),
            trim: config.trim_fields,
            strict: config.strict_quotes,
            line: 0,
            done: false,
        }
    }

    fn is_blank(&self, c: char) -> bool {
        self.trim && c != self.delimiter && !is_terminator(c) && c.is_whitespace()
    }

    /// Swallows the `\n` of a `\r\n` pair and counts the terminated line.
    fn end_line(&mut self, terminator: char) -> io::Result<()> {
        if terminator == '\r' && self.chars.peek()? == Some('\n') {
            self.chars.next()?;
        }
        self.line += 1;
        Ok(())
    }

    fn close_field(&self, fields: &mut Vec<String>, field: &mut String, quoted: bool) {
        let mut value = std::mem::take(field);
        if self.trim && !quoted {
            let trimmed_len = value.trim_end().len();
            value.truncate(trimmed_len);
        }
        fields.push(value);
    }

    fn malformed(&mut self, row: u64, message: String) -> BinderError {
        self.done = true;
        BinderError::MalformedRecord { row, message }
    }

    /// Reads the next logical record.
    ///
    /// Comment lines are consumed without producing a record. A blank line
    /// produces a record with a single empty field. Returns `Ok(None)` at the
    /// end of the input, and after any error.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>, BinderError> {
        if self.done {
            return Ok(None);
        }
        match self.scan_record() {
            Ok(record) => {
                if let Some(record) = &record {
                    trace!("Tokenized row {}: {:?}", record.line, record.fields);
                }
                Ok(record)
            }
            Err(BinderError::Io(e)) => {
                self.done = true;
                Err(BinderError::Io(e))
            }
            Err(e) => Err(e),
        }
    }

    fn scan_record(&mut self) -> Result<Option<RawRecord>, BinderError> {
        let mut fields: Vec<String> = Vec::new();
        let mut field = String::new();
        let mut state = State::Unquoted;
        let mut record_line = self.line + 1;
        // Whether any character of the current record has been consumed.
        let mut started = false;
        let mut field_start = true;
        let mut quoted = false;
        let mut after_quote = false;

        loop {
            let Some(c) = self.chars.next()? else {
                self.done = true;
                return match state {
                    State::Quoted => Err(self.malformed(
                        record_line,
                        format!(
                            "unterminated quoted field at index {} reached the end of the stream",
                            fields.len()
                        ),
                    )),
                    State::Comment => {
                        self.line += 1;
                        Ok(None)
                    }
                    State::Unquoted | State::QuotePending if started => {
                        self.close_field(&mut fields, &mut field, quoted);
                        self.line += 1;
                        Ok(Some(RawRecord {
                            fields,
                            line: record_line,
                        }))
                    }
                    State::Unquoted | State::QuotePending => Ok(None),
                };
            };

            match state {
                State::Comment => {
                    if is_terminator(c) {
                        self.end_line(c)?;
                        record_line = self.line + 1;
                        state = State::Unquoted;
                    }
                }
                State::Quoted => {
                    if c == self.quote {
                        state = State::QuotePending;
                    } else {
                        field.push(c);
                        if is_terminator(c) {
                            if c == '\r' && self.chars.peek()? == Some('\n') {
                                self.chars.next()?;
                                field.push('\n');
                            }
                            self.line += 1;
                        }
                    }
                }
                State::QuotePending => {
                    if c == self.quote {
                        field.push(c);
                        state = State::Quoted;
                    } else if c == self.delimiter {
                        self.close_field(&mut fields, &mut field, quoted);
                        state = State::Unquoted;
                        field_start = true;
                        quoted = false;
                        after_quote = false;
                    } else if is_terminator(c) {
                        self.end_line(c)?;
                        self.close_field(&mut fields, &mut field, quoted);
                        return Ok(Some(RawRecord {
                            fields,
                            line: record_line,
                        }));
                    } else if self.is_blank(c) {
                        state = State::Unquoted;
                        after_quote = true;
                    } else if self.strict {
                        return Err(self.malformed(
                            record_line,
                            format!("unexpected '{}' after the closing quote of field {}", c, fields.len()),
                        ));
                    } else {
                        field.push(c);
                        state = State::Unquoted;
                    }
                }
                State::Unquoted => {
                    let first = !started;
                    started = true;
                    if c == self.delimiter {
                        self.close_field(&mut fields, &mut field, quoted);
                        field_start = true;
                        quoted = false;
                        after_quote = false;
                    } else if is_terminator(c) {
                        self.end_line(c)?;
                        self.close_field(&mut fields, &mut field, quoted);
                        return Ok(Some(RawRecord {
                            fields,
                            line: record_line,
                        }));
                    } else if field_start && c == self.quote {
                        state = State::Quoted;
                        field_start = false;
                        quoted = true;
                    } else if first && Some(c) == self.comment {
                        state = State::Comment;
                        started = false;
                    } else if (field_start || after_quote) && self.is_blank(c) {
                        // leading blanks, or blanks between a closing quote and the delimiter
                    } else if after_quote && self.strict {
                        return Err(self.malformed(
                            record_line,
                            format!("unexpected '{}' after the closing quote of field {}", c, fields.len()),
                        ));
                    } else if c == self.quote && self.strict {
                        return Err(self.malformed(
                            record_line,
                            format!("unexpected quote inside unquoted field {}", fields.len()),
                        ));
                    } else {
                        field.push(c);
                        field_start = false;
                        after_quote = false;
                    }
                }
            }
        }
    }
}
