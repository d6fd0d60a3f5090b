use std::{collections::HashMap, io::Read, sync::Arc};

use log::{debug, trace};

use crate::{
    core::config::CsvConfiguration,
    error::BinderError,
    item::csv::tokenizer::{RawRecord, Tokenizer},
};

/// One logical record: raw fields plus the physical line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    fields: Vec<String>,
    number: u64,
    is_header: bool,
}

impl Row {
    pub fn new(fields: Vec<String>, number: u64) -> Self {
        Self {
            fields,
            number,
            is_header: false,
        }
    }

    fn from_raw(raw: RawRecord, is_header: bool) -> Self {
        Self {
            fields: raw.fields,
            number: raw.line,
            is_header,
        }
    }

    /// 1-based row number, counting every physical line of the input.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn is_header(&self) -> bool {
        self.is_header
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// No field, or a single empty one.
    pub fn is_blank(&self) -> bool {
        match self.fields.as_slice() {
            [] => true,
            [only] => only.is_empty(),
            _ => false,
        }
    }
}

/// Column names of the header row and their indexes.
///
/// Immutable once built. Empty names take no part in lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
    case_sensitive: bool,
}

impl HeaderMap {
    /// Builds the map, rejecting names that appear twice.
    pub fn new(names: Vec<String>, case_sensitive: bool) -> Result<Self, BinderError> {
        let mut index = HashMap::with_capacity(names.len());

        for (position, name) in names.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let key = Self::key(name, case_sensitive);
            if let Some(first) = index.insert(key, position) {
                return Err(BinderError::Configuration(format!(
                    "Duplicate header name '{}' at indexes {} and {}",
                    name, first, position
                )));
            }
        }

        Ok(Self {
            names,
            index,
            case_sensitive,
        })
    }

    fn key(name: &str, case_sensitive: bool) -> String {
        if case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        if self.case_sensitive {
            self.index.get(name).copied()
        } else {
            self.index.get(&name.to_lowercase()).copied()
        }
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Column of the first candidate present in the header, with the name
    /// as written in the header.
    pub fn resolve<S: AsRef<str>>(&self, candidates: &[S]) -> Option<(usize, &str)> {
        candidates.iter().find_map(|candidate| {
            let index = self.index_of(candidate.as_ref())?;
            Some((index, self.names[index].as_str()))
        })
    }
}

/// Rows of a CSV stream with header detection and blank line skipping.
///
/// ```
/// use csv_binder::core::config::CsvConfiguration;
/// use csv_binder::item::csv::row_source::RowSource;
///
/// let config = CsvConfiguration { allow_comments: true, ..Default::default() };
/// let mut rows = RowSource::new("id,name\n# note\n\n1,one\n".as_bytes(), &config).unwrap();
///
/// let row = rows.advance().unwrap().unwrap();
/// assert_eq!(row.number(), 4);
/// assert_eq!(row.fields(), &["1", "one"]);
/// assert_eq!(rows.headers().unwrap().index_of("name"), Some(1));
/// assert!(rows.advance().unwrap().is_none());
/// ```
pub struct RowSource<R> {
    tokenizer: Tokenizer<R>,
    has_header: bool,
    skip_blank_lines: bool,
    case_sensitive: bool,
    header_row: Option<Row>,
    headers: Option<Arc<HeaderMap>>,
    header_done: bool,
    failed: bool,
}

impl<R> RowSource<R> {
    /// Header map, available once the first row has been requested.
    pub fn headers(&self) -> Option<&Arc<HeaderMap>> {
        self.headers.as_ref()
    }

    pub fn header_row(&self) -> Option<&Row> {
        self.header_row.as_ref()
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Physical lines consumed so far.
    pub fn line(&self) -> u64 {
        self.tokenizer.line()
    }

    pub fn into_inner(self) -> R {
        self.tokenizer.into_inner()
    }
}

impl<R: Read> RowSource<R> {
    pub fn new(reader: R, config: &CsvConfiguration) -> Result<Self, BinderError> {
        config.validate()?;

        Ok(Self {
            tokenizer: Tokenizer::new(reader, config),
            has_header: config.has_header_record,
            skip_blank_lines: config.skip_blank_lines,
            case_sensitive: config.header_case_sensitive,
            header_row: None,
            headers: None,
            header_done: !config.has_header_record,
            failed: false,
        })
    }

    fn next_raw(&mut self) -> Result<Option<RawRecord>, BinderError> {
        let result = self.tokenizer.next_record();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn read_header(&mut self) -> Result<(), BinderError> {
        self.header_done = true;

        while let Some(raw) = self.next_raw()? {
            let row = Row::from_raw(raw, true);
            if row.is_blank() {
                trace!("Skipping blank line {} before the header", row.number());
                continue;
            }

            let headers = HeaderMap::new(row.fields().to_vec(), self.case_sensitive)
                .inspect_err(|_| self.failed = true)?;
            debug!("Header found at row {}: {:?}", row.number(), headers.names());
            self.headers = Some(Arc::new(headers));
            self.header_row = Some(row);
            break;
        }
        Ok(())
    }

    /// Moves to the next data row.
    ///
    /// The header row is consumed by the first call. Returns `Ok(None)` once
    /// the stream is exhausted or after an unrecoverable error.
    pub fn advance(&mut self) -> Result<Option<Row>, BinderError> {
        if self.failed {
            return Ok(None);
        }
        if !self.header_done {
            self.read_header()?;
        }

        while let Some(raw) = self.next_raw()? {
            let row = Row::from_raw(raw, false);
            if self.skip_blank_lines && row.is_blank() {
                trace!("Skipping blank line {}", row.number());
                continue;
            }
            return Ok(Some(row));
        }
        Ok(None)
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<Row, BinderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
