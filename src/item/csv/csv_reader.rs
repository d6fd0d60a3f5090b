use std::{cell::RefCell, fs::File, io::Read, path::Path, sync::Arc};

use log::debug;

use crate::{
    core::{
        config::CsvConfiguration,
        item::{ItemReader, ItemReaderResult},
    },
    error::BinderError,
    item::csv::row_source::{HeaderMap, RowSource},
    mapping::{
        binder::RecordBinder,
        class_map::{Bindable, ClassMap, ClassMapBuilder},
        converter::{TypeConverter, TypeConverterRegistry},
    },
};

struct ReaderState<R, T> {
    rows: RowSource<R>,
    class_map: Arc<ClassMap<T>>,
    converters: Arc<TypeConverterRegistry>,
    /// Created on the first row, once the header is known.
    binder: Option<RecordBinder<T>>,
    /// Set once an error ended the read.
    finished: bool,
}

/// A CSV reader that maps every data row onto a record of type `T`.
///
/// Rows are pulled lazily from the underlying stream: nothing is read until
/// the first call to [`read`](ItemReader::read). A failure to bind a row
/// (see [`BinderError::is_row_scoped`]) only concerns that row, so the
/// caller may keep reading. Any other error ends the read.
///
/// # Type Parameters
///
/// - `R`: The source of the CSV text. Must implement `Read`.
/// - `T`: The record type, described by a [`ClassMap`].
///
/// # Examples
///
/// ```
/// use csv_binder::core::item::ItemReader;
/// use csv_binder::item::csv::csv_reader::CsvRecordReaderBuilder;
/// use csv_binder::mapping::class_map::{ClassMapBuilder, PropertyBuilder};
///
/// #[derive(Debug, Default)]
/// struct City {
///     name: String,
///     population: u32,
/// }
///
/// let data = "\
/// name,population
/// Boston,4628910
/// Concord,42695
/// ";
///
/// let reader = CsvRecordReaderBuilder::new()
///     .class_map(
///         ClassMapBuilder::new()
///             .map(PropertyBuilder::new("name", |c: &mut City, v: String| c.name = v))
///             .map(PropertyBuilder::new("population", |c: &mut City, v: u32| c.population = v)),
///     )
///     .from_reader(data.as_bytes())
///     .unwrap();
///
/// let city = reader.read().unwrap().unwrap();
/// assert_eq!(city.name, "Boston");
/// assert_eq!(city.population, 4628910);
///
/// let city = reader.read().unwrap().unwrap();
/// assert_eq!(city.name, "Concord");
///
/// assert!(reader.read().unwrap().is_none());
/// ```
pub struct CsvRecordReader<R, T> {
    /// Row source and binder
    ///
    /// Uses `RefCell` so that `read` can advance the stream through a shared
    /// reference, as required by the `ItemReader` trait.
    state: RefCell<ReaderState<R, T>>,
}

impl<R: Read, T> ItemReader<T> for CsvRecordReader<R, T> {
    /// Reads and binds the next data row.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a row was read and bound
    /// - `Ok(None)` once the stream is exhausted, or after an error that ended the read
    /// - `Err(error)` if the row is malformed, cannot be bound, or the stream fails
    fn read(&self) -> ItemReaderResult<T> {
        let mut state = self.state.borrow_mut();
        let ReaderState {
            rows,
            class_map,
            converters,
            binder,
            finished,
        } = &mut *state;

        if *finished {
            return Ok(None);
        }

        let row = match rows.advance()? {
            Some(row) => row,
            None => return Ok(None),
        };

        let binder = binder.get_or_insert_with(|| {
            RecordBinder::new(
                Arc::clone(class_map),
                Arc::clone(converters),
                rows.headers().cloned(),
            )
        });

        binder.bind(&row).map(Some).inspect_err(|error| {
            if !error.is_row_scoped() {
                *finished = true;
            }
        })
    }
}

impl<R: Read, T> CsvRecordReader<R, T> {
    /// Iterator over the remaining records.
    ///
    /// ```
    /// use csv_binder::item::csv::csv_reader::CsvRecordReaderBuilder;
    /// use csv_binder::mapping::class_map::{ClassMapBuilder, PropertyBuilder};
    ///
    /// #[derive(Debug, Default)]
    /// struct Id(u8);
    ///
    /// let reader = CsvRecordReaderBuilder::new()
    ///     .has_header_record(false)
    ///     .class_map(ClassMapBuilder::new().map(PropertyBuilder::new("id", |r: &mut Id, v: u8| r.0 = v)))
    ///     .from_reader("1\nx\n3\n".as_bytes())
    ///     .unwrap();
    ///
    /// // The bad row is reported, reading goes on with the next one.
    /// let ids: Vec<u8> = reader.records().filter_map(Result::ok).map(|r| r.0).collect();
    /// assert_eq!(ids, vec![1, 3]);
    /// ```
    pub fn records(&self) -> Records<'_, R, T> {
        Records { reader: self }
    }
}

impl<R, T> CsvRecordReader<R, T> {
    /// Header of the input, known once the first record has been read.
    pub fn headers(&self) -> Option<Arc<HeaderMap>> {
        self.state.borrow().rows.headers().cloned()
    }

    /// Physical lines consumed so far, which is the 1-based number of the
    /// last line read.
    pub fn row_number(&self) -> u64 {
        self.state.borrow().rows.line()
    }

    pub fn class_map(&self) -> Arc<ClassMap<T>> {
        Arc::clone(&self.state.borrow().class_map)
    }

    /// Gives back the underlying stream. Buffered, unread input is dropped.
    pub fn into_inner(self) -> R {
        self.state.into_inner().rows.into_inner()
    }
}

/// Records of a [`CsvRecordReader`], see [`CsvRecordReader::records`].
pub struct Records<'r, R, T> {
    reader: &'r CsvRecordReader<R, T>,
}

impl<R: Read, T> Iterator for Records<'_, R, T> {
    type Item = Result<T, BinderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read().transpose()
    }
}

/// A builder for configuring CSV record reading.
///
/// # Default Configuration
///
/// - Header record: enabled
/// - Delimiter: comma (,)
/// - Quote: double quote (")
/// - Comments: disabled, `#` when enabled
/// - Blank lines: skipped
///
/// A class map is required, either with [`class_map`](Self::class_map) or
/// [`attribute_mapping`](Self::attribute_mapping).
///
/// # Examples
///
/// ```
/// use csv_binder::impl_bindable;
/// use csv_binder::core::item::ItemReader;
/// use csv_binder::item::csv::csv_reader::CsvRecordReaderBuilder;
/// use csv_binder::mapping::class_map::CsvField;
///
/// #[derive(Debug, Default)]
/// struct Reading {
///     station: String,
///     celsius: f64,
/// }
///
/// impl_bindable!(Reading {
///     station: String => CsvField::index(0),
///     celsius: f64 => CsvField::index(1),
/// });
///
/// let reader = CsvRecordReaderBuilder::<Reading>::new()
///     .delimiter(';')
///     .has_header_record(false)
///     .allow_comments(true)
///     .attribute_mapping()
///     .from_reader("# station;celsius\nOslo;-3.5\n".as_bytes())
///     .unwrap();
///
/// let reading = reader.read().unwrap().unwrap();
/// assert_eq!(reading.station, "Oslo");
/// assert_eq!(reading.celsius, -3.5);
/// ```
pub struct CsvRecordReaderBuilder<T> {
    config: CsvConfiguration,
    class_map: Option<ClassMapBuilder<T>>,
    converters: TypeConverterRegistry,
}

impl<T: 'static> Default for CsvRecordReaderBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> CsvRecordReaderBuilder<T> {
    /// Creates a builder with the default configuration and converters.
    pub fn new() -> Self {
        Self {
            config: CsvConfiguration::default(),
            class_map: None,
            converters: TypeConverterRegistry::new(),
        }
    }

    /// Sets whether the first non-blank row holds the column names.
    pub fn has_header_record(mut self, yes: bool) -> Self {
        self.config.has_header_record = yes;
        self
    }

    /// Sets the field delimiter.
    ///
    /// ```
    /// use csv_binder::item::csv::csv_reader::CsvRecordReaderBuilder;
    ///
    /// // Tab separated values
    /// let builder = CsvRecordReaderBuilder::<()>::new().delimiter('\t');
    /// ```
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn quote(mut self, quote: char) -> Self {
        self.config.quote = quote;
        self
    }

    /// Enables skipping lines that start with the comment character.
    pub fn allow_comments(mut self, yes: bool) -> Self {
        self.config.allow_comments = yes;
        self
    }

    pub fn comment(mut self, comment: char) -> Self {
        self.config.comment = comment;
        self
    }

    pub fn skip_blank_lines(mut self, yes: bool) -> Self {
        self.config.skip_blank_lines = yes;
        self
    }

    pub fn header_case_sensitive(mut self, yes: bool) -> Self {
        self.config.header_case_sensitive = yes;
        self
    }

    pub fn trim_fields(mut self, yes: bool) -> Self {
        self.config.trim_fields = yes;
        self
    }

    pub fn strict_quotes(mut self, yes: bool) -> Self {
        self.config.strict_quotes = yes;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Replaces every option at once, for instance with a configuration
    /// loaded through [`CsvConfiguration::from_json`].
    pub fn configuration(mut self, config: CsvConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Sets the fluent class map of `T`.
    pub fn class_map(mut self, class_map: ClassMapBuilder<T>) -> Self {
        self.class_map = Some(class_map);
        self
    }

    /// Maps `T` through its attribute mappings.
    pub fn attribute_mapping(self) -> Self
    where
        T: Bindable + Default,
    {
        self.class_map(ClassMapBuilder::from_attributes())
    }

    /// Registers a converter for `V`, replacing the default one.
    pub fn converter<V: 'static>(mut self, converter: impl TypeConverter<V> + 'static) -> Self {
        self.converters.register::<V>(converter);
        self
    }

    /// Adds every converter of `converters`, replacing existing ones.
    pub fn converters(mut self, converters: &TypeConverterRegistry) -> Self {
        self.converters.extend(converters);
        self
    }

    /// Creates a `CsvRecordReader` from a reader.
    ///
    /// The configuration is validated and the class map compiled here, so
    /// configuration errors surface before any row is read.
    pub fn from_reader<R: Read>(self, rdr: R) -> Result<CsvRecordReader<R, T>, BinderError> {
        let class_map = self.class_map.ok_or_else(|| {
            BinderError::Configuration(format!(
                "No class map configured for {}",
                std::any::type_name::<T>()
            ))
        })?;

        let rows = RowSource::new(rdr, &self.config)?;
        let class_map = class_map.compile(&self.config, &self.converters)?;

        debug!(
            "CSV reader created for {} (delimiter {:?}, header record: {})",
            class_map.type_name(),
            self.config.delimiter,
            self.config.has_header_record
        );

        Ok(CsvRecordReader {
            state: RefCell::new(ReaderState {
                rows,
                class_map: Arc::new(class_map),
                converters: Arc::new(self.converters),
                binder: None,
                finished: false,
            }),
        })
    }

    /// Creates a `CsvRecordReader` from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`BinderError::Io`] if the file cannot be opened, or a
    /// configuration error as [`from_reader`](Self::from_reader) does.
    ///
    /// ```no_run
    /// use csv_binder::core::item::ItemReader;
    /// use csv_binder::item::csv::csv_reader::CsvRecordReaderBuilder;
    /// use csv_binder::mapping::class_map::{ClassMapBuilder, PropertyBuilder};
    ///
    /// #[derive(Default)]
    /// struct Record { id: u32 }
    ///
    /// let reader = CsvRecordReaderBuilder::new()
    ///     .class_map(ClassMapBuilder::new().map(PropertyBuilder::new("id", |r: &mut Record, v: u32| r.id = v)))
    ///     .from_path("data.csv")
    ///     .unwrap();
    ///
    /// while let Some(record) = reader.read().unwrap() {
    ///     println!("ID: {}", record.id);
    /// }
    /// ```
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvRecordReader<File, T>, BinderError> {
        let file = File::open(path.as_ref())?;
        debug!("Reading CSV records from {}", path.as_ref().display());
        self.from_reader(file)
    }
}
