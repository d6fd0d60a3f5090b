//! CSV support for reading delimited text into typed records.
//!
//! # Module Architecture
//!
//! Reading goes through three layers, each usable on its own:
//!
//! 1. **Tokenizer**: a character level state machine turning the stream into
//!    records of raw fields. It handles quoted fields, escaped quotes, fields
//!    spanning several lines and comment lines.
//!
//! 2. **RowSource**: numbers rows by physical line, consumes the header row
//!    into a [`HeaderMap`](row_source::HeaderMap) and skips blank lines.
//!
//! 3. **CsvRecordReader**: binds every row onto a record through a compiled
//!    [`ClassMap`](crate::mapping::class_map::ClassMap) and implements the
//!    [`ItemReader`](crate::core::item::ItemReader) trait.
//!
//! # Examples
//!
//! ## Reading raw rows
//!
//! ```
//! use csv_binder::core::config::CsvConfiguration;
//! use csv_binder::item::csv::row_source::RowSource;
//!
//! let data = "id,comment\n1,\"says \"\"hi\"\"\"\n2,\"two\nlines\"\n";
//! let rows: Vec<_> = RowSource::new(data.as_bytes(), &CsvConfiguration::default())
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(rows[0].fields(), &["1", "says \"hi\""]);
//! assert_eq!(rows[1].fields(), &["2", "two\nlines"]);
//! assert_eq!(rows[1].number(), 3);
//! ```
//!
//! ## Reading records
//!
//! ```
//! use csv_binder::core::item::ItemReader;
//! use csv_binder::item::csv::csv_reader::CsvRecordReaderBuilder;
//! use csv_binder::mapping::class_map::{ClassMapBuilder, PropertyBuilder};
//!
//! #[derive(Debug, Default)]
//! struct Person {
//!     name: String,
//!     age: u8,
//! }
//!
//! let reader = CsvRecordReaderBuilder::new()
//!     .class_map(
//!         ClassMapBuilder::new()
//!             .map(PropertyBuilder::new("name", |p: &mut Person, v: String| p.name = v).names(&["Name", "FullName"]))
//!             .map(PropertyBuilder::new("age", |p: &mut Person, v: u8| p.age = v).names(&["Age"])),
//!     )
//!     .from_reader("FullName,Age\nAlice,30\nBob,x\n".as_bytes())
//!     .unwrap();
//!
//! assert_eq!(reader.read().unwrap().unwrap().name, "Alice");
//!
//! let error = reader.read().unwrap_err();
//! assert!(error.is_row_scoped());
//! assert!(error.to_string().contains("Field Name: 'Age'"));
//! assert!(error.to_string().contains("Field Value: 'x'"));
//! ```

/// The character level CSV state machine.
pub mod tokenizer;

/// Numbered rows, header detection and blank line skipping.
pub mod row_source;

/// A module providing facilities for reading CSV data records.
pub mod csv_reader;
