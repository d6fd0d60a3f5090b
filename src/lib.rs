#![cfg_attr(docsrs, feature(doc_cfg))]
//#![warn(missing_docs)]

/*!
 # CSV Binder for Rust

 A CSV tokenizer and record-to-struct mapping engine. Delimited text is read
 lazily from any `Read` source, split into rows of raw fields and bound onto
 strongly typed records through a configurable class map, with type
 conversion, custom construction and a per-row scratch cache. Every binding
 failure says exactly where it happened.

 ## Core Concepts

- **Tokenizer:** A streaming state machine turning characters into records of raw fields. Quoted fields may contain delimiters, escaped quotes (`""`) and line breaks.
- **RowSource:** Numbers each row by the physical line it starts on, consumes the header row and skips blank lines.
- **TypeConverterRegistry:** Converters from raw text to typed values, keyed by target type. Defaults cover the primitive types, `String`, `Option`s and, with the `chrono` feature, dates and times.
- **ClassMap:** How each property of a record is filled: by column index, by the first of several header names, or by a custom function of the whole row. Built from attribute mappings (`Bindable`, `impl_bindable!`) or with the fluent `ClassMapBuilder`.
- **RecordBinder:** Constructs the record and binds its properties for one row, failing fast with a positional diagnostic.
- **ItemReader:** The pull-based reader interface implemented by `CsvRecordReader`.

 ## Features

| **Feature**   | **Description**                                               |
|---------------|---------------------------------------------------------------|
| chrono        | Enables converters for the `chrono` date and time types       |
| full          | Enables all available features                                |

 ## Getting Started

```rust
# use csv_binder::{
#     core::item::ItemReader,
#     error::BinderError,
#     impl_bindable,
#     item::csv::csv_reader::CsvRecordReaderBuilder,
#     mapping::class_map::{ClassMapBuilder, CsvField, PropertyBuilder},
# };
#[derive(Debug, Default)]
struct Car {
    year: u16,
    make: String,
    model: String,
    price: f64,
}

impl_bindable!(Car {
    year: u16 => CsvField::names(&["year", "Year"]),
    make: String,
    model: String,
    price: f64 => CsvField::ignore(),
});

fn main() -> Result<(), BinderError> {
    let csv = "year,make,model,units,unit_price
1948,Porsche,356,2,10.5
1995,Peugeot,205,1,4
2021,Mazda,CX-30,x,3";

    let reader = CsvRecordReaderBuilder::new()
        .class_map(
            ClassMapBuilder::<Car>::from_attributes().map(
                PropertyBuilder::new("total", |car: &mut Car, total: f64| car.price = total)
                    .convert_using(|row| {
                        Ok(row.get_field_by_name::<f64>("units")? * row.get_field_by_name::<f64>("unit_price")?)
                    }),
            ),
        )
        .from_reader(csv.as_bytes())?;

    let porsche = reader.read()?.unwrap();
    assert_eq!(porsche.make, "Porsche");
    assert_eq!(porsche.price, 21.0);

    assert_eq!(reader.read()?.unwrap().model, "205");

    let error = reader.read().unwrap_err();
    assert!(error.is_row_scoped());
    assert!(error.to_string().contains("Row: '4'"));
    assert!(error.to_string().contains("Field Name: 'units'"));

    assert!(reader.read()?.is_none());

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for record reading
pub mod core;

/// Error types for tokenizing and binding
pub mod error;

#[doc(inline)]
pub use error::*;

/// Record readers (for example: the CSV record reader)
pub mod item;

/// Class maps, type converters and the record binder
pub mod mapping;
