mod common;

use std::{
    io::{ErrorKind, Write},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use common::MockStream;
use csv_binder::{
    core::{config::CsvConfiguration, item::ItemReader},
    error::{BinderError, ConversionFailure},
    impl_bindable,
    item::csv::csv_reader::CsvRecordReaderBuilder,
    mapping::{
        class_map::{ClassMapBuilder, CsvField, PropertyBuilder},
        converter::{EnumConverter, TypeConverterRegistry},
    },
};
use tempfile::NamedTempFile;

#[derive(Debug, Default, Clone, PartialEq)]
struct MultipleNames {
    int_column: i32,
    string_column: String,
}

#[test]
fn first_candidate_present_in_header_wins() {
    common::init_logger();
    let reader = CsvRecordReaderBuilder::new()
        .class_map(
            ClassMapBuilder::new()
                .map(
                    PropertyBuilder::new("IntColumn", |r: &mut MultipleNames, v: i32| r.int_column = v)
                        .names(&["int1", "int2", "int3"]),
                )
                .map(
                    PropertyBuilder::new("StringColumn", |r: &mut MultipleNames, v: String| r.string_column = v)
                        .names(&["string1", "string2", "string3"]),
                ),
        )
        .from_reader("int2,string3\n1,one\n".as_bytes())
        .unwrap();

    let record = reader.read().unwrap().unwrap();

    assert_eq!(record.int_column, 1);
    assert_eq!(record.string_column, "one");
    assert!(reader.read().unwrap().is_none());
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Constructed {
    id: i32,
    name: String,
}

#[test]
fn custom_construction_replaces_default_construction() {
    let reader = CsvRecordReaderBuilder::new()
        .class_map(
            ClassMapBuilder::<Constructed>::new()
                .construct_using(|_| {
                    Ok(Constructed {
                        name: "Constructed".to_string(),
                        ..Default::default()
                    })
                })
                .map(PropertyBuilder::new("id", |r: &mut Constructed, v: i32| r.id = v)),
        )
        .from_reader("id,name\n1,one\n2,two\n".as_bytes())
        .unwrap();

    let records: Vec<Constructed> = reader.records().collect::<Result<_, _>>().unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.name == "Constructed"));
    assert_eq!(records[1].id, 2);
}

#[test]
fn types_without_default_can_be_constructed_from_the_row() {
    struct Account {
        number: String,
        balance: f64,
    }

    let reader = CsvRecordReaderBuilder::new()
        .class_map(
            ClassMapBuilder::constructed_by(|row| {
                Ok(Account {
                    number: row.get_field_by_name::<String>("number")?,
                    balance: 0.0,
                })
            })
            .map(PropertyBuilder::new("balance", |a: &mut Account, v: f64| a.balance = v)),
        )
        .from_reader("number,balance\nFR-1,12.5\n".as_bytes())
        .unwrap();

    let account = reader.read().unwrap().unwrap();

    assert_eq!(account.number, "FR-1");
    assert_eq!(account.balance, 12.5);
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Computed {
    first: i32,
    second: i32,
}

#[test]
fn convert_using_bypasses_the_converters() {
    let reader = CsvRecordReaderBuilder::new()
        .has_header_record(false)
        .class_map(
            ClassMapBuilder::new()
                .map(
                    PropertyBuilder::new("first", |r: &mut Computed, v: i32| r.first = v)
                        .convert_using(|row| Ok(row.get(0).map_or(0, |text| text.len() as i32))),
                )
                .map(
                    PropertyBuilder::new("second", |r: &mut Computed, v: i32| r.second = v)
                        .convert_using(|row| Ok(row.get_field::<i32>(0)? + row.get_field::<i32>(1)?)),
                ),
        )
        .from_reader("123,4\n".as_bytes())
        .unwrap();

    let record = reader.read().unwrap().unwrap();

    assert_eq!(record, Computed { first: 3, second: 127 });
}

#[test]
fn row_cache_is_shared_within_a_row_and_reset_between_rows() {
    let computations = Arc::new(AtomicUsize::new(0));

    let multiplier = {
        let computations = Arc::clone(&computations);
        move |row: &mut csv_binder::mapping::row_context::RowContext<'_>| -> Result<i32, BinderError> {
            row.cached("multiplier", |row| {
                computations.fetch_add(1, Ordering::SeqCst);
                row.get_field::<i32>(0)
            })
        }
    };
    let first_multiplier = multiplier.clone();
    let second_multiplier = multiplier;

    let reader = CsvRecordReaderBuilder::new()
        .has_header_record(false)
        .class_map(
            ClassMapBuilder::new()
                .map(
                    PropertyBuilder::new("first", |r: &mut Computed, v: i32| r.first = v).convert_using(move |row| {
                        let multiplier = first_multiplier(row)?;
                        Ok(row.get_field::<i32>(1)? * multiplier)
                    }),
                )
                .map(
                    PropertyBuilder::new("second", |r: &mut Computed, v: i32| r.second = v).convert_using(move |row| {
                        let multiplier = second_multiplier(row)?;
                        Ok(row.get_field::<i32>(2)? * multiplier)
                    }),
                ),
        )
        .from_reader("2,3,4\n3,1,2\n".as_bytes())
        .unwrap();

    assert_eq!(reader.read().unwrap().unwrap(), Computed { first: 6, second: 8 });
    assert_eq!(reader.read().unwrap().unwrap(), Computed { first: 3, second: 6 });
    assert_eq!(computations.load(Ordering::SeqCst), 2);
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Employee {
    id: u32,
    name: String,
    department: String,
    salary: Option<f64>,
}

impl_bindable!(Employee {
    id: u32 => CsvField::index(0),
    name: String => CsvField::names(&["Name", "FullName"]),
    department: String => CsvField::ignore(),
    salary: Option<f64> => CsvField::names(&["Salary"]).optional(),
});

fn fluent_employee() -> ClassMapBuilder<Employee> {
    ClassMapBuilder::new()
        .map(PropertyBuilder::new("id", |e: &mut Employee, v: u32| e.id = v).index(0))
        .map(PropertyBuilder::new("name", |e: &mut Employee, v: String| e.name = v).names(&["Name", "FullName"]))
        .map(PropertyBuilder::new("department", |e: &mut Employee, v: String| e.department = v).ignore())
        .map(PropertyBuilder::new("salary", |e: &mut Employee, v: Option<f64>| e.salary = v).names(&["Salary"]).optional())
}

#[test]
fn attribute_and_fluent_mappings_read_the_same_records() {
    let data = "Id,FullName,Department,Salary\n1,Ada,R&D,1200.5\n2,Grace,Ops,\n";

    let attributes = CsvRecordReaderBuilder::<Employee>::new()
        .attribute_mapping()
        .from_reader(data.as_bytes())
        .unwrap();
    let fluent = CsvRecordReaderBuilder::new()
        .class_map(fluent_employee())
        .from_reader(data.as_bytes())
        .unwrap();

    assert_eq!(attributes.class_map().describe(), fluent.class_map().describe());

    let from_attributes: Vec<Employee> = attributes.records().collect::<Result<_, _>>().unwrap();
    let from_fluent: Vec<Employee> = fluent.records().collect::<Result<_, _>>().unwrap();

    assert_eq!(from_attributes, from_fluent);
    assert_eq!(from_attributes[0].salary, Some(1200.5));
    assert_eq!(from_attributes[1].salary, None);
    assert_eq!(from_attributes[1].department, "");
}

#[test]
fn optional_property_is_skipped_when_its_column_is_absent() {
    let reader = CsvRecordReaderBuilder::<Employee>::new()
        .attribute_mapping()
        .from_reader("Id,Name\n7,Linus\n".as_bytes())
        .unwrap();

    let employee = reader.read().unwrap().unwrap();

    assert_eq!(employee.name, "Linus");
    assert_eq!(employee.salary, None);
}

#[test]
fn bad_rows_can_be_skipped() {
    common::init_logger();
    let reader = CsvRecordReaderBuilder::new()
        .class_map(fluent_employee())
        .from_reader("Id,Name\n1,a\nx,b\n3\n4,d\n".as_bytes())
        .unwrap();

    let mut ids = Vec::new();
    let mut failed_rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(employee) => ids.push(employee.id),
            Err(error) if error.is_row_scoped() => failed_rows.push(error.row()),
            Err(error) => panic!("unexpected error: {}", error),
        }
    }

    assert_eq!(ids, vec![1, 4]);
    assert_eq!(failed_rows, vec![Some(3), Some(4)]);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq)]
struct Alert {
    level: Level,
    enabled: bool,
}

impl Default for Alert {
    fn default() -> Self {
        Self {
            level: Level::Low,
            enabled: false,
        }
    }
}

#[test]
fn registered_and_per_property_converters() {
    let reader = CsvRecordReaderBuilder::new()
        .converter::<Level>(EnumConverter::new([("low", Level::Low), ("high", Level::High)]))
        .class_map(
            ClassMapBuilder::new()
                .map(PropertyBuilder::new("level", |a: &mut Alert, v: Level| a.level = v))
                .map(
                    PropertyBuilder::new("enabled", |a: &mut Alert, v: bool| a.enabled = v).converter(
                        |text: &str| -> Result<bool, ConversionFailure> {
                            match text {
                                "on" => Ok(true),
                                "off" => Ok(false),
                                _ => Err(ConversionFailure::invalid("switch", text)),
                            }
                        },
                    ),
                ),
        )
        .from_reader("level,enabled\nHIGH,on\n0,off\n1,true\n".as_bytes())
        .unwrap();

    assert_eq!(reader.read().unwrap().unwrap(), Alert { level: Level::High, enabled: true });
    assert_eq!(reader.read().unwrap().unwrap(), Alert { level: Level::Low, enabled: false });

    let error = reader.read().unwrap_err();
    assert!(error.to_string().contains("Type: 'bool'"));
    assert!(error.to_string().contains("not a valid switch value"));
    assert!(error.to_string().contains("Field Value: 'true'"));
}

#[test]
fn unregistered_type_fails_when_building_the_reader() {
    let result = CsvRecordReaderBuilder::new()
        .class_map(ClassMapBuilder::new().map(PropertyBuilder::new("level", |a: &mut Alert, v: Level| a.level = v)))
        .from_reader("level\nlow\n".as_bytes());

    assert!(matches!(result, Err(BinderError::Configuration(_))));
}

#[test]
fn converters_can_be_shared_between_readers() {
    let mut shared = TypeConverterRegistry::empty();
    shared.register::<Level>(EnumConverter::new([("low", Level::Low), ("high", Level::High)]));

    let reader = CsvRecordReaderBuilder::new()
        .converters(&shared)
        .class_map(
            ClassMapBuilder::new()
                .map(PropertyBuilder::new("level", |a: &mut Alert, v: Level| a.level = v))
                .map(PropertyBuilder::new("enabled", |a: &mut Alert, v: bool| a.enabled = v)),
        )
        .from_reader("level,enabled\nhigh,yes\n".as_bytes())
        .unwrap();

    assert_eq!(reader.read().unwrap().unwrap(), Alert { level: Level::High, enabled: true });
}

#[test]
fn configuration_loaded_from_json() {
    let config = CsvConfiguration::from_json(
        r#"{ "delimiter": "|", "allow_comments": true, "comment": ";", "header_case_sensitive": false }"#,
    )
    .unwrap();

    let reader = CsvRecordReaderBuilder::new()
        .configuration(config)
        .class_map(fluent_employee())
        .from_reader("; exported employees\nID|name|SALARY\n5|\"Doe| Jane\"|10\n".as_bytes())
        .unwrap();

    let employee = reader.read().unwrap().unwrap();

    assert_eq!(employee.id, 5);
    assert_eq!(employee.name, "Doe| Jane");
    assert_eq!(employee.salary, Some(10.0));
    assert_eq!(reader.row_number(), 3);
}

#[test]
fn records_are_read_from_a_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Id,Name,Salary").unwrap();
    writeln!(file, "1,Ada,10").unwrap();
    writeln!(file, "2,Grace,20").unwrap();
    file.flush().unwrap();

    let reader = CsvRecordReaderBuilder::new()
        .class_map(fluent_employee())
        .from_path(file.path())
        .unwrap();

    let names: Vec<String> = reader.records().map(|r| r.unwrap().name).collect();
    assert_eq!(names, vec!["Ada", "Grace"]);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = CsvRecordReaderBuilder::new()
        .class_map(fluent_employee())
        .from_path(dir.path().join("missing.csv"));

    match result {
        Err(BinderError::Io(error)) => assert_eq!(error.kind(), ErrorKind::NotFound),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("the file does not exist"),
    }
}

#[test]
fn stream_failure_ends_the_read() {
    let mut stream = MockStream::new();
    let mut calls = 0;
    stream.expect_read().returning(move |buf: &mut [u8]| {
        calls += 1;
        if calls == 1 {
            let data = b"Id,Name\n1,Ada\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        } else {
            Err(std::io::Error::new(ErrorKind::Other, "connection reset"))
        }
    });

    let reader = CsvRecordReaderBuilder::new()
        .class_map(fluent_employee())
        .from_reader(stream)
        .unwrap();

    assert_eq!(reader.read().unwrap().unwrap().name, "Ada");

    let error = reader.read().unwrap_err();
    assert!(matches!(error, BinderError::Io(_)));
    assert!(!error.is_row_scoped());
    assert!(reader.read().unwrap().is_none());
}
