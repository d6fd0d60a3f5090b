/// String to value conversion strategies keyed by target type.
pub mod converter;

/// Per-row field accessor and scratch cache handed to custom functions.
pub mod row_context;

/// Attribute based and fluent descriptions of how a record is built from a row.
pub mod class_map;

/// Binds rows onto records through a compiled class map.
pub mod binder;

#[cfg(feature = "chrono")]
/// Converters for the `chrono` date and time types.
pub mod datetime;
