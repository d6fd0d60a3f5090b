/// Reader abstraction shared by every record source
pub mod item;

/// Reader and mapping options
pub mod config;
