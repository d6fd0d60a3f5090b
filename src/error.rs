use std::fmt;

use thiserror::Error;

/// A value could not be converted from its raw text.
///
/// Carries no positional data so converters stay usable outside of a row;
/// the binder attaches a [`ConversionContext`] when the failure surfaces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("The conversion cannot be performed: {message}")]
pub struct ConversionFailure {
    /// Name of the type the text was converted to.
    pub type_name: &'static str,
    /// Human readable reason.
    pub message: String,
}

impl ConversionFailure {
    pub fn new<S: Into<String>>(type_name: &'static str, message: S) -> Self {
        Self {
            type_name,
            message: message.into(),
        }
    }

    /// Failure for text that is not a valid literal of `type_name`.
    pub fn invalid(type_name: &'static str, text: &str) -> Self {
        Self::new(
            type_name,
            format!("'{}' is not a valid {} value", text, type_name),
        )
    }
}

/// Positional details attached to a failed field conversion.
///
/// The `Display` output is the diagnostic payload consumers search for,
/// one `Key: 'value'` pair per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionContext {
    /// 1-based physical line the row started on.
    pub row: u64,
    /// 0-based column index.
    pub field_index: usize,
    /// Header name, only when the field was resolved by name.
    pub field_name: Option<String>,
    /// Exact unconverted text.
    pub field_value: String,
    /// Type the field was converted to.
    pub type_name: &'static str,
}

impl fmt::Display for ConversionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Row: '{}' (1 based)", self.row)?;
        writeln!(f, "Type: '{}'", self.type_name)?;
        writeln!(f, "Field Index: '{}' (0 based)", self.field_index)?;
        if let Some(name) = &self.field_name {
            writeln!(f, "Field Name: '{}'", name)?;
        }
        write!(f, "Field Value: '{}'", self.field_value)
    }
}

#[derive(Error, Debug)]
/// Errors raised while tokenizing rows or binding them to records.
pub enum BinderError {
    /// Structural fault in the input, such as an unterminated quote.
    #[error("Malformed record starting at row '{row}': {message}")]
    MalformedRecord { row: u64, message: String },

    /// Invalid or ambiguous mapping or reader configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required property could not find its source field in the row.
    #[error(
        "Missing required field for property '{property}' at row '{row}'{}",
        describe_location(.field_index, .field_name)
    )]
    MissingRequiredField {
        row: u64,
        property: String,
        field_index: Option<usize>,
        field_name: Option<String>,
    },

    /// A value could not be converted outside of any row.
    #[error(transparent)]
    Conversion(#[from] ConversionFailure),

    /// A resolved field could not be converted to the property type.
    #[error("{failure}\n{context}")]
    FieldConversion {
        failure: ConversionFailure,
        context: ConversionContext,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe_location(index: &Option<usize>, name: &Option<String>) -> String {
    match (index, name) {
        (Some(index), Some(name)) => format!(" (Field Index: '{}', Field Name: '{}')", index, name),
        (Some(index), None) => format!(" (Field Index: '{}')", index),
        (None, Some(name)) => format!(" (Field Name: '{}')", name),
        (None, None) => String::new(),
    }
}

impl BinderError {
    /// The positional diagnostic payload, when this error carries one.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            BinderError::FieldConversion { context, .. } => Some(context.to_string()),
            _ => None,
        }
    }

    /// Whether the failure only concerns the current row.
    ///
    /// Row scoped errors leave the reader usable: the next read moves on to
    /// the following row. Other errors end the read.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            BinderError::MissingRequiredField { .. }
                | BinderError::FieldConversion { .. }
                | BinderError::Conversion(_)
        )
    }

    /// Row number carried by the error, if any.
    pub fn row(&self) -> Option<u64> {
        match self {
            BinderError::MalformedRecord { row, .. } => Some(*row),
            BinderError::MissingRequiredField { row, .. } => Some(*row),
            BinderError::FieldConversion { context, .. } => Some(context.row),
            _ => None,
        }
    }
}
