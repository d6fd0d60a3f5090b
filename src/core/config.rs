use serde::{Deserialize, Serialize};

use crate::error::BinderError;

/// Options shared by the tokenizer, the row source and the class map compiler.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use csv_binder::core::config::CsvConfiguration;
///
/// let config = CsvConfiguration::from_json(r#"{ "delimiter": ";", "allow_comments": true }"#).unwrap();
///
/// assert_eq!(config.delimiter, ';');
/// assert!(config.allow_comments);
/// assert!(config.has_header_record);
/// assert_eq!(config.quote, '"');
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfiguration {
    /// The first non-comment, non-blank row holds column names.
    pub has_header_record: bool,
    pub delimiter: char,
    pub quote: char,
    /// Lines starting with `comment` are skipped.
    pub allow_comments: bool,
    pub comment: char,
    /// Rows with no field or a single empty field are not returned.
    pub skip_blank_lines: bool,
    /// Header name lookups match exactly when set, ignoring case otherwise.
    pub header_case_sensitive: bool,
    /// Trim whitespace around unquoted fields and before an opening quote.
    pub trim_fields: bool,
    /// Reject quotes inside unquoted fields and text after a closing quote.
    pub strict_quotes: bool,
    /// Capacity of the buffer wrapped around the input stream.
    pub buffer_capacity: usize,
}

impl Default for CsvConfiguration {
    fn default() -> Self {
        Self {
            has_header_record: true,
            delimiter: ',',
            quote: '"',
            allow_comments: false,
            comment: '#',
            skip_blank_lines: true,
            header_case_sensitive: true,
            trim_fields: false,
            strict_quotes: false,
            buffer_capacity: 8 * 1024,
        }
    }
}

impl CsvConfiguration {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self, BinderError> {
        let config: CsvConfiguration = serde_json::from_str(json)
            .map_err(|e| BinderError::Configuration(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the special characters can be told apart.
    pub fn validate(&self) -> Result<(), BinderError> {
        let is_terminator = |c: char| c == '\r' || c == '\n';

        if is_terminator(self.delimiter) {
            return Err(BinderError::Configuration(
                "The delimiter cannot be a line terminator".to_string(),
            ));
        }
        if is_terminator(self.quote) {
            return Err(BinderError::Configuration(
                "The quote character cannot be a line terminator".to_string(),
            ));
        }
        if self.delimiter == self.quote {
            return Err(BinderError::Configuration(format!(
                "The delimiter and the quote character cannot both be '{}'",
                self.delimiter
            )));
        }
        if self.allow_comments {
            if is_terminator(self.comment) {
                return Err(BinderError::Configuration(
                    "The comment character cannot be a line terminator".to_string(),
                ));
            }
            if self.comment == self.delimiter || self.comment == self.quote {
                return Err(BinderError::Configuration(format!(
                    "The comment character '{}' is already used as delimiter or quote",
                    self.comment
                )));
            }
        }
        if self.buffer_capacity == 0 {
            return Err(BinderError::Configuration(
                "The buffer capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CsvConfiguration;
    use crate::error::BinderError;

    #[test]
    fn defaults_match_documented_values() {
        let config = CsvConfiguration::default();

        assert!(config.has_header_record);
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.quote, '"');
        assert!(!config.allow_comments);
        assert_eq!(config.comment, '#');
        assert!(config.skip_blank_lines);
        assert!(config.header_case_sensitive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn same_delimiter_and_quote_is_rejected() {
        let config = CsvConfiguration {
            quote: ',',
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(BinderError::Configuration(_))));
    }

    #[test]
    fn comment_char_is_only_checked_when_comments_are_enabled() {
        let mut config = CsvConfiguration {
            comment: ',',
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.allow_comments = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_json_is_a_configuration_error() {
        let result = CsvConfiguration::from_json(r#"{ "delimiter": 12 }"#);

        assert!(matches!(result, Err(BinderError::Configuration(_))));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let config = CsvConfiguration {
            delimiter: '\t',
            has_header_record: false,
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed = CsvConfiguration::from_json(&json).unwrap();

        assert_eq!(parsed, config);
    }
}
