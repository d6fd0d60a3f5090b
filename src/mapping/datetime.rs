use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{
    error::ConversionFailure,
    mapping::converter::{TypeConverter, TypeConverterRegistry, optional},
};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Parses the trimmed text with the first matching format of a list.
///
/// ```
/// use chrono::NaiveDate;
/// use csv_binder::mapping::converter::TypeConverterRegistry;
/// use csv_binder::mapping::datetime::FormatConverter;
///
/// let mut registry = TypeConverterRegistry::new();
/// registry.register::<NaiveDate>(FormatConverter::new(["%d.%m.%Y"]));
///
/// assert_eq!(
///     registry.convert::<NaiveDate>("24.09.2012").unwrap(),
///     NaiveDate::from_ymd_opt(2012, 9, 24).unwrap()
/// );
/// assert!(registry.convert::<NaiveDate>("2012-09-24").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct FormatConverter {
    formats: Vec<String>,
}

impl FormatConverter {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            formats: formats.into_iter().map(Into::into).collect(),
        }
    }

    fn parse<V>(
        &self,
        text: &str,
        type_name: &'static str,
        parse: impl Fn(&str, &str) -> chrono::ParseResult<V>,
    ) -> Result<V, ConversionFailure> {
        let trimmed = text.trim();
        self.formats
            .iter()
            .find_map(|format| parse(trimmed, format).ok())
            .ok_or_else(|| {
                ConversionFailure::new(
                    type_name,
                    format!(
                        "'{}' does not match any of the formats {:?}",
                        text, self.formats
                    ),
                )
            })
    }
}

impl TypeConverter<NaiveDate> for FormatConverter {
    fn convert(&self, text: &str) -> Result<NaiveDate, ConversionFailure> {
        self.parse(text, "NaiveDate", NaiveDate::parse_from_str)
    }
}

impl TypeConverter<NaiveDateTime> for FormatConverter {
    fn convert(&self, text: &str) -> Result<NaiveDateTime, ConversionFailure> {
        self.parse(text, "NaiveDateTime", NaiveDateTime::parse_from_str)
    }
}

impl TypeConverter<NaiveTime> for FormatConverter {
    fn convert(&self, text: &str) -> Result<NaiveTime, ConversionFailure> {
        self.parse(text, "NaiveTime", NaiveTime::parse_from_str)
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, ConversionFailure> {
    FormatConverter::new(DATE_FORMATS.iter().copied()).convert(text)
}

/// Date and time, or a date alone at midnight.
fn parse_date_time(text: &str) -> Result<NaiveDateTime, ConversionFailure> {
    let converter = FormatConverter::new(DATE_TIME_FORMATS.iter().copied());
    TypeConverter::<NaiveDateTime>::convert(&converter, text).or_else(|failure| {
        parse_date(text)
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|_| failure)
    })
}

fn parse_time(text: &str) -> Result<NaiveTime, ConversionFailure> {
    FormatConverter::new(TIME_FORMATS.iter().copied()).convert(text)
}

fn parse_fixed_offset(text: &str) -> Result<DateTime<FixedOffset>, ConversionFailure> {
    let trimmed = text.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(trimmed, format).ok())
        })
        .ok_or_else(|| ConversionFailure::invalid("DateTime<FixedOffset>", text))
}

/// Offset date times are shifted to UTC, naive ones are taken as UTC.
fn parse_utc(text: &str) -> Result<DateTime<Utc>, ConversionFailure> {
    parse_fixed_offset(text)
        .map(|date_time| date_time.with_timezone(&Utc))
        .or_else(|_| parse_date_time(text).map(|naive| naive.and_utc()))
        .map_err(|_| ConversionFailure::invalid("DateTime<Utc>", text))
}

/// Registers the chrono converters used by [`TypeConverterRegistry::new`].
pub fn register_defaults(registry: &mut TypeConverterRegistry) {
    registry
        .register::<NaiveDate>(parse_date)
        .register::<Option<NaiveDate>>(|text: &str| optional(text, parse_date))
        .register::<NaiveDateTime>(parse_date_time)
        .register::<Option<NaiveDateTime>>(|text: &str| optional(text, parse_date_time))
        .register::<NaiveTime>(parse_time)
        .register::<Option<NaiveTime>>(|text: &str| optional(text, parse_time))
        .register::<DateTime<FixedOffset>>(parse_fixed_offset)
        .register::<Option<DateTime<FixedOffset>>>(|text: &str| optional(text, parse_fixed_offset))
        .register::<DateTime<Utc>>(parse_utc)
        .register::<Option<DateTime<Utc>>>(|text: &str| optional(text, parse_utc));
}
