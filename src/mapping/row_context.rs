use std::{any::Any, collections::HashMap, fmt};

use crate::{
    error::{BinderError, ConversionContext},
    item::csv::row_source::{HeaderMap, Row},
    mapping::converter::{TypeConverter, TypeConverterRegistry},
};

/// Scratch values shared by the conversions of a single row.
///
/// A new, empty cache is created for every row, so nothing stored here is
/// ever seen by the next row.
#[derive(Default)]
pub struct RowCache {
    values: HashMap<String, Box<dyn Any>>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value stored under `key`, if it exists and has type `V`.
    pub fn get<V: 'static>(&self, key: &str) -> Option<&V> {
        self.values.get(key).and_then(|value| value.downcast_ref::<V>())
    }

    pub fn insert<V: 'static>(&mut self, key: impl Into<String>, value: V) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl fmt::Debug for RowCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("RowCache").field("keys", &keys).finish()
    }
}

/// Accessor handed to custom construction and property functions.
///
/// Reads fields of the current row by index or header name, converts them
/// with the reader's converters and gives access to the row's [`RowCache`].
/// Conversion failures carry the row number, field index, field name (for
/// name lookups) and raw value.
///
/// ```
/// use csv_binder::item::csv::row_source::Row;
/// use csv_binder::mapping::converter::TypeConverterRegistry;
/// use csv_binder::mapping::row_context::RowContext;
///
/// let row = Row::new(vec!["2".into(), "x".into()], 5);
/// let converters = TypeConverterRegistry::new();
/// let mut context = RowContext::new(&row, None, &converters);
///
/// assert_eq!(context.get_field::<i32>(0).unwrap(), 2);
///
/// let error = context.get_field::<i32>(1).unwrap_err();
/// assert!(error.to_string().contains("Row: '5'"));
/// assert!(error.to_string().contains("Field Value: 'x'"));
///
/// let doubled = context.cached("double", |ctx| Ok(ctx.get_field::<i32>(0)? * 2)).unwrap();
/// assert_eq!(doubled, 4);
/// assert_eq!(context.cache().get::<i32>("double"), Some(&4));
/// ```
pub struct RowContext<'a> {
    row: &'a Row,
    headers: Option<&'a HeaderMap>,
    converters: &'a TypeConverterRegistry,
    property: &'a str,
    cache: RowCache,
}

impl<'a> RowContext<'a> {
    pub fn new(
        row: &'a Row,
        headers: Option<&'a HeaderMap>,
        converters: &'a TypeConverterRegistry,
    ) -> Self {
        Self {
            row,
            headers,
            converters,
            property: "",
            cache: RowCache::new(),
        }
    }

    /// Names the property being bound, for missing field errors.
    pub(crate) fn set_property(&mut self, property: &'a str) {
        self.property = property;
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }

    pub fn row_number(&self) -> u64 {
        self.row.number()
    }

    pub fn headers(&self) -> Option<&'a HeaderMap> {
        self.headers
    }

    pub fn converters(&self) -> &'a TypeConverterRegistry {
        self.converters
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.row.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&'a str> {
        self.headers
            .and_then(|headers| headers.index_of(name))
            .and_then(|index| self.row.get(index))
    }

    /// Raw text at `index`, or a missing field error.
    pub fn field(&self, index: usize) -> Result<&'a str, BinderError> {
        self.row
            .get(index)
            .ok_or_else(|| self.missing(Some(index), None))
    }

    /// Column index and raw text of the field under header `name`.
    pub fn field_by_name(&self, name: &str) -> Result<(usize, &'a str), BinderError> {
        let headers = self.headers.ok_or_else(|| {
            BinderError::Configuration(format!(
                "Field '{}' is looked up by name but the input has no header record",
                name
            ))
        })?;
        let index = headers
            .index_of(name)
            .ok_or_else(|| self.missing(None, Some(name)))?;
        let text = self
            .row
            .get(index)
            .ok_or_else(|| self.missing(Some(index), Some(name)))?;
        Ok((index, text))
    }

    /// Converts the field at `index` with the registered converter for `V`.
    pub fn get_field<V: 'static>(&self, index: usize) -> Result<V, BinderError> {
        let converter = self.converters.converter::<V>()?;
        self.convert_with(converter.as_ref(), index, None)
    }

    /// Converts the field under header `name` with the registered converter for `V`.
    pub fn get_field_by_name<V: 'static>(&self, name: &str) -> Result<V, BinderError> {
        let converter = self.converters.converter::<V>()?;
        let (index, _) = self.field_by_name(name)?;
        let column = self.headers.and_then(|headers| headers.name_at(index)).unwrap_or(name);
        self.convert_with(converter.as_ref(), index, Some(column))
    }

    /// Converts the field at `index` with `converter`.
    ///
    /// `name` is reported in the diagnostic and should only be given when the
    /// field was found through the header.
    pub fn convert_with<V>(
        &self,
        converter: &dyn TypeConverter<V>,
        index: usize,
        name: Option<&str>,
    ) -> Result<V, BinderError> {
        let text = self
            .row
            .get(index)
            .ok_or_else(|| self.missing(Some(index), name))?;

        converter
            .convert(text)
            .map_err(|failure| BinderError::FieldConversion {
                context: ConversionContext {
                    row: self.row.number(),
                    field_index: index,
                    field_name: name.map(str::to_string),
                    field_value: text.to_string(),
                    type_name: std::any::type_name::<V>(),
                },
                failure,
            })
    }

    pub fn cache(&self) -> &RowCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut RowCache {
        &mut self.cache
    }

    /// The cached value under `key`, computing and storing it on first use.
    pub fn cached<V, F>(&mut self, key: &str, compute: F) -> Result<V, BinderError>
    where
        V: Clone + 'static,
        F: FnOnce(&Self) -> Result<V, BinderError>,
    {
        if let Some(value) = self.cache.get::<V>(key) {
            return Ok(value.clone());
        }
        let value = compute(self)?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    fn missing(&self, field_index: Option<usize>, field_name: Option<&str>) -> BinderError {
        BinderError::MissingRequiredField {
            row: self.row.number(),
            property: self.property.to_string(),
            field_index,
            field_name: field_name.map(str::to_string),
        }
    }
}

impl fmt::Debug for RowContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowContext")
            .field("row", self.row)
            .field("property", &self.property)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{RowCache, RowContext};
    use crate::{
        error::BinderError,
        item::csv::row_source::{HeaderMap, Row},
        mapping::converter::TypeConverterRegistry,
    };

    fn row(fields: &[&str], number: u64) -> Row {
        Row::new(fields.iter().map(|f| f.to_string()).collect(), number)
    }

    #[test]
    fn cache_is_typed() {
        let mut cache = RowCache::new();
        cache.insert("factor", 3_i64);

        assert_eq!(cache.get::<i64>("factor"), Some(&3));
        assert_eq!(cache.get::<i32>("factor"), None);
        assert!(cache.contains_key("factor"));
        assert!(cache.remove("factor"));
        assert!(cache.is_empty());
    }

    #[test]
    fn conversion_by_name_reports_field_name() {
        let headers = HeaderMap::new(vec!["IntColumn".into(), "StringColumn".into()], true).unwrap();
        let row = row(&["", "two"], 3);
        let converters = TypeConverterRegistry::new();
        let context = RowContext::new(&row, Some(&headers), &converters);

        let error = context.get_field_by_name::<i32>("IntColumn").unwrap_err();
        let diagnostic = error.diagnostic().unwrap();

        assert!(diagnostic.contains("Row: '3'"));
        assert!(diagnostic.contains("Field Index: '0'"));
        assert!(diagnostic.contains("Field Name: 'IntColumn'"));
        assert!(diagnostic.contains("Field Value: ''"));
    }

    #[test]
    fn conversion_by_index_omits_field_name() {
        let headers = HeaderMap::new(vec!["IntColumn".into()], true).unwrap();
        let row = row(&["x"], 2);
        let converters = TypeConverterRegistry::new();
        let context = RowContext::new(&row, Some(&headers), &converters);

        let error = context.get_field::<i32>(0).unwrap_err();

        assert!(!error.to_string().contains("Field Name"));
    }

    #[test]
    fn short_row_is_a_missing_field() {
        let row = row(&["1"], 4);
        let converters = TypeConverterRegistry::new();
        let mut context = RowContext::new(&row, None, &converters);
        context.set_property("Amount");

        match context.get_field::<i32>(2) {
            Err(BinderError::MissingRequiredField {
                row,
                property,
                field_index,
                ..
            }) => {
                assert_eq!(row, 4);
                assert_eq!(property, "Amount");
                assert_eq!(field_index, Some(2));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn name_lookup_without_header_is_a_configuration_error() {
        let row = row(&["1"], 1);
        let converters = TypeConverterRegistry::new();
        let context = RowContext::new(&row, None, &converters);

        assert!(context.get_by_name("id").is_none());
        assert!(matches!(
            context.get_field_by_name::<i32>("id"),
            Err(BinderError::Configuration(_))
        ));
    }

    #[test]
    fn cached_value_is_computed_once() {
        let row = row(&["2"], 1);
        let converters = TypeConverterRegistry::new();
        let mut context = RowContext::new(&row, None, &converters);
        let mut calls = 0;

        for _ in 0..3 {
            let value = context
                .cached("n", |ctx| {
                    calls += 1;
                    ctx.get_field::<i32>(0)
                })
                .unwrap();
            assert_eq!(value, 2);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn failed_computation_is_not_cached() {
        let row = row(&["oops"], 1);
        let converters = TypeConverterRegistry::new();
        let mut context = RowContext::new(&row, None, &converters);

        assert!(context.cached("n", |ctx| ctx.get_field::<i32>(0)).is_err());
        assert!(context.cache().is_empty());
    }
}
