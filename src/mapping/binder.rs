use std::sync::Arc;

use log::{error, trace};

use crate::{
    error::BinderError,
    item::csv::row_source::{HeaderMap, Row},
    mapping::{
        class_map::{ClassMap, Source},
        converter::TypeConverterRegistry,
        row_context::RowContext,
    },
};

/// Field a binding reads, resolved once against the header.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolvedSource {
    Field { index: usize, name: Option<String> },
    Unresolved { names: Vec<String> },
    Custom,
}

/// Builds one record per row from a compiled [`ClassMap`].
///
/// Each row goes through construction then property binding, in declared
/// order. The first failure aborts the row; the binder keeps no row state,
/// so the next row starts clean.
///
/// ```
/// use std::sync::Arc;
///
/// use csv_binder::core::config::CsvConfiguration;
/// use csv_binder::item::csv::row_source::{HeaderMap, Row};
/// use csv_binder::mapping::binder::RecordBinder;
/// use csv_binder::mapping::class_map::{ClassMapBuilder, PropertyBuilder};
/// use csv_binder::mapping::converter::TypeConverterRegistry;
///
/// #[derive(Debug, Default)]
/// struct Point { x: i32, y: i32 }
///
/// let converters = Arc::new(TypeConverterRegistry::new());
/// let class_map = ClassMapBuilder::<Point>::new()
///     .map(PropertyBuilder::new("x", |p: &mut Point, v: i32| p.x = v))
///     .map(PropertyBuilder::new("y", |p: &mut Point, v: i32| p.y = v))
///     .compile(&CsvConfiguration::default(), &converters)
///     .unwrap();
/// let headers = HeaderMap::new(vec!["y".into(), "x".into()], true).unwrap();
///
/// let binder = RecordBinder::new(Arc::new(class_map), converters, Some(Arc::new(headers)));
/// let point = binder.bind(&Row::new(vec!["2".into(), "1".into()], 2)).unwrap();
///
/// assert_eq!((point.x, point.y), (1, 2));
/// ```
pub struct RecordBinder<T> {
    class_map: Arc<ClassMap<T>>,
    converters: Arc<TypeConverterRegistry>,
    headers: Option<Arc<HeaderMap>>,
    sources: Vec<ResolvedSource>,
}

impl<T> RecordBinder<T> {
    pub fn new(
        class_map: Arc<ClassMap<T>>,
        converters: Arc<TypeConverterRegistry>,
        headers: Option<Arc<HeaderMap>>,
    ) -> Self {
        let sources = class_map
            .bindings()
            .iter()
            .map(|binding| match &binding.source {
                Source::Index { index, .. } => ResolvedSource::Field {
                    index: *index,
                    name: None,
                },
                Source::Names { names, .. } => match headers.as_ref().and_then(|h| h.resolve(names)) {
                    Some((index, name)) => ResolvedSource::Field {
                        index,
                        name: Some(name.to_string()),
                    },
                    None => ResolvedSource::Unresolved {
                        names: names.clone(),
                    },
                },
                Source::Custom(_) => ResolvedSource::Custom,
            })
            .collect();

        Self {
            class_map,
            converters,
            headers,
            sources,
        }
    }

    pub fn class_map(&self) -> &Arc<ClassMap<T>> {
        &self.class_map
    }

    pub fn headers(&self) -> Option<&Arc<HeaderMap>> {
        self.headers.as_ref()
    }

    /// Builds the record of `row`.
    pub fn bind(&self, row: &Row) -> Result<T, BinderError> {
        let mut context = RowContext::new(row, self.headers.as_deref(), &self.converters);

        let result = self.bind_with(&mut context);
        match &result {
            Ok(_) => trace!("Row {} bound to {}", row.number(), self.class_map.type_name()),
            Err(e) => error!(
                "Row {} could not be bound to {}: {}",
                row.number(),
                self.class_map.type_name(),
                e
            ),
        }
        result
    }

    fn bind_with<'a>(&'a self, context: &mut RowContext<'a>) -> Result<T, BinderError> {
        context.set_property(self.class_map.type_name());
        let mut record = self.class_map.construct(context)?;

        for (binding, source) in self.class_map.bindings().iter().zip(&self.sources) {
            context.set_property(&binding.property);

            match (&binding.source, source) {
                (Source::Custom(assign), _) => assign(&mut record, context)?,
                (
                    Source::Index { assign, .. } | Source::Names { assign, .. },
                    ResolvedSource::Field { index, name },
                ) => {
                    if context.get(*index).is_none() {
                        if binding.required {
                            return Err(BinderError::MissingRequiredField {
                                row: context.row_number(),
                                property: binding.property.clone(),
                                field_index: Some(*index),
                                field_name: name.clone(),
                            });
                        }
                        continue;
                    }
                    assign(&mut record, context, *index, name.as_deref())?;
                }
                (_, ResolvedSource::Unresolved { names }) => {
                    if binding.required {
                        return Err(BinderError::MissingRequiredField {
                            row: context.row_number(),
                            property: binding.property.clone(),
                            field_index: None,
                            field_name: Some(names.join(", ")),
                        });
                    }
                }
                (_, ResolvedSource::Custom) => {}
            }
        }

        Ok(record)
    }
}
