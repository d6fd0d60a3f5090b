use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock, RwLock},
};

use log::debug;

use crate::{
    core::config::CsvConfiguration,
    error::BinderError,
    mapping::{
        converter::{TypeConverter, TypeConverterRegistry},
        row_context::RowContext,
    },
};

/// Converts the field at a resolved index and assigns it to the record.
pub(crate) type FieldAssign<T> =
    Arc<dyn Fn(&mut T, &RowContext<'_>, usize, Option<&str>) -> Result<(), BinderError> + Send + Sync>;

/// Looks up the converter of a property once the registry is known.
type FieldResolver<T> = Arc<dyn Fn(&TypeConverterRegistry) -> Option<FieldAssign<T>> + Send + Sync>;

/// Computes a property from the whole row and assigns it to the record.
pub(crate) type CustomAssign<T> =
    Arc<dyn Fn(&mut T, &mut RowContext<'_>) -> Result<(), BinderError> + Send + Sync>;

type ConstructFn<T> = Arc<dyn Fn(&mut RowContext<'_>) -> Result<T, BinderError> + Send + Sync>;

fn field_assign<T, F>(assign: F) -> FieldAssign<T>
where
    F: Fn(&mut T, &RowContext<'_>, usize, Option<&str>) -> Result<(), BinderError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(assign)
}

fn custom_assign<T, F>(assign: F) -> CustomAssign<T>
where
    F: Fn(&mut T, &mut RowContext<'_>) -> Result<(), BinderError> + Send + Sync + 'static,
{
    Arc::new(assign)
}

/// Types whose properties can be listed for attribute based mapping.
///
/// Usually implemented with [`impl_bindable!`](crate::impl_bindable).
pub trait Bindable: Sized + 'static {
    /// One mapping per bindable property, in declaration order.
    fn slots() -> Vec<PropertyMapping<Self>>;
}

/// Declarative metadata of a single property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvField {
    pub index: Option<usize>,
    pub names: Vec<String>,
    pub ignore: bool,
    pub optional: bool,
}

impl CsvField {
    pub fn index(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }

    /// Candidate header names, the first one present in the header wins.
    pub fn names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn ignore() -> Self {
        Self {
            ignore: true,
            ..Default::default()
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Where a property takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    Index(usize),
    Names(Vec<String>),
    Custom,
}

/// One property's binding rule, whichever surface declared it.
pub struct PropertyMapping<T> {
    name: String,
    type_name: &'static str,
    index: Option<usize>,
    names: Vec<String>,
    ignored: bool,
    required: bool,
    has_converter: bool,
    field: FieldResolver<T>,
    custom: Option<CustomAssign<T>>,
}

impl<T: 'static> PropertyMapping<T> {
    /// Mapping converted with the registry and stored through `setter`.
    pub fn new<V, F>(name: impl Into<String>, setter: F) -> Self
    where
        V: 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        PropertyBuilder::new(name, setter).into()
    }

    /// Applies declarative metadata.
    pub fn attribute(mut self, field: CsvField) -> Self {
        if field.index.is_some() {
            self.index = field.index;
        }
        if !field.names.is_empty() {
            self.names = field.names;
        }
        self.ignored |= field.ignore;
        if field.optional {
            self.required = false;
        }
        self
    }
}

impl<T> PropertyMapping<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Declared source, before the implicit convention applies.
    pub fn selector(&self) -> Option<SourceSelector> {
        if self.custom.is_some() {
            Some(SourceSelector::Custom)
        } else if let Some(index) = self.index {
            Some(SourceSelector::Index(index))
        } else if !self.names.is_empty() {
            Some(SourceSelector::Names(self.names.clone()))
        } else {
            None
        }
    }
}

impl<T> Clone for PropertyMapping<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            type_name: self.type_name,
            index: self.index,
            names: self.names.clone(),
            ignored: self.ignored,
            required: self.required,
            has_converter: self.has_converter,
            field: Arc::clone(&self.field),
            custom: self.custom.clone(),
        }
    }
}

impl<T> fmt::Debug for PropertyMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMapping")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("selector", &self.selector())
            .field("ignored", &self.ignored)
            .field("required", &self.required)
            .field("has_converter", &self.has_converter)
            .finish()
    }
}

/// Fluent description of one property of `T` holding a `V`.
///
/// ```
/// use csv_binder::mapping::class_map::PropertyBuilder;
///
/// #[derive(Default)]
/// struct Line { total: i64 }
///
/// let total = PropertyBuilder::new("total", |line: &mut Line, value: i64| line.total = value)
///     .convert_using(|row| Ok(row.get_field::<i64>(0)? * row.get_field::<i64>(1)?));
/// ```
pub struct PropertyBuilder<T, V> {
    name: String,
    setter: Arc<dyn Fn(&mut T, V) + Send + Sync>,
    index: Option<usize>,
    names: Vec<String>,
    custom: Option<Arc<dyn Fn(&mut RowContext<'_>) -> Result<V, BinderError> + Send + Sync>>,
    converter: Option<Arc<dyn TypeConverter<V>>>,
    ignored: bool,
    required: bool,
}

impl<T: 'static, V: 'static> PropertyBuilder<T, V> {
    pub fn new<F>(name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            setter: Arc::new(setter),
            index: None,
            names: Vec::new(),
            custom: None,
            converter: None,
            ignored: false,
            required: true,
        }
    }

    /// Binds to the 0-based column `index`. Takes precedence over names.
    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Binds to the first of `names` present in the header.
    pub fn names(mut self, names: &[&str]) -> Self {
        self.names = names.iter().map(|name| name.to_string()).collect();
        self
    }

    /// Computes the value from the whole row, bypassing the converters.
    pub fn convert_using<F>(mut self, convert: F) -> Self
    where
        F: Fn(&mut RowContext<'_>) -> Result<V, BinderError> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(convert));
        self
    }

    /// Converter used for this property instead of the registered one.
    pub fn converter(mut self, converter: impl TypeConverter<V> + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Skips the property when its field cannot be found in a row.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl<T: 'static, V: 'static> From<PropertyBuilder<T, V>> for PropertyMapping<T> {
    fn from(builder: PropertyBuilder<T, V>) -> Self {
        let has_converter = builder.converter.is_some();

        let setter = Arc::clone(&builder.setter);
        let custom = builder.custom.map(|convert| {
            let setter = Arc::clone(&setter);
            custom_assign(move |target: &mut T, row: &mut RowContext<'_>| {
                let value = convert(row)?;
                setter(target, value);
                Ok(())
            })
        });

        let overridden = builder.converter;
        let field: FieldResolver<T> = Arc::new(move |registry: &TypeConverterRegistry| -> Option<FieldAssign<T>> {
            let converter = overridden.clone().or_else(|| registry.get::<V>())?;
            let setter = Arc::clone(&setter);
            Some(field_assign(
                move |target: &mut T, row: &RowContext<'_>, index: usize, name: Option<&str>| {
                    let value = row.convert_with(converter.as_ref(), index, name)?;
                    setter(target, value);
                    Ok(())
                },
            ))
        });

        PropertyMapping {
            name: builder.name,
            type_name: type_name::<V>(),
            index: builder.index,
            names: builder.names,
            ignored: builder.ignored,
            required: builder.required,
            has_converter,
            field,
            custom,
        }
    }
}

enum Factory<T> {
    Default(fn() -> T),
    Custom(ConstructFn<T>),
}

impl<T> Clone for Factory<T> {
    fn clone(&self) -> Self {
        match self {
            Factory::Default(create) => Factory::Default(*create),
            Factory::Custom(construct) => Factory::Custom(Arc::clone(construct)),
        }
    }
}

fn attribute_cache() -> &'static RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Slots of `T`, collected once per process.
fn cached_slots<T: Bindable>() -> Arc<Vec<PropertyMapping<T>>> {
    let id = TypeId::of::<T>();

    let cached = attribute_cache()
        .read()
        .ok()
        .and_then(|cache| cache.get(&id).cloned())
        .and_then(|slots| slots.downcast::<Vec<PropertyMapping<T>>>().ok());
    if let Some(slots) = cached {
        debug!("Attribute mappings of {} taken from cache", type_name::<T>());
        return slots;
    }

    let slots = Arc::new(T::slots());
    if let Ok(mut cache) = attribute_cache().write() {
        cache.insert(id, Arc::clone(&slots) as Arc<dyn Any + Send + Sync>);
    }
    slots
}

/// Fluent class map configuration.
///
/// ```
/// use csv_binder::core::config::CsvConfiguration;
/// use csv_binder::mapping::class_map::{ClassMapBuilder, PropertyBuilder, SourceSelector};
/// use csv_binder::mapping::converter::TypeConverterRegistry;
///
/// #[derive(Default)]
/// struct Person { id: u32, name: String }
///
/// let map = ClassMapBuilder::<Person>::new()
///     .map(PropertyBuilder::new("id", |p: &mut Person, v: u32| p.id = v).index(0))
///     .map(PropertyBuilder::new("name", |p: &mut Person, v: String| p.name = v).names(&["Name", "FullName"]))
///     .compile(&CsvConfiguration::default(), &TypeConverterRegistry::new())
///     .unwrap();
///
/// assert_eq!(map.selectors()[1], ("name", SourceSelector::Names(vec!["Name".into(), "FullName".into()])));
/// ```
pub struct ClassMapBuilder<T> {
    mappings: Vec<PropertyMapping<T>>,
    factory: Factory<T>,
}

impl<T: Default + 'static> ClassMapBuilder<T> {
    /// Empty map building records with `T::default()`.
    pub fn new() -> Self {
        Self {
            mappings: Vec::new(),
            factory: Factory::Default(T::default),
        }
    }
}

impl<T: Default + Bindable> ClassMapBuilder<T> {
    /// Map holding the attribute mappings of `T`.
    pub fn from_attributes() -> Self {
        Self::new().attributes()
    }
}

impl<T: Default + 'static> Default for ClassMapBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ClassMapBuilder<T> {
    /// Empty map building records with `construct`.
    pub fn constructed_by<F>(construct: F) -> Self
    where
        F: Fn(&mut RowContext<'_>) -> Result<T, BinderError> + Send + Sync + 'static,
    {
        Self {
            mappings: Vec::new(),
            factory: Factory::Custom(Arc::new(construct)),
        }
    }

    /// Adds the attribute mappings of `T`.
    pub fn attributes(mut self) -> Self
    where
        T: Bindable,
    {
        for mapping in cached_slots::<T>().iter() {
            self = self.map(mapping.clone());
        }
        self
    }

    /// Adds a property, replacing an earlier one of the same name.
    pub fn map(mut self, mapping: impl Into<PropertyMapping<T>>) -> Self {
        let mapping = mapping.into();
        match self.mappings.iter_mut().find(|m| m.name == mapping.name) {
            Some(existing) => *existing = mapping,
            None => self.mappings.push(mapping),
        }
        self
    }

    /// Replaces default construction. Called once per row, before any property.
    pub fn construct_using<F>(mut self, construct: F) -> Self
    where
        F: Fn(&mut RowContext<'_>) -> Result<T, BinderError> + Send + Sync + 'static,
    {
        self.factory = Factory::Custom(Arc::new(construct));
        self
    }

    pub fn mappings(&self) -> &[PropertyMapping<T>] {
        &self.mappings
    }

    /// Resolves every mapping against the configuration and converters.
    ///
    /// Fails when a mapping mixes a custom function with an index or names,
    /// uses names without a header record, or has no converter for its type.
    pub fn compile(
        &self,
        config: &CsvConfiguration,
        registry: &TypeConverterRegistry,
    ) -> Result<ClassMap<T>, BinderError> {
        let mut bindings = Vec::with_capacity(self.mappings.len());

        for (position, mapping) in self.mappings.iter().filter(|m| !m.ignored).enumerate() {
            let source = match &mapping.custom {
                Some(custom) => {
                    if mapping.index.is_some() || !mapping.names.is_empty() || mapping.has_converter {
                        return Err(BinderError::Configuration(format!(
                            "Property '{}' of {} combines a custom function with another source",
                            mapping.name,
                            type_name::<T>()
                        )));
                    }
                    Source::Custom(Arc::clone(custom))
                }
                None => {
                    let assign = (mapping.field)(registry).ok_or_else(|| {
                        BinderError::Configuration(format!(
                            "No type converter registered for type '{}' of property '{}'",
                            mapping.type_name, mapping.name
                        ))
                    })?;
                    match (mapping.index, mapping.names.is_empty()) {
                        (Some(index), _) => Source::Index { index, assign },
                        (None, false) if !config.has_header_record => {
                            return Err(BinderError::Configuration(format!(
                                "Property '{}' of {} is mapped by name but there is no header record",
                                mapping.name,
                                type_name::<T>()
                            )));
                        }
                        (None, false) => Source::Names {
                            names: mapping.names.clone(),
                            assign,
                        },
                        (None, true) if config.has_header_record => Source::Names {
                            names: vec![mapping.name.clone()],
                            assign,
                        },
                        (None, true) => Source::Index {
                            index: position,
                            assign,
                        },
                    }
                }
            };

            bindings.push(Binding {
                property: mapping.name.clone(),
                required: mapping.required,
                source,
            });
        }

        debug!(
            "Compiled class map for {} with {} bindings",
            type_name::<T>(),
            bindings.len()
        );

        Ok(ClassMap {
            type_name: type_name::<T>(),
            factory: self.factory.clone(),
            bindings,
        })
    }
}

pub(crate) enum Source<T> {
    Index { index: usize, assign: FieldAssign<T> },
    Names { names: Vec<String>, assign: FieldAssign<T> },
    Custom(CustomAssign<T>),
}

pub(crate) struct Binding<T> {
    pub(crate) property: String,
    pub(crate) required: bool,
    pub(crate) source: Source<T>,
}

impl<T> Binding<T> {
    pub(crate) fn selector(&self) -> SourceSelector {
        match &self.source {
            Source::Index { index, .. } => SourceSelector::Index(*index),
            Source::Names { names, .. } => SourceSelector::Names(names.clone()),
            Source::Custom(_) => SourceSelector::Custom,
        }
    }
}

/// Compiled bindings of a record type, shared by every row of a read.
pub struct ClassMap<T> {
    type_name: &'static str,
    factory: Factory<T>,
    bindings: Vec<Binding<T>>,
}

impl<T> ClassMap<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn has_custom_construction(&self) -> bool {
        matches!(self.factory, Factory::Custom(_))
    }

    /// Source of every bound property, in binding order.
    pub fn selectors(&self) -> Vec<(&str, SourceSelector)> {
        self.bindings
            .iter()
            .map(|binding| (binding.property.as_str(), binding.selector()))
            .collect()
    }

    /// One line per bound property.
    pub fn describe(&self) -> String {
        self.bindings
            .iter()
            .map(|binding| {
                let source = match binding.selector() {
                    SourceSelector::Index(index) => format!("index {}", index),
                    SourceSelector::Names(names) => format!("names {}", names.join(" | ")),
                    SourceSelector::Custom => "custom function".to_string(),
                };
                let required = if binding.required { "required" } else { "optional" };
                format!("{}.{} <- {} ({})", self.type_name, binding.property, source, required)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn bindings(&self) -> &[Binding<T>] {
        &self.bindings
    }

    pub(crate) fn construct(&self, row: &mut RowContext<'_>) -> Result<T, BinderError> {
        match &self.factory {
            Factory::Default(create) => Ok(create()),
            Factory::Custom(construct) => construct(row),
        }
    }
}

impl<T> fmt::Debug for ClassMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMap")
            .field("type_name", &self.type_name)
            .field("bindings", &self.selectors())
            .finish()
    }
}

/// Implements [`Bindable`] for a struct from a list of its fields.
///
/// Each entry is `field: Type`, optionally followed by `as "Property"` to
/// rename the property and `=> CsvField` for its declarative metadata.
///
/// ```
/// use csv_binder::impl_bindable;
/// use csv_binder::mapping::class_map::{Bindable, CsvField, SourceSelector};
///
/// #[derive(Debug, Default)]
/// struct Trade {
///     id: u64,
///     symbol: String,
///     note: String,
/// }
///
/// impl_bindable!(Trade {
///     id as "Id": u64 => CsvField::index(0),
///     symbol: String => CsvField::names(&["Symbol", "Ticker"]),
///     note: String => CsvField::ignore(),
/// });
///
/// let slots = Trade::slots();
/// assert_eq!(slots[0].name(), "Id");
/// assert_eq!(slots[0].selector(), Some(SourceSelector::Index(0)));
/// assert!(slots[2].is_ignored());
/// ```
#[macro_export]
macro_rules! impl_bindable {
    (@name $field:ident) => {
        stringify!($field)
    };
    (@name $field:ident $name:literal) => {
        $name
    };
    (@attr $mapping:expr) => {
        $mapping
    };
    (@attr $mapping:expr, $attr:expr) => {
        $mapping.attribute($attr)
    };
    ($record:ty { $($field:ident $(as $name:literal)? : $value:ty $(=> $attr:expr)?),* $(,)? }) => {
        impl $crate::mapping::class_map::Bindable for $record {
            fn slots() -> ::std::vec::Vec<$crate::mapping::class_map::PropertyMapping<Self>> {
                ::std::vec![
                    $(
                        $crate::impl_bindable!(@attr
                            $crate::mapping::class_map::PropertyMapping::new(
                                $crate::impl_bindable!(@name $field $($name)?),
                                |record: &mut $record, value: $value| record.$field = value,
                            )
                            $(, $attr)?
                        )
                    ),*
                ]
            }
        }
    };
}
