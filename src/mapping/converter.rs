use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt::{self, Display},
    str::FromStr,
    sync::Arc,
};

use crate::error::{BinderError, ConversionFailure};

/// Turns the raw text of a field into a typed value.
///
/// Any `Fn(&str) -> Result<V, ConversionFailure>` is a converter:
///
/// ```
/// use csv_binder::error::ConversionFailure;
/// use csv_binder::mapping::converter::TypeConverterRegistry;
///
/// #[derive(Debug, PartialEq)]
/// struct Cents(i64);
///
/// let mut registry = TypeConverterRegistry::new();
/// registry.register::<Cents>(|text: &str| -> Result<Cents, ConversionFailure> {
///     let amount: f64 = text
///         .trim_start_matches('$')
///         .parse()
///         .map_err(|_| ConversionFailure::invalid("Cents", text))?;
///     Ok(Cents((amount * 100.0).round() as i64))
/// });
///
/// assert_eq!(registry.convert::<Cents>("$12.50").unwrap(), Cents(1250));
/// assert!(registry.convert::<Cents>("twelve").is_err());
/// ```
pub trait TypeConverter<V>: Send + Sync {
    fn convert(&self, text: &str) -> Result<V, ConversionFailure>;
}

impl<V, F> TypeConverter<V> for F
where
    F: Fn(&str) -> Result<V, ConversionFailure> + Send + Sync,
{
    fn convert(&self, text: &str) -> Result<V, ConversionFailure> {
        self(text)
    }
}

#[derive(Clone)]
struct Entry {
    type_name: &'static str,
    /// An `Arc<dyn TypeConverter<V>>` for the `V` of the map key.
    converter: Arc<dyn Any + Send + Sync>,
}

/// Converters keyed by target type.
///
/// [`TypeConverterRegistry::new`] comes with converters for the primitive
/// types, `String`, `char`, the `Option` of each of them and, with the
/// `chrono` feature, the chrono date and time types. Registering a converter
/// for a type replaces the previous one.
#[derive(Clone)]
pub struct TypeConverterRegistry {
    converters: HashMap<TypeId, Entry>,
}

impl Default for TypeConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.converters.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        f.debug_struct("TypeConverterRegistry")
            .field("types", &names)
            .finish()
    }
}

macro_rules! register_from_str {
    ($registry:expr, $($ty:ty),* $(,)?) => {
        $(
            $registry.register::<$ty>(parse_trimmed::<$ty>);
            $registry.register::<Option<$ty>>(|text: &str| optional(text, parse_trimmed::<$ty>));
        )*
    };
}

impl TypeConverterRegistry {
    /// Registry holding the default converters.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        register_from_str!(
            registry, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
        );
        registry.register::<bool>(parse_bool);
        registry.register::<Option<bool>>(|text: &str| optional(text, parse_bool));
        registry.register::<char>(parse_char);
        registry.register::<Option<char>>(|text: &str| optional(text, parse_char));
        registry.register::<String>(|text: &str| -> Result<String, ConversionFailure> {
            Ok(text.to_string())
        });
        registry.register::<Option<String>>(|text: &str| {
            optional(text, |text| -> Result<String, ConversionFailure> { Ok(text.to_string()) })
        });
        #[cfg(feature = "chrono")]
        crate::mapping::datetime::register_defaults(&mut registry);
        registry
    }

    /// Registry without any converter.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    pub fn register<V: 'static>(&mut self, converter: impl TypeConverter<V> + 'static) -> &mut Self {
        let converter: Arc<dyn TypeConverter<V>> = Arc::new(converter);
        self.insert(converter);
        self
    }

    pub(crate) fn insert<V: 'static>(&mut self, converter: Arc<dyn TypeConverter<V>>) {
        self.converters.insert(
            TypeId::of::<V>(),
            Entry {
                type_name: type_name::<V>(),
                converter: Arc::new(converter),
            },
        );
    }

    /// Converts through the type's `FromStr` implementation, after trimming.
    pub fn register_from_str<V>(&mut self) -> &mut Self
    where
        V: FromStr + 'static,
        V::Err: Display,
    {
        self.register::<V>(parse_trimmed::<V>)
    }

    /// Copies every converter of `other` into this registry, replacing
    /// converters registered for the same type.
    pub fn extend(&mut self, other: &TypeConverterRegistry) -> &mut Self {
        for (id, entry) in &other.converters {
            self.converters.insert(*id, entry.clone());
        }
        self
    }

    pub fn contains<V: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<V>())
    }

    pub fn get<V: 'static>(&self) -> Option<Arc<dyn TypeConverter<V>>> {
        self.converters
            .get(&TypeId::of::<V>())
            .and_then(|entry| entry.converter.downcast_ref::<Arc<dyn TypeConverter<V>>>())
            .cloned()
    }

    /// The converter for `V`, or a configuration error when none is registered.
    pub fn converter<V: 'static>(&self) -> Result<Arc<dyn TypeConverter<V>>, BinderError> {
        self.get::<V>().ok_or_else(|| {
            BinderError::Configuration(format!(
                "No type converter registered for type '{}'",
                type_name::<V>()
            ))
        })
    }

    /// Converts `text` to `V` outside of any row.
    pub fn convert<V: 'static>(&self, text: &str) -> Result<V, BinderError> {
        Ok(self.converter::<V>()?.convert(text)?)
    }
}

fn parse_trimmed<V>(text: &str) -> Result<V, ConversionFailure>
where
    V: FromStr,
    V::Err: Display,
{
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ConversionFailure::new(
            type_name::<V>(),
            "an empty value cannot be converted",
        ));
    }
    trimmed.parse::<V>().map_err(|e| {
        ConversionFailure::new(
            type_name::<V>(),
            format!("'{}' is not a valid {} value ({})", text, type_name::<V>(), e),
        )
    })
}

fn parse_bool(text: &str) -> Result<bool, ConversionFailure> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(ConversionFailure::invalid("bool", text)),
    }
}

fn parse_char(text: &str) -> Result<char, ConversionFailure> {
    let single = |s: &str| {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    };
    single(text)
        .or_else(|| single(text.trim()))
        .ok_or_else(|| ConversionFailure::invalid("char", text))
}

/// Empty or whitespace-only text is `None`, anything else goes through `parse`.
pub fn optional<V>(
    text: &str,
    parse: impl Fn(&str) -> Result<V, ConversionFailure>,
) -> Result<Option<V>, ConversionFailure> {
    if text.trim().is_empty() {
        Ok(None)
    } else {
        parse(text).map(Some)
    }
}

/// Converts variant names, ignoring case, or 0-based ordinals to an enum value.
///
/// ```
/// use csv_binder::mapping::converter::{EnumConverter, TypeConverterRegistry};
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Color { Red, Green }
///
/// let mut registry = TypeConverterRegistry::new();
/// registry.register::<Color>(EnumConverter::new([("Red", Color::Red), ("Green", Color::Green)]));
///
/// assert_eq!(registry.convert::<Color>("green").unwrap(), Color::Green);
/// assert_eq!(registry.convert::<Color>("0").unwrap(), Color::Red);
/// assert!(registry.convert::<Color>("Blue").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EnumConverter<E> {
    variants: Vec<(String, E)>,
}

impl<E> EnumConverter<E> {
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = (S, E)>,
        S: Into<String>,
    {
        Self {
            variants: variants
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

impl<E: Clone + Send + Sync> TypeConverter<E> for EnumConverter<E> {
    fn convert(&self, text: &str) -> Result<E, ConversionFailure> {
        let trimmed = text.trim();

        if let Some((_, value)) = self
            .variants
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
        {
            return Ok(value.clone());
        }

        if let Ok(ordinal) = trimmed.parse::<usize>() {
            if let Some((_, value)) = self.variants.get(ordinal) {
                return Ok(value.clone());
            }
        }

        Err(ConversionFailure::new(
            type_name::<E>(),
            format!(
                "'{}' is out of range, expected one of: {}",
                text,
                self.variants
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{EnumConverter, TypeConverterRegistry};
    use crate::error::{BinderError, ConversionFailure};

    #[test]
    fn integers_are_trimmed_and_range_checked() {
        let registry = TypeConverterRegistry::new();

        assert_eq!(registry.convert::<i32>(" 42 ").unwrap(), 42);
        assert_eq!(registry.convert::<i64>("-7").unwrap(), -7);
        assert!(matches!(
            registry.convert::<u8>("256"),
            Err(BinderError::Conversion(_))
        ));
        assert!(registry.convert::<u32>("-1").is_err());
    }

    #[test]
    fn empty_text_is_not_a_number() {
        let registry = TypeConverterRegistry::new();

        let error = registry.convert::<i32>("").unwrap_err();
        assert!(matches!(error, BinderError::Conversion(ConversionFailure { type_name: "i32", .. })));
        assert!(registry.convert::<f64>("   ").is_err());
    }

    #[test]
    fn floats_parse() {
        let registry = TypeConverterRegistry::new();

        assert_eq!(registry.convert::<f64>("3.25").unwrap(), 3.25);
        assert_eq!(registry.convert::<f32>("1e3").unwrap(), 1000.0);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let registry = TypeConverterRegistry::new();

        for text in ["true", "TRUE", "1", "yes", "Y"] {
            assert!(registry.convert::<bool>(text).unwrap(), "{}", text);
        }
        for text in ["false", "False", "0", "no", "n"] {
            assert!(!registry.convert::<bool>(text).unwrap(), "{}", text);
        }
        assert!(registry.convert::<bool>("maybe").is_err());
    }

    #[test]
    fn options_map_blank_text_to_none() {
        let registry = TypeConverterRegistry::new();

        assert_eq!(registry.convert::<Option<i32>>("").unwrap(), None);
        assert_eq!(registry.convert::<Option<i32>>(" 5").unwrap(), Some(5));
        assert_eq!(registry.convert::<Option<String>>("").unwrap(), None);
        assert_eq!(registry.convert::<Option<String>>("   ").unwrap(), None);
        assert_eq!(registry.convert::<Option<String>>(" a ").unwrap(), Some(" a ".to_string()));
        assert!(registry.convert::<Option<i32>>("x").is_err());
    }

    #[test]
    fn strings_are_kept_verbatim() {
        let registry = TypeConverterRegistry::new();

        assert_eq!(registry.convert::<String>(" a ").unwrap(), " a ");
        assert_eq!(registry.convert::<char>("x").unwrap(), 'x');
        assert_eq!(registry.convert::<char>(" x ").unwrap(), 'x');
        assert!(registry.convert::<char>("xy").is_err());
    }

    #[test]
    fn unregistered_type_is_a_configuration_error() {
        struct Unknown;

        let registry = TypeConverterRegistry::new();

        assert!(!registry.contains::<Unknown>());
        assert!(matches!(
            registry.convert::<Unknown>("x"),
            Err(BinderError::Configuration(_))
        ));
    }

    #[test]
    fn registered_converter_takes_precedence() {
        let mut registry = TypeConverterRegistry::new();
        registry.register::<i32>(|text: &str| -> Result<i32, ConversionFailure> {
            Ok(text.len() as i32)
        });

        assert_eq!(registry.convert::<i32>("abcd").unwrap(), 4);
    }

    #[test]
    fn extend_overrides_existing_entries() {
        let mut overrides = TypeConverterRegistry::empty();
        overrides.register::<bool>(|text: &str| -> Result<bool, ConversionFailure> {
            Ok(text == "oui")
        });

        let mut registry = TypeConverterRegistry::new();
        registry.extend(&overrides);

        assert!(registry.convert::<bool>("oui").unwrap());
        assert!(!registry.convert::<bool>("true").unwrap());
        assert_eq!(registry.convert::<i32>("3").unwrap(), 3);
    }

    #[test]
    fn from_str_types_can_be_registered() {
        let mut registry = TypeConverterRegistry::empty();
        registry.register_from_str::<std::net::Ipv4Addr>();

        assert_eq!(
            registry.convert::<std::net::Ipv4Addr>("127.0.0.1").unwrap(),
            std::net::Ipv4Addr::LOCALHOST
        );
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Status {
        Active,
        Suspended,
    }

    #[test]
    fn enum_names_and_ordinals() {
        let converter = EnumConverter::new([("Active", Status::Active), ("Suspended", Status::Suspended)]);
        let mut registry = TypeConverterRegistry::new();
        registry.register::<Status>(converter);

        assert_eq!(registry.convert::<Status>("SUSPENDED").unwrap(), Status::Suspended);
        assert_eq!(registry.convert::<Status>("1").unwrap(), Status::Suspended);

        let error = registry.convert::<Status>("2").unwrap_err();
        assert!(error.to_string().contains("out of range"));
    }
}
