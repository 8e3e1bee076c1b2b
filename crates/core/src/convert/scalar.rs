//! Built-in converters for scalar types

use super::{ConversionContext, PropertyConverter};
use rust_decimal::Decimal;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Accepts `y/yes/true/t/1` and `n/no/false/f/0`, ignoring case
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter;

impl PropertyConverter<bool> for BoolConverter {
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<bool>> {
        context.add_supported_formats(
            "BoolConverter",
            &["yes (ignore case)", "y", "true", "t", "1", "no", "n", "false", "f", "0"],
        );
        let normalized = value.trim().to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "y" | "yes" | "true" | "t" | "1" => Some(true),
            "n" | "no" | "false" | "f" | "0" => Some(false),
            _ => None,
        })
    }
}

/// Integral types decodable from decimal, `0x`/`#` hex and leading-zero octal literals
pub trait DecodeInteger: Sized + Copy + Send + Sync + 'static {
    const NAME: &'static str;
    const MIN: Self;
    const MAX: Self;

    fn from_str_radix(digits: &str, radix: u32) -> Option<Self>;
}

macro_rules! decode_integer {
    ($($t:ty),* $(,)?) => {
        $(
            impl DecodeInteger for $t {
                const NAME: &'static str = stringify!($t);
                const MIN: Self = <$t>::MIN;
                const MAX: Self = <$t>::MAX;

                fn from_str_radix(digits: &str, radix: u32) -> Option<Self> {
                    <$t>::from_str_radix(digits, radix).ok()
                }
            }
        )*
    };
}

decode_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

/// Decode an integer literal the way numeric literals are decoded in property files
///
/// Accepts an optional sign, then `0x`/`0X`/`#` for hex, a leading `0` for octal, or plain
/// decimal digits. `MIN`/`MAX` (and `MIN_VALUE`/`MAX_VALUE`) name the type's bounds.
pub fn decode_integer<T: DecodeInteger>(value: &str) -> Option<T> {
    let trimmed = value.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "MIN" | "MIN_VALUE" => return Some(T::MIN),
        "MAX" | "MAX_VALUE" => return Some(T::MAX),
        _ => {}
    }

    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (radix, digits) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
        .or_else(|| unsigned.strip_prefix('#'))
    {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };

    if digits.is_empty() || digits.starts_with(['-', '+']) {
        return None;
    }

    if negative {
        T::from_str_radix(&format!("-{digits}"), radix)
    } else {
        T::from_str_radix(digits, radix)
    }
}

/// Converter for any integral type
#[derive(Debug)]
pub struct IntegerConverter<T>(PhantomData<fn() -> T>);

impl<T> IntegerConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for IntegerConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DecodeInteger> PropertyConverter<T> for IntegerConverter<T> {
    fn convert(&self, value: &str, context: &mut ConversionContext<'_>) -> anyhow::Result<Option<T>> {
        context.add_supported_formats(
            &format!("IntegerConverter<{}>", T::NAME),
            &["123 (decimal)", "-123", "0x7B (hex)", "#7B (hex)", "0173 (octal)", "MIN", "MAX"],
        );
        Ok(decode_integer(value))
    }
}

/// Floating point types with their keyword values
pub trait DecodeFloat: FromStr + Copy + Send + Sync + 'static {
    const NAME: &'static str;
    const MIN: Self;
    const MAX: Self;
    const NAN: Self;
    const INFINITY: Self;
    const NEG_INFINITY: Self;
}

macro_rules! decode_float {
    ($($t:ident),* $(,)?) => {
        $(
            impl DecodeFloat for $t {
                const NAME: &'static str = stringify!($t);
                const MIN: Self = $t::MIN;
                const MAX: Self = $t::MAX;
                const NAN: Self = $t::NAN;
                const INFINITY: Self = $t::INFINITY;
                const NEG_INFINITY: Self = $t::NEG_INFINITY;
            }
        )*
    };
}

decode_float!(f32, f64);

/// Converter for `f32`/`f64`, accepting `NaN`, `POSITIVE_INFINITY`, `NEGATIVE_INFINITY`,
/// `MIN` and `MAX` besides plain literals
#[derive(Debug)]
pub struct FloatConverter<T>(PhantomData<fn() -> T>);

impl<T> FloatConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FloatConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DecodeFloat> PropertyConverter<T> for FloatConverter<T> {
    fn convert(&self, value: &str, context: &mut ConversionContext<'_>) -> anyhow::Result<Option<T>> {
        context.add_supported_formats(
            &format!("FloatConverter<{}>", T::NAME),
            &["1.5", "-1.5e3", "NaN", "POSITIVE_INFINITY", "NEGATIVE_INFINITY", "MIN", "MAX"],
        );
        let trimmed = value.trim();
        Ok(match trimmed.to_ascii_uppercase().as_str() {
            "NAN" => Some(T::NAN),
            "POSITIVE_INFINITY" => Some(T::INFINITY),
            "NEGATIVE_INFINITY" => Some(T::NEG_INFINITY),
            "MIN" | "MIN_VALUE" => Some(T::MIN),
            "MAX" | "MAX_VALUE" => Some(T::MAX),
            _ => trimmed.parse::<T>().ok(),
        })
    }
}

/// Single characters, `'x'` quoted characters or numeric code points
#[derive(Debug, Clone, Copy, Default)]
pub struct CharConverter;

impl PropertyConverter<char> for CharConverter {
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<char>> {
        context.add_supported_formats("CharConverter", &["'a'", "a", "97 (code point)"]);
        let trimmed = value.trim();
        let mut chars = trimmed.chars();

        let converted = match (chars.next(), chars.next(), chars.next(), chars.next()) {
            (None, ..) => None,
            (Some(c), None, ..) => Some(c),
            (Some('\''), Some(c), Some('\''), None) => Some(c),
            _ => trimmed.parse::<u32>().ok().and_then(char::from_u32),
        };
        Ok(converted)
    }
}

/// Arbitrary precision decimals, including hex integer literals
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalConverter;

impl DecimalConverter {
    fn decode(value: &str) -> Option<Decimal> {
        let trimmed = value.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.contains("0x") || trimmed.starts_with('#') {
            return decode_integer::<i128>(trimmed)
                .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok());
        }
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
    }
}

impl PropertyConverter<Decimal> for DecimalConverter {
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<Decimal>> {
        context.add_supported_formats("DecimalConverter", &["-1.2345", "1.5e10", "0x7B"]);
        Ok(Self::decode(value))
    }
}

/// An integral or decimal number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Number {
    Integer(i128),
    Decimal(Decimal),
}

/// Integer literals become [`Number::Integer`], everything else parseable a decimal
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberConverter;

impl PropertyConverter<Number> for NumberConverter {
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<Number>> {
        context.add_supported_formats("NumberConverter", &["123", "0x7B", "-1.25", "1e3"]);
        if let Some(integer) = decode_integer::<i128>(value) {
            return Ok(Some(Number::Integer(integer)));
        }
        Ok(DecimalConverter::decode(value).map(Number::Decimal))
    }
}

/// Hands the raw value through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl PropertyConverter<String> for StringConverter {
    fn convert(
        &self,
        value: &str,
        _context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<String>> {
        Ok(Some(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathConverter;

impl PropertyConverter<PathBuf> for PathConverter {
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<PathBuf>> {
        context.add_supported_formats("PathConverter", &["/var/lib/app", "relative/path"]);
        let trimmed = value.trim();
        Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
    }
}

/// Durations such as `500ms`, `10s`, `2m`, `1h`, `1d`; bare numbers are milliseconds
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationConverter;

impl PropertyConverter<Duration> for DurationConverter {
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<Duration>> {
        context.add_supported_formats("DurationConverter", &["250 (millis)", "500ms", "10s", "2m", "1h", "1d"]);
        let trimmed = value.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (amount, unit) = trimmed.split_at(split);
        let Ok(amount) = amount.parse::<u64>() else {
            return Ok(None);
        };

        Ok(match unit.trim() {
            "" | "ms" => Some(Duration::from_millis(amount)),
            "s" => Some(Duration::from_secs(amount)),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "h" => amount.checked_mul(3_600).map(Duration::from_secs),
            "d" => amount.checked_mul(86_400).map(Duration::from_secs),
            _ => None,
        })
    }
}

/// Matches enum constants by name, ignoring case
#[derive(Debug, Clone)]
pub struct EnumConverter<E> {
    type_name: &'static str,
    variants: Vec<(String, E)>,
}

impl<E: Clone> EnumConverter<E> {
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = (S, E)>,
        S: Into<String>,
    {
        Self {
            type_name: std::any::type_name::<E>(),
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl<E: Clone + Send + Sync> PropertyConverter<E> for EnumConverter<E> {
    fn convert(&self, value: &str, context: &mut ConversionContext<'_>) -> anyhow::Result<Option<E>> {
        let names: Vec<&str> = self.variants.iter().map(|(n, _)| n.as_str()).collect();
        context.add_supported_formats(&format!("EnumConverter<{}>", self.type_name), &names);

        let trimmed = value.trim();
        Ok(self
            .variants
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
            .map(|(_, variant)| variant.clone()))
    }
}
