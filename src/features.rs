//! Summary features derived from decoded call arguments.
//!
//! Every argument is classified by its declared type. Arrays report their
//! length, integer arrays their extremes, string and byte arrays the extremes of
//! their element lengths. Scalar strings and byte strings report their length,
//! strings that hold a number also report that number.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use ethabi::param_type::{ParamType, Reader};
use ethabi::Token;
use ethereum_types::U256;
use ethers::types::I256;

use crate::decoder::{token_len, DecodedResult};

/// Insertion ordered set, unique by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSet<T: Eq + Hash + Clone> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> OrderedSet<T> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the value if absent. Returns false if it was already present.
    pub fn insert(&mut self, value: T) -> bool {
        if !self.seen.insert(value.clone()) {
            return false;
        }
        self.items.push(value);
        true
    }

    /// Values in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set holds no value.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values in insertion order, as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Eq + Hash + Clone> Extend<T> for OrderedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a, T: Eq + Hash + Clone> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// What a feature measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Element, byte or character count.
    Length,
    /// Smallest element.
    Min,
    /// Largest element.
    Max,
    /// Shortest element.
    MinLength,
    /// Longest element.
    MaxLength,
    /// Number held by a string.
    Num,
    /// Creation time of the contract an address argument names.
    CreationTime,
}

impl FeatureKind {
    /// Column name suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            FeatureKind::Length => "length",
            FeatureKind::Min => "min",
            FeatureKind::Max => "max",
            FeatureKind::MinLength => "minLength",
            FeatureKind::MaxLength => "maxLength",
            FeatureKind::Num => "num",
            FeatureKind::CreationTime => "timeStamp",
        }
    }

    /// Column name of this feature for the given argument.
    pub fn feature_name(&self, argument: &str) -> String {
        format!("{}_{}", argument, self.suffix())
    }
}

/// Value of a feature, rendered as a CSV cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    /// A length.
    Count(usize),
    /// An unsigned integer.
    Uint(U256),
    /// A signed integer.
    Int(I256),
    /// A number parsed from text.
    Number(f64),
    /// A unix timestamp.
    Timestamp(u64),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Count(count) => write!(f, "{}", count),
            FeatureValue::Uint(value) => write!(f, "{}", value),
            FeatureValue::Int(value) => write!(f, "{}", value),
            FeatureValue::Number(value) => write!(f, "{}", value),
            FeatureValue::Timestamp(value) => write!(f, "{}", value),
        }
    }
}

/// A named feature of one decoded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Column name, `{argument}_{suffix}`.
    pub name: String,
    /// What is measured.
    pub kind: FeatureKind,
    /// Measured value.
    pub value: FeatureValue,
}

// Keeps the first feature recorded under each name
#[derive(Default)]
struct FeatureSet {
    names: OrderedSet<String>,
    features: Vec<Feature>,
}

impl FeatureSet {
    fn add(&mut self, argument: &str, kind: FeatureKind, value: FeatureValue) {
        let name = kind.feature_name(argument);
        if self.names.insert(name.clone()) {
            self.features.push(Feature { name, kind, value });
        }
    }

    fn add_range(&mut self, argument: &str, kinds: (FeatureKind, FeatureKind), range: Option<(FeatureValue, FeatureValue)>) {
        if let Some((min, max)) = range {
            self.add(argument, kinds.0, min);
            self.add(argument, kinds.1, max);
        }
    }
}

/// Derives the features of one decoded call. Names are unique in the result.
pub fn derive_features(decoded: &DecodedResult) -> Vec<Feature> {
    let mut set = FeatureSet::default();

    for ((type_name, argument), value) in decoded.types.iter().zip(&decoded.names).zip(&decoded.inputs) {
        let kind = match Reader::read(type_name) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(argument, type_name, error = ?e, "Skipping argument with unreadable type");
                continue;
            }
        };

        match kind {
            ParamType::Array(inner) | ParamType::FixedArray(inner, _) => {
                let elements = match value {
                    Token::Array(elements) | Token::FixedArray(elements) => elements,
                    _ => continue,
                };
                set.add(argument, FeatureKind::Length, FeatureValue::Count(elements.len()));
                array_features(&mut set, argument, &inner, elements);
            }
            ParamType::Bytes | ParamType::FixedBytes(_) => {
                if let Some(len) = token_len(value) {
                    set.add(argument, FeatureKind::Length, FeatureValue::Count(len));
                }
            }
            ParamType::String => {
                if let Token::String(text) = value {
                    set.add(argument, FeatureKind::Length, FeatureValue::Count(text.chars().count()));
                    if let Some(number) = parse_number(text) {
                        set.add(argument, FeatureKind::Num, FeatureValue::Number(number));
                    }
                }
            }
            _ => {}
        }
    }

    set.features
}

fn array_features(set: &mut FeatureSet, argument: &str, base: &ParamType, elements: &[Token]) {
    let extremes = (FeatureKind::Min, FeatureKind::Max);
    match base {
        ParamType::Uint(_) => {
            let values = elements.iter().filter_map(|token| match token {
                Token::Uint(value) => Some(*value),
                _ => None,
            });
            let range = min_max(values).map(|(min, max)| (FeatureValue::Uint(min), FeatureValue::Uint(max)));
            set.add_range(argument, extremes, range);
        }
        ParamType::Int(_) => {
            let values = elements.iter().filter_map(|token| match token {
                Token::Int(value) => Some(I256::from_raw(*value)),
                _ => None,
            });
            let range = min_max(values).map(|(min, max)| (FeatureValue::Int(min), FeatureValue::Int(max)));
            set.add_range(argument, extremes, range);
        }
        ParamType::String | ParamType::Bytes | ParamType::FixedBytes(_) => {
            let lengths = min_max(elements.iter().filter_map(token_len))
                .map(|(min, max)| (FeatureValue::Count(min), FeatureValue::Count(max)));
            set.add_range(argument, (FeatureKind::MinLength, FeatureKind::MaxLength), lengths);

            // Only the elements that read as numbers take part
            let numbers = elements.iter().filter_map(|token| match token {
                Token::String(text) => parse_number(text),
                _ => None,
            });
            let range = min_max(numbers).map(|(min, max)| (FeatureValue::Number(min), FeatureValue::Number(max)));
            set.add_range(argument, extremes, range);
        }
        _ => {}
    }
}

fn min_max<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.fold(None, |acc, value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((
            if value < min { value } else { min },
            if value > max { value } else { max },
        )),
    })
}

/// Scalar `address` arguments of a decoded call, as `(argument, address)`
/// pairs with the address rendered as lower-case `0x` hex.
pub fn address_arguments(decoded: &DecodedResult) -> Vec<(String, String)> {
    decoded
        .types
        .iter()
        .zip(&decoded.names)
        .zip(&decoded.inputs)
        .filter_map(|((type_name, argument), value)| match (Reader::read(type_name), value) {
            (Ok(ParamType::Address), Token::Address(address)) => Some((argument.clone(), format!("{:#x}", address))),
            _ => None,
        })
        .collect()
}

/// Feature recording when the contract passed as `argument` was created.
pub fn creation_time_feature(argument: &str, timestamp: u64) -> Feature {
    Feature {
        name: FeatureKind::CreationTime.feature_name(argument),
        kind: FeatureKind::CreationTime,
        value: FeatureValue::Timestamp(timestamp),
    }
}

/// Reads a string as a finite number: decimal, scientific or `0x` hex.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(hex_digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u128::from_str_radix(hex_digits, 16).ok().map(|n| n as f64);
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
