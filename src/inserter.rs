//! Merge strategies for inserts
//!
//! An insert hands the tree a function from the value currently stored at a
//! network (if any) to the value that should replace it. Returning `None`
//! clears the record.

use crate::data_section::DataValue;
use crate::error::{Result, WriterError};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Combines an incoming value with the value already stored
pub trait MergeStrategy {
    /// Value to store given the incoming `new` and the existing `old`
    fn merge(&self, new: &DataValue, old: Option<&DataValue>) -> Result<Option<DataValue>>;
}

/// Built-in strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Overwrite whatever is there
    #[default]
    Replace,
    /// Merge map keys one level deep; new keys win
    TopLevelMerge,
    /// Merge maps recursively and arrays by index; new scalars win
    DeepMerge,
    /// Only fill networks that hold no value yet
    KeepExisting,
    /// Clear the network
    Remove,
}

impl MergeStrategy for Strategy {
    fn merge(&self, new: &DataValue, old: Option<&DataValue>) -> Result<Option<DataValue>> {
        match self {
            Strategy::Replace => Ok(Some(new.clone())),
            Strategy::Remove => Ok(None),
            Strategy::KeepExisting => Ok(Some(old.unwrap_or(new).clone())),
            Strategy::TopLevelMerge => match old {
                None => Ok(Some(new.clone())),
                Some(old) => {
                    let (old_map, new_map) = both_maps(old, new, "top-level merge")?;
                    let mut merged = old_map.clone();
                    for (k, v) in new_map {
                        merged.insert(k.clone(), v.clone());
                    }
                    Ok(Some(DataValue::Map(merged)))
                }
            },
            Strategy::DeepMerge => match old {
                None => Ok(Some(new.clone())),
                Some(old) => {
                    both_maps(old, new, "deep merge")?;
                    Ok(Some(deep_merge(old, new)))
                }
            },
        }
    }
}

impl<F> MergeStrategy for F
where
    F: Fn(&DataValue, Option<&DataValue>) -> Result<Option<DataValue>>,
{
    fn merge(&self, new: &DataValue, old: Option<&DataValue>) -> Result<Option<DataValue>> {
        self(new, old)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Strategy::Replace),
            "toplevel" | "top-level" => Ok(Strategy::TopLevelMerge),
            "deep" => Ok(Strategy::DeepMerge),
            "keep" | "keep-existing" => Ok(Strategy::KeepExisting),
            "remove" => Ok(Strategy::Remove),
            other => Err(format!(
                "unknown merge strategy '{}' (expected replace, toplevel, deep, keep or remove)",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Replace => "replace",
            Strategy::TopLevelMerge => "toplevel",
            Strategy::DeepMerge => "deep",
            Strategy::KeepExisting => "keep",
            Strategy::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Per-record merge function applying `strategy` with `value` as the new value
pub fn inserter<'a, S>(
    strategy: &'a S,
    value: DataValue,
) -> impl FnMut(Option<&DataValue>) -> Result<Option<DataValue>> + 'a
where
    S: MergeStrategy + ?Sized,
{
    move |old| strategy.merge(&value, old)
}

fn both_maps<'a>(
    old: &'a DataValue,
    new: &'a DataValue,
    what: &str,
) -> Result<(&'a HashMap<String, DataValue>, &'a HashMap<String, DataValue>)> {
    match (old, new) {
        (DataValue::Map(o), DataValue::Map(n)) => Ok((o, n)),
        _ => Err(WriterError::merge_conflict(format!(
            "{} needs maps on both sides, found {} and {}",
            what,
            type_name(old),
            type_name(new)
        ))),
    }
}

fn deep_merge(old: &DataValue, new: &DataValue) -> DataValue {
    match (old, new) {
        (DataValue::Map(o), DataValue::Map(n)) => {
            let mut merged = o.clone();
            for (k, v) in n {
                let value = match o.get(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), value);
            }
            DataValue::Map(merged)
        }
        (DataValue::Array(o), DataValue::Array(n)) => {
            let len = o.len().max(n.len());
            DataValue::Array(
                (0..len)
                    .filter_map(|i| match (o.get(i), n.get(i)) {
                        (Some(a), Some(b)) => Some(deep_merge(a, b)),
                        (a, b) => b.or(a).cloned(),
                    })
                    .collect(),
            )
        }
        _ => new.clone(),
    }
}

fn type_name(value: &DataValue) -> &'static str {
    match value {
        DataValue::String(_) => "string",
        DataValue::Double(_) => "double",
        DataValue::Bytes(_) => "bytes",
        DataValue::Uint16(_) => "uint16",
        DataValue::Uint32(_) => "uint32",
        DataValue::Map(_) => "map",
        DataValue::Int32(_) => "int32",
        DataValue::Uint64(_) => "uint64",
        DataValue::Uint128(_) => "uint128",
        DataValue::Array(_) => "array",
        DataValue::Bool(_) => "bool",
        DataValue::Float(_) => "float",
    }
}
