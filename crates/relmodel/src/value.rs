//! Runtime value types.
//!
//! A [`Value`] is used for three things: literals inside annotations
//! (defaults, constraint anchors), cells of extracted rows, and the members of
//! live object graphs handed to the extractor.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar data types recognized by the type classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal.
    Decimal,
    /// Single character.
    Char,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    DateTime,
    /// Unique identifier (128-bit).
    Guid,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        self.is_integral()
            || matches!(
                self,
                ScalarType::Float32 | ScalarType::Float64 | ScalarType::Decimal
            )
    }

    /// Check if this type is an integer type.
    pub fn is_integral(&self) -> bool {
        self.integral_range().is_some()
    }

    /// Check if this type is textual.
    pub fn is_textual(&self) -> bool {
        matches!(self, ScalarType::String)
    }

    /// Check if values of this type have a total order usable in comparisons.
    pub fn is_ordered(&self) -> bool {
        self.is_numeric()
            || matches!(
                self,
                ScalarType::Char | ScalarType::String | ScalarType::DateTime
            )
    }

    /// Check if the domain of this type is discrete (countable between bounds).
    pub fn is_discrete(&self) -> bool {
        self.is_integral() || matches!(self, ScalarType::Char | ScalarType::DateTime)
    }

    /// Inclusive value range of an integer type.
    pub fn integral_range(&self) -> Option<(i128, i128)> {
        match self {
            ScalarType::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            ScalarType::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            ScalarType::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            ScalarType::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
            ScalarType::UInt8 => Some((0, u8::MAX as i128)),
            ScalarType::UInt16 => Some((0, u16::MAX as i128)),
            ScalarType::UInt32 => Some((0, u32::MAX as i128)),
            ScalarType::UInt64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// Inclusive range of a discrete domain, as integers.
    pub fn discrete_range(&self) -> Option<(i128, i128)> {
        match self {
            ScalarType::Char => Some((0, char::MAX as i128)),
            ScalarType::DateTime => Some((i64::MIN as i128, i64::MAX as i128)),
            other => other.integral_range(),
        }
    }

    /// Bring a value into the canonical representation of this type.
    ///
    /// Returns `None` if the value does not belong to the domain. Null is not
    /// part of any scalar domain.
    pub fn normalize(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ScalarType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (ScalarType::Float32 | ScalarType::Float64 | ScalarType::Decimal, v) => {
                v.as_f64().map(Value::Float)
            }
            (ScalarType::Char, Value::Char(c)) => Some(Value::Char(*c)),
            (ScalarType::String, Value::String(s)) => Some(Value::String(s.clone())),
            (ScalarType::DateTime, Value::DateTime(t)) => Some(Value::DateTime(*t)),
            (ScalarType::Guid, Value::Guid(g)) => Some(Value::Guid(*g)),
            (integral, v) => {
                let (min, max) = integral.integral_range()?;
                let n = match v {
                    Value::Int(i) => *i as i128,
                    Value::UInt(u) => *u as i128,
                    _ => return None,
                };
                if n < min || n > max {
                    return None;
                }
                if min < 0 {
                    Some(Value::Int(n as i64))
                } else {
                    Some(Value::UInt(n as u64))
                }
            }
        }
    }

    /// Check if a value belongs to this type's domain.
    pub fn accepts(&self, value: &Value) -> bool {
        self.normalize(value).is_some()
    }

    /// A representative non-null value of this type.
    pub fn probe(&self) -> Value {
        match self {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64 => {
                Value::Int(0)
            }
            ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 | ScalarType::UInt64 => {
                Value::UInt(0)
            }
            ScalarType::Float32 | ScalarType::Float64 | ScalarType::Decimal => Value::Float(0.0),
            ScalarType::Char => Value::Char('\0'),
            ScalarType::String => Value::String(String::new()),
            ScalarType::DateTime => Value::DateTime(0),
            ScalarType::Guid => Value::Guid([0; 16]),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Collection semantics of a relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Ordered sequence that allows duplicates.
    List,
    /// Unordered collection of distinct elements.
    Set,
    /// Sequence whose order is significant and persisted.
    OrderedList,
    /// Mapping from distinct keys to values.
    Map,
}

impl CollectionKind {
    /// Check if entries of this kind are addressed by position.
    pub fn is_positional(&self) -> bool {
        matches!(self, CollectionKind::List | CollectionKind::OrderedList)
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point or decimal number.
    Float(f64),
    /// Single character.
    Char(char),
    /// UTF-8 string.
    String(String),
    /// Timestamp as microseconds since Unix epoch.
    DateTime(i64),
    /// Unique identifier as 16 bytes.
    Guid([u8; 16]),
    /// Enumeration value; flag combinations are joined with `|`.
    Enum(String),
    /// Aggregate or entity instance.
    Object(Box<Object>),
    /// Collection backing a relation field.
    Collection(Collection),
}

impl Value {
    /// Create an enumeration value.
    pub fn enumeration(variant: impl Into<String>) -> Self {
        Value::Enum(variant.into())
    }

    /// Create a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as a discrete integer (integers, characters, timestamps).
    pub fn as_discrete(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i as i128),
            Value::UInt(u) => Some(*u as i128),
            Value::Char(c) => Some(*c as u32 as i128),
            Value::DateTime(t) => Some(*t as i128),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as object reference.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Try to get as collection reference.
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Try to compare two values.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Guid(a), Value::Guid(b)) => a.partial_cmp(b),
            (Value::Enum(a), Value::Enum(b)) => a.partial_cmp(b),
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (a, b) => match (a.as_discrete(), b.as_discrete()) {
                (Some(x), Some(y)) if numeric_pair(a, b) => Some(x.cmp(&y)),
                _ => None,
            },
        }
    }

    /// Check two values for equality under numeric coercion.
    pub fn same(&self, other: &Value) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }
}

fn numeric_pair(a: &Value, b: &Value) -> bool {
    matches!(a, Value::Int(_) | Value::UInt(_)) && matches!(b, Value::Int(_) | Value::UInt(_))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Char(c) => write!(f, "'{}'", c),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::DateTime(t) => write!(f, "@{}", t),
            Value::Guid(g) => {
                for byte in g {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Enum(e) => write!(f, "{}", e),
            Value::Object(o) => write!(f, "{} {{..}}", o.type_name),
            Value::Collection(c) => write!(f, "{:?}[{}]", c.kind(), c.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u as u64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(Box::new(o))
    }
}

impl From<Collection> for Value {
    fn from(c: Collection) -> Self {
        Value::Collection(c)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A live instance of an entity or aggregate type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Object {
    /// Qualified name of the instance's type.
    pub type_name: String,
    /// Member values keyed by member name.
    pub members: BTreeMap<String, Value>,
}

impl Object {
    /// Create an empty instance of a type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: BTreeMap::new(),
        }
    }

    /// Set a member value.
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(member.into(), value.into());
        self
    }

    /// Get a member value.
    pub fn get(&self, member: &str) -> Option<&Value> {
        self.members.get(member)
    }

    /// Set a member value in place.
    pub fn set(&mut self, member: impl Into<String>, value: impl Into<Value>) {
        self.members.insert(member.into(), value.into());
    }
}

/// Change-tracking state of a collection entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    /// Persisted and unchanged.
    Saved,
    /// Added since the last save.
    New,
    /// Persisted, value changed since the last save.
    Modified,
    /// Persisted, removed since the last save.
    Deleted,
}

/// One entry of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// Map key; `None` for lists and sets.
    pub key: Option<Value>,
    /// Element (or map value).
    pub value: Value,
    /// Change-tracking state.
    pub state: EntryState,
    /// Stored position of a list element. Slots only grow; a removed
    /// element's slot is never handed out again.
    pub slot: u64,
}

/// A change-tracking collection backing a relation field.
///
/// Equality compares live (non-deleted) entries only; sets and maps compare
/// without regard to order.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    kind: CollectionKind,
    entries: Vec<Entry>,
    next_slot: u64,
}

impl Collection {
    /// Create an empty collection.
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            next_slot: 0,
        }
    }

    /// Create a list whose elements are all new.
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::from_items(CollectionKind::List, items)
    }

    /// Create an ordered list whose elements are all new.
    pub fn ordered_list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::from_items(CollectionKind::OrderedList, items)
    }

    /// Create a set whose elements are all new. Duplicates are dropped.
    pub fn set(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let mut set = Self::new(CollectionKind::Set);
        for item in items {
            set.push(item);
        }
        set
    }

    /// Create a map whose entries are all new. Later keys replace earlier ones.
    pub fn map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        let mut map = Self::new(CollectionKind::Map);
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }

    fn from_items(kind: CollectionKind, items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let mut collection = Self::new(kind);
        for item in items {
            collection.append(None, item.into(), EntryState::New);
        }
        collection
    }

    /// Create a collection from persisted entries, numbering slots from 0.
    pub fn loaded(kind: CollectionKind, entries: Vec<(Option<Value>, Value)>) -> Self {
        let mut collection = Self::new(kind);
        for (key, value) in entries {
            collection.append(key, value, EntryState::Saved);
        }
        collection
    }

    /// Create a collection from persisted entries that keep their stored slots.
    ///
    /// Entries are taken in the given order; new elements are placed after
    /// the highest slot seen.
    pub fn restored(kind: CollectionKind, entries: Vec<(u64, Option<Value>, Value)>) -> Self {
        let mut collection = Self::new(kind);
        for (slot, key, value) in entries {
            collection.entries.push(Entry {
                key,
                value,
                state: EntryState::Saved,
                slot,
            });
            collection.next_slot = collection.next_slot.max(slot.saturating_add(1));
        }
        collection
    }

    fn append(&mut self, key: Option<Value>, value: Value, state: EntryState) {
        self.entries.push(Entry {
            key,
            value,
            state,
            slot: self.next_slot,
        });
        self.next_slot += 1;
    }

    /// Collection kind.
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// All entries, including deleted ones.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Live (non-deleted) entries.
    pub fn live(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| e.state != EntryState::Deleted)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live().count()
    }

    /// Check if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if no entry has changed since the last save.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.state == EntryState::Saved)
    }

    /// Append an element. For sets, an element already present is ignored.
    pub fn push(&mut self, item: impl Into<Value>) {
        let value = item.into();
        if self.kind == CollectionKind::Set && self.live().any(|e| e.value.same(&value)) {
            return;
        }
        self.append(None, value, EntryState::New);
    }

    /// Insert or replace a map entry.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let existing = self.entries.iter_mut().find(|e| {
            e.state != EntryState::Deleted && e.key.as_ref().is_some_and(|k| k.same(&key))
        });
        match existing {
            Some(entry) => {
                entry.value = value;
                if entry.state == EntryState::Saved {
                    entry.state = EntryState::Modified;
                }
            }
            None => self.append(Some(key), value, EntryState::New),
        }
    }

    /// Replace the element at a position of the entry list.
    pub fn modify(&mut self, index: usize, value: impl Into<Value>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.value = value.into();
            if entry.state == EntryState::Saved {
                entry.state = EntryState::Modified;
            }
        }
    }

    /// Remove the entry at a position of the entry list.
    ///
    /// New entries disappear; persisted ones are marked deleted.
    pub fn remove_at(&mut self, index: usize) {
        match self.entries.get(index).map(|e| e.state) {
            Some(EntryState::New) => {
                self.entries.remove(index);
            }
            Some(_) => self.entries[index].state = EntryState::Deleted,
            None => {}
        }
    }

    /// Mark every live entry saved and forget deleted ones.
    pub fn commit(&mut self) {
        self.entries.retain(|e| e.state != EntryState::Deleted);
        for entry in &mut self.entries {
            entry.state = EntryState::Saved;
        }
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind || self.len() != other.len() {
            return false;
        }
        let entry_eq = |a: &Entry, b: &Entry| {
            a.value == b.value
                && match (&a.key, &b.key) {
                    (Some(x), Some(y)) => x == y,
                    (None, None) => true,
                    _ => false,
                }
        };
        if self.kind.is_positional() {
            return self.live().zip(other.live()).all(|(a, b)| entry_eq(a, b));
        }
        let mut unmatched: Vec<&Entry> = other.live().collect();
        for entry in self.live() {
            match unmatched.iter().position(|e| entry_eq(entry, e)) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => return false,
            }
        }
        unmatched.is_empty()
    }
}
