//! Typed instances: the in-memory object view of entities, structs and traits.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{errors::MetaGraphError, types::PrimitiveType};

static NEXT_TRANSIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    Active,
    Deleted,
}

impl EntityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Active => "ACTIVE",
            EntityState::Deleted => "DELETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(EntityState::Active),
            "DELETED" => Some(EntityState::Deleted),
            _ => None,
        }
    }
}

/// Identity of an entity: store-assigned, or a placeholder for an instance
/// that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Guid {
    Assigned(String),
    Transient(u64),
}

impl Guid {
    pub fn is_assigned(&self) -> bool {
        matches!(self, Guid::Assigned(_))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guid::Assigned(guid) => f.write_str(guid),
            Guid::Transient(n) => write!(f, "-{n}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    pub guid: Guid,
    pub type_name: String,
    pub version: u64,
    pub state: EntityState,
}

impl Id {
    /// Fresh placeholder identity, unique within this process.
    pub fn transient(type_name: &str) -> Self {
        Self {
            guid: Guid::Transient(NEXT_TRANSIENT_ID.fetch_add(1, Ordering::Relaxed)),
            type_name: type_name.to_string(),
            version: 0,
            state: EntityState::Active,
        }
    }

    pub fn assigned(guid: &str, type_name: &str) -> Self {
        Self {
            guid: Guid::Assigned(guid.to_string()),
            type_name: type_name.to_string(),
            version: 0,
            state: EntityState::Active,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.guid.is_assigned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValue {
    pub value: String,
    pub ordinal: i32,
}

impl EnumValue {
    pub fn new(value: &str, ordinal: i32) -> Self {
        Self {
            value: value.to_string(),
            ordinal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
}

impl PrimitiveValue {
    /// Property representation. Dates are stored as epoch milliseconds.
    pub fn to_json(&self) -> Value {
        match self {
            PrimitiveValue::Boolean(b) => Value::Bool(*b),
            PrimitiveValue::Int(i) => Value::from(*i),
            PrimitiveValue::Long(l) => Value::from(*l),
            PrimitiveValue::Double(d) => Value::from(*d),
            PrimitiveValue::String(s) => Value::String(s.clone()),
            PrimitiveValue::Date(d) => Value::from(d.timestamp_millis()),
        }
    }

    pub fn from_json(kind: PrimitiveType, value: &Value) -> Result<Self, MetaGraphError> {
        let mismatch = || {
            MetaGraphError::invalid_input(format!("property value {value} is not a {kind:?}"))
        };
        Ok(match kind {
            PrimitiveType::Boolean => PrimitiveValue::Boolean(value.as_bool().ok_or_else(mismatch)?),
            PrimitiveType::Int => PrimitiveValue::Int(
                value
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(mismatch)?,
            ),
            PrimitiveType::Long => PrimitiveValue::Long(value.as_i64().ok_or_else(mismatch)?),
            PrimitiveType::Double => PrimitiveValue::Double(value.as_f64().ok_or_else(mismatch)?),
            PrimitiveType::String => {
                PrimitiveValue::String(value.as_str().ok_or_else(mismatch)?.to_string())
            }
            PrimitiveType::Date => {
                let millis = value.as_i64().ok_or_else(mismatch)?;
                PrimitiveValue::Date(
                    Utc.timestamp_millis_opt(millis)
                        .single()
                        .ok_or_else(mismatch)?,
                )
            }
        })
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Boolean(b) => write!(f, "{b}"),
            PrimitiveValue::Int(i) => write!(f, "{i}"),
            PrimitiveValue::Long(l) => write!(f, "{l}"),
            PrimitiveValue::Double(d) => write!(f, "{d}"),
            PrimitiveValue::String(s) => f.write_str(s),
            PrimitiveValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Primitive(PrimitiveValue),
    Enum(EnumValue),
    Array(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    Struct(TypedInstance),
    /// Class instance carried inline; persisted (or reused) during discovery.
    Entity(TypedInstance),
    /// Class instance referred to by identity only.
    Reference(Id),
}

impl AttrValue {
    pub fn string(value: &str) -> Self {
        AttrValue::Primitive(PrimitiveValue::String(value.to_string()))
    }

    pub fn int(value: i32) -> Self {
        AttrValue::Primitive(PrimitiveValue::Int(value))
    }

    pub fn long(value: i64) -> Self {
        AttrValue::Primitive(PrimitiveValue::Long(value))
    }

    pub fn boolean(value: bool) -> Self {
        AttrValue::Primitive(PrimitiveValue::Boolean(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Primitive(PrimitiveValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Identity of a class-typed value, inline or by reference.
    pub fn class_id(&self) -> Option<&Id> {
        match self {
            AttrValue::Entity(instance) => instance.id.as_ref(),
            AttrValue::Reference(id) => Some(id),
            _ => None,
        }
    }
}

/// One entity (`id` set), struct or trait occurrence (`id` unset).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypedInstance {
    pub id: Option<Id>,
    pub type_name: String,
    pub values: BTreeMap<String, AttrValue>,
    pub traits: BTreeMap<String, TypedInstance>,
}

impl TypedInstance {
    /// New entity with a transient identity.
    pub fn entity(type_name: &str) -> Self {
        Self {
            id: Some(Id::transient(type_name)),
            type_name: type_name.to_string(),
            values: BTreeMap::new(),
            traits: BTreeMap::new(),
        }
    }

    pub fn with_id(id: Id) -> Self {
        Self {
            type_name: id.type_name.clone(),
            id: Some(id),
            values: BTreeMap::new(),
            traits: BTreeMap::new(),
        }
    }

    /// Struct or trait instance.
    pub fn structure(type_name: &str) -> Self {
        Self {
            id: None,
            type_name: type_name.to_string(),
            values: BTreeMap::new(),
            traits: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: AttrValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_trait(mut self, trait_instance: TypedInstance) -> Self {
        self.traits
            .insert(trait_instance.type_name.clone(), trait_instance);
        self
    }

    pub fn set(&mut self, name: &str, value: AttrValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    pub fn guid(&self) -> Option<&str> {
        match self.id.as_ref().map(|id| &id.guid) {
            Some(Guid::Assigned(guid)) => Some(guid),
            _ => None,
        }
    }

    /// Lightweight reference to this entity.
    pub fn reference(&self) -> Option<AttrValue> {
        self.id.clone().map(AttrValue::Reference)
    }

    pub fn trait_names(&self) -> Vec<&str> {
        self.traits.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_ids_are_unique() {
        let a = Id::transient("Table");
        let b = Id::transient("Table");
        assert_ne!(a.guid, b.guid);
        assert!(!a.is_assigned());
    }

    #[test]
    fn primitive_json_conversion_is_type_driven() {
        let date = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let stored = PrimitiveValue::Date(date).to_json();
        assert_eq!(stored, Value::from(1_700_000_000_123i64));
        assert_eq!(
            PrimitiveValue::from_json(PrimitiveType::Date, &stored).unwrap(),
            PrimitiveValue::Date(date)
        );
        let err = PrimitiveValue::from_json(PrimitiveType::Int, &Value::from(i64::MAX))
            .expect_err("overflow");
        assert!(matches!(err, MetaGraphError::InvalidInput(_)));
    }
}
