//! In-process type registry.
//!
//! Holds the class, struct, trait and enum definitions the mappers consult.
//! Each hierarchical type carries a flattened [`FieldMapping`] in which every
//! attribute remembers the type that declared it, since property keys and
//! edge labels are derived from the declaring type rather than the concrete
//! one.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{edge_label, qualified_name},
    errors::MetaGraphError,
    instance::EnumValue,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Int,
    Long,
    Double,
    String,
    Date,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Primitive(PrimitiveType),
    Enum(String),
    Array(Box<DataType>),
    /// String-keyed map of the boxed value type.
    Map(Box<DataType>),
    Struct(String),
    Class(String),
    Trait(String),
}

/// Closed set of attribute kinds. Every mapper matches on it exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    Primitive,
    Enum,
    Array,
    Map,
    Struct,
    Class,
    Trait,
}

impl DataType {
    pub fn array(element: DataType) -> Self {
        DataType::Array(Box::new(element))
    }

    pub fn map(value: DataType) -> Self {
        DataType::Map(Box::new(value))
    }

    pub fn class(name: &str) -> Self {
        DataType::Class(name.to_string())
    }

    pub fn structure(name: &str) -> Self {
        DataType::Struct(name.to_string())
    }

    pub fn enumeration(name: &str) -> Self {
        DataType::Enum(name.to_string())
    }

    pub fn category(&self) -> TypeCategory {
        match self {
            DataType::Primitive(_) => TypeCategory::Primitive,
            DataType::Enum(_) => TypeCategory::Enum,
            DataType::Array(_) => TypeCategory::Array,
            DataType::Map(_) => TypeCategory::Map,
            DataType::Struct(_) => TypeCategory::Struct,
            DataType::Class(_) => TypeCategory::Class,
            DataType::Trait(_) => TypeCategory::Trait,
        }
    }

    /// Element type of an array, value type of a map, the type itself otherwise.
    pub fn element_type(&self) -> &DataType {
        match self {
            DataType::Array(element) | DataType::Map(element) => element,
            other => other,
        }
    }

    /// Whether values of this type are stored as separate vertices.
    pub fn is_reference(&self) -> bool {
        matches!(
            self.category(),
            TypeCategory::Struct | TypeCategory::Class | TypeCategory::Trait
        )
    }

    pub fn type_name(&self) -> String {
        match self {
            DataType::Primitive(p) => format!("{p:?}").to_lowercase(),
            DataType::Enum(name)
            | DataType::Struct(name)
            | DataType::Class(name)
            | DataType::Trait(name) => name.clone(),
            DataType::Array(element) => format!("array<{}>", element.type_name()),
            DataType::Map(value) => format!("map<string,{}>", value.type_name()),
        }
    }
}

/// Lower and upper bound on the number of values an attribute holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multiplicity {
    pub lower: u32,
    pub upper: u32,
}

impl Multiplicity {
    pub const OPTIONAL: Multiplicity = Multiplicity { lower: 0, upper: 1 };
    pub const REQUIRED: Multiplicity = Multiplicity { lower: 1, upper: 1 };
    pub const COLLECTION: Multiplicity = Multiplicity {
        lower: 1,
        upper: u32::MAX,
    };
    pub const OPTIONAL_COLLECTION: Multiplicity = Multiplicity {
        lower: 0,
        upper: u32::MAX,
    };

    pub fn new(lower: u32, upper: u32) -> Result<Self, MetaGraphError> {
        if upper == 0 || lower > upper {
            return Err(MetaGraphError::invalid_input(format!(
                "invalid multiplicity {lower}..{upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn null_allowed(&self) -> bool {
        self.lower == 0
    }

    pub fn is_many(&self) -> bool {
        self.upper > 1
    }
}

impl Default for Multiplicity {
    fn default() -> Self {
        Multiplicity::OPTIONAL
    }
}

/// Lifecycle relation between the holder of a reference and its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ownership {
    /// Composite class reference: the target is deleted with its holder.
    Owned,
    /// Plain class reference: only the connecting edge belongs to the holder.
    Shared,
    /// Struct or trait value: never shared, exactly one incoming edge.
    Inline,
}

/// Attribute as written by the type author.
#[derive(Clone, Debug)]
pub struct AttributeDef {
    pub name: String,
    pub data_type: DataType,
    pub multiplicity: Multiplicity,
    pub composite: bool,
    pub unique: bool,
    pub indexable: bool,
    pub reverse_attribute: Option<String>,
}

impl AttributeDef {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            multiplicity: Multiplicity::OPTIONAL,
            composite: false,
            unique: false,
            indexable: false,
            reverse_attribute: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.multiplicity = Multiplicity::REQUIRED;
        self
    }

    pub fn multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }

    /// Unique attributes are also indexable.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.indexable = true;
        self
    }

    pub fn indexable(mut self) -> Self {
        self.indexable = true;
        self
    }

    pub fn reverse(mut self, attribute: &str) -> Self {
        self.reverse_attribute = Some(attribute.to_string());
        self
    }
}

/// Attribute as resolved within a type hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    pub declaring_type: String,
    pub data_type: DataType,
    pub multiplicity: Multiplicity,
    /// Set for reference attributes (directly or as collection elements).
    pub ownership: Option<Ownership>,
    pub is_unique: bool,
    pub is_indexable: bool,
    pub reverse_attribute_name: Option<String>,
}

impl AttributeInfo {
    fn resolve(def: &AttributeDef, declaring_type: &str) -> Result<Self, MetaGraphError> {
        let element = def.data_type.element_type();
        if matches!(
            element.category(),
            TypeCategory::Array | TypeCategory::Map
        ) {
            return Err(MetaGraphError::unsupported(format!(
                "nested collection attribute {declaring_type}.{}",
                def.name
            )));
        }
        let ownership = match element.category() {
            TypeCategory::Struct | TypeCategory::Trait => Some(Ownership::Inline),
            TypeCategory::Class if def.composite => Some(Ownership::Owned),
            TypeCategory::Class => Some(Ownership::Shared),
            TypeCategory::Primitive
            | TypeCategory::Enum
            | TypeCategory::Array
            | TypeCategory::Map => None,
        };
        Ok(Self {
            name: def.name.clone(),
            declaring_type: declaring_type.to_string(),
            data_type: def.data_type.clone(),
            multiplicity: def.multiplicity,
            ownership,
            is_unique: def.unique,
            is_indexable: def.indexable,
            reverse_attribute_name: def.reverse_attribute.clone(),
        })
    }

    pub fn category(&self) -> TypeCategory {
        self.data_type.category()
    }

    /// `<declaringType>.<attributeName>`; the property key of this attribute.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.declaring_type, &self.name)
    }

    pub fn edge_label(&self) -> String {
        edge_label(&self.qualified_name())
    }

    pub fn is_composite(&self) -> bool {
        self.ownership == Some(Ownership::Owned)
    }
}

/// Ordered attributes of a type, supertype attributes first.
#[derive(Clone, Debug, Default)]
pub struct FieldMapping {
    fields: Vec<AttributeInfo>,
    index: AHashMap<String, usize>,
}

impl FieldMapping {
    fn push(&mut self, info: AttributeInfo) -> Result<(), MetaGraphError> {
        if self.index.contains_key(&info.name) {
            return Err(MetaGraphError::invalid_input(format!(
                "attribute {} declared twice in hierarchy of {}",
                info.name, info.declaring_type
            )));
        }
        self.index.insert(info.name.clone(), self.fields.len());
        self.fields.push(info);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeInfo> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeInfo> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn unique_attributes(&self) -> impl Iterator<Item = &AttributeInfo> {
        self.fields.iter().filter(|attr| attr.is_unique)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Struct,
    Trait,
}

#[derive(Clone, Debug)]
pub struct HierarchicalType {
    pub name: String,
    pub kind: TypeKind,
    pub super_types: Vec<String>,
    all_super_types: Vec<String>,
    field_mapping: FieldMapping,
}

impl HierarchicalType {
    pub fn field_mapping(&self) -> &FieldMapping {
        &self.field_mapping
    }

    /// Transitive supertypes, nearest first.
    pub fn all_super_type_names(&self) -> &[String] {
        &self.all_super_types
    }
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub name: String,
    values: Vec<EnumValue>,
}

impl EnumType {
    pub fn value_of(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.value == name)
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeSystem {
    types: AHashMap<String, HierarchicalType>,
    enums: AHashMap<String, EnumType>,
}

impl TypeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supertypes must already be defined; referenced attribute types may
    /// be defined later.
    pub fn define_class(
        &mut self,
        name: &str,
        super_types: &[&str],
        attributes: Vec<AttributeDef>,
    ) -> Result<(), MetaGraphError> {
        self.define(name, TypeKind::Class, super_types, attributes)
    }

    pub fn define_struct(
        &mut self,
        name: &str,
        attributes: Vec<AttributeDef>,
    ) -> Result<(), MetaGraphError> {
        self.define(name, TypeKind::Struct, &[], attributes)
    }

    pub fn define_trait(
        &mut self,
        name: &str,
        super_types: &[&str],
        attributes: Vec<AttributeDef>,
    ) -> Result<(), MetaGraphError> {
        self.define(name, TypeKind::Trait, super_types, attributes)
    }

    pub fn define_enum(&mut self, name: &str, values: &[&str]) -> Result<(), MetaGraphError> {
        self.ensure_undefined(name)?;
        let values = values
            .iter()
            .enumerate()
            .map(|(ordinal, value)| EnumValue::new(value, ordinal as i32))
            .collect();
        self.enums.insert(
            name.to_string(),
            EnumType {
                name: name.to_string(),
                values,
            },
        );
        Ok(())
    }

    pub fn hierarchical(&self, name: &str) -> Result<&HierarchicalType, MetaGraphError> {
        self.types
            .get(name)
            .ok_or_else(|| MetaGraphError::not_found(format!("type {name}")))
    }

    pub fn class(&self, name: &str) -> Result<&HierarchicalType, MetaGraphError> {
        self.of_kind(name, TypeKind::Class)
    }

    pub fn struct_type(&self, name: &str) -> Result<&HierarchicalType, MetaGraphError> {
        self.of_kind(name, TypeKind::Struct)
    }

    pub fn trait_type(&self, name: &str) -> Result<&HierarchicalType, MetaGraphError> {
        self.of_kind(name, TypeKind::Trait)
    }

    pub fn enum_type(&self, name: &str) -> Result<&EnumType, MetaGraphError> {
        self.enums
            .get(name)
            .ok_or_else(|| MetaGraphError::not_found(format!("enum type {name}")))
    }

    pub fn field_mapping(&self, name: &str) -> Result<&FieldMapping, MetaGraphError> {
        Ok(self.hierarchical(name)?.field_mapping())
    }

    /// Property keys of every attribute declared unique on a class.
    pub fn unique_property_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .types
            .values()
            .filter(|t| t.kind == TypeKind::Class)
            .flat_map(|t| t.field_mapping.unique_attributes())
            .map(AttributeInfo::qualified_name)
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        keys.sort();
        keys
    }

    fn of_kind(&self, name: &str, kind: TypeKind) -> Result<&HierarchicalType, MetaGraphError> {
        let found = self.hierarchical(name)?;
        if found.kind != kind {
            return Err(MetaGraphError::invalid_input(format!(
                "type {name} is a {:?}, expected {kind:?}",
                found.kind
            )));
        }
        Ok(found)
    }

    fn ensure_undefined(&self, name: &str) -> Result<(), MetaGraphError> {
        if name.trim().is_empty() {
            return Err(MetaGraphError::invalid_input("type name must be set"));
        }
        if name.contains('.') {
            return Err(MetaGraphError::invalid_input(format!(
                "type name {name} must not contain '.'"
            )));
        }
        if self.types.contains_key(name) || self.enums.contains_key(name) {
            return Err(MetaGraphError::already_exists(format!("type {name}")));
        }
        Ok(())
    }

    fn define(
        &mut self,
        name: &str,
        kind: TypeKind,
        super_types: &[&str],
        attributes: Vec<AttributeDef>,
    ) -> Result<(), MetaGraphError> {
        self.ensure_undefined(name)?;
        let mut field_mapping = FieldMapping::default();
        let mut all_super_types: Vec<String> = Vec::new();
        for super_name in super_types {
            let parent = self.of_kind(super_name, kind)?;
            if !all_super_types.iter().any(|s| s == super_name) {
                all_super_types.push(super_name.to_string());
            }
            for inherited in &parent.all_super_types {
                if !all_super_types.contains(inherited) {
                    all_super_types.push(inherited.clone());
                }
            }
            for info in parent.field_mapping.iter() {
                // diamond inheritance reaches the same declaration twice
                if field_mapping
                    .get(&info.name)
                    .is_some_and(|existing| existing.declaring_type == info.declaring_type)
                {
                    continue;
                }
                field_mapping.push(info.clone())?;
            }
        }
        for def in &attributes {
            if def.data_type.element_type().category() == TypeCategory::Trait {
                return Err(MetaGraphError::unsupported(format!(
                    "trait-typed attribute {name}.{}",
                    def.name
                )));
            }
            field_mapping.push(AttributeInfo::resolve(def, name)?)?;
        }
        self.types.insert(
            name.to_string(),
            HierarchicalType {
                name: name.to_string(),
                kind,
                super_types: super_types.iter().map(|s| s.to_string()).collect(),
                all_super_types,
                field_mapping,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TypeSystem {
        let mut types = TypeSystem::new();
        types
            .define_class(
                "Referenceable",
                &[],
                vec![AttributeDef::new("qualifiedName", DataType::Primitive(PrimitiveType::String)).unique()],
            )
            .expect("base");
        types
            .define_class(
                "Table",
                &["Referenceable"],
                vec![
                    AttributeDef::new("columns", DataType::array(DataType::class("Column")))
                        .composite(),
                    AttributeDef::new("db", DataType::class("Database")).required(),
                    AttributeDef::new("serde", DataType::structure("SerDe")),
                ],
            )
            .expect("table");
        types
    }

    #[test]
    fn field_mapping_keeps_declaring_type() {
        let types = catalog();
        let fields = types.field_mapping("Table").expect("fields");
        let names: Vec<_> = fields.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["qualifiedName", "columns", "db", "serde"]);
        assert_eq!(
            fields.get("qualifiedName").unwrap().qualified_name(),
            "Referenceable.qualifiedName"
        );
        assert_eq!(fields.get("columns").unwrap().edge_label(), "__Table.columns");
    }

    #[test]
    fn ownership_is_derived_from_category_and_composite_flag() {
        let types = catalog();
        let fields = types.field_mapping("Table").expect("fields");
        assert_eq!(fields.get("columns").unwrap().ownership, Some(Ownership::Owned));
        assert_eq!(fields.get("db").unwrap().ownership, Some(Ownership::Shared));
        assert_eq!(fields.get("serde").unwrap().ownership, Some(Ownership::Inline));
        assert_eq!(fields.get("qualifiedName").unwrap().ownership, None);
    }

    #[test]
    fn rejects_nested_collections_and_unknown_supertypes() {
        let mut types = catalog();
        let err = types
            .define_struct(
                "Matrix",
                vec![AttributeDef::new(
                    "rows",
                    DataType::array(DataType::array(DataType::Primitive(PrimitiveType::Int))),
                )],
            )
            .expect_err("nested");
        assert!(matches!(err, MetaGraphError::Unsupported(_)));

        let err = types
            .define_class("View", &["Missing"], vec![])
            .expect_err("unknown super");
        assert!(matches!(err, MetaGraphError::NotFound(_)));
    }

    #[test]
    fn unique_property_keys_are_deduplicated() {
        let types = catalog();
        assert_eq!(types.unique_property_keys(), vec!["Referenceable.qualifiedName"]);
    }
}
