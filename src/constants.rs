//! Property keys and label derivation shared with existing stores.
//!
//! These strings are an interop contract: stores written by other
//! implementations use exactly the same keys and labels.

pub const GUID_PROPERTY_KEY: &str = "__guid";
pub const VERSION_PROPERTY_KEY: &str = "__version";
pub const TYPE_NAME_PROPERTY_KEY: &str = "__typeName";
pub const STATE_PROPERTY_KEY: &str = "__state";
pub const TIMESTAMP_PROPERTY_KEY: &str = "__timestamp";
pub const MODIFICATION_TIMESTAMP_PROPERTY_KEY: &str = "__modificationTimestamp";
pub const TRAIT_NAMES_PROPERTY_KEY: &str = "__traitNames";
pub const SUPER_TYPES_PROPERTY_KEY: &str = "__superTypeNames";
pub const ENTITY_TEXT_PROPERTY_KEY: &str = "entityText";

pub const EDGE_LABEL_PREFIX: &str = "__";

/// `<declaringType>.<attributeName>`
pub fn qualified_name(declaring_type: &str, attribute: &str) -> String {
    format!("{declaring_type}.{attribute}")
}

/// Edge label for a qualified attribute (or map entry) name.
pub fn edge_label(qualified: &str) -> String {
    format!("{EDGE_LABEL_PREFIX}{qualified}")
}

/// Property key (or edge label) of one map entry.
pub fn map_key_name(base: &str, key: &str) -> String {
    format!("{base}.{key}")
}

/// Label of the ownership edge from an entity to one of its trait vertices.
pub fn trait_label(entity_type: &str, trait_name: &str) -> String {
    format!("{entity_type}.{trait_name}")
}

/// Splits a reference edge label into `(declaring type, attribute name)`.
///
/// Map entry labels carry a trailing `.key`, which is ignored. Trait labels
/// have no prefix and yield `None`.
pub fn parse_edge_label(label: &str) -> Option<(&str, &str)> {
    let qualified = label.strip_prefix(EDGE_LABEL_PREFIX)?;
    let (type_name, rest) = qualified.split_once('.')?;
    let attribute = rest.split('.').next().unwrap_or(rest);
    if type_name.is_empty() || attribute.is_empty() {
        return None;
    }
    Some((type_name, attribute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_naming_contract() {
        let qualified = qualified_name("hive_table", "columns");
        assert_eq!(qualified, "hive_table.columns");
        assert_eq!(edge_label(&qualified), "__hive_table.columns");
        assert_eq!(
            edge_label(&map_key_name(&qualified, "ds")),
            "__hive_table.columns.ds"
        );
        assert_eq!(trait_label("hive_table", "PII"), "hive_table.PII");
    }

    #[test]
    fn parse_edge_label_handles_map_entries() {
        assert_eq!(
            parse_edge_label("__hive_table.partitions.2024"),
            Some(("hive_table", "partitions"))
        );
        assert_eq!(parse_edge_label("__db.owner"), Some(("db", "owner")));
        assert_eq!(parse_edge_label("hive_table.PII"), None);
        assert_eq!(parse_edge_label("__nodot"), None);
    }
}
