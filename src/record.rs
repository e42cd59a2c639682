//! Normalized vehicle records produced by the row mapper.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::synonyms::{CATEGORY_FIELDS, KEY_FIELD};

/// A stored attribute value: a scalar string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(value) => Some(value),
            AttributeValue::List(_) => None,
        }
    }

    /// Flattens the value for tabular output; list items are joined with `", "`.
    pub fn to_display_string(&self) -> String {
        match self {
            AttributeValue::Text(value) => value.clone(),
            AttributeValue::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Sparse mapping of canonical field to raw cell text, in profile order.
///
/// Fields whose column could not be resolved are absent, never blank, so
/// that a merge onto an existing record leaves those values alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VehicleRecord {
    fields: Vec<(String, String)>,
}

impl VehicleRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field`, replacing an earlier value for the same field.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The natural key, when present and not blank.
    pub fn vin(&self) -> Option<&str> {
        self.get(KEY_FIELD).filter(|vin| !vin.trim().is_empty())
    }

    /// Make, model, trim and year, for whichever of them the row supplied.
    pub fn categories(&self) -> BTreeMap<String, String> {
        CATEGORY_FIELDS
            .iter()
            .filter_map(|field| self.get(field).map(|value| (field.to_string(), value.to_string())))
            .collect()
    }

    /// Every mapped field outside the four categorical ones.
    pub fn attributes(&self) -> BTreeMap<String, AttributeValue> {
        self.iter()
            .filter(|(name, _)| !CATEGORY_FIELDS.contains(name))
            .map(|(name, value)| (name.to_string(), AttributeValue::from(value)))
            .collect()
    }

    /// `"<year> <make> <model> <trim>"` from the non-blank parts, falling
    /// back to the VIN.
    pub fn display_title(&self) -> String {
        let title = ["year", "make", "model", "trim"]
            .iter()
            .filter_map(|field| self.get(field))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !title.is_empty() {
            return title;
        }
        match self.vin() {
            Some(vin) => vin.trim().to_string(),
            None => "Untitled vehicle".to_string(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VehicleRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = VehicleRecord::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_joins_present_parts() {
        let record: VehicleRecord = [
            ("year", "2020"),
            ("make", "Ford"),
            ("model", " Escape "),
            ("trim", ""),
        ]
        .into_iter()
        .collect();
        assert_eq!(record.display_title(), "2020 Ford Escape");
    }

    #[test]
    fn title_falls_back_to_vin_then_placeholder() {
        let record: VehicleRecord = [("vin", "1FMCU0F70LUB12345")].into_iter().collect();
        assert_eq!(record.display_title(), "1FMCU0F70LUB12345");
        assert_eq!(VehicleRecord::new().display_title(), "Untitled vehicle");
    }

    #[test]
    fn blank_vin_is_treated_as_missing() {
        let record: VehicleRecord = [("vin", "   ")].into_iter().collect();
        assert_eq!(record.vin(), None);
    }

    #[test]
    fn categories_and_attributes_are_split() {
        let record: VehicleRecord = [
            ("vin", "V1"),
            ("make", "Kia"),
            ("year", "2019"),
            ("mileage", "1200"),
        ]
        .into_iter()
        .collect();
        let categories = record.categories();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories["make"], "Kia");
        let attributes = record.attributes();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["mileage"], AttributeValue::from("1200"));
        assert!(!attributes.contains_key("make"));
    }

    #[test]
    fn list_values_flatten_for_display() {
        let value = AttributeValue::List(vec!["a.jpg".into(), "b.jpg".into()]);
        assert_eq!(value.to_display_string(), "a.jpg, b.jpg");
        assert_eq!(value.as_text(), None);
    }
}
