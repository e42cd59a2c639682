//! Raw row → [`VehicleRecord`].

use log::trace;

use crate::{
    profile::{ColumnResolution, MappingProfile},
    record::VehicleRecord,
};

/// Maps data rows of one file through one profile.
///
/// Column positions are resolved once at construction; mapping a row is a
/// plain index lookup per resolved field.
#[derive(Debug, Clone)]
pub struct RowMapper {
    resolution: ColumnResolution,
    width: usize,
}

impl RowMapper {
    pub fn new(profile: &MappingProfile, headers: &[String]) -> Self {
        RowMapper {
            resolution: profile.resolve_columns(headers),
            width: headers.len(),
        }
    }

    pub fn resolution(&self) -> &ColumnResolution {
        &self.resolution
    }

    pub fn unresolved(&self) -> &[String] {
        &self.resolution.unresolved
    }

    /// Every resolved field is set, using `""` when the row is too short.
    /// Unresolved fields are left out.
    pub fn map_row(&self, row: &[String]) -> VehicleRecord {
        if row.len() < self.width {
            trace!(
                "Row has {} of {} cell(s); missing cells map to empty values",
                row.len(),
                self.width
            );
        }
        let mut record = VehicleRecord::new();
        for (field, idx) in &self.resolution.resolved {
            let value = row.get(*idx).map(String::as_str).unwrap_or("");
            record.insert(field.as_str(), value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        profile::{FieldAssignment, FieldMapping},
        synonyms::SynonymDictionary,
    };

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn maps_scenario_row() {
        let profile = MappingProfile::synthesize(SynonymDictionary::default_dictionary());
        let headers = strings(&["Year", "Make", "Model", "VIN"]);
        let mapper = RowMapper::new(&profile, &headers);
        let record = mapper.map_row(&strings(&["2020", "Ford", "Escape", "1FMCU0F70LUB12345"]));
        assert_eq!(record.get("year"), Some("2020"));
        assert_eq!(record.get("make"), Some("Ford"));
        assert_eq!(record.get("model"), Some("Escape"));
        assert_eq!(record.get("vin"), Some("1FMCU0F70LUB12345"));
        assert_eq!(record.len(), 4);
        assert!(!record.contains("mileage"));
    }

    #[test]
    fn short_rows_yield_empty_values() {
        let profile = MappingProfile::synthesize(SynonymDictionary::default_dictionary());
        let headers = strings(&["VIN", "Make", "Mileage"]);
        let mapper = RowMapper::new(&profile, &headers);
        let record = mapper.map_row(&strings(&["V1"]));
        assert_eq!(record.get("vin"), Some("V1"));
        assert_eq!(record.get("make"), Some(""));
        assert_eq!(record.get("mileage"), Some(""));
    }

    #[test]
    fn values_are_not_coerced() {
        let profile = MappingProfile::synthesize(SynonymDictionary::default_dictionary());
        let headers = strings(&["Price", "Miles"]);
        let mapper = RowMapper::new(&profile, &headers);
        let record = mapper.map_row(&strings(&["$21,995.00", " 012,300 "]));
        assert_eq!(record.get("price"), Some("$21,995.00"));
        assert_eq!(record.get("mileage"), Some(" 012,300 "));
    }

    #[test]
    fn record_follows_profile_order() {
        let profile = MappingProfile {
            id: "p".into(),
            name: None,
            fingerprint: None,
            fields: vec![
                FieldMapping {
                    field: "model".into(),
                    source: FieldAssignment::Column("B".into()),
                },
                FieldMapping {
                    field: "make".into(),
                    source: FieldAssignment::Column("A".into()),
                },
                FieldMapping {
                    field: "trim".into(),
                    source: FieldAssignment::Column("Z".into()),
                },
            ],
        };
        let mapper = RowMapper::new(&profile, &strings(&["A", "B"]));
        let record = mapper.map_row(&strings(&["Kia", "Soul"]));
        let fields: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(fields, vec!["model", "make"]);
        assert_eq!(mapper.unresolved(), &["trim".to_string()]);
    }
}
