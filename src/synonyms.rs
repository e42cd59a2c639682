//! Canonical vehicle fields and the header spellings dealer feeds use for them.
//!
//! The shipped table is a literal data asset: every canonical field lists
//! the raw spellings seen in vendor exports, in priority order. Lookups are
//! exact and case-sensitive. A spelling belongs to at most one field; a
//! dictionary that breaks that rule is rejected when it is built.

use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::Path,
    sync::OnceLock,
};

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

/// How the storage side interprets a field's raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Textarea,
    MultiSelect,
    Group,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Textarea => "textarea",
            FieldType::MultiSelect => "multi_select",
            FieldType::Group => "group",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

struct FieldDef {
    name: &'static str,
    field_type: FieldType,
    synonyms: &'static [&'static str],
}

const fn def(
    name: &'static str,
    field_type: FieldType,
    synonyms: &'static [&'static str],
) -> FieldDef {
    FieldDef {
        name,
        field_type,
        synonyms,
    }
}

use FieldType::{MultiSelect, Number, Text, Textarea};

const DEFAULT_FIELDS: &[FieldDef] = &[
    def(
        "vin",
        Text,
        &[
            "vin",
            "VIN",
            "VIN_No",
            "Vin",
            "Vin_No",
            "vin_no",
            "VIN No",
            "VIN Number",
            "VINNumber",
            "vin_number",
            "VehicleVIN",
            "Vehicle VIN",
            "vehicle_vin",
        ],
    ),
    def(
        "stock_number",
        Text,
        &[
            "stock_number",
            "Stock Number",
            "StockNumber",
            "Stock #",
            "Stock#",
            "Stock No",
            "Stock_No",
            "stock_no",
            "StockNo",
            "Stock",
            "stock",
            "STOCK",
            "stocknum",
        ],
    ),
    def(
        "year",
        Number,
        &[
            "year",
            "Year",
            "YEAR",
            "Model Year",
            "ModelYear",
            "model_year",
            "Yr",
            "yr",
            "Vehicle Year",
        ],
    ),
    def(
        "make",
        Text,
        &[
            "make",
            "Make",
            "MAKE",
            "Manufacturer",
            "manufacturer",
            "Brand",
            "brand",
            "make_name",
            "Make Name",
            "Vehicle Make",
        ],
    ),
    def(
        "model",
        Text,
        &[
            "model",
            "Model",
            "MODEL",
            "Model Name",
            "ModelName",
            "model_name",
            "Vehicle Model",
        ],
    ),
    def(
        "trim",
        Text,
        &[
            "trim",
            "Trim",
            "TRIM",
            "Trim Level",
            "TrimLevel",
            "trim_level",
            "Series",
            "series",
        ],
    ),
    def(
        "body_style",
        Text,
        &[
            "body_style",
            "Body Style",
            "BodyStyle",
            "Body",
            "body",
            "BODY",
            "Body Type",
            "BodyType",
            "body_type",
            "Vehicle Type",
        ],
    ),
    def(
        "condition",
        Text,
        &[
            "condition",
            "Condition",
            "New/Used",
            "NewUsed",
            "new_used",
            "Type",
            "type",
            "Inventory Type",
            "InventoryType",
            "Stock Type",
        ],
    ),
    def(
        "certified",
        Text,
        &[
            "certified",
            "Certified",
            "CPO",
            "cpo",
            "Is Certified",
            "IsCertified",
            "is_certified",
            "Certified Pre-Owned",
        ],
    ),
    def(
        "doors",
        Number,
        &["doors", "Doors", "DOORS", "Door Count", "DoorCount", "door_count", "# of Doors"],
    ),
    def(
        "exterior_color",
        Text,
        &[
            "exterior_color",
            "Exterior Color",
            "ExteriorColor",
            "Ext Color",
            "ExtColor",
            "ext_color",
            "Color",
            "color",
            "Colour",
            "Exterior Colour",
        ],
    ),
    def(
        "interior_color",
        Text,
        &[
            "interior_color",
            "Interior Color",
            "InteriorColor",
            "Int Color",
            "IntColor",
            "int_color",
            "Interior Colour",
            "Interior",
        ],
    ),
    def(
        "engine",
        Text,
        &[
            "engine",
            "Engine",
            "ENGINE",
            "Engine Description",
            "EngineDescription",
            "engine_description",
            "Motor",
        ],
    ),
    def(
        "engine_cylinders",
        Number,
        &[
            "engine_cylinders",
            "Cylinders",
            "cylinders",
            "Engine Cylinders",
            "EngineCylinders",
            "Cyl",
        ],
    ),
    def(
        "engine_displacement",
        Text,
        &[
            "engine_displacement",
            "Displacement",
            "displacement",
            "Engine Displacement",
            "EngineDisplacement",
            "Engine Size",
            "EngineSize",
        ],
    ),
    def(
        "transmission",
        Text,
        &[
            "transmission",
            "Transmission",
            "TRANSMISSION",
            "Trans",
            "trans",
            "Transmission Type",
            "TransmissionType",
            "transmission_type",
            "Gearbox",
        ],
    ),
    def(
        "drivetrain",
        Text,
        &[
            "drivetrain",
            "Drivetrain",
            "DriveTrain",
            "Drive Train",
            "drive_train",
            "Drive Type",
            "DriveType",
            "drive_type",
            "Drive",
        ],
    ),
    def(
        "fuel_type",
        Text,
        &[
            "fuel_type",
            "Fuel Type",
            "FuelType",
            "Fuel",
            "fuel",
            "FUEL",
        ],
    ),
    def(
        "city_mpg",
        Number,
        &["city_mpg", "City MPG", "CityMPG", "MPG City", "mpg_city", "CityMpg"],
    ),
    def(
        "highway_mpg",
        Number,
        &[
            "highway_mpg",
            "Highway MPG",
            "HighwayMPG",
            "Hwy MPG",
            "HwyMPG",
            "MPG Highway",
            "mpg_highway",
            "HighwayMpg",
        ],
    ),
    def(
        "mileage",
        Number,
        &[
            "mileage",
            "Mileage",
            "MILEAGE",
            "Miles",
            "miles",
            "Odometer",
            "odometer",
            "Odometer Reading",
            "Kilometers",
            "km",
        ],
    ),
    def(
        "price",
        Number,
        &[
            "price",
            "Price",
            "PRICE",
            "Selling Price",
            "SellingPrice",
            "selling_price",
            "Asking Price",
            "List Price",
            "ListPrice",
            "Retail Price",
        ],
    ),
    def(
        "msrp",
        Number,
        &["msrp", "MSRP", "Msrp", "Sticker Price", "StickerPrice", "sticker_price"],
    ),
    def(
        "sale_price",
        Number,
        &[
            "sale_price",
            "Sale Price",
            "SalePrice",
            "Special Price",
            "SpecialPrice",
            "special_price",
        ],
    ),
    def(
        "internet_price",
        Number,
        &[
            "internet_price",
            "Internet Price",
            "InternetPrice",
            "Web Price",
            "WebPrice",
            "Online Price",
        ],
    ),
    def(
        "invoice",
        Number,
        &["invoice", "Invoice", "INVOICE", "Invoice Price", "InvoicePrice", "invoice_price", "Cost"],
    ),
    def(
        "description",
        Textarea,
        &[
            "description",
            "Description",
            "DESCRIPTION",
            "Comments",
            "comments",
            "Dealer Comments",
            "DealerComments",
            "Seller Comments",
            "Notes",
            "Vehicle Description",
        ],
    ),
    def(
        "options",
        MultiSelect,
        &[
            "options",
            "Options",
            "OPTIONS",
            "Features",
            "features",
            "Equipment",
            "equipment",
            "Installed Options",
            "InstalledOptions",
            "Option List",
        ],
    ),
    def(
        "images",
        MultiSelect,
        &[
            "images",
            "Images",
            "IMAGES",
            "Image URLs",
            "ImageURLs",
            "image_urls",
            "ImageList",
            "Photos",
            "photos",
            "Photo URLs",
            "PhotoURLs",
            "Pictures",
        ],
    ),
    def(
        "video_url",
        Text,
        &["video_url", "Video URL", "VideoURL", "Video", "video", "YouTube"],
    ),
    def(
        "date_in_stock",
        Text,
        &[
            "date_in_stock",
            "Date In Stock",
            "DateInStock",
            "In Stock Date",
            "Stock Date",
            "date_added",
            "Date Added",
            "DateAdded",
            "Received Date",
        ],
    ),
    def(
        "days_in_stock",
        Number,
        &["days_in_stock", "Days In Stock", "DaysInStock", "Age", "Days On Lot"],
    ),
    def(
        "location",
        Text,
        &["location", "Location", "Lot", "lot", "Lot Location", "LotLocation"],
    ),
    def(
        "dealer_id",
        Text,
        &[
            "dealer_id",
            "Dealer ID",
            "DealerID",
            "DealerId",
            "Dealer Code",
            "DealerCode",
            "dealer_code",
            "Rooftop ID",
        ],
    ),
    def(
        "dealer_name",
        Text,
        &[
            "dealer_name",
            "Dealer Name",
            "DealerName",
            "Dealer",
            "dealer",
            "Dealership",
            "dealership",
        ],
    ),
    def(
        "dealer_address",
        Text,
        &[
            "dealer_address",
            "Dealer Address",
            "DealerAddress",
            "Address",
            "address",
            "Street",
        ],
    ),
    def(
        "dealer_city",
        Text,
        &["dealer_city", "Dealer City", "DealerCity", "City", "city"],
    ),
    def(
        "dealer_state",
        Text,
        &[
            "dealer_state",
            "Dealer State",
            "DealerState",
            "State",
            "state",
            "Province",
        ],
    ),
    def(
        "dealer_zip",
        Text,
        &[
            "dealer_zip",
            "Dealer Zip",
            "DealerZip",
            "Zip",
            "zip",
            "ZIP",
            "Zip Code",
            "ZipCode",
            "Postal Code",
            "PostalCode",
        ],
    ),
    def(
        "dealer_phone",
        Text,
        &[
            "dealer_phone",
            "Dealer Phone",
            "DealerPhone",
            "Phone",
            "phone",
            "Phone Number",
            "PhoneNumber",
        ],
    ),
];

/// Categorical attributes stored apart from the freeform attribute set.
pub const CATEGORY_FIELDS: [&str; 4] = ["make", "model", "trim", "year"];

/// Canonical field used as the natural key for upserts.
pub const KEY_FIELD: &str = "vin";

static DEFAULT_DICTIONARY: OnceLock<SynonymDictionary> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct SynonymDictionary {
    entries: Vec<FieldEntry>,
    by_field: HashMap<String, usize>,
    by_spelling: HashMap<String, usize>,
}

impl SynonymDictionary {
    /// The dictionary shipped with the crate, built once per process.
    pub fn default_dictionary() -> &'static SynonymDictionary {
        DEFAULT_DICTIONARY.get_or_init(|| {
            let entries = DEFAULT_FIELDS
                .iter()
                .map(|def| FieldEntry {
                    name: def.name.to_string(),
                    field_type: def.field_type,
                    synonyms: def.synonyms.iter().map(|s| s.to_string()).collect(),
                })
                .collect();
            SynonymDictionary::from_entries(entries)
                .expect("built-in synonym table has one field per spelling")
        })
    }

    pub fn from_entries(entries: Vec<FieldEntry>) -> Result<Self> {
        let mut by_field = HashMap::with_capacity(entries.len());
        let mut by_spelling = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(ImportError::Config {
                    message: format!("Synonym entry {} has an empty field name", idx + 1),
                });
            }
            if by_field.insert(entry.name.clone(), idx).is_some() {
                return Err(ImportError::Config {
                    message: format!("Field '{}' is declared more than once", entry.name),
                });
            }
            for spelling in &entry.synonyms {
                if let Some(&previous) = by_spelling.get(spelling.as_str()) {
                    if previous == idx {
                        continue;
                    }
                    let first: &FieldEntry = &entries[previous];
                    return Err(ImportError::AmbiguousSynonym {
                        spelling: spelling.clone(),
                        first: first.name.clone(),
                        second: entry.name.clone(),
                    });
                }
                by_spelling.insert(spelling.clone(), idx);
            }
        }
        Ok(SynonymDictionary {
            entries,
            by_field,
            by_spelling,
        })
    }

    /// Loads a replacement dictionary from a YAML list of field entries.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| ImportError::from_open(path, err))?;
        let entries: Vec<FieldEntry> = serde_yaml::from_reader(BufReader::new(file))?;
        SynonymDictionary::from_entries(entries)
    }

    pub fn canonical_for(&self, raw_header: &str) -> Option<&str> {
        self.by_spelling
            .get(raw_header)
            .map(|&idx| self.entries[idx].name.as_str())
    }

    pub fn synonyms_for(&self, field: &str) -> &[String] {
        self.entry(field)
            .map(|entry| entry.synonyms.as_slice())
            .unwrap_or(&[])
    }

    pub fn field_type(&self, field: &str) -> FieldType {
        self.entry(field)
            .map(|entry| entry.field_type)
            .unwrap_or_default()
    }

    pub fn entry(&self, field: &str) -> Option<&FieldEntry> {
        self.by_field.get(field).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
