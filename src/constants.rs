/// Column and code constants shared by the cleaning pipeline, loader and reports.

// Raw column names (after trim + lowercase)
pub const RAW_PRICE_PAID: &str = "price_paid";
pub const RAW_DEED_DATE: &str = "deed_date";
pub const RAW_POSTCODE: &str = "postcode";

// Canonical column names
pub const PRICE: &str = "price";
pub const DATE: &str = "date";
pub const POSTCODE: &str = "postcode";
pub const PROPERTY_TYPE: &str = "property_type";
pub const NEW_BUILD: &str = "new_build";
pub const ESTATE_TYPE: &str = "estate_type";
pub const SAON: &str = "saon";
pub const PAON: &str = "paon";
pub const STREET: &str = "street";
pub const ADDRESS: &str = "address";
pub const BOROUGH: &str = "borough";
pub const TRANSACTION_CATEGORY: &str = "transaction_category";

/// Raw columns whose absence makes a row unusable.
pub const MANDATORY_RAW_COLUMNS: [&str; 3] = [RAW_PRICE_PAID, RAW_DEED_DATE, RAW_POSTCODE];

/// Expected raw column → canonical column, in output order.
pub const KEEP_AND_RENAME: [(&str, &str); 11] = [
    (RAW_PRICE_PAID, PRICE),
    (RAW_DEED_DATE, DATE),
    ("postcode", POSTCODE),
    ("property_type", PROPERTY_TYPE),
    ("new_build", NEW_BUILD),
    ("estate_type", ESTATE_TYPE),
    ("saon", SAON),
    ("paon", PAON),
    ("street", STREET),
    ("borough", BOROUGH),
    ("transaction_category", TRANSACTION_CATEGORY),
];

/// Address fragments in composition order.
pub const ADDRESS_PARTS: [&str; 3] = [SAON, PAON, STREET];

pub const OTHER_PROPERTY_TYPE: &str = "Other";
pub const NON_STANDARD_TRANSACTION: &str = "B";

pub const DEFAULT_TABLE: &str = "clean_house_prices";
pub const VIEW_AVG_PRICE_OUTCODE: &str = "v_avg_price_outcode";
pub const VIEW_FLIPS_24M: &str = "v_flips_24m";

/// Human-readable label for a property type code. Unknown codes pass through.
pub fn property_type_label(code: &str) -> Option<&'static str> {
    match code {
        "F" => Some("Flat"),
        "S" => Some("Semi-detached"),
        "D" => Some("Detached"),
        "T" => Some("Terraced"),
        "O" => Some(OTHER_PROPERTY_TYPE),
        _ => None,
    }
}

/// Human-readable label for an estate type code. Unknown codes pass through.
pub fn estate_type_label(code: &str) -> Option<&'static str> {
    match code {
        "L" => Some("Leasehold"),
        "F" => Some("Freehold"),
        _ => None,
    }
}

/// Default borough → raw extract file mapping.
pub fn default_borough_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Brent", "unclean_brent.csv"),
        ("Greenwich", "unclean_greenwich.csv"),
        ("Hackney", "unclean_hackney.csv"),
        ("Wandsworth", "unclean_wandsworth.csv"),
        ("Westminster", "unclean_westminster.csv"),
    ]
}
