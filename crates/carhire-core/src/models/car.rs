//! Car models as served by and submitted to the `/cars` endpoint.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::ValidationError;

/// First year a car could plausibly have been built.
const EARLIEST_MODEL_YEAR: i32 = 1886;

/// A rentable car. Server-owned and read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Car {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub fuel: String,
    // Backend serves this as a display string ("$45"), sometimes as a bare number
    #[serde(rename = "pricePerDay", deserialize_with = "deserialize_string_or_number")]
    pub price_per_day: String,
}

impl Car {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }

    pub fn price_display(&self) -> String {
        format!("{} per day", self.price_per_day)
    }
}

/// Fields submitted from the dashboard "Add New Car" form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewCar {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub fuel: String,
    #[serde(rename = "pricePerDay")]
    pub price_per_day: String,
}

impl NewCar {
    /// Check the form locally so obviously bad input never reaches the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("brand", &self.brand),
            ("model", &self.model),
            ("fuel", &self.fuel),
            ("price per day", &self.price_per_day),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Required(field));
            }
        }

        let latest = Utc::now().year() + 1;
        if !(EARLIEST_MODEL_YEAR..=latest).contains(&self.year) {
            return Err(ValidationError::YearOutOfRange {
                year: self.year,
                min: EARLIEST_MODEL_YEAR,
                max: latest,
            });
        }

        Ok(())
    }

    /// Copy with surrounding whitespace removed from text fields.
    pub fn trimmed(&self) -> Self {
        Self {
            brand: self.brand.trim().to_string(),
            model: self.model.trim().to_string(),
            year: self.year,
            fuel: self.fuel.trim().to_string(),
            price_per_day: self.price_per_day.trim().to_string(),
        }
    }
}

// Helper to deserialize string or number as String
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_car() -> NewCar {
        NewCar {
            brand: "Toyota".to_string(),
            model: "Corolla".to_string(),
            year: 2020,
            fuel: "Petrol".to_string(),
            price_per_day: "$45".to_string(),
        }
    }

    #[test]
    fn test_parse_car_with_string_fields() {
        let json = r#"{"id":"c1","brand":"Toyota","model":"Corolla","year":2020,"fuel":"Petrol","pricePerDay":"$45"}"#;
        let car: Car = serde_json::from_str(json).expect("Failed to parse car JSON");
        assert_eq!(car.id, "c1");
        assert_eq!(car.display_name(), "Toyota Corolla");
        assert_eq!(car.price_display(), "$45 per day");
    }

    #[test]
    fn test_parse_car_with_numeric_id_and_price() {
        let json = r#"{"id":7,"brand":"Tesla","model":"Model 3","year":2023,"fuel":"Electric","pricePerDay":90}"#;
        let car: Car = serde_json::from_str(json).expect("Failed to parse car JSON");
        assert_eq!(car.id, "7");
        assert_eq!(car.price_per_day, "90");
    }

    #[test]
    fn test_new_car_serializes_camel_case_price() {
        let value = serde_json::to_value(sample_car()).unwrap();
        assert_eq!(value["pricePerDay"], "$45");
        assert!(value.get("price_per_day").is_none());
    }

    #[test]
    fn test_new_car_validate() {
        assert!(sample_car().validate().is_ok());

        let mut missing_brand = sample_car();
        missing_brand.brand = "   ".to_string();
        assert_eq!(
            missing_brand.validate(),
            Err(ValidationError::Required("brand"))
        );

        let mut bad_year = sample_car();
        bad_year.year = 0;
        assert!(matches!(
            bad_year.validate(),
            Err(ValidationError::YearOutOfRange { year: 0, .. })
        ));
    }

    #[test]
    fn test_new_car_trimmed() {
        let mut car = sample_car();
        car.brand = "  Toyota ".to_string();
        assert_eq!(car.trimmed().brand, "Toyota");
    }
}
