//! Rental requests built on the client from the "Rent Car" flow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// How the renter receives the car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum RentalMode {
    Delivery,
    Pickup,
}

impl RentalMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            RentalMode::Delivery => "Delivery to Address",
            RentalMode::Pickup => "Pick Up at Rental Place",
        }
    }
}

impl fmt::Display for RentalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RentalMode::Delivery => f.write_str("delivery"),
            RentalMode::Pickup => f.write_str("pickup"),
        }
    }
}

impl FromStr for RentalMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delivery" => Ok(RentalMode::Delivery),
            "pickup" | "pick-up" => Ok(RentalMode::Pickup),
            other => Err(ValidationError::UnknownRentalMode(other.to_string())),
        }
    }
}

/// A validated rental request.
///
/// Fields are private so that `address` is `Some` exactly when the mode is
/// [`RentalMode::Delivery`]. Never persisted on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentalRequest {
    #[serde(rename = "carId")]
    car_id: String,
    mode: RentalMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

impl RentalRequest {
    /// Build a request from raw form input.
    ///
    /// Delivery requires a non-blank address. For pickup any address the form
    /// still holds is discarded.
    pub fn new(
        car_id: impl Into<String>,
        mode: RentalMode,
        address: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let car_id = car_id.into();
        if car_id.trim().is_empty() {
            return Err(ValidationError::Required("car"));
        }

        let address = match mode {
            RentalMode::Delivery => {
                let address = address.map(str::trim).unwrap_or_default();
                if address.is_empty() {
                    return Err(ValidationError::Required("delivery address"));
                }
                Some(address.to_string())
            }
            RentalMode::Pickup => None,
        };

        Ok(Self {
            car_id,
            mode,
            address,
        })
    }

    pub fn car_id(&self) -> &str {
        &self.car_id
    }

    pub fn mode(&self) -> RentalMode {
        self.mode
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}
