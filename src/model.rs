//! Data models for the QR-gated classifieds service
//!
//! This module defines the two persistent records (Code and Ad), their
//! lifecycle status enums, and the request payloads accepted by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a physical QR code
///
/// - `New` - printed, never scanned into an ad
/// - `Printed` - explicitly freed / available again
/// - `Active` - bound to an ad
///
/// `Other` is a catch-all for status values written by older or external
/// tooling; resolution surfaces the raw value instead of failing to parse
/// the record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    New,
    Printed,
    Active,
    #[serde(untagged)]
    Other(String),
}

/// Category hint printed on a batch of stickers
///
/// Drives which ad-creation form a fresh scan lands on. `Generic` stickers
/// carry no hint; the form asks the user.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CodeCategory {
    Vehicle,
    PropertySale,
    PropertyRent,
    Generic,
}

/// Represents one physical QR sticker and its binding state
///
/// Invariant: `status == Active` if and only if `bound_ad` is `Some`.
/// Both sides of the relationship are always written in the same request
/// (see the coordinator module).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Code {
    /// Unique identifier printed on the sticker (e.g. "QV-001")
    pub id: String,

    /// Optional category hint assigned at batch issuance
    pub category: Option<CodeCategory>,

    /// Lifecycle status
    pub status: CodeStatus,

    /// Id of the ad this code is bound to, if any
    pub bound_ad: Option<String>,

    /// Timestamp when this code was issued
    pub created_at: DateTime<Utc>,
}

/// Publication lifecycle of an ad
///
/// `PendingVerification` -> `Aprobado` (moderated) <-> `Draft` (paused),
/// with `Closed` and `Deleted` as terminal states.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    PendingVerification,
    Aprobado,
    Draft,
    Closed,
    /// Never assigned here: deletion removes the row outright. Kept so
    /// records soft-deleted by external tooling still deserialize and stay
    /// terminal.
    Deleted,
}

impl AdStatus {
    /// Terminal states permit no further mutation
    pub fn is_terminal(self) -> bool {
        matches!(self, AdStatus::Closed | AdStatus::Deleted)
    }
}

/// Operation type for property listings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Sale,
    Rent,
}

/// Category-specific structured attributes of an ad
///
/// A tagged union keyed by category. Every field is optional; `extra` is an
/// open residual map for attributes the current schema does not model yet.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Features {
    Vehicle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        brand: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mileage_km: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fuel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transmission: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, serde_json::Value>,
    },
    Property {
        operation: Operation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bedrooms: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bathrooms: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area_m2: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, serde_json::Value>,
    },
}

impl Features {
    /// Human-readable category label
    pub fn category_label(&self) -> &'static str {
        match self {
            Features::Vehicle { .. } => "vehiculo",
            Features::Property {
                operation: Operation::Sale,
                ..
            } => "inmueble en venta",
            Features::Property {
                operation: Operation::Rent,
                ..
            } => "inmueble en alquiler",
        }
    }

    /// Flattens the set attributes into (label, value) pairs for display
    /// and for the chat-context string
    pub fn summary(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        fn push_opt(out: &mut Vec<(String, String)>, label: &str, v: Option<String>) {
            if let Some(v) = v {
                out.push((label.to_string(), v));
            }
        }
        match self {
            Features::Vehicle {
                brand,
                model,
                year,
                mileage_km,
                fuel,
                transmission,
                extra,
            } => {
                push_opt(&mut out, "marca", brand.clone());
                push_opt(&mut out, "modelo", model.clone());
                push_opt(&mut out, "año", year.map(|y| y.to_string()));
                push_opt(&mut out, "kilometraje", mileage_km.map(|k| format!("{} km", k)));
                push_opt(&mut out, "combustible", fuel.clone());
                push_opt(&mut out, "transmisión", transmission.clone());
                for (k, v) in extra {
                    out.push((k.clone(), flatten_value(v)));
                }
            }
            Features::Property {
                operation,
                bedrooms,
                bathrooms,
                area_m2,
                location,
                extra,
            } => {
                let op = match operation {
                    Operation::Sale => "venta",
                    Operation::Rent => "alquiler",
                };
                out.push(("operación".to_string(), op.to_string()));
                push_opt(&mut out, "dormitorios", bedrooms.map(|b| b.to_string()));
                push_opt(&mut out, "baños", bathrooms.map(|b| b.to_string()));
                push_opt(&mut out, "superficie", area_m2.map(|a| format!("{} m2", a)));
                push_opt(&mut out, "ubicación", location.clone());
                for (k, v) in extra {
                    out.push((k.clone(), flatten_value(v)));
                }
            }
        }
        out
    }
}

fn flatten_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Represents one listing stored in the database
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Ad {
    /// Unique identifier (random alphanumeric slug)
    pub id: String,

    /// Identity of the owning user (opaque comparable id)
    pub owner_id: String,

    /// Listing title
    pub title: String,

    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,

    /// Category-specific structured attributes
    pub features: Features,

    /// Price in whole currency units; 0 means "price on request"
    #[serde(default)]
    pub price: u64,

    /// Public address of the main media object (mandatory)
    pub media_ref: String,

    /// Publication lifecycle status
    pub status: AdStatus,

    /// Human-readable slug used in the public detail URL, if any
    #[serde(default)]
    pub slug: Option<String>,

    /// Start of the validity window
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,

    /// End of the validity window; extended in 30-day increments
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,

    /// Timestamp when this ad was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the latest mutation
    pub updated_at: DateTime<Utc>,
}

impl Ad {
    /// Flattened textual context handed to the external text-completion
    /// service: title, price, category, description and structured features
    pub fn chat_context(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Título: {}", self.title));
        lines.push(format!("Categoría: {}", self.features.category_label()));
        if self.price == 0 {
            lines.push("Precio: a convenir".to_string());
        } else {
            lines.push(format!("Precio: {}", self.price));
        }
        if let Some(desc) = &self.description {
            lines.push(format!("Descripción: {}", desc));
        }
        for (label, value) in self.features.summary() {
            lines.push(format!("{}: {}", label, value));
        }
        lines.join("\n")
    }
}

/// Derives a URL-safe slug from a title: lowercase, ASCII alphanumerics,
/// runs of anything else collapsed to a single dash
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(ch);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Request payload for creating a new ad
///
/// # Example
/// ```json
/// {
///   "title": "Toyota Yaris 2019",
///   "price": 8500,
///   "media_ref": "https://media.example/ads/abc.jpg",
///   "features": { "category": "vehicle", "brand": "Toyota", "year": 2019 },
///   "code": "QV-001"
/// }
/// ```
#[derive(Deserialize)]
pub struct CreateAdRequest {
    /// Listing title (mandatory, validated before any write)
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Price; omitted means 0 ("price on request")
    #[serde(default)]
    pub price: Option<u64>,

    /// Address of the stored media object (mandatory)
    #[serde(default)]
    pub media_ref: Option<String>,

    /// Category-specific attributes
    pub features: Features,

    /// Custom slug; derived from the title when omitted
    #[serde(default)]
    pub slug: Option<String>,

    /// Physical code identifier to bind this ad to, if the seller scanned one
    #[serde(default)]
    pub code: Option<String>,
}

/// Request payload for updating an existing ad
///
/// Only supplied fields are replaced. Media is only replaced when a new
/// reference is supplied. Code binding is never touched by updates.
#[derive(Deserialize)]
pub struct UpdateAdRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub features: Option<Features>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Request payload for issuing a batch of codes
#[derive(Deserialize)]
pub struct IssueBatchRequest {
    /// Number of sequential identifiers to issue (1..=500)
    pub count: u32,

    /// First sequence number; defaults to the next unused one
    #[serde(default)]
    pub starting_sequence: Option<u32>,

    /// Category hint printed on this batch
    #[serde(default)]
    pub category: Option<CodeCategory>,
}

/// Request payload for the admin relink (repair) operation
#[derive(Deserialize)]
pub struct RelinkRequest {
    /// Code identifier to re-attempt binding for
    pub code: String,
}
