use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// One freight offer as returned by the Lardi search endpoint. Only the
/// fields the notifier renders are typed; everything else in the record is
/// ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    #[serde(rename = "dateCreate")]
    pub date_create: Option<String>,
    pub from: Option<Waypoint>,
    pub to: Option<Waypoint>,
    #[serde(rename = "gruzName")]
    pub cargo_name: Option<String>,
    pub mass: Option<f64>,
    pub volume: Option<f64>,
    pub payment: Option<Payment>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub value: Option<f64>,
    #[serde(rename = "currencyName")]
    pub currency_name: Option<String>,
}

/// Search response envelope: `{"result": {"proposals": [...]}}`. Entries are
/// kept as raw JSON so that individual malformed records can be dropped
/// without failing the whole page.
#[derive(Debug, Deserialize)]
pub struct SearchEnvelope {
    pub result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub proposals: Option<Vec<serde_json::Value>>,
}

/// Per-user notification state: the watermark plus the skip-list of offer
/// ids already delivered within the current watermark window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotificationProfile {
    pub user_id: i64,
    pub notifications_enabled: bool,
    pub last_checked_at: DateTime<Utc>,
    pub delivered_ids: HashSet<i64>,
}

impl UserNotificationProfile {
    pub fn new(user_id: i64) -> Self {
        UserNotificationProfile {
            user_id,
            notifications_enabled: false,
            last_checked_at: Utc::now(),
            delivered_ids: HashSet::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid range: from {from} is greater than to {to}")]
pub struct InvalidRange {
    pub from: f64,
    pub to: f64,
}

/// Numeric range dimensions a user can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeField {
    Mass,
    Volume,
    Length,
    Width,
    Height,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectionRow {
    #[serde(rename = "countrySign")]
    pub country_sign: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectionFilter {
    #[serde(rename = "directionRows")]
    pub direction_rows: Vec<DirectionRow>,
}

impl DirectionFilter {
    pub fn country(sign: &str) -> Self {
        DirectionFilter {
            direction_rows: vec![DirectionRow {
                country_sign: Some(sign.to_string()),
            }],
        }
    }
}

/// Per-user search filter. Serialized field names are the Lardi wire
/// contract and must not be renamed; absent constraints serialize as null
/// or an empty list, exactly as the marketplace's own frontend sends them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterSpecification {
    #[serde(rename = "directionFrom")]
    pub direction_from: DirectionFilter,
    #[serde(rename = "directionTo")]
    pub direction_to: DirectionFilter,
    pub mass1: Option<f64>,
    pub mass2: Option<f64>,
    pub volume1: Option<f64>,
    pub volume2: Option<f64>,
    #[serde(rename = "dateFromISO")]
    pub date_from_iso: Option<String>,
    #[serde(rename = "dateToISO")]
    pub date_to_iso: Option<String>,
    #[serde(rename = "bodyTypeIds")]
    pub body_type_ids: Vec<i64>,
    #[serde(rename = "loadTypes")]
    pub load_types: Vec<String>,
    #[serde(rename = "paymentFormIds")]
    pub payment_form_ids: Vec<i64>,
    pub groupage: bool,
    pub photos: bool,
    #[serde(rename = "showIgnore")]
    pub show_ignore: bool,
    #[serde(rename = "onlyActual")]
    pub only_actual: bool,
    #[serde(rename = "onlyNew")]
    pub only_new: bool,
    #[serde(rename = "onlyRelevant")]
    pub only_relevant: bool,
    #[serde(rename = "onlyShippers")]
    pub only_shippers: bool,
    #[serde(rename = "onlyCarrier")]
    pub only_carrier: bool,
    #[serde(rename = "onlyExpedition")]
    pub only_expedition: bool,
    #[serde(rename = "onlyWithStavka")]
    pub only_with_stavka: bool,
    #[serde(rename = "distanceKmFrom")]
    pub distance_km_from: Option<i64>,
    #[serde(rename = "distanceKmTo")]
    pub distance_km_to: Option<i64>,
    #[serde(rename = "onlyPartners")]
    pub only_partners: bool,
    #[serde(rename = "partnerGroups")]
    pub partner_groups: Vec<i64>,
    pub cargos: Vec<String>,
    #[serde(rename = "cargoPackagingIds")]
    pub cargo_packaging_ids: Vec<i64>,
    #[serde(rename = "excludeCargos")]
    pub exclude_cargos: Vec<String>,
    #[serde(rename = "cargoBodyTypeProperties")]
    pub cargo_body_type_properties: Vec<String>,
    #[serde(rename = "paymentCurrencyId")]
    pub payment_currency_id: i64,
    #[serde(rename = "paymentValue")]
    pub payment_value: Option<f64>,
    #[serde(rename = "paymentValueType")]
    pub payment_value_type: String,
    #[serde(rename = "companyRefId")]
    pub company_ref_id: Option<String>,
    #[serde(rename = "companyName")]
    pub company_name: Option<String>,
    pub length1: Option<f64>,
    pub length2: Option<f64>,
    pub width1: Option<f64>,
    pub width2: Option<f64>,
    pub height1: Option<f64>,
    pub height2: Option<f64>,
    #[serde(rename = "includeDocuments")]
    pub include_documents: Vec<i64>,
    #[serde(rename = "excludeDocuments")]
    pub exclude_documents: Vec<i64>,
    pub adr: Option<bool>,
}

impl Default for FilterSpecification {
    fn default() -> Self {
        FilterSpecification {
            direction_from: DirectionFilter::country("UA"),
            direction_to: DirectionFilter::country("UA"),
            mass1: None,
            mass2: None,
            volume1: None,
            volume2: None,
            date_from_iso: None,
            date_to_iso: None,
            body_type_ids: Vec::new(),
            load_types: Vec::new(),
            payment_form_ids: vec![2, 10],
            groupage: false,
            photos: false,
            show_ignore: false,
            only_actual: false,
            only_new: false,
            only_relevant: false,
            only_shippers: false,
            only_carrier: false,
            only_expedition: false,
            only_with_stavka: false,
            distance_km_from: None,
            distance_km_to: None,
            only_partners: false,
            partner_groups: Vec::new(),
            cargos: Vec::new(),
            cargo_packaging_ids: Vec::new(),
            exclude_cargos: Vec::new(),
            cargo_body_type_properties: Vec::new(),
            // UAH
            payment_currency_id: 4,
            payment_value: None,
            payment_value_type: "TOTAL".into(),
            company_ref_id: None,
            company_name: None,
            length1: None,
            length2: None,
            width1: None,
            width2: None,
            height1: None,
            height2: None,
            include_documents: Vec::new(),
            exclude_documents: Vec::new(),
            adr: None,
        }
    }
}

impl FilterSpecification {
    fn range_slots(&mut self, field: RangeField) -> (&mut Option<f64>, &mut Option<f64>) {
        match field {
            RangeField::Mass => (&mut self.mass1, &mut self.mass2),
            RangeField::Volume => (&mut self.volume1, &mut self.volume2),
            RangeField::Length => (&mut self.length1, &mut self.length2),
            RangeField::Width => (&mut self.width1, &mut self.width2),
            RangeField::Height => (&mut self.height1, &mut self.height2),
        }
    }

    /// Sets both bounds of one dimension. Rejected (and the filter left
    /// untouched) when both bounds are present and from > to.
    pub fn set_range(
        &mut self,
        field: RangeField,
        from: Option<f64>,
        to: Option<f64>,
    ) -> Result<(), InvalidRange> {
        if let (Some(lo), Some(hi)) = (from, to) {
            if lo > hi {
                return Err(InvalidRange { from: lo, to: hi });
            }
        }
        let (slot_from, slot_to) = self.range_slots(field);
        *slot_from = from;
        *slot_to = to;
        Ok(())
    }

    pub fn set_distance_range(
        &mut self,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<(), InvalidRange> {
        if let (Some(lo), Some(hi)) = (from, to) {
            if lo > hi {
                return Err(InvalidRange {
                    from: lo as f64,
                    to: hi as f64,
                });
            }
        }
        self.distance_km_from = from;
        self.distance_km_to = to;
        Ok(())
    }
}
