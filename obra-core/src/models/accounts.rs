use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Entity;
use super::record::RecordId;
use crate::registry::EntityKind;

/// Money owed to a counterparty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payable {
    pub id: Uuid,
    pub contraparte: String,
    pub monto: f64,
    #[serde(default)]
    pub vencimiento: Option<NaiveDate>,
    #[serde(default)]
    pub pagada: bool,
}

impl Payable {
    pub fn new(contraparte: impl Into<String>, monto: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            contraparte: contraparte.into(),
            monto,
            vencimiento: None,
            pagada: false,
        }
    }
}

impl Entity for Payable {
    const KIND: EntityKind = EntityKind::Payable;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

/// Money owed by a counterparty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receivable {
    pub id: Uuid,
    pub contraparte: String,
    pub monto: f64,
    #[serde(default)]
    pub vencimiento: Option<NaiveDate>,
    #[serde(default)]
    pub pagada: bool,
}

impl Receivable {
    pub fn new(contraparte: impl Into<String>, monto: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            contraparte: contraparte.into(),
            monto,
            vencimiento: None,
            pagada: false,
        }
    }
}

impl Entity for Receivable {
    const KIND: EntityKind = EntityKind::Receivable;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}
