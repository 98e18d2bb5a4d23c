use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::entity::Entity;
use super::record::RecordId;
use crate::registry::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinanceKind {
    Ingreso,
    Gasto,
}

impl fmt::Display for FinanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinanceKind::Ingreso => write!(f, "ingreso"),
            FinanceKind::Gasto => write!(f, "gasto"),
        }
    }
}

impl FromStr for FinanceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ingreso" => Ok(FinanceKind::Ingreso),
            "gasto" => Ok(FinanceKind::Gasto),
            _ => Err(format!(
                "Invalid finance kind '{}'. Valid options: ingreso, gasto",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinanceEntry {
    pub id: Uuid,
    #[serde(default)]
    pub proyecto_id: Option<Uuid>,
    pub concepto: String,
    pub monto: f64,
    pub tipo: FinanceKind,
    pub fecha: NaiveDate,
}

impl FinanceEntry {
    pub fn new(
        concepto: impl Into<String>,
        monto: f64,
        tipo: FinanceKind,
        fecha: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proyecto_id: None,
            concepto: concepto.into(),
            monto,
            tipo,
            fecha,
        }
    }

    pub fn for_project(mut self, proyecto_id: Uuid) -> Self {
        self.proyecto_id = Some(proyecto_id);
        self
    }

    /// Signed amount: income positive, expense negative.
    pub fn signed_amount(&self) -> f64 {
        match self.tipo {
            FinanceKind::Ingreso => self.monto,
            FinanceKind::Gasto => -self.monto,
        }
    }
}

impl Entity for FinanceEntry {
    const KIND: EntityKind = EntityKind::Finance;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}
