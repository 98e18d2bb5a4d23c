use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Entity;
use super::record::RecordId;
use crate::registry::EntityKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub proyecto_id: Uuid,
    pub titulo: String,
    #[serde(default)]
    pub completada: bool,
    #[serde(default)]
    pub fecha_limite: Option<NaiveDate>,
}

impl Task {
    pub fn new(proyecto_id: Uuid, titulo: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            proyecto_id,
            titulo: titulo.into(),
            completada: false,
            fecha_limite: None,
        }
    }

    pub fn with_fecha_limite(mut self, fecha: NaiveDate) -> Self {
        self.fecha_limite = Some(fecha);
        self
    }
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}
