use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Entity;
use super::record::RecordId;
use crate::registry::EntityKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderItem {
    pub id: Uuid,
    pub carpeta: String,
    pub nombre: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl FolderItem {
    pub fn new(carpeta: impl Into<String>, nombre: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            carpeta: carpeta.into(),
            nombre: nombre.into(),
            url: None,
        }
    }
}

impl Entity for FolderItem {
    const KIND: EntityKind = EntityKind::Folder;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

/// Generated or hand-written content attached to a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreativeArtifact {
    pub id: Uuid,
    #[serde(default)]
    pub proyecto_id: Option<Uuid>,
    pub tipo: String,
    pub contenido: String,
}

impl CreativeArtifact {
    pub fn new(tipo: impl Into<String>, contenido: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            proyecto_id: None,
            tipo: tipo.into(),
            contenido: contenido.into(),
        }
    }
}

impl Entity for CreativeArtifact {
    const KIND: EntityKind = EntityKind::Creative;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}
