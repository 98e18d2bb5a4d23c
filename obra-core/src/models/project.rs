use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::entity::Entity;
use super::record::RecordId;
use crate::registry::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Activo,
    Pausado,
    Terminado,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Activo => write!(f, "activo"),
            ProjectStatus::Pausado => write!(f, "pausado"),
            ProjectStatus::Terminado => write!(f, "terminado"),
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "activo" => Ok(ProjectStatus::Activo),
            "pausado" => Ok(ProjectStatus::Pausado),
            "terminado" => Ok(ProjectStatus::Terminado),
            _ => Err(format!(
                "Invalid project status '{}'. Valid options: activo, pausado, terminado",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub nombre_proyecto: String,
    #[serde(default)]
    pub cliente: Option<String>,
    #[serde(default)]
    pub presupuesto: f64,
    #[serde(default)]
    pub estado: ProjectStatus,
    #[serde(default)]
    pub fecha_inicio: Option<NaiveDate>,
    #[serde(default)]
    pub notas: Option<String>,
}

impl Project {
    pub fn new(nombre_proyecto: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            nombre_proyecto: nombre_proyecto.into(),
            cliente: None,
            presupuesto: 0.0,
            estado: ProjectStatus::default(),
            fecha_inicio: None,
            notas: None,
        }
    }

    pub fn with_cliente(mut self, cliente: impl Into<String>) -> Self {
        self.cliente = Some(cliente.into());
        self
    }

    pub fn with_presupuesto(mut self, presupuesto: f64) -> Self {
        self.presupuesto = presupuesto;
        self
    }

    pub fn with_fecha_inicio(mut self, fecha: NaiveDate) -> Self {
        self.fecha_inicio = Some(fecha);
        self
    }
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use serde_json::json;

    #[test]
    fn test_new_project_defaults() {
        let project = Project::new("Casa Norte");
        assert_eq!(project.nombre_proyecto, "Casa Norte");
        assert_eq!(project.presupuesto, 0.0);
        assert_eq!(project.estado, ProjectStatus::Activo);
    }

    #[test]
    fn test_project_status_from_str() {
        assert_eq!(
            ProjectStatus::from_str("Pausado").unwrap(),
            ProjectStatus::Pausado
        );
        assert!(ProjectStatus::from_str("borrado").is_err());
    }

    #[test]
    fn test_project_fields_exclude_id() {
        let project = Project::new("Casa").with_cliente("Ana");
        let fields = project.to_fields().unwrap();

        assert!(!fields.contains_key("id"));
        assert_eq!(fields["nombre_proyecto"], json!("Casa"));
        assert_eq!(fields["cliente"], json!("Ana"));
        assert_eq!(fields["estado"], json!("activo"));
    }

    #[test]
    fn test_project_from_record() {
        let project = Project::new("Casa").with_presupuesto(1500.0);
        let record = Record::pending(project.record_id(), project.to_fields().unwrap());

        let loaded = Project::from_record(&record).unwrap();
        assert_eq!(loaded, project);
    }

    #[test]
    fn test_project_from_sparse_record() {
        let record = Record::new(
            "0b8f8a4e-1f43-4a7c-9d55-3f8ab1b5e0c1",
            serde_json::from_value(json!({"nombre_proyecto": "Remota"})).unwrap(),
        );

        let loaded = Project::from_record(&record).unwrap();
        assert_eq!(loaded.nombre_proyecto, "Remota");
        assert_eq!(loaded.cliente, None);
        assert_eq!(loaded.estado, ProjectStatus::Activo);
    }
}
