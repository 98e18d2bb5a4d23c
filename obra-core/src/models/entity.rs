use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::record::{fields_from_value, Fields, Record, RecordError, RecordId, ID_FIELD};
use crate::registry::EntityKind;

/// A typed view over the records of one table.
///
/// Entities serialize to a flat JSON object whose `id` key becomes the
/// record id; everything else becomes the record payload.
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn record_id(&self) -> RecordId;

    fn to_fields(&self) -> Result<Fields, RecordError> {
        let mut fields = fields_from_value(serde_json::to_value(self)?)?;
        fields.remove(ID_FIELD);
        Ok(fields)
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        let mut fields = record.fields.clone();
        fields.insert(
            ID_FIELD.to_string(),
            record.id.to_value(Self::KIND.key_kind())?,
        );
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}
