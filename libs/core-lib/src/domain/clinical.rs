use super::timestamp::{self, Timestamp};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kinds of patient record. The collection name equals the URL segment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Anamneses,
    Consultas,
    Exames,
    Medicamentos,
    Checklist,
}

impl RecordKind {
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Anamneses => "anamneses",
            RecordKind::Consultas => "consultas",
            RecordKind::Exames => "exames",
            RecordKind::Medicamentos => "medicamentos",
            RecordKind::Checklist => "checklist",
        }
    }

    /// Kinds that may point at the consultation they belong to.
    pub fn may_reference_consultation(&self) -> bool {
        !matches!(self, RecordKind::Consultas)
    }
}

impl FromStr for RecordKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anamneses" => Ok(RecordKind::Anamneses),
            "consultas" => Ok(RecordKind::Consultas),
            "exames" => Ok(RecordKind::Exames),
            "medicamentos" => Ok(RecordKind::Medicamentos),
            "checklist" => Ok(RecordKind::Checklist),
            other => Err(CoreError::NotFound(format!("record kind '{}'", other))),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClinicalRecord {
    pub id: String,
    pub negocio_id: String,
    pub paciente_id: String,
    pub kind: RecordKind,
    pub author_id: String,
    #[serde(default)]
    pub consulta_id: Option<String>,
    /// Free-form content, always a JSON object.
    pub content: Value,
    #[serde(with = "timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "timestamp")]
    pub updated_at: Timestamp,
}

impl ClinicalRecord {
    pub fn new(
        kind: RecordKind,
        negocio_id: &str,
        paciente_id: &str,
        author_id: &str,
        consulta_id: Option<String>,
        content: Value,
    ) -> Result<Self, CoreError> {
        validate_content(&content)?;
        if consulta_id.is_some() && !kind.may_reference_consultation() {
            return Err(CoreError::Validation(
                "a consultation cannot reference another consultation".into(),
            ));
        }
        let now = timestamp::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            negocio_id: negocio_id.to_string(),
            paciente_id: paciente_id.to_string(),
            kind,
            author_id: author_id.to_string(),
            consulta_id,
            content,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn replace_content(&mut self, content: Value) -> Result<(), CoreError> {
        validate_content(&content)?;
        self.content = content;
        self.updated_at = timestamp::now();
        Ok(())
    }
}

fn validate_content(content: &Value) -> Result<(), CoreError> {
    match content {
        Value::Object(map) if !map.is_empty() => Ok(()),
        Value::Object(_) => Err(CoreError::Validation("record content is empty".into())),
        _ => Err(CoreError::Validation("record content must be an object".into())),
    }
}
