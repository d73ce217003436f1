//! Lecture de la table attributaire dBASE (.dbf)

use std::collections::BTreeMap;
use std::path::Path;

use shapefile::dbase::{self, FieldValue};

use crate::error::LoadError;
use crate::types::AttributeValue;

/// Table attributaire décodée
#[derive(Debug, Default)]
pub struct Table {
    /// Noms des champs dans l'ordre de déclaration
    pub fields: Vec<String>,
    /// Une map par enregistrement, dans l'ordre du fichier
    pub rows: Vec<BTreeMap<String, AttributeValue>>,
}

/// Lit la table complète
pub fn read(path: &Path) -> Result<Table, LoadError> {
    let mut reader = dbase::Reader::from_path(path).map_err(|e| LoadError::corrupt(path, e))?;

    let fields: Vec<String> = reader
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        // Champ de suppression interne à dBASE
        .filter(|name| name != "DeletionFlag")
        .collect();

    let records = reader.read().map_err(|e| LoadError::corrupt(path, e))?;

    let rows = records
        .into_iter()
        .map(|record| {
            fields
                .iter()
                .map(|name| {
                    let value = record.get(name).map_or(AttributeValue::Null, convert);
                    (name.clone(), value)
                })
                .collect()
        })
        .collect();

    Ok(Table { fields, rows })
}

/// Convertit une valeur dBASE en valeur typée
pub fn convert(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            let s = s.trim_end();
            if s.trim().is_empty() {
                AttributeValue::Null
            } else {
                AttributeValue::Text(s.to_string())
            }
        }
        FieldValue::Character(None) => AttributeValue::Null,
        FieldValue::Numeric(Some(v)) | FieldValue::Double(v) | FieldValue::Currency(v) => {
            number(*v)
        }
        FieldValue::Numeric(None) => AttributeValue::Null,
        FieldValue::Float(Some(v)) => number(f64::from(*v)),
        FieldValue::Float(None) => AttributeValue::Null,
        FieldValue::Integer(i) => AttributeValue::Integer(i64::from(*i)),
        FieldValue::Logical(Some(b)) => AttributeValue::Bool(*b),
        FieldValue::Logical(None) => AttributeValue::Null,
        FieldValue::Date(Some(d)) => {
            AttributeValue::Date(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        FieldValue::Date(None) => AttributeValue::Null,
        other => AttributeValue::Text(format!("{:?}", other)),
    }
}

fn number(v: f64) -> AttributeValue {
    if v.is_finite() {
        AttributeValue::Number(v)
    } else {
        AttributeValue::Null
    }
}
