use std::collections::HashSet;

use crate::format::format_value;
use crate::model::{PresentedField, Record};

/// Internal identifiers and audit columns that are never shown.
const ALWAYS_REDACTED: &[&str] = &[
    "id",
    "uuid",
    "created_at",
    "updated_at",
    "deleted_at",
    "fecha_creacion",
    "fecha_actualizacion",
    "fecha_eliminacion",
    "created_by",
    "updated_by",
];

const LABELS: &[(&str, &str)] = &[
    ("numero_contrato", "Número de contrato"),
    ("numero_cuota", "N° de cuota"),
    ("nombre", "Nombre"),
    ("razon_social", "Razón social"),
    ("rut", "RUT"),
    ("email", "Correo electrónico"),
    ("telefono", "Teléfono"),
    ("direccion", "Dirección"),
    ("descripcion", "Descripción"),
    ("monto", "Monto"),
    ("monto_total", "Monto total"),
    ("monto_pagado", "Monto pagado"),
    ("saldo", "Saldo"),
    ("saldo_pendiente", "Saldo pendiente"),
    ("valor_cuota", "Valor de la cuota"),
    ("tasa_interes", "Tasa de interés"),
    ("plazo_meses", "Plazo (meses)"),
    ("fecha_inicio", "Fecha de inicio"),
    ("fecha_fin", "Fecha de término"),
    ("fecha_vencimiento", "Fecha de vencimiento"),
    ("fecha_pago", "Fecha de pago"),
    ("estado", "Estado"),
    ("activo", "Estado"),
    ("banco", "Banco"),
    ("metodo_pago", "Método de pago"),
    ("referencia", "Referencia"),
    ("observaciones", "Observaciones"),
    ("count", "Cantidad"),
    ("total", "Total"),
    ("average", "Promedio"),
];

/// Set of field names excluded from presentation.
#[derive(Debug, Clone)]
pub struct Redaction {
    fields: HashSet<String>,
}

impl Redaction {
    /// The fixed internal-identifier set plus the tenant column. Any
    /// `*_id` foreign key is redacted as well.
    pub fn standard(tenant_column: &str) -> Self {
        let mut fields: HashSet<String> = ALWAYS_REDACTED.iter().map(|f| f.to_string()).collect();
        fields.insert(tenant_column.to_ascii_lowercase());
        Self { fields }
    }

    pub fn is_redacted(&self, field: &str) -> bool {
        let field = field.to_ascii_lowercase();
        field.ends_with("_id") || self.fields.contains(&field)
    }

    /// Copy of `record` without redacted fields, raw values untouched.
    pub fn strip(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(key, _)| !self.is_redacted(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Display label for a field: dictionary first, then humanized.
pub fn label_for(field: &str) -> String {
    let lowered = field.to_ascii_lowercase();
    LABELS
        .iter()
        .find(|(key, _)| *key == lowered)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| humanize(field))
}

/// `saldo_pendiente` → `Saldo Pendiente`.
pub fn humanize(field: &str) -> String {
    field
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered `(label, value)` pairs for one record, skipping redacted and
/// empty fields.
pub fn present_record(record: &Record, redaction: &Redaction) -> Vec<PresentedField> {
    record
        .iter()
        .filter(|(key, _)| !redaction.is_redacted(key))
        .filter_map(|(key, value)| {
            format_value(key, value).map(|formatted| PresentedField {
                label: label_for(key),
                value: formatted,
                key: key.clone(),
            })
        })
        .collect()
}
