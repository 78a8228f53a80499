use apache_avro::types::Value as AvroValue;
use apache_avro::{from_avro_datum, to_avro_datum, Schema};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};

/// Avro decoder for one schema id.
///
/// Immutable once built; shared by every subscription that references the
/// same schema id.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDecoder {
    schema_id: String,
    schema: Schema,
}

impl SchemaDecoder {
    /// Parses an Avro schema definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the definition is not a valid schema.
    pub fn parse(schema_id: &str, schema_json: &str) -> Result<Self> {
        let schema = Schema::parse_str(schema_json)
            .map_err(|e| Error::Decode(format!("invalid schema {schema_id}: {e}")))?;
        Ok(Self {
            schema_id: schema_id.to_string(),
            schema,
        })
    }

    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decodes a binary payload into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the payload does not match the schema,
    /// has trailing bytes, or is not a record.
    pub fn decode(&self, payload: &[u8]) -> Result<JsonValue> {
        let mut reader = payload;
        let value = from_avro_datum(&self.schema, &mut reader, None).map_err(|e| {
            Error::Decode(format!(
                "payload does not match schema {}: {e}",
                self.schema_id
            ))
        })?;
        if !reader.is_empty() {
            return Err(Error::Decode(format!(
                "payload has {} trailing bytes for schema {}",
                reader.len(),
                self.schema_id
            )));
        }

        match value {
            AvroValue::Record(_) => avro_to_json(value),
            _ => Err(Error::Decode(format!(
                "payload for schema {} is not a record",
                self.schema_id
            ))),
        }
    }

    /// Encodes a JSON object as a binary payload.
    ///
    /// Missing fields fall back to their schema defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body cannot be resolved against the
    /// schema.
    pub fn encode(&self, body: &JsonValue) -> Result<Vec<u8>> {
        if !body.is_object() {
            return Err(Error::Decode("event body must be a JSON object".to_string()));
        }
        let resolved = AvroValue::from(body.clone())
            .resolve(&self.schema)
            .map_err(|e| {
                Error::Decode(format!("body does not match schema {}: {e}", self.schema_id))
            })?;
        Ok(to_avro_datum(&self.schema, resolved)?)
    }
}

/// Converts a decoded Avro value to JSON.
///
/// Bytes and fixed become base64 strings, logical time types keep their
/// integer representation, unions are unwrapped.
fn avro_to_json(value: AvroValue) -> Result<JsonValue> {
    let json = match value {
        AvroValue::Null => JsonValue::Null,
        AvroValue::Boolean(b) => JsonValue::Bool(b),
        AvroValue::Int(n) | AvroValue::Date(n) | AvroValue::TimeMillis(n) => JsonValue::from(n),
        AvroValue::Long(n)
        | AvroValue::TimeMicros(n)
        | AvroValue::TimestampMillis(n)
        | AvroValue::TimestampMicros(n)
        | AvroValue::LocalTimestampMillis(n)
        | AvroValue::LocalTimestampMicros(n) => JsonValue::from(n),
        AvroValue::Float(f) => JsonValue::from(f64::from(f)),
        AvroValue::Double(f) => JsonValue::from(f),
        AvroValue::Bytes(bytes) | AvroValue::Fixed(_, bytes) => {
            JsonValue::String(BASE64.encode(bytes))
        }
        AvroValue::String(s) | AvroValue::Enum(_, s) => JsonValue::String(s),
        AvroValue::Uuid(uuid) => JsonValue::String(uuid.to_string()),
        AvroValue::Union(_, inner) => avro_to_json(*inner)?,
        AvroValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(avro_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        AvroValue::Map(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                object.insert(key, avro_to_json(value)?);
            }
            JsonValue::Object(object)
        }
        AvroValue::Record(fields) => {
            let mut object = Map::with_capacity(fields.len());
            for (name, value) in fields {
                object.insert(name, avro_to_json(value)?);
            }
            JsonValue::Object(object)
        }
        other => {
            return Err(Error::Decode(format!(
                "unsupported avro value: {other:?}"
            )))
        }
    };
    Ok(json)
}
