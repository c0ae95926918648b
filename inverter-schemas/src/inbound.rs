//! Inbound payloads: remote commands and dynamic configuration patches

use inverter_core::{Command, DynamicConfig};
use serde::{Deserialize, Serialize};

use crate::SchemaError;

#[derive(Debug, Deserialize)]
struct CommandPayload {
    command: String,
    #[serde(default)]
    parameter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandBatch {
    #[serde(default)]
    commands: Vec<CommandPayload>,
}

impl CommandPayload {
    fn decode(&self) -> Result<Command, SchemaError> {
        Ok(Command::parse(self.command.trim(), self.parameter.as_deref())?)
    }
}

/// Decode one `{"command": .., "parameter": ..}` object
pub fn decode_command(json: &str) -> Result<Command, SchemaError> {
    serde_json::from_str::<CommandPayload>(json)?.decode()
}

/// Decode a `{"commands": [..]}` poll response
///
/// A malformed envelope fails as a whole; individual commands are decoded
/// independently so one unknown name does not drop the rest.
pub fn decode_command_batch(json: &str) -> Result<Vec<Result<Command, SchemaError>>, SchemaError> {
    let batch: CommandBatch = serde_json::from_str(json)?;
    Ok(batch.commands.iter().map(CommandPayload::decode).collect())
}

/// Partial update of [`DynamicConfig`]; absent fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_capacity_wh: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar_area_m2: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_power_w: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proteccion_activa: Option<bool>,
}

impl DynamicConfigPatch {
    /// Parse a patch document; unknown keys (location and the like) are ignored
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply on top of `current`, rejecting the whole patch on any bad value
    pub fn apply(&self, current: DynamicConfig) -> Result<DynamicConfig, SchemaError> {
        let mut next = current;
        if let Some(wh) = self.battery_capacity_wh {
            next.battery_capacity_wh = positive(wh, "battery_capacity_wh")?;
        }
        if let Some(area) = self.solar_area_m2 {
            next.panel_area_m2 = positive(area, "solar_area_m2")?;
        }
        if let Some(watts) = self.wind_power_w {
            next.rated_turbine_power_w = positive(watts, "wind_power_w")?;
        }
        if let Some(enabled) = self.proteccion_activa {
            next.protection_enabled = enabled;
        }
        Ok(next)
    }
}

fn positive(value: f32, field: &'static str) -> Result<f32, SchemaError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SchemaError::InvalidValue { field, reason: "must be a positive number" })
    }
}
