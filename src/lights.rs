use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::*;

use crate::app_config::HueConfig;

/// CIE xy chromaticity as used by the Hue CLIP v2 API
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct XyColor {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LightModel {
    pub id: String,
    pub name: String,
    pub is_on: bool,
    pub brightness: f64,
    pub color: XyColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupModel {
    pub id: String,
    pub name: String,
    pub is_on: bool,
    pub brightness: f64,
    pub color: XyColor,
}

/// Partial update. Unset fields keep the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LightStatePatch {
    pub is_on: Option<bool>,
    pub brightness: Option<f64>,
    pub color: Option<XyColor>,
}

impl LightModel {
    pub fn apply_patch(&mut self, patch: &LightStatePatch) {
        if let Some(is_on) = patch.is_on {
            self.is_on = is_on;
        }
        if let Some(brightness) = patch.brightness {
            self.brightness = brightness;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
    }
}

impl GroupModel {
    pub fn apply_patch(&mut self, patch: &LightStatePatch) {
        if let Some(is_on) = patch.is_on {
            self.is_on = is_on;
        }
        if let Some(brightness) = patch.brightness {
            self.brightness = brightness;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
    }
}

fn state_payload(is_on: bool, brightness: f64, color: XyColor) -> serde_json::Value {
    json!({
        "on": {"on": is_on},
        "dimming": {"brightness": brightness},
        "color": {"xy": {"x": color.x, "y": color.y}}
    })
}

/// Philips Hue bridge client holding the cached light and group records
pub struct HueClient {
    http_client: reqwest::Client,
    base_url: String,
    app_key: String,
    lights: Vec<LightModel>,
    groups: Vec<GroupModel>,
}

impl HueClient {
    pub fn new(config: &HueConfig) -> anyhow::Result<Self> {
        // the bridge serves a self signed certificate
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            http_client,
            base_url: format!("https://{}/clip/v2/resource", config.bridge_ip),
            app_key: config.app_key.clone(),
            lights: config.lights.clone(),
            groups: config.groups.clone(),
        })
    }

    pub fn lights(&self) -> &[LightModel] {
        &self.lights
    }

    pub fn light(&self, id: &str) -> Option<&LightModel> {
        self.lights.iter().find(|light| light.id == id)
    }

    /// Applies the patch to the cached light record and pushes it to the
    /// bridge. Returns `None` for an unknown id. HTTP failures come back as
    /// an error value; the cached record is only committed on success.
    pub async fn change_light_state(
        &mut self,
        id: &str,
        patch: &LightStatePatch,
    ) -> Option<Result<LightModel, reqwest::Error>> {
        let light = self.lights.iter_mut().find(|light| light.id == id)?;
        let mut updated = light.clone();
        updated.apply_patch(patch);

        let url = format!("{}/light/{}", self.base_url, updated.id);
        let payload = state_payload(updated.is_on, updated.brightness, updated.color);
        let result = self
            .http_client
            .put(url)
            .header("hue-application-key", &self.app_key)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        Some(match result {
            Ok(_) => {
                *light = updated.clone();
                Ok(updated)
            }
            Err(error) => {
                warn!("Hue light update failed: {}", error);
                Err(error)
            }
        })
    }

    pub async fn change_group_state(
        &mut self,
        id: &str,
        patch: &LightStatePatch,
    ) -> Option<Result<GroupModel, reqwest::Error>> {
        let group = self.groups.iter_mut().find(|group| group.id == id)?;
        let mut updated = group.clone();
        updated.apply_patch(patch);

        let url = format!("{}/grouped_light/{}", self.base_url, updated.id);
        let payload = state_payload(updated.is_on, updated.brightness, updated.color);
        let result = self
            .http_client
            .put(url)
            .header("hue-application-key", &self.app_key)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        Some(match result {
            Ok(_) => {
                *group = updated.clone();
                Ok(updated)
            }
            Err(error) => {
                warn!("Hue group update failed: {}", error);
                Err(error)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> LightModel {
        LightModel {
            id: "a60e6289".to_owned(),
            name: "bedroom-light-1".to_owned(),
            is_on: true,
            brightness: 100.0,
            color: XyColor {
                x: 0.3865,
                y: 0.3784,
            },
        }
    }

    #[test]
    fn empty_patch_keeps_current_values() {
        let mut current = light();
        current.apply_patch(&LightStatePatch::default());
        assert_eq!(current, light());
    }

    #[test]
    fn patch_replaces_only_set_fields() {
        let mut current = light();
        let patch = LightStatePatch {
            is_on: Some(false),
            brightness: Some(40.0),
            color: None,
        };
        current.apply_patch(&patch);
        assert!(!current.is_on);
        assert_eq!(current.brightness, 40.0);
        assert_eq!(current.color, light().color);
        assert_eq!(current.name, light().name);
    }

    #[test]
    fn bridge_payload_shape() {
        let payload = state_payload(true, 72.5, XyColor { x: 0.2, y: 0.3 });
        assert_eq!(
            payload,
            serde_json::json!({
                "on": {"on": true},
                "dimming": {"brightness": 72.5},
                "color": {"xy": {"x": 0.2, "y": 0.3}}
            })
        );
    }

    #[test]
    fn patch_deserializes_with_missing_fields() {
        let patch: LightStatePatch = serde_json::from_str(r#"{"is_on": false}"#).unwrap();
        assert_eq!(patch.is_on, Some(false));
        assert!(patch.brightness.is_none());
        assert!(patch.color.is_none());
    }
}
