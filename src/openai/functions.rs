use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::*;

use crate::lights::{HueClient, LightStatePatch};
use crate::weather::WeatherClient;

use super::conversation_handler::{json_schema_for_func_args, ChatGptFunction};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetLightsFuncArgs {}

pub struct GetLightsFuncCallback {
    pub hue_client: Arc<Mutex<HueClient>>,
}

#[async_trait]
impl ChatGptFunction for GetLightsFuncCallback {
    fn name(&self) -> String {
        "get_lights".to_string()
    }

    fn description(&self) -> String {
        "Get the list of lights and their current state".to_string()
    }

    fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
        json_schema_for_func_args::<GetLightsFuncArgs>()
    }

    async fn call(&self, _args: &str) -> anyhow::Result<serde_json::Value> {
        let hue_client = self.hue_client.lock().await;
        let result = serde_json::to_value(hue_client.lights())?;
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetLightStateFuncArgs {
    /// The Id of the light
    pub id: String,
}

pub struct GetLightStateFuncCallback {
    pub hue_client: Arc<Mutex<HueClient>>,
}

#[async_trait]
impl ChatGptFunction for GetLightStateFuncCallback {
    fn name(&self) -> String {
        "get_light_state".to_string()
    }

    fn description(&self) -> String {
        "Get the state of a particular light".to_string()
    }

    fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
        json_schema_for_func_args::<GetLightStateFuncArgs>()
    }

    async fn call(&self, args: &str) -> anyhow::Result<serde_json::Value> {
        let get_light_state_args: GetLightStateFuncArgs = serde_json::from_str(args)?;

        let hue_client = self.hue_client.lock().await;
        let result = serde_json::to_value(hue_client.light(&get_light_state_args.id))?;
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeLightStateFuncArgs {
    /// The Id of the light
    pub id: String,
    /// Fields to change. Unset fields keep their current value.
    pub new_light_state: LightStatePatch,
}

pub struct ChangeLightStateFuncCallback {
    pub hue_client: Arc<Mutex<HueClient>>,
}

#[async_trait]
impl ChatGptFunction for ChangeLightStateFuncCallback {
    fn name(&self) -> String {
        "change_light_state".to_string()
    }

    fn description(&self) -> String {
        "Change the on/off state, brightness or color of an individual light".to_string()
    }

    fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
        json_schema_for_func_args::<ChangeLightStateFuncArgs>()
    }

    async fn call(&self, args: &str) -> anyhow::Result<serde_json::Value> {
        let change_args: ChangeLightStateFuncArgs = serde_json::from_str(args)?;

        let mut hue_client = self.hue_client.lock().await;
        let result = match hue_client
            .change_light_state(&change_args.id, &change_args.new_light_state)
            .await
        {
            Some(Ok(light)) => serde_json::to_value(light)?,
            Some(Err(error)) => json!({"error": error.to_string()}),
            None => {
                warn!("Unknown light id {}", change_args.id);
                serde_json::Value::Null
            }
        };
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeGroupStateFuncArgs {
    /// The Id of the group
    pub id: String,
    /// Fields to change. Unset fields keep their current value.
    pub new_group_state: LightStatePatch,
}

pub struct ChangeGroupStateFuncCallback {
    pub hue_client: Arc<Mutex<HueClient>>,
}

#[async_trait]
impl ChatGptFunction for ChangeGroupStateFuncCallback {
    fn name(&self) -> String {
        "change_group_state".to_string()
    }

    fn description(&self) -> String {
        "Change the on/off state, brightness or color of a whole light group".to_string()
    }

    fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
        json_schema_for_func_args::<ChangeGroupStateFuncArgs>()
    }

    async fn call(&self, args: &str) -> anyhow::Result<serde_json::Value> {
        let change_args: ChangeGroupStateFuncArgs = serde_json::from_str(args)?;

        let mut hue_client = self.hue_client.lock().await;
        let result = match hue_client
            .change_group_state(&change_args.id, &change_args.new_group_state)
            .await
        {
            Some(Ok(group)) => serde_json::to_value(group)?,
            Some(Err(error)) => json!({"error": error.to_string()}),
            None => {
                warn!("Unknown group id {}", change_args.id);
                serde_json::Value::Null
            }
        };
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetWeatherFuncArgs {
    /// The city to get the weather data from
    pub city: String,
}

pub struct GetWeatherFuncCallback {
    pub weather_client: Arc<WeatherClient>,
}

#[async_trait]
impl ChatGptFunction for GetWeatherFuncCallback {
    fn name(&self) -> String {
        "get_weather_info".to_string()
    }

    fn description(&self) -> String {
        "Get the current weather conditions and today's low and high for a city".to_string()
    }

    fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
        json_schema_for_func_args::<GetWeatherFuncArgs>()
    }

    async fn call(&self, args: &str) -> anyhow::Result<serde_json::Value> {
        let weather_args: GetWeatherFuncArgs = serde_json::from_str(args)?;

        let weather = self
            .weather_client
            .get_weather_info(&weather_args.city)
            .await?;
        let result = serde_json::to_value(weather)?;
        Ok(result)
    }
}
