mod conversation_handler;
mod functions;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::*;

use crate::assistant::Orchestrator;
use crate::lights::HueClient;
use crate::weather::WeatherClient;

pub use conversation_handler::{ChatGptConversation, ChatGptFunction, OpenAiApiResponse};

use self::functions::*;

const MODEL_NAME: &str = "gpt-4-0125-preview";

const SYSTEM_PROMPT: &str = "You are a home assistant called Jarvis. \
You can control the smart lights in the house and look up the weather by calling functions. \
Light and group ids are opaque, look them up by name with get_lights when the user refers to a light. \
When a function returns an error value report the failure to the user instead of retrying endlessly. \
Give short spoken-style answers that are to the point.
";

/// Tool calling chat loop over the OpenAI API
pub struct OpenAiOrchestrator {
    conversation: ChatGptConversation,
    client: Client<OpenAIConfig>,
}

impl OpenAiOrchestrator {
    pub fn new(
        openai_api_key: &str,
        hue_client: HueClient,
        weather_client: WeatherClient,
    ) -> anyhow::Result<Self> {
        let config = OpenAIConfig::new().with_api_key(openai_api_key);
        let client = Client::with_config(config);

        let mut conversation = ChatGptConversation::new(SYSTEM_PROMPT, MODEL_NAME);

        let hue_client = Arc::new(Mutex::new(hue_client));
        let weather_client = Arc::new(weather_client);

        conversation.add_function(Arc::new(GetLightsFuncCallback {
            hue_client: hue_client.clone(),
        }))?;

        conversation.add_function(Arc::new(GetLightStateFuncCallback {
            hue_client: hue_client.clone(),
        }))?;

        conversation.add_function(Arc::new(ChangeLightStateFuncCallback {
            hue_client: hue_client.clone(),
        }))?;

        conversation.add_function(Arc::new(ChangeGroupStateFuncCallback {
            hue_client: hue_client.clone(),
        }))?;

        conversation.add_function(Arc::new(GetWeatherFuncCallback { weather_client }))?;

        Ok(Self {
            conversation,
            client,
        })
    }
}

#[async_trait]
impl Orchestrator for OpenAiOrchestrator {
    /// Runs the conversation until the model produces a text answer,
    /// executing tool calls along the way
    async fn dispatch(&mut self, text: &str) -> anyhow::Result<String> {
        let mut command = Some(text);

        loop {
            let next_response = self
                .conversation
                .next_message(command.take(), &self.client)
                .await?;

            match next_response {
                OpenAiApiResponse::AssistantResponse(response) => {
                    info!("Assistant response: {:?}", response);
                    return Ok(response);
                }
                OpenAiApiResponse::FunctionCallWithNoResponse => {
                    // tool results are already in the history, ask again
                }
            }
        }
    }
}
