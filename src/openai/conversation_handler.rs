use anyhow::Context;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use schemars::{gen::SchemaSettings, JsonSchema};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tracing::*;

fn get_schema_generator() -> schemars::gen::SchemaGenerator {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    settings.into_generator()
}

pub fn json_schema_for_func_args<T: ?Sized + JsonSchema>() -> anyhow::Result<serde_json::Value> {
    let mut schema = get_schema_generator().into_root_schema_for::<T>();
    // remove title from schema
    schema.schema.metadata().title = None;
    let schema_json = serde_json::to_value(&schema)?;
    Ok(schema_json)
}

pub enum OpenAiApiResponse {
    AssistantResponse(String),
    FunctionCallWithNoResponse,
}

/// One named tool the model can call. Handlers are looked up by name in an
/// explicit registry, never discovered by introspection.
#[async_trait]
pub trait ChatGptFunction: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    fn parameters_schema(&self) -> anyhow::Result<serde_json::Value>;

    async fn call(&self, args: &str) -> anyhow::Result<serde_json::Value>;
}

#[derive(Clone)]
pub struct ChatGptConversation {
    history: Vec<ChatCompletionRequestMessage>,
    tools: Vec<ChatCompletionTool>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    model_name: String,
    function_table: HashMap<String, Arc<dyn ChatGptFunction>>,
}

impl ChatGptConversation {
    pub fn new(system_prompt: &str, model_name: &str) -> Self {
        let history = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            // can this fail?
            .expect("Failed to build system prompt message")
            .into()];
        Self {
            history,
            tools: vec![],
            temperature: None,
            top_p: None,
            model_name: model_name.to_string(),
            function_table: HashMap::new(),
        }
    }

    pub fn add_function(&mut self, function: Arc<dyn ChatGptFunction>) -> anyhow::Result<()> {
        let new_function = FunctionObjectArgs::default()
            .name(function.name())
            .description(function.description())
            .parameters(function.parameters_schema()?)
            .build()?;

        let tool = ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(new_function)
            .build()?;

        self.tools.push(tool);
        self.function_table.insert(function.name(), function);
        Ok(())
    }

    /// Handler failures come back as an error payload for the model to
    /// report, they never abort the conversation
    async fn call_function(&self, name: &str, args: &str) -> serde_json::Value {
        info!("Calling function {:?} with args {:?}", name, args);
        let function = match self.function_table.get(name) {
            Some(function) => function,
            None => return json!({"error": format!("Function {} not found", name)}),
        };
        match function.call(args).await {
            Ok(result) => result,
            Err(error) => {
                error!("Function {} failed: {}", name, error);
                json!({"error": error.to_string()})
            }
        }
    }

    /// build request message
    fn build_request_message(&self) -> anyhow::Result<CreateChatCompletionRequest> {
        // request builder setup is a bit more complicated because of the optional parameters
        let mut request_builder = CreateChatCompletionRequestArgs::default();

        request_builder
            .model(self.model_name.clone())
            .messages(self.history.clone())
            .tools(self.tools.clone())
            .tool_choice(ChatCompletionToolChoiceOption::Auto);

        if let Some(temperature) = self.temperature {
            request_builder.temperature(temperature);
        }

        if let Some(top_p) = self.top_p {
            request_builder.top_p(top_p);
        }

        Ok(request_builder.build()?)
    }

    /// next step of the conversation
    pub async fn next_message(
        &mut self,
        message_text: Option<&str>,
        client: &Client<OpenAIConfig>,
    ) -> anyhow::Result<OpenAiApiResponse> {
        if let Some(message_text) = message_text {
            let user_message = ChatCompletionRequestUserMessageArgs::default()
                .content(message_text)
                .build()?
                .into();

            self.history.push(user_message);
        }

        let request = self.build_request_message()?;

        let response_message = client
            .chat()
            .create(request)
            .await?
            .choices
            .first()
            .context("Failed to get first choice on OpenAI api response")?
            .message
            .clone();

        // execute tool calls

        if let Some(tool_calls) = response_message.tool_calls {
            // add tool calls to history
            let tool_call_request = ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(tool_calls.clone())
                .build()?
                .into();
            self.history.push(tool_call_request);

            for tool_call in tool_calls {
                if !matches!(tool_call.r#type, ChatCompletionToolType::Function) {
                    error!("Tool call type is not function {:?}", tool_call.r#type);
                }
                let name = tool_call.function.name.clone();
                let args = tool_call.function.arguments.clone();
                let id = tool_call.id;
                let func_call_response = self.call_function(&name, &args).await;

                // add response to history
                let tool_response = ChatCompletionRequestToolMessageArgs::default()
                    .content(func_call_response.to_string())
                    .tool_call_id(id)
                    .build()
                    .context("Failed to build tool response")?
                    .into();
                self.history.push(tool_response);
            }
        }

        if let Some(content) = response_message.content {
            let added_response = ChatCompletionRequestAssistantMessageArgs::default()
                .content(&content)
                .build()?
                .into();

            self.history.push(added_response);
            return Ok(OpenAiApiResponse::AssistantResponse(content));
        }

        Ok(OpenAiApiResponse::FunctionCallWithNoResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoFunction;

    #[async_trait]
    impl ChatGptFunction for EchoFunction {
        fn name(&self) -> String {
            "echo".to_string()
        }

        fn description(&self) -> String {
            "echo the arguments back".to_string()
        }

        fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
            Ok(json!({"type": "object"}))
        }

        async fn call(&self, args: &str) -> anyhow::Result<serde_json::Value> {
            Ok(json!({ "echoed": args }))
        }
    }

    struct FailingFunction;

    #[async_trait]
    impl ChatGptFunction for FailingFunction {
        fn name(&self) -> String {
            "broken".to_string()
        }

        fn description(&self) -> String {
            "always fails".to_string()
        }

        fn parameters_schema(&self) -> anyhow::Result<serde_json::Value> {
            Ok(json!({"type": "object"}))
        }

        async fn call(&self, _args: &str) -> anyhow::Result<serde_json::Value> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn registered_function_is_called_by_name() {
        let mut conversation = ChatGptConversation::new("prompt", "model");
        conversation
            .add_function(Arc::new(EchoFunction))
            .unwrap();

        let result = conversation.call_function("echo", "{\"a\":1}").await;
        assert_eq!(result, json!({"echoed": "{\"a\":1}"}));
    }

    #[tokio::test]
    async fn unknown_function_reports_error_value() {
        let conversation = ChatGptConversation::new("prompt", "model");
        let result = conversation.call_function("nope", "{}").await;
        assert!(result["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn failing_function_reports_error_value() {
        let mut conversation = ChatGptConversation::new("prompt", "model");
        conversation
            .add_function(Arc::new(FailingFunction))
            .unwrap();

        let result = conversation.call_function("broken", "{}").await;
        assert_eq!(result, json!({"error": "boom"}));
    }
}
