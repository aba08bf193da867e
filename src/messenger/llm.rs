use anyhow::{anyhow, bail, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::messenger::config::LlmConfig;

/// 文本生成服务
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 发送单轮对话请求，返回生成的文本
    async fn text_chat(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;
}

/// LLM 提供商类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Claude,
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "claude" | "anthropic" => Ok(Provider::Claude),
            _ => bail!("不支持的 LLM 提供商: {}", s),
        }
    }
}

// Claude API 请求和响应结构
#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    messages: Vec<ClaudeMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// LLM 客户端封装
pub struct LlmClient {
    provider: Provider,
    openai_client: Option<OpenAIClient<OpenAIConfig>>,
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl LlmClient {
    /// 根据配置创建 LLM 客户端
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let provider = config.provider.parse::<Provider>()?;
        if config.model.is_empty() {
            bail!("未配置 LLM 模型名称");
        }

        let openai_client = match provider {
            Provider::OpenAI => {
                let openai_config = OpenAIConfig::new()
                    .with_api_key(config.apikey.clone())
                    .with_api_base(config.url.trim_end_matches('/'));
                Some(OpenAIClient::with_config(openai_config))
            }
            Provider::Claude => None,
        };

        Ok(Self {
            provider,
            openai_client,
            http_client: reqwest::Client::new(),
            api_key: config.apikey.clone(),
            base_url: config.url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// OpenAI 兼容接口实现
    async fn text_chat_openai(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let client = self
            .openai_client
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI 客户端未初始化"))?;

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.model.as_str()).messages(messages);
        if let Some(temperature) = self.temperature {
            request.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request.max_tokens(u16::try_from(max_tokens).unwrap_or(u16::MAX));
        }

        let response = client.chat().create(request.build()?).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("OpenAI 响应中没有找到文本内容"))
    }

    /// Claude 接口实现
    async fn text_chat_claude(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));

        let request_body = ClaudeRequest {
            model: self.model.clone(),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens.unwrap_or(1000),
            temperature: self.temperature,
            system: system_prompt.map(str::to_string),
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        // 检查响应状态
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "未知错误".to_string());
            bail!("Claude API 请求失败: {} - {}", status, error_text);
        }

        let response_body: ClaudeResponse = response.json().await?;

        // 提取文本内容
        response_body
            .content
            .into_iter()
            .find(|content| content.content_type == "text")
            .map(|content| content.text)
            .ok_or_else(|| anyhow!("API 响应中没有找到文本内容"))
    }

    /// 获取当前使用的模型名称
    #[cfg(test)]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// 获取当前使用的提供商
    #[cfg(test)]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn text_chat(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        match self.provider {
            Provider::OpenAI => self.text_chat_openai(prompt, system_prompt).await,
            Provider::Claude => self.text_chat_claude(prompt, system_prompt).await,
        }
    }
}
