//! Tool adapter: validation → forecast → response envelope.
//!
//! No retries happen here, and nothing below is re-classified: the envelope
//! reflects whichever layer first produced the [`Error`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn};

use crate::{
    config::DEFAULT_TIMEZONE,
    error::{Error, ResultExt, UpstreamDetails},
    model::WeatherRequest,
    provider::ForecastProvider,
    telemetry::timed,
};

pub const TOOL_NAME: &str = "get_today_weather";
pub const TOOL_DESCRIPTION: &str =
    "Get today's weather for coordinates + timezone (IANA). Returns JSON.";

const MSG_BAD_ARGUMENTS: &str =
    "latitude and longitude are required numbers; timezone must be a string";
const MSG_UNKNOWN_TOOL: &str = "unknown tool";
const MSG_INTERNAL: &str = "Internal error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// Response envelope handed back to the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
}

#[derive(Debug, Serialize)]
struct ToolErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<UpstreamDetails>,
}

impl CallToolResult {
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_string(data) {
            Ok(text) => Self::text(text, false),
            Err(error) => {
                warn!(%error, "failed to serialize tool result");
                Self::internal_error()
            }
        }
    }

    pub fn tool_error(err: &Error) -> Self {
        let body = ToolErrorBody {
            code: err.code(),
            message: err.message(),
            details: err.details(),
        };
        match serde_json::to_string(&body) {
            Ok(text) => Self::text(text, true),
            Err(error) => {
                warn!(%error, "failed to serialize tool error, dropping details");
                let text = json!({ "code": err.code(), "message": err.message() }).to_string();
                Self::text(text, true)
            }
        }
    }

    /// Generic, detail-free failure for the host boundary to use when an
    /// invocation dies without producing an envelope.
    pub fn internal_error() -> Self {
        Self::tool_error(&Error::unexpected(MSG_INTERNAL))
    }

    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ContentBlock::Text { text }],
            is_error,
        }
    }

    /// Body of the first text block.
    pub fn body(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
        })
    }
}

/// Name, description and JSON Schema advertised to the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Inbound arguments as sent by the agent runtime.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TodayWeatherParams {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug)]
pub struct WeatherTools<P> {
    provider: P,
    default_timezone: String,
}

impl<P: ForecastProvider> WeatherTools<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            default_timezone: DEFAULT_TIMEZONE.to_owned(),
        }
    }

    pub fn with_default_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.default_timezone = timezone.into();
        self
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: TOOL_NAME,
            description: TOOL_DESCRIPTION,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "latitude": { "type": "number", "description": "Latitude, -90..90" },
                    "longitude": { "type": "number", "description": "Longitude, -180..180" },
                    "timezone": {
                        "type": "string",
                        "description": "IANA timezone, e.g. Europe/Kyiv",
                        "default": self.default_timezone,
                    },
                },
                "required": ["latitude", "longitude"],
            }),
        }
    }

    /// Dispatch a named call with raw JSON arguments.
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> CallToolResult {
        if name != TOOL_NAME {
            warn!(tool = name, "call for unknown tool");
            return CallToolResult::tool_error(&Error::invalid_params(MSG_UNKNOWN_TOOL));
        }

        match serde_json::from_value::<TodayWeatherParams>(arguments) {
            Ok(params) => {
                self.get_today_weather(
                    params.latitude,
                    params.longitude,
                    params.timezone.as_deref(),
                    cancel,
                )
                .await
            }
            Err(error) => {
                warn!(%error, "tool arguments did not decode");
                CallToolResult::tool_error(&Error::invalid_params(MSG_BAD_ARGUMENTS))
            }
        }
    }

    /// Validate, fetch and wrap today's forecast. A `None` timezone falls
    /// back to the configured default.
    pub async fn get_today_weather(
        &self,
        latitude: f64,
        longitude: f64,
        timezone: Option<&str>,
        cancel: &CancellationToken,
    ) -> CallToolResult {
        let timezone = timezone.unwrap_or(&self.default_timezone);
        let span = info_span!(
            "mcp_tool",
            tool = TOOL_NAME,
            latitude,
            longitude,
            timezone
        );

        timed("mcp_tool", span, self.invoke(latitude, longitude, timezone, cancel)).await
    }

    async fn invoke(
        &self,
        latitude: f64,
        longitude: f64,
        timezone: &str,
        cancel: &CancellationToken,
    ) -> CallToolResult {
        let request = match WeatherRequest::create(latitude, longitude, timezone) {
            Ok(request) => request,
            Err(err) => {
                warn!(code = err.code(), reason = err.message(), "rejected tool input");
                return CallToolResult::tool_error(&err);
            }
        };

        self.provider.get_today(&request, cancel).await.fold(
            |today| CallToolResult::ok(&today),
            |err| {
                warn!(code = err.code(), reason = err.message(), "tool call failed");
                CallToolResult::tool_error(&err)
            },
        )
    }
}
