//! エージェント構成
//!
//! MCPセッションからツール宣言とコンテキスト用リソースを取得し、
//! Live API に渡すシステムプロンプトと関数宣言を組み立てます。
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::ipo::{
    RESOURCE_APPLICATION_UPI, RESOURCE_BUSINESS_RULES, RESOURCE_COMPLIANCE, RESOURCE_POST_APPLY,
    RESOURCE_PRE_APPLY,
};
use crate::mcp::{McpClient, McpError, Tool};

pub const FALLBACK_CONTEXT: &str = "Follow standard IPO guidelines.";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub model: String,
    pub voice_name: String,
    pub instruction: String,
}

/// Live API の関数宣言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
}

impl FunctionDeclaration {
    /// MCPツール定義から変換（`type` が無いスキーマは object とみなす）
    pub fn from_tool(tool: &Tool) -> Self {
        let mut parameters = tool.input_schema.clone();
        if let Value::Object(schema) = &mut parameters {
            schema
                .entry("type")
                .or_insert_with(|| Value::String("object".to_string()));
        } else {
            parameters = serde_json::json!({ "type": "object" });
        }

        Self {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            parameters,
        }
    }
}

/// MCPセッションを初期化し、エージェント構成と関数宣言を返す
pub async fn build_agent(
    mcp: &McpClient,
    config: &AgentConfig,
) -> Result<(AgentProfile, Vec<FunctionDeclaration>), McpError> {
    info!("initializing MCP session");
    mcp.initialize().await?;

    info!("listing MCP tools");
    let tools = mcp.list_tools().await?;
    let declarations = tools
        .iter()
        .map(FunctionDeclaration::from_tool)
        .collect::<Vec<_>>();

    info!("reading MCP resources");
    let context = match load_context(mcp).await {
        Ok(context) => context,
        Err(e) => {
            warn!(error = %e, "resources unavailable, using fallback context");
            FALLBACK_CONTEXT.to_string()
        }
    };

    let profile = AgentProfile {
        name: config.name.clone(),
        model: config.model.clone(),
        voice_name: config.voice_name.clone(),
        instruction: render_system_prompt(&context),
    };

    info!(
        agent = %profile.name,
        model = %profile.model,
        tools = declarations.len(),
        "agent ready"
    );
    Ok((profile, declarations))
}

async fn load_context(mcp: &McpClient) -> Result<String, McpError> {
    let mut texts = Vec::with_capacity(5);
    for uri in [
        RESOURCE_COMPLIANCE,
        RESOURCE_BUSINESS_RULES,
        RESOURCE_PRE_APPLY,
        RESOURCE_APPLICATION_UPI,
        RESOURCE_POST_APPLY,
    ] {
        let result = mcp.read_resource(uri).await?;
        let text = result.first_text().ok_or_else(|| McpError::Rpc {
            code: crate::mcp::protocol::RESOURCE_NOT_FOUND,
            message: format!("resource has no text content: {}", uri),
        })?;
        texts.push(text.to_string());
    }

    Ok(assemble_context(
        &texts[0], &texts[1], &texts[2], &texts[3], &texts[4],
    ))
}

pub fn assemble_context(
    compliance: &str,
    business_rules: &str,
    pre_apply: &str,
    application_upi: &str,
    post_apply: &str,
) -> String {
    format!(
        "--- COMPLIANCE ---\n{}\n--- PROCEDURES ---\n{}\n{}\n{}\n{}",
        compliance, business_rules, pre_apply, application_upi, post_apply
    )
}

pub fn render_system_prompt(context: &str) -> String {
    format!(
        r#"
IMPORTANT: Use clear Indian English (en-IN) to start with.
You are the official Groww IPO Voice Assistant. Use clear Indian English (en-IN) and you should sound as human as possible to the extent that no one should be able to figure out that you are an AI bot.
Your persona must be calm, polite, empathetic, not too formal and non-argumentative at all times.

CORE CONTEXT & RULES:
{context}

GUIDELINES:
1. DATA SOURCE TRUTH: You must ONLY use the data provided via the Tools. Do NOT hallucinate.
2. TOOL USAGE: Call tools like `get_user_applications` without arguments unless specific filters are requested.
3. LIST HANDLING: If a tool returns multiple items, speak details of EVERY SINGLE ITEM.
4. RESPONSE STYLE: Keep general conversational responses concise. When fetching data, always inform the customer to wait while you are processing.
5. HINDI GRAMMAR: When speaking in English, use clear Indian English (en-IN). When speaking in Hindi, you MUST strictly use correct grammatical forms.
6. ESCALATION: Use the 'escalate_to_agent' tool if necessary.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_without_type_becomes_object() {
        let tool = Tool {
            name: "t".to_string(),
            description: None,
            input_schema: json!({"properties": {"a": {"type": "string"}}}),
        };
        let decl = FunctionDeclaration::from_tool(&tool);
        assert_eq!(decl.parameters["type"], "object");
        assert_eq!(decl.parameters["properties"]["a"]["type"], "string");
        assert_eq!(decl.description, "");
    }

    #[test]
    fn test_existing_type_is_kept() {
        let tool = Tool {
            name: "t".to_string(),
            description: Some("d".to_string()),
            input_schema: json!({"type": "object", "required": ["x"]}),
        };
        let decl = FunctionDeclaration::from_tool(&tool);
        assert_eq!(decl.parameters, json!({"type": "object", "required": ["x"]}));
    }

    #[test]
    fn test_context_layout() {
        let context = assemble_context("c", "l", "p", "u", "a");
        assert_eq!(context, "--- COMPLIANCE ---\nc\n--- PROCEDURES ---\nl\np\nu\na");
    }

    #[test]
    fn test_prompt_embeds_context() {
        let prompt = render_system_prompt(FALLBACK_CONTEXT);
        assert!(prompt.contains("CORE CONTEXT & RULES:\nFollow standard IPO guidelines."));
        assert!(prompt.contains("escalate_to_agent"));
    }
}
