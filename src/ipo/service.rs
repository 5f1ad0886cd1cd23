//! IPOサポート用の MCP ツール/リソース
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::content::{
    self, APPLICATION_PROCEDURE_UPI, BUSINESS_LOGIC, COMPLIANCE_GUARDRAILS, COMMON_QUERY_KEYS,
    POST_APPLY_PROCEDURE, USER_JOURNEY_PRE_APPLY,
};
use super::data::{IpoCatalog, IpoListing};
use crate::mcp::{Implementation, Resource, Tool, ToolError, ToolProvider};

pub const SERVER_NAME: &str = "Groww-IPO-Service";

pub const RESOURCE_COMPLIANCE: &str = "ipo://compliance/guardrails";
pub const RESOURCE_BUSINESS_RULES: &str = "ipo://logic/business_rules";
pub const RESOURCE_PRE_APPLY: &str = "ipo://procedure/pre_apply";
pub const RESOURCE_APPLICATION_UPI: &str = "ipo://procedure/application_upi";
pub const RESOURCE_POST_APPLY: &str = "ipo://procedure/post_apply";

const DEFAULT_USER_ID: &str = "u123";

#[derive(Debug, Clone, Default)]
pub struct IpoService {
    catalog: IpoCatalog,
}

#[derive(Debug, Serialize)]
struct IpoDetails<'a> {
    #[serde(rename = "IPO")]
    ipo: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "BiddingDates")]
    bidding_dates: Option<&'a str>,
    #[serde(rename = "PriceRange")]
    price_range: Option<&'a str>,
    #[serde(rename = "LotSize")]
    lot_size: Option<u32>,
    #[serde(rename = "SmeRule")]
    sme_rule: String,
    #[serde(rename = "AllotmentDate")]
    allotment_date: Option<&'a str>,
    #[serde(rename = "ListingDate")]
    listing_date: Option<&'a str>,
}

impl IpoService {
    pub fn new(catalog: IpoCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &IpoCatalog {
        &self.catalog
    }

    pub fn user_applications(&self, _user_id: &str) -> Value {
        // 利用者IDに関わらず全件を返す
        json!({ "applications": self.catalog.user_applications })
    }

    pub fn active_ipos(&self) -> Value {
        json!({ "active_ipos": self.catalog.active_ipos })
    }

    pub fn upcoming_ipos(&self) -> Value {
        json!({ "upcoming_ipos": self.catalog.upcoming_ipos })
    }

    pub fn closed_ipos(&self) -> Value {
        json!({ "closed_ipos": self.catalog.closed_ipos })
    }

    pub fn ipo_specific_details(&self, symbol: &str) -> String {
        let Some(ipo) = self.catalog.find_open_or_upcoming(symbol) else {
            return format!(
                "Error: IPO {} not found in active or upcoming list.",
                symbol
            );
        };

        let details = IpoDetails {
            ipo: &ipo.groww_short_name,
            status: &ipo.status,
            bidding_dates: ipo.bidding_dates.as_deref(),
            price_range: ipo.price_range.as_deref(),
            lot_size: ipo.lot_size,
            sme_rule: sme_rule(ipo),
            allotment_date: ipo.allotment_date.as_deref(),
            listing_date: ipo.listing_date.as_deref(),
        };
        serde_json::to_string(&details).unwrap_or_default()
    }

    pub fn common_query_answer(&self, query_key: &str) -> String {
        content::common_query_answer(query_key)
            .unwrap_or("Query not classified or answer not available.")
            .to_string()
    }

    pub fn escalate_to_agent(&self, reason: &str) -> String {
        format!(
            "ESCALATION_TRIGGERED: {}. Transferring call to Groww's Customer Support Champion.",
            reason
        )
    }
}

fn sme_rule(ipo: &IpoListing) -> String {
    if ipo.is_sme() {
        let shares = ipo
            .sme_min_shares()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "NOTE: This is an SME IPO. Minimum application is 2 lots (Shares: {}).",
            shares
        )
    } else {
        "This is a regular IPO.".to_string()
    }
}

fn no_argument_schema(tool: &str) -> Value {
    json!({
        "type": "object",
        "properties": {},
        "title": format!("{}Arguments", tool),
    })
}

fn required_string_schema(tool: &str, field: &str, title: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "title": title }
        },
        "required": [field],
        "title": format!("{}Arguments", tool),
    })
}

fn string_arg<'a>(
    tool: &str,
    arguments: &'a Map<String, Value>,
    field: &str,
) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(other) => Err(ToolError::invalid_arguments(
            tool,
            format!("`{}` must be a string, got {}", field, other),
        )),
    }
}

fn required_string_arg<'a>(
    tool: &str,
    arguments: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, ToolError> {
    string_arg(tool, arguments, field)?
        .ok_or_else(|| ToolError::invalid_arguments(tool, format!("missing required argument `{}`", field)))
}

fn to_text(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

impl ToolProvider for IpoService {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "get_user_applications".to_string(),
                description: Some(
                    "Fetches the COMPLETE list of IPO applications for the current user.\n\
                     Returns a dictionary containing a list of ALL applications found with status, amount, and dates."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": { "type": "string", "title": "User Id", "default": DEFAULT_USER_ID }
                    },
                    "title": "get_user_applicationsArguments",
                }),
            },
            Tool {
                name: "get_active_ipos".to_string(),
                description: Some(
                    "Fetches a list of ALL currently OPEN (Active) IPOs available for bidding.\n\
                     Returns a dictionary containing a list of active IPOs."
                        .to_string(),
                ),
                input_schema: no_argument_schema("get_active_ipos"),
            },
            Tool {
                name: "get_upcoming_ipos".to_string(),
                description: Some(
                    "Fetches a list of Upcoming IPOs that are not yet open for bidding.\n\
                     Returns a dictionary containing a list of upcoming IPOs."
                        .to_string(),
                ),
                input_schema: no_argument_schema("get_upcoming_ipos"),
            },
            Tool {
                name: "get_closed_ipos".to_string(),
                description: Some(
                    "Fetches a list of Closed IPOs to check past listing or allotment dates.\n\
                     Returns a dictionary containing a list of closed IPOs."
                        .to_string(),
                ),
                input_schema: no_argument_schema("get_closed_ipos"),
            },
            Tool {
                name: "get_ipo_specific_details".to_string(),
                description: Some(
                    "Fetches detailed information (lot size, price range, dates, SME status) for a specific IPO.\n\
                     Args:\n    symbol: The IPO symbol (e.g., INTERARCH)"
                        .to_string(),
                ),
                input_schema: required_string_schema("get_ipo_specific_details", "symbol", "Symbol"),
            },
            Tool {
                name: "get_common_query_answer".to_string(),
                description: Some(format!(
                    "Retrieves detailed, narrative answers for common procedural queries (e.g., cancellation, mandate approval).\n\
                     Args:\n    query_key: Key representing the query type. One of: {}.",
                    COMMON_QUERY_KEYS.join(", ")
                )),
                input_schema: required_string_schema("get_common_query_answer", "query_key", "Query Key"),
            },
            Tool {
                name: "escalate_to_agent".to_string(),
                description: Some(
                    "Triggers a handover to a human Customer Support Champion.\n\
                     Use this if the user is angry, abusive, or the query is outside IPO context."
                        .to_string(),
                ),
                input_schema: required_string_schema("escalate_to_agent", "reason", "Reason"),
            },
        ]
    }

    fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        match name {
            "get_user_applications" => {
                let user_id = string_arg(name, arguments, "user_id")?.unwrap_or(DEFAULT_USER_ID);
                Ok(to_text(&self.user_applications(user_id)))
            }
            "get_active_ipos" => Ok(to_text(&self.active_ipos())),
            "get_upcoming_ipos" => Ok(to_text(&self.upcoming_ipos())),
            "get_closed_ipos" => Ok(to_text(&self.closed_ipos())),
            "get_ipo_specific_details" => {
                let symbol = required_string_arg(name, arguments, "symbol")?;
                Ok(self.ipo_specific_details(symbol))
            }
            "get_common_query_answer" => {
                let key = required_string_arg(name, arguments, "query_key")?;
                Ok(self.common_query_answer(key))
            }
            "escalate_to_agent" => {
                let reason = required_string_arg(name, arguments, "reason")?;
                Ok(self.escalate_to_agent(reason))
            }
            _ => Err(ToolError::UnknownTool {
                name: name.to_string(),
            }),
        }
    }

    fn resources(&self) -> Vec<Resource> {
        let resource = |uri: &str, name: &str, description: &str| Resource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            mime_type: Some("text/plain".to_string()),
        };

        vec![
            resource(
                RESOURCE_COMPLIANCE,
                "get_compliance_rules",
                "Returns strict behavioral guardrails.",
            ),
            resource(
                RESOURCE_BUSINESS_RULES,
                "get_business_rules",
                "Returns core business logic.",
            ),
            resource(
                RESOURCE_PRE_APPLY,
                "get_pre_apply_journey",
                "Returns the step-by-step process for the pre-apply and general IPO journey on the app.",
            ),
            resource(
                RESOURCE_APPLICATION_UPI,
                "get_application_procedure",
                "Returns the step-by-step process for placing an IPO application using UPI.",
            ),
            resource(
                RESOURCE_POST_APPLY,
                "get_post_apply_procedure",
                "Returns the step-by-step process for mandate approval and tracking status.",
            ),
        ]
    }

    fn read_resource(&self, uri: &str) -> Option<String> {
        let text = match uri {
            RESOURCE_COMPLIANCE => COMPLIANCE_GUARDRAILS,
            RESOURCE_BUSINESS_RULES => BUSINESS_LOGIC,
            RESOURCE_PRE_APPLY => USER_JOURNEY_PRE_APPLY,
            RESOURCE_APPLICATION_UPI => APPLICATION_PROCEDURE_UPI,
            RESOURCE_POST_APPLY => POST_APPLY_PROCEDURE,
            _ => return None,
        };
        Some(text.to_string())
    }
}
