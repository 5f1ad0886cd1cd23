//! IPOカタログとそれを公開する MCP サービス
pub mod content;
mod data;
mod service;

pub use data::{IpoCatalog, IpoListing, UserApplication};
pub use service::{
    IpoService, RESOURCE_APPLICATION_UPI, RESOURCE_BUSINESS_RULES, RESOURCE_COMPLIANCE,
    RESOURCE_POST_APPLY, RESOURCE_PRE_APPLY, SERVER_NAME,
};
