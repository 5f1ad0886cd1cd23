//! IPOカタログ（モック）
//!
//! 利用者の申込状況と、募集中/募集前/募集終了のIPO一覧を保持します。
//! JSONへは camelCase で出力し、値の無いフィールドは省略します。
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserApplication {
    pub symbol: String,
    pub company_name: String,
    pub status: String,
    pub payment_status: String,
    pub title: String,
    pub remark: String,
    pub category: String,
    pub applied_as_label: String,
    pub amount: u64,
    pub can_cancel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_initiation_date: Option<String>,
    pub upi_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpoListing {
    pub symbol: String,
    pub groww_short_name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidding_dates: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bid_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sme: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allotment_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_apply_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_status: Option<String>,
}

impl IpoListing {
    fn new(symbol: &str, name: &str, status: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            groww_short_name: name.to_string(),
            status: status.to_string(),
            bidding_dates: None,
            price_range: None,
            lot_size: None,
            min_bid_quantity: None,
            is_sme: None,
            allotment_date: None,
            listing_date: None,
            pre_apply_open: None,
            listing_status: None,
        }
    }

    pub fn is_sme(&self) -> bool {
        self.is_sme.unwrap_or(false)
    }

    /// SMEの最低申込株数（明示値が無ければ2ロット分）
    pub fn sme_min_shares(&self) -> Option<u32> {
        self.min_bid_quantity
            .or_else(|| self.lot_size.map(|lot| lot * 2))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpoCatalog {
    pub user_applications: Vec<UserApplication>,
    pub active_ipos: Vec<IpoListing>,
    pub upcoming_ipos: Vec<IpoListing>,
    pub closed_ipos: Vec<IpoListing>,
}

impl IpoCatalog {
    /// JSONファイルからカタログを読み込み
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("カタログの読み込みに失敗 {}: {}", path.display(), e))?;
        let catalog = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("カタログのJSONパースエラー {}: {}", path.display(), e))?;
        Ok(catalog)
    }

    /// 募集中・募集前の中からシンボル（大文字小文字無視）で検索
    pub fn find_open_or_upcoming(&self, symbol: &str) -> Option<&IpoListing> {
        self.active_ipos
            .iter()
            .chain(self.upcoming_ipos.iter())
            .find(|ipo| ipo.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn mock() -> Self {
        let user_applications = vec![
            UserApplication {
                symbol: "INTERARCH".to_string(),
                company_name: "Interarch Building Products".to_string(),
                status: "PAYMENT_PENDING".to_string(),
                payment_status: "PENDING".to_string(),
                title: "Approve request on Groww UPI".to_string(),
                remark: "Please wait for UPI request.".to_string(),
                category: "IND".to_string(),
                applied_as_label: "Regular".to_string(),
                amount: 14_400,
                can_cancel: true,
                refund_initiation_date: None,
                upi_id: "8942052094@yesg".to_string(),
            },
            UserApplication {
                symbol: "SUNTECHELEC".to_string(),
                company_name: "Suntech Electronics".to_string(),
                status: "NOT_ALLOTED".to_string(),
                payment_status: "SUCCESS".to_string(),
                title: "IPO Not Allotted".to_string(),
                remark: "Amount will be released by the bank.".to_string(),
                category: "IND".to_string(),
                applied_as_label: "Regular".to_string(),
                amount: 5_500,
                can_cancel: false,
                refund_initiation_date: Some("2024-08-26".to_string()),
                upi_id: "9123000001@upi".to_string(),
            },
            UserApplication {
                symbol: "URBANGREEN".to_string(),
                company_name: "Urban Green Infra (SME)".to_string(),
                status: "APPROVED".to_string(),
                payment_status: "SUCCESS".to_string(),
                title: "Application Accepted by Exchange".to_string(),
                remark: "Waiting for allotment date.".to_string(),
                category: "HNI".to_string(),
                applied_as_label: "HNI".to_string(),
                amount: 250_000,
                // HNI区分は取消不可
                can_cancel: false,
                refund_initiation_date: None,
                upi_id: "9988776655@icici".to_string(),
            },
        ];

        let active_ipos = vec![
            IpoListing {
                bidding_dates: Some("Aug 19 - Aug 21, 2024".to_string()),
                price_range: Some("₹850 - ₹900".to_string()),
                lot_size: Some(16),
                is_sme: Some(false),
                allotment_date: Some("2024-08-22".to_string()),
                listing_date: Some("2024-08-26".to_string()),
                ..IpoListing::new("INTERARCH", "Interarch Building Products", "ACTIVE")
            },
            IpoListing {
                bidding_dates: Some("Aug 18 - Aug 20, 2024".to_string()),
                price_range: Some("₹160 - ₹165".to_string()),
                lot_size: Some(35),
                min_bid_quantity: Some(70),
                is_sme: Some(true),
                allotment_date: Some("2024-08-21".to_string()),
                listing_date: Some("2024-08-26".to_string()),
                ..IpoListing::new("RURALFIN", "Rural Finserve Limited (SME)", "ACTIVE")
            },
        ];

        let upcoming_ipos = vec![IpoListing {
            bidding_dates: Some("Dec 02 - Dec 04, 2024".to_string()),
            price_range: Some("₹95 - ₹100".to_string()),
            lot_size: Some(40),
            pre_apply_open: Some(true),
            ..IpoListing::new("NOVAFOODS", "Nova Foods Limited", "UPCOMING")
        }];

        let closed_ipos = vec![IpoListing {
            listing_status: Some("LISTED".to_string()),
            allotment_date: Some("2024-06-10".to_string()),
            ..IpoListing::new("HEALTHPLUS", "HealthPlus Hospitals", "CLOSED")
        }];

        Self {
            user_applications,
            active_ipos,
            upcoming_ipos,
            closed_ipos,
        }
    }
}

impl Default for IpoCatalog {
    fn default() -> Self {
        Self::mock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_catalog_sizes() {
        let catalog = IpoCatalog::mock();
        assert_eq!(catalog.user_applications.len(), 3);
        assert_eq!(catalog.active_ipos.len(), 2);
        assert_eq!(catalog.upcoming_ipos.len(), 1);
        assert_eq!(catalog.closed_ipos.len(), 1);
    }

    #[test]
    fn test_find_is_case_insensitive_and_skips_closed() {
        let catalog = IpoCatalog::mock();
        assert_eq!(
            catalog.find_open_or_upcoming("ruralfin").map(|ipo| ipo.lot_size),
            Some(Some(35))
        );
        assert!(catalog.find_open_or_upcoming("NovaFoods").is_some());
        assert!(catalog.find_open_or_upcoming("HEALTHPLUS").is_none());
    }

    #[test]
    fn test_listing_serialization_omits_missing_fields() {
        let catalog = IpoCatalog::mock();
        let json = serde_json::to_value(&catalog.closed_ipos[0]).unwrap();
        assert_eq!(json["growwShortName"], "HealthPlus Hospitals");
        assert_eq!(json["listingStatus"], "LISTED");
        assert!(json.get("lotSize").is_none());
        assert!(json.get("priceRange").is_none());
    }

    #[test]
    fn test_sme_min_shares_falls_back_to_two_lots() {
        let mut listing = IpoCatalog::mock().active_ipos[1].clone();
        assert_eq!(listing.sme_min_shares(), Some(70));
        listing.min_bid_quantity = None;
        assert_eq!(listing.sme_min_shares(), Some(70));
        listing.lot_size = Some(50);
        assert_eq!(listing.sme_min_shares(), Some(100));
    }
}
