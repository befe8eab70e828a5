//! Typed tool invocations
//!
//! Agents emit loosely typed `{name, parameters}` records. At the validation
//! boundary they are converted into [`ToolInvocation`], a closed set of
//! tools with typed parameter records. Unknown tool names are rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::turn::ToolCall;

pub const FIND_PRODUCT: &str = "find_product";
pub const VIEW_PRODUCT_INFORMATION: &str = "view_product_information";
pub const RECOMMEND_PRODUCT: &str = "recommend_product";
pub const TERMINATE: &str = "terminate";
pub const WEB_SEARCH: &str = "web_search";

/// Maximum result page reachable through `find_product`
pub const MAX_PAGE: i64 = 5;

/// Bounds for `web_search.max_results`
pub const MAX_WEB_RESULTS: i64 = 20;
pub const DEFAULT_WEB_RESULTS: i64 = 10;

/// Result ordering for product search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    PriceAsc,
    PriceDesc,
    Order,
    #[default]
    Default,
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "priceasc" => Ok(SortOrder::PriceAsc),
            "pricedesc" => Ok(SortOrder::PriceDesc),
            "order" => Ok(SortOrder::Order),
            "default" => Ok(SortOrder::Default),
            other => Err(CoreError::invalid(FIND_PRODUCT, format!("unknown sort `{}`", other))),
        }
    }
}

/// Service filters understood by product search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceFilter {
    #[serde(rename = "official")]
    Official,
    #[serde(rename = "freeShipping")]
    FreeShipping,
    #[serde(rename = "COD")]
    CashOnDelivery,
    #[serde(rename = "flashsale")]
    FlashSale,
}

impl ServiceFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceFilter::Official => "official",
            ServiceFilter::FreeShipping => "freeShipping",
            ServiceFilter::CashOnDelivery => "COD",
            ServiceFilter::FlashSale => "flashsale",
        }
    }

    /// Parse a comma-separated filter list; `default` entries are dropped
    pub fn parse_list(s: &str) -> Result<Vec<ServiceFilter>> {
        let mut filters = Vec::new();
        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let filter = match item {
                "default" => continue,
                "official" => ServiceFilter::Official,
                "freeShipping" => ServiceFilter::FreeShipping,
                "COD" => ServiceFilter::CashOnDelivery,
                "flashsale" => ServiceFilter::FlashSale,
                other => {
                    return Err(CoreError::invalid(
                        FIND_PRODUCT,
                        format!("unknown service `{}`", other),
                    ));
                }
            };
            if !filters.contains(&filter) {
                filters.push(filter);
            }
        }
        Ok(filters)
    }
}

/// Price window in `low-high` or open-ended `low-` form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceFilter {
    pub low: f64,
    pub high: Option<f64>,
}

impl FromStr for PriceFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || CoreError::invalid(FIND_PRODUCT, format!("malformed price range `{}`", s));
        let (low, high) = s.split_once('-').ok_or_else(bad)?;
        let low = low.trim().parse::<f64>().map_err(|_| bad())?;
        let high = match high.trim() {
            "" => None,
            value => Some(value.parse::<f64>().map_err(|_| bad())?),
        };
        if high.is_some_and(|high| high < low) {
            return Err(bad());
        }
        Ok(PriceFilter { low, high })
    }
}

impl fmt::Display for PriceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.high {
            Some(high) => write!(f, "{}-{}", self.low, high),
            None => write!(f, "{}-", self.low),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindProductParams {
    pub q: String,
    pub page: i64,
    pub shop_id: Option<String>,
    pub price: Option<PriceFilter>,
    pub sort: SortOrder,
    pub service: Vec<ServiceFilter>,
}

/// Final status declared by `terminate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminateStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchParams {
    pub q: String,
    pub max_results: i64,
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "parameters", rename_all = "snake_case")]
pub enum ToolInvocation {
    FindProduct(FindProductParams),
    ViewProductInformation { product_ids: Vec<String> },
    RecommendProduct { product_ids: Vec<String> },
    Terminate { status: TerminateStatus },
    WebSearch(WebSearchParams),
}

/// Split a comma-separated id list, trimming blanks
pub fn split_product_ids(ids: &str) -> Vec<String> {
    ids.split(',').map(str::trim).map(str::to_string).collect()
}

struct Params<'a> {
    tool: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(CoreError::invalid(self.tool, format!("`{}` must be a string", key))),
        }
    }

    fn required_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)?
            .ok_or_else(|| CoreError::invalid(self.tool, format!("missing `{}`", key)))
    }

    fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                CoreError::invalid(self.tool, format!("`{}` must be an integer", key))
            }),
        }
    }

    fn non_blank(&self, key: &str) -> Result<Option<&'a str>> {
        Ok(self.str(key)?.filter(|s| !s.trim().is_empty()))
    }
}

impl ToolInvocation {
    /// Tool name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::FindProduct(_) => FIND_PRODUCT,
            ToolInvocation::ViewProductInformation { .. } => VIEW_PRODUCT_INFORMATION,
            ToolInvocation::RecommendProduct { .. } => RECOMMEND_PRODUCT,
            ToolInvocation::Terminate { .. } => TERMINATE,
            ToolInvocation::WebSearch(_) => WEB_SEARCH,
        }
    }

    /// Whether this invocation ends the dialogue
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolInvocation::Terminate { .. })
    }

    /// Back to the loose wire form
    pub fn to_tool_call(&self) -> ToolCall {
        let parameters = match self {
            ToolInvocation::FindProduct(p) => {
                let mut map = Map::new();
                map.insert("q".to_string(), json!(p.q));
                map.insert("page".to_string(), json!(p.page));
                if let Some(shop_id) = &p.shop_id {
                    map.insert("shop_id".to_string(), json!(shop_id));
                }
                if let Some(price) = &p.price {
                    map.insert("price".to_string(), json!(price.to_string()));
                }
                if p.sort != SortOrder::Default {
                    let sort = serde_json::to_value(p.sort).unwrap_or_default();
                    map.insert("sort".to_string(), sort);
                }
                if !p.service.is_empty() {
                    let service: Vec<_> = p.service.iter().map(|s| s.as_str()).collect();
                    map.insert("service".to_string(), json!(service.join(",")));
                }
                Value::Object(map)
            }
            ToolInvocation::ViewProductInformation { product_ids }
            | ToolInvocation::RecommendProduct { product_ids } => {
                json!({ "product_ids": product_ids.join(",") })
            }
            ToolInvocation::Terminate { status } => json!({ "status": status }),
            ToolInvocation::WebSearch(p) => json!({ "q": p.q, "max_results": p.max_results }),
        };
        ToolCall::new(self.name()).with_parameters(parameters)
    }
}

impl TryFrom<&ToolCall> for ToolInvocation {
    type Error = CoreError;

    fn try_from(call: &ToolCall) -> Result<Self> {
        match call.name.as_str() {
            FIND_PRODUCT => {
                let p = Params { tool: FIND_PRODUCT, map: &call.parameters };
                let q = p.required_str("q")?.to_string();
                let page = p
                    .int("page")?
                    .ok_or_else(|| CoreError::invalid(FIND_PRODUCT, "missing `page`"))?;
                if !(1..=MAX_PAGE).contains(&page) {
                    return Err(CoreError::invalid(
                        FIND_PRODUCT,
                        format!("`page` must be between 1 and {}, got {}", MAX_PAGE, page),
                    ));
                }
                Ok(ToolInvocation::FindProduct(FindProductParams {
                    q,
                    page,
                    shop_id: p.non_blank("shop_id")?.map(str::to_string),
                    price: p.non_blank("price")?.map(str::parse::<PriceFilter>).transpose()?,
                    sort: p
                        .non_blank("sort")?
                        .map(str::parse::<SortOrder>)
                        .transpose()?
                        .unwrap_or_default(),
                    service: match p.non_blank("service")? {
                        Some(service) => ServiceFilter::parse_list(service)?,
                        None => Vec::new(),
                    },
                }))
            }
            VIEW_PRODUCT_INFORMATION | RECOMMEND_PRODUCT => {
                let tool = if call.name == RECOMMEND_PRODUCT {
                    RECOMMEND_PRODUCT
                } else {
                    VIEW_PRODUCT_INFORMATION
                };
                let p = Params { tool, map: &call.parameters };
                let product_ids = split_product_ids(p.required_str("product_ids")?);
                if product_ids.iter().all(|id| id.is_empty()) {
                    return Err(CoreError::invalid(tool, "`product_ids` is empty"));
                }
                Ok(if tool == RECOMMEND_PRODUCT {
                    ToolInvocation::RecommendProduct { product_ids }
                } else {
                    ToolInvocation::ViewProductInformation { product_ids }
                })
            }
            TERMINATE => {
                let p = Params { tool: TERMINATE, map: &call.parameters };
                let status = match p.required_str("status")? {
                    "success" => TerminateStatus::Success,
                    "failure" => TerminateStatus::Failure,
                    other => {
                        return Err(CoreError::invalid(
                            TERMINATE,
                            format!("unknown status `{}`", other),
                        ));
                    }
                };
                Ok(ToolInvocation::Terminate { status })
            }
            WEB_SEARCH => {
                let p = Params { tool: WEB_SEARCH, map: &call.parameters };
                let q = p.required_str("q")?.to_string();
                let max_results = p.int("max_results")?.unwrap_or(DEFAULT_WEB_RESULTS);
                if !(1..=MAX_WEB_RESULTS).contains(&max_results) {
                    return Err(CoreError::invalid(
                        WEB_SEARCH,
                        format!("`max_results` must be between 1 and {}", MAX_WEB_RESULTS),
                    ));
                }
                Ok(ToolInvocation::WebSearch(WebSearchParams { q, max_results }))
            }
            other => Err(CoreError::UnknownTool(other.to_string())),
        }
    }
}

/// Static description of a tool as shown to the agent
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolSpec {
    /// Prompt-friendly description block
    pub fn to_prompt(&self) -> String {
        format!(
            "Name: {}\nDescription: {}\nParameters: {}",
            self.name, self.description, self.parameters
        )
    }
}

/// Specs for every tool in the closed tool set
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: FIND_PRODUCT,
            description: "Search for products and return up to 10 products, with each product \
                          including a product_id, shop_id, title, price, service, and sold_count.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "q": {
                        "type": "string",
                        "description": "The query used to search for products."
                    },
                    "page": {"type": "integer", "description": "Result page, ranging from 1 to 5."},
                    "shop_id": {
                        "type": "string",
                        "description": "Restrict the search to one shop."
                    },
                    "price": {
                        "type": "string",
                        "description": "Price range, e.g. \"0-100\" or \"1000-\"."
                    },
                    "sort": {
                        "type": "string",
                        "enum": ["priceasc", "pricedesc", "order", "default"]
                    },
                    "service": {
                        "type": "string",
                        "description": "Comma-joined subset of official, freeShipping, COD, \
                                        flashsale, default."
                    }
                },
                "required": ["q", "page"]
            }),
        },
        ToolSpec {
            name: VIEW_PRODUCT_INFORMATION,
            description: "Given a list of product_ids, fetch their descriptions, SKU options, \
                          and SPU attributes.",
            parameters: json!({
                "type": "object",
                "properties": {"product_ids": {"type": "string"}},
                "required": ["product_ids"]
            }),
        },
        ToolSpec {
            name: RECOMMEND_PRODUCT,
            description: "Recommend the products to the user. You can use the tool only once.",
            parameters: json!({
                "type": "object",
                "properties": {"product_ids": {"type": "string"}},
                "required": ["product_ids"]
            }),
        },
        ToolSpec {
            name: TERMINATE,
            description: "Terminate the dialogue and declare the task completion status.",
            parameters: json!({
                "type": "object",
                "properties": {"status": {"type": "string", "enum": ["success", "failure"]}},
                "required": ["status"]
            }),
        },
        ToolSpec {
            name: WEB_SEARCH,
            description: "Search for information using the web search engine.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "q": {"type": "string"},
                    "max_results": {"type": "integer", "description": "From 1 to 20, default 10."}
                },
                "required": ["q"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, parameters: Value) -> ToolCall {
        ToolCall::new(name).with_parameters(parameters)
    }

    #[test]
    fn test_find_product_full() {
        let invocation = ToolInvocation::try_from(&call(
            FIND_PRODUCT,
            json!({
                "q": "nike shoes",
                "page": 2,
                "price": "100-500",
                "sort": "priceasc",
                "service": "COD,default,freeShipping"
            }),
        ))
        .unwrap();

        let ToolInvocation::FindProduct(params) = invocation else {
            panic!("expected find_product");
        };
        assert_eq!(params.q, "nike shoes");
        assert_eq!(params.page, 2);
        assert_eq!(params.price, Some(PriceFilter { low: 100.0, high: Some(500.0) }));
        assert_eq!(params.sort, SortOrder::PriceAsc);
        assert_eq!(params.service, vec![
            ServiceFilter::CashOnDelivery,
            ServiceFilter::FreeShipping
        ]);
        assert_eq!(params.shop_id, None);
    }

    #[test]
    fn test_find_product_rejects_bad_page() {
        let bad_page = call(FIND_PRODUCT, json!({"q": "x", "page": 9}));
        let err = ToolInvocation::try_from(&bad_page).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameters { .. }));

        let err = ToolInvocation::try_from(&call(FIND_PRODUCT, json!({"q": "x", "page": "1"})))
            .unwrap_err();
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_open_price_range() {
        let price: PriceFilter = "1000-".parse().unwrap();
        assert_eq!(price, PriceFilter { low: 1000.0, high: None });
        assert_eq!(price.to_string(), "1000-");
        assert!("cheap".parse::<PriceFilter>().is_err());
        assert!("500-100".parse::<PriceFilter>().is_err());
    }

    #[test]
    fn test_recommend_splits_ids() {
        let invocation =
            ToolInvocation::try_from(&call(RECOMMEND_PRODUCT, json!({"product_ids": "1, 2,3"})))
                .unwrap();
        assert_eq!(invocation, ToolInvocation::RecommendProduct {
            product_ids: vec!["1".to_string(), "2".to_string(), "3".to_string()]
        });
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let err = ToolInvocation::try_from(&call("python_execute", json!({}))).unwrap_err();
        assert!(matches!(err, CoreError::UnknownTool(name) if name == "python_execute"));
    }

    #[test]
    fn test_terminate_and_web_search() {
        let invocation =
            ToolInvocation::try_from(&call(TERMINATE, json!({"status": "success"}))).unwrap();
        assert!(invocation.is_terminal());
        assert!(ToolInvocation::try_from(&call(TERMINATE, json!({"status": "done"}))).is_err());

        let invocation =
            ToolInvocation::try_from(&call(WEB_SEARCH, json!({"q": "popmart"}))).unwrap();
        assert_eq!(invocation, ToolInvocation::WebSearch(WebSearchParams {
            q: "popmart".to_string(),
            max_results: DEFAULT_WEB_RESULTS
        }));
    }

    #[test]
    fn test_to_tool_call_round_trip() {
        let original = call(
            FIND_PRODUCT,
            json!({"q": "backpack", "page": 1, "sort": "order", "service": "official"}),
        );
        let invocation = ToolInvocation::try_from(&original).unwrap();
        let back = invocation.to_tool_call();
        assert_eq!(back, original);
        assert_eq!(back.id, original.id);
    }

    #[test]
    fn test_tool_specs_cover_closed_set() {
        let names: Vec<_> = tool_specs().iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec![
            FIND_PRODUCT,
            VIEW_PRODUCT_INFORMATION,
            RECOMMEND_PRODUCT,
            TERMINATE,
            WEB_SEARCH
        ]);
        assert!(tool_specs()[3].to_prompt().starts_with("Name: terminate"));
    }
}
