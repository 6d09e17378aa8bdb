//! Insights service: POS context → LLM prompt → structured insights.
//!
//! DESIGN
//! ======
//! The caller posts sales rows and the product catalog it already holds.
//! Figures the model should not be trusted to compute (revenue, profit,
//! margin, low-stock) are derived here and put into the prompt. The LLM
//! call itself goes through the shared AI request queue, one closure per
//! request.
//!
//! ERROR HANDLING
//! ==============
//! A throttled upstream (HTTP 429) or a queue that is full or expired is not
//! an error for the user: the response degrades to a fallback payload built
//! from the local figures, flagged `fallback: true`. Everything else
//! propagates as `InsightError`.

use std::collections::HashMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::llm::types::{LlmError, Message};
use crate::queue::QueueError;
use crate::state::AppState;

const MAX_TOP_PRODUCTS: usize = 5;
const MAX_LOW_STOCK_LISTED: usize = 20;
const LOW_MARGIN_PCT: f64 = 20.0;

pub const FALLBACK_MESSAGE: &str =
    "AI insights are busy right now. Showing figures computed locally; try again shortly.";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("LLM not configured")]
    LlmNotConfigured,
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl InsightError {
    /// Busy conditions that degrade to a fallback payload.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_rate_limited(),
            Self::Queue(e) => matches!(e, QueueError::Full { .. } | QueueError::Expired { .. }),
            Self::LlmNotConfigured => false,
        }
    }
}

impl ErrorCode for InsightError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LlmNotConfigured => "E_LLM_NOT_CONFIGURED",
            Self::Llm(e) => e.error_code(),
            Self::Queue(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::LlmNotConfigured => false,
            Self::Llm(e) => e.retryable(),
            Self::Queue(e) => e.retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    #[default]
    Overview,
    Restock,
    Pricing,
}

/// One sold line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRow {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
    /// Falls back to the product's `cost_price` when absent.
    #[serde(default)]
    pub unit_cost: Option<f64>,
    #[serde(default)]
    pub sold_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub cost_price: Option<f64>,
    #[serde(default)]
    pub selling_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    #[serde(default)]
    pub kind: InsightKind,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub sales: Vec<SaleRow>,
    #[serde(default)]
    pub products: Vec<ProductRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub transactions: usize,
    pub units_sold: u64,
    pub revenue: f64,
    pub cost: f64,
    pub gross_profit: f64,
    /// Gross profit over revenue, in percent. Zero when there is no revenue.
    pub margin_pct: f64,
    pub by_category: Vec<CategoryRevenue>,
    pub top_products: Vec<ProductRevenue>,
    pub low_stock: Vec<LowStock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRevenue {
    pub name: String,
    pub units: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStock {
    pub id: String,
    pub name: String,
    pub stock: i64,
    pub reorder_level: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub kind: InsightKind,
    pub summary: String,
    pub insights: Vec<Insight>,
    pub stats: SalesSummary,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Model reply after lenient parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ParsedInsights {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Generate insights for `request` through the shared AI queue.
///
/// # Errors
///
/// Returns `LlmNotConfigured` when no LLM is set up, and any non-busy LLM or
/// queue failure. Busy conditions return a fallback response instead.
pub async fn generate(state: &AppState, request: InsightRequest) -> Result<InsightResponse, InsightError> {
    let Some(llm) = state.llm.clone() else {
        return Err(InsightError::LlmNotConfigured);
    };

    let kind = request.kind;
    info!(?kind, sales = request.sales.len(), products = request.products.len(), "insights: request received");

    let stats = summarize(&request);
    let system = build_system_prompt(kind);
    let prompt = build_user_prompt(&request, &stats);
    let max_tokens = state.ai_max_tokens;

    let outcome = state
        .ai_queue
        .enqueue(move || async move {
            llm.chat(max_tokens, &system, &[Message::user(prompt)])
                .await
                .map_err(InsightError::from)
        })
        .await;

    match outcome {
        Ok(response) => {
            info!(
                ?kind,
                model = %response.model,
                stop_reason = %response.stop_reason,
                input_tokens = response.input_tokens,
                output_tokens = response.output_tokens,
                "insights: LLM response"
            );
            let parsed = parse_insights(&response.text);
            Ok(InsightResponse {
                kind,
                summary: parsed.summary,
                insights: parsed.insights,
                stats,
                fallback: false,
                model: Some(response.model),
            })
        }
        Err(e) if e.is_busy() => {
            warn!(?kind, error = %e, "insights: upstream busy, serving fallback");
            Ok(fallback_response(kind, stats))
        }
        Err(e) => Err(e),
    }
}

// =============================================================================
// FIGURES
// =============================================================================

/// Derive sales, profit and stock figures from the request context.
#[must_use]
pub fn summarize(request: &InsightRequest) -> SalesSummary {
    let products: HashMap<&str, &ProductRow> = request
        .products
        .iter()
        .map(|p| (p.id.as_str(), p))
        .collect();

    let mut summary = SalesSummary { transactions: request.sales.len(), ..SalesSummary::default() };
    let mut by_category: HashMap<String, f64> = HashMap::new();
    let mut by_product: HashMap<&str, (u64, f64)> = HashMap::new();

    for sale in &request.sales {
        let product = products.get(sale.product_id.as_str());
        let qty = f64::from(sale.quantity);
        let revenue = qty * sale.unit_price;
        let unit_cost = sale
            .unit_cost
            .or_else(|| product.and_then(|p| p.cost_price))
            .unwrap_or(0.0);

        summary.units_sold += u64::from(sale.quantity);
        summary.revenue += revenue;
        summary.cost += qty * unit_cost;

        let category = product
            .and_then(|p| p.category.clone())
            .unwrap_or_else(|| "Uncategorized".to_string());
        *by_category.entry(category).or_default() += revenue;

        let name = product.map_or(sale.product_id.as_str(), |p| p.name.as_str());
        let entry = by_product.entry(name).or_default();
        entry.0 += u64::from(sale.quantity);
        entry.1 += revenue;
    }

    summary.gross_profit = summary.revenue - summary.cost;
    if summary.revenue > 0.0 {
        summary.margin_pct = summary.gross_profit / summary.revenue * 100.0;
    }

    summary.by_category = by_category
        .into_iter()
        .map(|(category, revenue)| CategoryRevenue { category, revenue })
        .collect();
    summary
        .by_category
        .sort_by(|a, b| b.revenue.total_cmp(&a.revenue).then_with(|| a.category.cmp(&b.category)));

    let mut top: Vec<ProductRevenue> = by_product
        .into_iter()
        .map(|(name, (units, revenue))| ProductRevenue { name: name.to_string(), units, revenue })
        .collect();
    top.sort_by(|a, b| b.revenue.total_cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
    top.truncate(MAX_TOP_PRODUCTS);
    summary.top_products = top;

    summary.low_stock = request
        .products
        .iter()
        .filter(|p| p.stock <= p.reorder_level)
        .map(|p| LowStock { id: p.id.clone(), name: p.name.clone(), stock: p.stock, reorder_level: p.reorder_level })
        .collect();
    summary
        .low_stock
        .sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));

    summary
}

// =============================================================================
// PROMPTS
// =============================================================================

pub(crate) fn build_system_prompt(kind: InsightKind) -> String {
    let focus = match kind {
        InsightKind::Overview => "Give a concise overview of sales performance, profitability and inventory health.",
        InsightKind::Restock => {
            "Focus on inventory: which products to reorder first, how much, and which items are overstocked."
        }
        InsightKind::Pricing => {
            "Focus on pricing and margins: products priced below a healthy margin and where prices could move."
        }
    };

    format!(
        "You are a retail analyst for a small shop's point-of-sale system.\n\
         {focus}\n\
         All figures below were computed by the system; do not recalculate them.\n\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"summary\": string, \"insights\": [{{\"title\": string, \"detail\": string, \
         \"priority\": \"high\"|\"medium\"|\"low\"}}]}}\n\
         Return at most 5 insights."
    )
}

pub(crate) fn build_user_prompt(request: &InsightRequest, stats: &SalesSummary) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Sales figures:");
    let _ = writeln!(
        prompt,
        "- transactions={} units={} revenue={:.2} cost={:.2} gross_profit={:.2} margin={:.1}%",
        stats.transactions, stats.units_sold, stats.revenue, stats.cost, stats.gross_profit, stats.margin_pct
    );

    if !stats.by_category.is_empty() {
        let _ = writeln!(prompt, "\nRevenue by category:");
        for c in &stats.by_category {
            let _ = writeln!(prompt, "- {}: {:.2}", c.category, c.revenue);
        }
    }

    if !stats.top_products.is_empty() {
        let _ = writeln!(prompt, "\nTop products by revenue:");
        for p in &stats.top_products {
            let _ = writeln!(prompt, "- {}: units={} revenue={:.2}", p.name, p.units, p.revenue);
        }
    }

    let _ = writeln!(prompt, "\nInventory: {} products", request.products.len());
    if stats.low_stock.is_empty() {
        prompt.push_str("(no products at or below reorder level)\n");
    } else {
        let _ = writeln!(prompt, "At or below reorder level:");
        for item in stats.low_stock.iter().take(MAX_LOW_STOCK_LISTED) {
            let _ = writeln!(prompt, "- {}: stock={} reorder_level={}", item.name, item.stock, item.reorder_level);
        }
        if stats.low_stock.len() > MAX_LOW_STOCK_LISTED {
            let _ = writeln!(prompt, "- ... and {} more", stats.low_stock.len() - MAX_LOW_STOCK_LISTED);
        }
    }

    if request.kind == InsightKind::Pricing {
        let priced: Vec<&ProductRow> = request
            .products
            .iter()
            .filter(|p| p.cost_price.is_some() && p.selling_price.is_some())
            .collect();
        if !priced.is_empty() {
            let _ = writeln!(prompt, "\nUnit prices (cost -> price):");
            for p in priced {
                let (cost, price) = (p.cost_price.unwrap_or_default(), p.selling_price.unwrap_or_default());
                let _ = writeln!(prompt, "- {}: {cost:.2} -> {price:.2}", p.name);
            }
        }
    }

    if let Some(question) = request.question.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let _ = write!(prompt, "\n<user_question>{question}</user_question>\n");
    }

    prompt
}

// =============================================================================
// PARSING + FALLBACK
// =============================================================================

/// Parse the model reply, tolerating prose or code fences around the JSON.
///
/// When no JSON object parses, the trimmed reply becomes the summary.
#[must_use]
pub fn parse_insights(text: &str) -> ParsedInsights {
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => "",
    };

    serde_json::from_str::<ParsedInsights>(candidate)
        .ok()
        .filter(|p| !p.summary.is_empty() || !p.insights.is_empty())
        .unwrap_or_else(|| ParsedInsights { summary: text.trim().to_string(), insights: Vec::new() })
}

pub(crate) fn fallback_response(kind: InsightKind, stats: SalesSummary) -> InsightResponse {
    let mut insights: Vec<Insight> = stats
        .low_stock
        .iter()
        .take(MAX_TOP_PRODUCTS)
        .map(|item| Insight {
            title: format!("Restock {}", item.name),
            detail: format!("Stock is {} against a reorder level of {}.", item.stock, item.reorder_level),
            priority: if item.stock <= 0 { Priority::High } else { Priority::Medium },
        })
        .collect();

    if stats.revenue > 0.0 && stats.margin_pct < LOW_MARGIN_PCT {
        insights.push(Insight {
            title: "Gross margin is low".to_string(),
            detail: format!("Gross margin is {:.1}% on {:.2} of revenue.", stats.margin_pct, stats.revenue),
            priority: Priority::High,
        });
    }

    InsightResponse { kind, summary: FALLBACK_MESSAGE.to_string(), insights, stats, fallback: true, model: None }
}

#[cfg(test)]
#[path = "insights_test.rs"]
mod tests;
