use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::str::FromStr;

use crate::config::SelectorPolicy;
use crate::utils::error::ScrapeError;
use crate::{AppError, Result};

/// Parses a fetched page body and pulls out a price.
///
/// Side-effect free: no I/O, no shared state. Selectors come from the
/// configured [`SelectorPolicy`] and are tried in priority order; the first
/// matching node wins, with no scoring or fallback beyond that order.
pub struct PriceExtractor {
    container: Selector,
    price_selectors: Vec<Selector>,
    price_regex: Regex,
}

impl PriceExtractor {
    pub fn new(policy: &SelectorPolicy) -> Result<Self> {
        let container = Selector::parse(&policy.container).map_err(|e| {
            AppError::Validation(format!("Invalid container selector '{}': {e}", policy.container))
        })?;

        let mut price_selectors = Vec::with_capacity(policy.price_selectors.len());
        for raw in &policy.price_selectors {
            let selector = Selector::parse(raw).map_err(|e| {
                AppError::Validation(format!("Invalid price selector '{raw}': {e}"))
            })?;
            price_selectors.push(selector);
        }

        let price_regex = Regex::new(r"(\d{1,3}(?:,\d{3})*(?:\.\d+)?|\d+(?:\.\d+)?)")
            .map_err(|e| AppError::Internal(format!("price regex: {e}")))?;

        Ok(Self {
            container,
            price_selectors,
            price_regex,
        })
    }

    /// Extract a price from a raw page body.
    ///
    /// `StructureNotFound` when the expected container is absent,
    /// `PriceNotFound` when no selector matches inside it, `Parse` when the
    /// matched node's text does not normalize to a number.
    pub fn extract(&self, html: &str) -> std::result::Result<Decimal, ScrapeError> {
        let document = Html::parse_document(html);

        let container = document
            .select(&self.container)
            .next()
            .ok_or(ScrapeError::StructureNotFound)?;

        for selector in &self.price_selectors {
            if let Some(node) = container.select(selector).next() {
                let text = node.text().collect::<Vec<_>>().join(" ").trim().to_string();
                return self.parse_price(&text);
            }
        }

        Err(ScrapeError::PriceNotFound)
    }

    /// Strip currency symbols and thousands separators, then convert.
    fn parse_price(&self, text: &str) -> std::result::Result<Decimal, ScrapeError> {
        let captures = self.price_regex.captures(text).ok_or_else(|| ScrapeError::Parse {
            text: text.to_string(),
        })?;

        let digits = captures
            .get(1)
            .map(|m| m.as_str().replace(',', ""))
            .ok_or_else(|| ScrapeError::Parse {
                text: text.to_string(),
            })?;

        Decimal::from_str(&digits).map_err(|_| ScrapeError::Parse {
            text: text.to_string(),
        })
    }
}
