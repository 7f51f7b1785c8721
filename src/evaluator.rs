use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Trigger,
    NoTrigger,
}

/// Decide whether an observation is worth an alert.
///
/// Triggers when the observed price is at or below the target (equality
/// triggers). Stateless on purpose: a price that stays below target triggers
/// again on every observation. There is no hysteresis and no rate limiting
/// of repeat alerts; that is a known limitation of this evaluator, not
/// something callers should paper over.
pub fn evaluate(target_price: Decimal, observed_price: Decimal) -> Threshold {
    if observed_price <= target_price {
        Threshold::Trigger
    } else {
        Threshold::NoTrigger
    }
}
