use configuration::Universe;
use core_types::Ticker;

/// Reduces the exchange-wide ticker list to the symbols worth evaluating.
///
/// A ticker survives when its symbol ends with the quote suffix, contains none
/// of the excluded substrings, trades more than the turnover floor, and sits
/// inside the configured price band. With `rank_by_volatility` the survivors
/// are ordered by absolute 24h change, largest first, before the candidate cap
/// is applied.
pub fn filter_universe(tickers: &[Ticker], universe: &Universe) -> Vec<String> {
    let mut candidates: Vec<&Ticker> = tickers
        .iter()
        .filter(|t| t.symbol.ends_with(&universe.quote_suffix))
        .filter(|t| !universe.excluded_substrings.iter().any(|x| t.symbol.contains(x.as_str())))
        .filter(|t| t.turnover_24h > universe.min_turnover_24h)
        .filter(|t| t.last_price >= universe.min_price)
        .filter(|t| universe.max_price.is_none_or(|max| t.last_price <= max))
        .collect();

    if universe.rank_by_volatility {
        candidates.sort_by(|a, b| b.price_24h_pcnt.abs().cmp(&a.price_24h_pcnt.abs()));
    }
    if let Some(cap) = universe.max_candidates {
        candidates.truncate(cap);
    }

    candidates.into_iter().map(|t| t.symbol.clone()).collect()
}
