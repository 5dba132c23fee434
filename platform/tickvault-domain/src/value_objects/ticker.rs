pub const MAX_TICKER_LEN: usize = 9;

/// Accepts exchange-style symbols: uppercase letters plus `-` and `.`,
/// optionally prefixed with `^` for indices.
pub fn validate_ticker(ticker: &str) -> Result<(), String> {
    if ticker.is_empty() {
        return Err("ticker is required".to_string());
    }
    if ticker.len() > MAX_TICKER_LEN {
        return Err(format!(
            "ticker must be at most {MAX_TICKER_LEN} characters: {ticker}"
        ));
    }
    let body = ticker.strip_prefix('^').unwrap_or(ticker);
    if body.is_empty() || !body.chars().any(|ch| ch.is_ascii_uppercase()) {
        return Err(format!("ticker must contain uppercase letters: {ticker}"));
    }
    if !body
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch == '-' || ch == '.')
    {
        return Err(format!(
            "ticker must be all uppercase letters, '-' or '.': {ticker}"
        ));
    }
    Ok(())
}
