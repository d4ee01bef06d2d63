/// Returns "$12.34", switching to four decimals for sub-cent amounts.
pub fn format_money(amount: f64) -> String {
    if amount != 0.0 && amount.abs() < 0.01 {
        format!("${:.4}", amount)
    } else {
        format!("${:.2}", amount)
    }
}

/// Returns "1.2M", "3.4K" or the plain count.
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{}", count)
    }
}

/// Returns "{used}% used" rounded to the nearest integer.
pub fn format_used_percent(used_fraction: f64) -> String {
    let used = (used_fraction * 100.0).max(0.0).round() as u64;
    format!("{}% used", used)
}

/// Returns "[████████░░░░]" where █ = spent portion, ░ = remaining portion.
/// Width is the number of block characters inside the brackets.
pub fn format_usage_bar(used_fraction: f64, width: usize) -> String {
    let used_fraction = used_fraction.clamp(0.0, 1.0);
    let used_blocks = (used_fraction * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    let filled: String = "█".repeat(used_blocks);
    let empty: String = "░".repeat(remaining_blocks);

    format!("[{}{}]", filled, empty)
}

/// Returns "+3.2σ" for a z-score, or "const" when the baseline had no spread.
pub fn format_z_score(z: Option<f64>) -> String {
    match z {
        Some(z) => format!("{:+.1}σ", z),
        None => "const".to_string(),
    }
}
