//! Human-readable wei amounts

use alloy::primitives::U256;

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}

/// Format a wei amount in ether
pub fn format_ether(wei: U256) -> String {
    format_units(wei, 18)
}

/// Lossy conversion for metric values
pub fn to_f64(value: U256) -> f64 {
    match u128::try_from(value) {
        Ok(v) => v as f64,
        Err(_) => f64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_ether(one_eth), "1");

        let one_point_five = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_ether(one_point_five), "1.5");

        let tiny = U256::from(62_500_000_000_000_000u128);
        assert_eq!(format_ether(tiny), "0.0625");

        assert_eq!(format_units(U256::from(1_000_000_000u64), 6), "1000");
        assert_eq!(format_ether(U256::ZERO), "0");
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(U256::from(1_000u64)), 1_000.0);
        assert_eq!(to_f64(U256::MAX), f64::MAX);
    }
}
