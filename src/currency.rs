use crate::text_enum::text_enum;

text_enum! {
    /// Currencies a cooperative can hold balances in.
    pub enum Currency {
        Ngn => "NGN",
        Usd => "USD",
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Ngn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse() {
        assert_eq!(Currency::from_str("NGN"), Ok(Currency::Ngn));
        assert_eq!(Currency::from_str("USD"), Ok(Currency::Usd));
        assert!(Currency::from_str("ngn").is_err());
        assert!(Currency::from_str("EUR").is_err());
        assert_eq!(Currency::default(), Currency::Ngn);
    }

    #[test]
    fn test_json_form() {
        assert_eq!(serde_json::to_value(Currency::Usd).unwrap(), serde_json::json!("USD"));
        assert!(serde_json::from_str::<Currency>(r#""EUR""#).is_err());
    }
}
