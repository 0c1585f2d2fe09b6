use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoResponse {
    pub product_name: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub exchanges: Vec<&'static str>,
}

pub fn build_app_info_response(product_name: String, version: String) -> AppInfoResponse {
    AppInfoResponse {
        product_name,
        version,
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        exchanges: crate::market::types::Exchange::ALL
            .iter()
            .map(|exchange| exchange.label())
            .collect(),
    }
}

pub fn app_info() -> AppInfoResponse {
    build_app_info_response(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_info_contains_runtime_metadata() {
        let response = app_info();

        assert_eq!(response.product_name, "funding-desk");
        assert!(!response.version.is_empty());
        assert!(!response.platform.is_empty());
        assert!(!response.arch.is_empty());
        assert_eq!(response.exchanges, vec!["Binance", "Delta India"]);
    }
}
