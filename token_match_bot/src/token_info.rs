//! Market data of tokens, from CoinGecko or, failing that, DexScreener.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::database::MarketData;

const COINGECKO_CONTRACTS: &str = "https://api.coingecko.com/api/v3/coins";
const DEXSCREENER_TOKENS: &str = "https://api.dexscreener.com/latest/dex/tokens";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

/// CoinGecko's name for a chain. Only EVM-ish chains are listed there by contract.
fn coingecko_platform(chain: &str) -> Option<&'static str> {
    Some(match chain {
        "Ethereum" => "ethereum",
        "BSC" => "binance-smart-chain",
        "Polygon" => "polygon-pos",
        "Arbitrum" => "arbitrum-one",
        "Optimism" => "optimistic-ethereum",
        "Avalanche" => "avalanche",
        "Fantom" => "fantom",
        "Cronos" => "cronos",
        "Base" => "base",
        "Linea" => "linea",
        "Mantle" => "mantle",
        "Scroll" => "scroll",
        "zkSync" => "zksync",
        "Starknet" => "starknet",
        _ => return None,
    })
}

/// Appends path segments to a base URL, escaping them.
fn api_url(base: &str, segments: &[&str]) -> Option<Url> {
    let mut url = Url::parse(base).ok()?;
    url.path_segments_mut().ok()?.extend(segments);
    Some(url)
}

/// A number that may also be written as a string, like DexScreener's `"0.0042"`.
fn number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(x) => x.as_f64(),
        Value::String(x) => x.parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|x| x.is_finite())
}

fn positive(value: &Value) -> Option<f64> {
    number(value).filter(|x| *x > 0.0)
}

/// Reads a response of CoinGecko's `/coins/{platform}/contract/{address}`.
fn parse_coingecko(json: &Value) -> Option<MarketData> {
    json.get("id")?;
    let market = &json["market_data"];

    let data = MarketData {
        symbol: json["symbol"].as_str().map(str::to_uppercase),
        price: positive(&market["current_price"]["usd"]),
        price_change_24h: number(&market["price_change_percentage_24h"]),
        volume_24h: positive(&market["total_volume"]["usd"]),
        market_cap: positive(&market["market_cap"]["usd"]),
    };
    (!data.is_empty()).then_some(data)
}

/// Reads a response of DexScreener's `/latest/dex/tokens/{address}`. The first pair wins.
fn parse_dexscreener(json: &Value) -> Option<MarketData> {
    let pair = json["pairs"].as_array()?.first()?;

    let data = MarketData {
        symbol: pair["baseToken"]["symbol"].as_str().map(str::to_string),
        price: positive(&pair["priceUsd"]),
        price_change_24h: number(&pair["priceChange"]["h24"]),
        volume_24h: positive(&pair["volume"]["h24"]),
        market_cap: positive(&pair["marketCap"]),
    };
    (!data.is_empty()).then_some(data)
}

pub struct TokenInfoClient {
    client: reqwest::Client,
}

impl TokenInfoClient {
    pub fn new() -> Result<TokenInfoClient, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(TokenInfoClient { client })
    }

    /// Returns [`None`] for 404s and other unsuccessful responses.
    async fn get_json(&self, url: Url) -> Result<Option<Value>, Error> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let text = response.text().await?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn from_coingecko(&self, contract_address: &str, chain: &str) -> Option<MarketData> {
        let platform = coingecko_platform(chain)?;
        let url = api_url(COINGECKO_CONTRACTS, &[platform, "contract", contract_address])?;
        match self.get_json(url).await {
            Ok(json) => json.as_ref().and_then(parse_coingecko),
            Err(e) => {
                log::debug!("CoinGecko failed for {contract_address}: {e}");
                None
            }
        }
    }

    async fn from_dexscreener(&self, contract_address: &str) -> Option<MarketData> {
        let url = api_url(DEXSCREENER_TOKENS, &[contract_address])?;
        match self.get_json(url).await {
            Ok(json) => json.as_ref().and_then(parse_dexscreener),
            Err(e) => {
                log::debug!("DexScreener failed for {contract_address}: {e}");
                None
            }
        }
    }

    /// Looks the token up on CoinGecko by its chain, then on DexScreener.
    ///
    /// Returns [`None`] if neither knows it, which is normal for new tokens.
    pub async fn fetch(&self, contract_address: &str, chain: Option<&str>) -> Option<MarketData> {
        if let Some(chain) = chain {
            if let Some(data) = self.from_coingecko(contract_address, chain).await {
                return Some(data);
            }
        }
        self.from_dexscreener(contract_address).await
    }
}

/// Dollar amount with a K/M/B/T suffix, like `$4.20M`.
#[must_use]
pub fn format_usd(amount: f64) -> String {
    for (size, suffix) in [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")] {
        if amount >= size {
            return format!("${:.2}{suffix}", amount / size);
        }
    }
    format!("${amount:.2}")
}

/// Token price, with more digits the smaller it is.
#[must_use]
pub fn format_price(price: f64) -> String {
    if price < 0.000_001 {
        format!("${price:.2e}")
    } else if price < 0.01 {
        format!("${price:.6}")
    } else if price < 1.0 {
        format!("${price:.4}")
    } else {
        format!("${price:.2}")
    }
}

/// Like `+5.25%` or `-3.10%`.
#[must_use]
pub fn format_change(change: f64) -> String {
    format!("{change:+.2}%")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn usd_suffixes() {
        assert_eq!(format_usd(999.5), "$999.50");
        assert_eq!(format_usd(1_234.0), "$1.23K");
        assert_eq!(format_usd(4_200_000.0), "$4.20M");
        assert_eq!(format_usd(7_500_000_000.0), "$7.50B");
        assert_eq!(format_usd(2e12), "$2.00T");
    }

    #[test]
    fn prices_and_changes() {
        assert_eq!(format_price(0.000_000_12), "$1.20e-7");
        assert_eq!(format_price(0.0042), "$0.004200");
        assert_eq!(format_price(0.5), "$0.5000");
        assert_eq!(format_price(42.0), "$42.00");

        assert_eq!(format_change(5.254), "+5.25%");
        assert_eq!(format_change(-3.1), "-3.10%");
    }

    #[test]
    fn coingecko_response() {
        let json = json!({
            "id": "alpha",
            "symbol": "alp",
            "market_data": {
                "current_price": { "usd": 0.0042 },
                "price_change_percentage_24h": -3.5,
                "total_volume": { "usd": 120000 },
                "market_cap": { "usd": 0 },
            },
        });
        assert_eq!(
            parse_coingecko(&json),
            Some(MarketData {
                symbol: Some("ALP".to_string()),
                price: Some(0.0042),
                price_change_24h: Some(-3.5),
                volume_24h: Some(120000.0),
                market_cap: None,
            })
        );

        // Known token, but no market to speak of.
        assert_eq!(parse_coingecko(&json!({ "id": "alpha", "market_data": {} })), None);
        assert_eq!(parse_coingecko(&json!({ "error": "coin not found" })), None);
    }

    #[test]
    fn dexscreener_response() {
        let json = json!({
            "pairs": [
                {
                    "baseToken": { "symbol": "BETA" },
                    "priceUsd": "1.5",
                    "priceChange": { "h24": 12.25 },
                    "volume": { "h24": 5000.5 },
                    "marketCap": 2500000,
                },
                {
                    "baseToken": { "symbol": "WRONG" },
                    "priceUsd": "9",
                },
            ],
        });
        assert_eq!(
            parse_dexscreener(&json),
            Some(MarketData {
                symbol: Some("BETA".to_string()),
                price: Some(1.5),
                price_change_24h: Some(12.25),
                volume_24h: Some(5000.5),
                market_cap: Some(2500000.0),
            })
        );

        assert_eq!(parse_dexscreener(&json!({ "pairs": [] })), None);
        assert_eq!(parse_dexscreener(&json!({ "pairs": null })), None);
    }

    #[test]
    fn chains_and_urls() {
        assert_eq!(coingecko_platform("BSC"), Some("binance-smart-chain"));
        assert_eq!(coingecko_platform("Solana"), None);

        let url = api_url(COINGECKO_CONTRACTS, &["ethereum", "contract", "0xaaa"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/coins/ethereum/contract/0xaaa"
        );
        let url = api_url(DEXSCREENER_TOKENS, &["a/b?c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.dexscreener.com/latest/dex/tokens/a%2Fb%3Fc"
        );
    }
}
