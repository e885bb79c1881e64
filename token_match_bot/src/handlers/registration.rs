//! Parsing the `/register` form.

use crate::database::NewProject;

pub const CHAINS: &[&str] = &[
    "Ethereum", "Polygon", "BSC", "Arbitrum", "Optimism", "Solana", "Base", "Avalanche", "SUI",
    "XRP", "TON", "SONIC",
];

pub const MARKET_CAPS: &[&str] = &["0-1M", "1-5M", "1-10M", "10-100M", "100M+", "Any"];

pub const CATEGORIES: &[&str] = &[
    "Meme Coin",
    "KOL",
    "AI",
    "Metaverse",
    "Play-to-Earn",
    "Blockchain",
    "Launchpad",
    "NFTs",
    "Telegram Bot",
    "CTO",
];

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Nothing to register. Send the form below the command.")]
    Empty,
    #[error("This line should look like \"key: value\": {0}")]
    MalformedLine(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Unknown chain: {0}")]
    UnknownChain(String),
    #[error("Unknown market cap: {0}")]
    UnknownMarketCap(String),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Contract address can't have spaces in it.")]
    BadContract,
}

/// Help text for `/register`.
pub fn registration_help() -> String {
    format!(
        concat!(
            "Send your project like this, one field per line:\n\n",
            "<code>/register\n",
            "name: My Token\n",
            "contract: 0x1234...\n",
            "chains: Ethereum, Base\n",
            "market_cap: 1-5M\n",
            "categories: Meme Coin, AI\n",
            "description: What we're about\n",
            "group: https://t.me/my_group\n",
            "channel: https://t.me/my_channel\n",
            "x: @my_token</code>\n\n",
            "<code>name</code>, <code>contract</code>, <code>chains</code> and ",
            "<code>market_cap</code> are required. Send it as a photo caption to set a logo.\n\n",
            "Chains: {}\n",
            "Market caps: {}\n",
            "Categories: {}"
        ),
        CHAINS.join(", "),
        MARKET_CAPS.join(", "),
        CATEGORIES.join(", "),
    )
}

/// Finds the canonical spelling of this value in the list, ignoring case.
fn canonical(list: &[&'static str], value: &str) -> Option<&'static str> {
    list.iter().copied().find(|x| x.eq_ignore_ascii_case(value))
}

fn canonical_list(
    list: &[&'static str],
    value: &str,
    error: fn(String) -> RegistrationError,
) -> Result<Vec<String>, RegistrationError> {
    let mut output: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|x| !x.is_empty()) {
        let Some(item) = canonical(list, item) else {
            return Err(error(item.to_string()));
        };
        if !output.iter().any(|x| x == item) {
            output.push(item.to_string());
        }
    }
    Ok(output)
}

/// Parses the `key: value` lines of a registration into a project.
///
/// Admin handles are left empty.
pub fn parse_registration(text: &str) -> Result<NewProject, RegistrationError> {
    let mut project = NewProject::default();
    let mut anything = false;

    for line in text.lines().map(str::trim).filter(|x| !x.is_empty()) {
        anything = true;
        let Some((key, value)) = line.split_once(':') else {
            return Err(RegistrationError::MalformedLine(line.to_string()));
        };
        let key = key.trim().to_lowercase().replace([' ', '-'], "_");
        let value = value.trim();
        let optional = (!value.is_empty()).then(|| value.to_string());

        match key.as_str() {
            "name" => project.name = value.to_string(),
            "contract" | "contract_address" | "ca" => {
                if value.contains(char::is_whitespace) {
                    return Err(RegistrationError::BadContract);
                }
                project.contract_address = value.to_string();
            }
            "chains" | "chain" => {
                project.chains = canonical_list(CHAINS, value, RegistrationError::UnknownChain)?
            }
            "market_cap" | "mcap" => {
                let Some(cap) = canonical(MARKET_CAPS, value) else {
                    return Err(RegistrationError::UnknownMarketCap(value.to_string()));
                };
                project.market_cap = cap.to_string();
            }
            "categories" | "category" => {
                project.categories =
                    canonical_list(CATEGORIES, value, RegistrationError::UnknownCategory)?
            }
            "description" => project.description = optional,
            "group" | "telegram_group" => project.telegram_group = optional,
            "channel" | "telegram_channel" => project.telegram_channel = optional,
            "x" | "twitter" | "x_account" => project.x_account = optional,
            _ => return Err(RegistrationError::UnknownField(key)),
        }
    }

    if !anything {
        return Err(RegistrationError::Empty);
    }
    if project.name.is_empty() {
        return Err(RegistrationError::MissingField("name"));
    }
    if project.contract_address.is_empty() {
        return Err(RegistrationError::MissingField("contract"));
    }
    if project.chains.is_empty() {
        return Err(RegistrationError::MissingField("chains"));
    }
    if project.market_cap.is_empty() {
        return Err(RegistrationError::MissingField("market_cap"));
    }

    Ok(project)
}
