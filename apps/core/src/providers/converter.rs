use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};
use crate::usage::now_epoch_secs;

const RATES_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";
const RATES_MAX_AGE_SECS: i64 = 86_400;
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const LENGTH: &[(&str, f64)] = &[
    ("km", 1000.0), ("kilometer", 1000.0), ("kilometers", 1000.0),
    ("m", 1.0), ("meter", 1.0), ("meters", 1.0), ("metre", 1.0), ("metres", 1.0),
    ("cm", 0.01), ("centimeter", 0.01), ("centimeters", 0.01),
    ("mm", 0.001), ("millimeter", 0.001), ("millimeters", 0.001),
    ("mi", 1609.34), ("mile", 1609.34), ("miles", 1609.34),
    ("yd", 0.9144), ("yard", 0.9144), ("yards", 0.9144),
    ("ft", 0.3048), ("foot", 0.3048), ("feet", 0.3048),
    ("in", 0.0254), ("inch", 0.0254), ("inches", 0.0254),
];

const WEIGHT: &[(&str, f64)] = &[
    ("kg", 1.0), ("kilogram", 1.0), ("kilograms", 1.0),
    ("g", 0.001), ("gram", 0.001), ("grams", 0.001),
    ("mg", 0.000_001), ("milligram", 0.000_001), ("milligrams", 0.000_001),
    ("lb", 0.453_592), ("lbs", 0.453_592), ("pound", 0.453_592), ("pounds", 0.453_592),
    ("oz", 0.028_349_5), ("ounce", 0.028_349_5), ("ounces", 0.028_349_5),
    ("ton", 1000.0), ("tons", 1000.0), ("tonne", 1000.0), ("tonnes", 1000.0),
];

const VOLUME: &[(&str, f64)] = &[
    ("l", 1.0), ("liter", 1.0), ("liters", 1.0), ("litre", 1.0), ("litres", 1.0),
    ("ml", 0.001), ("milliliter", 0.001), ("milliliters", 0.001),
    ("gal", 3.785_41), ("gallon", 3.785_41), ("gallons", 3.785_41),
    ("qt", 0.946_353), ("quart", 0.946_353), ("quarts", 0.946_353),
    ("pt", 0.473_176), ("pint", 0.473_176), ("pints", 0.473_176),
    ("cup", 0.236_588), ("cups", 0.236_588),
];

const CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "INR", "CAD", "AUD", "CHF", "SEK", "NOK", "DKK", "PLN",
    "RUB", "BRL", "MXN", "ZAR", "KRW", "SGD", "HKD", "NZD", "TRY", "AED", "SAR",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionQuery {
    pub value: f64,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Length,
    Weight,
    Volume,
}

impl Dimension {
    fn table(self) -> &'static [(&'static str, f64)] {
        match self {
            Self::Length => LENGTH,
            Self::Weight => WEIGHT,
            Self::Volume => VOLUME,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Length => "Length",
            Self::Weight => "Weight",
            Self::Volume => "Volume",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub title: String,
    pub value: String,
    pub explanation: String,
}

/// USD-based rate table as cached on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRates {
    pub rates: HashMap<String, f64>,
    pub fetched_epoch_secs: i64,
}

impl ExchangeRates {
    pub fn is_stale(&self, now: i64) -> bool {
        now.saturating_sub(self.fetched_epoch_secs) > RATES_MAX_AGE_SECS
    }

    pub fn convert(&self, value: f64, from: &str, to: &str) -> Option<f64> {
        let rate = |code: &str| -> Option<f64> {
            if code == "USD" {
                return Some(1.0);
            }
            self.rates.get(code).copied().filter(|r| *r > 0.0)
        };
        Some(value / rate(from)? * rate(to)?)
    }
}

/// Unit and currency conversions. Currency rates come from a cache that is
/// refreshed on a background thread; a keystroke never waits on the network.
pub struct UnitConverter {
    cache_path: PathBuf,
    api_key: Option<String>,
    rates: Arc<RwLock<Option<ExchangeRates>>>,
    refreshing: Arc<AtomicBool>,
}

impl UnitConverter {
    pub fn new(cache_path: PathBuf, api_key: Option<String>) -> Self {
        Self {
            cache_path,
            api_key,
            rates: Arc::new(RwLock::new(None)),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_rates(self, rates: ExchangeRates) -> Self {
        *self.rates.write() = Some(rates);
        self
    }

    fn load_cache(&self) {
        let Ok(raw) = std::fs::read_to_string(&self.cache_path) else {
            return;
        };
        match serde_json::from_str::<ExchangeRates>(&raw) {
            Ok(rates) => *self.rates.write() = Some(rates),
            Err(error) => warn!(path = %self.cache_path.display(), %error, "ignoring corrupt rate cache"),
        }
    }

    fn refresh_in_background(&self) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let url = rates_url(self.api_key.as_deref());
        let path = self.cache_path.clone();
        let rates = Arc::clone(&self.rates);
        let refreshing = Arc::clone(&self.refreshing);
        let spawned = std::thread::Builder::new()
            .name("exchange-rates".to_string())
            .spawn(move || {
                match fetch_rates(&url) {
                    Ok(fresh) => {
                        info!(currencies = fresh.rates.len(), "exchange rates refreshed");
                        if let Err(error) = save_cache(&path, &fresh) {
                            warn!(path = %path.display(), %error, "failed to write rate cache");
                        }
                        *rates.write() = Some(fresh);
                    }
                    Err(error) => warn!(%error, "exchange rate refresh failed"),
                }
                refreshing.store(false, Ordering::Release);
            });
        if let Err(error) = spawned {
            warn!(%error, "could not start exchange rate refresh");
            self.refreshing.store(false, Ordering::Release);
        }
    }

    fn convert_currency(&self, query: &ConversionQuery) -> Conversion {
        let from = query.from.to_ascii_uppercase();
        let to = query.to.to_ascii_uppercase();
        let snapshot = self.rates.read().clone();
        if snapshot
            .as_ref()
            .map_or(true, |rates| rates.is_stale(now_epoch_secs()))
        {
            self.refresh_in_background();
        }

        let converted = snapshot
            .as_ref()
            .and_then(|rates| rates.convert(query.value, &from, &to));
        match (converted, snapshot) {
            (Some(result), Some(rates)) => Conversion {
                title: format!("{} {from} = {result:.2} {to}", trim_number(query.value)),
                value: format!("{result:.2}"),
                explanation: format!("Exchange rate (updated {})", age_label(rates.fetched_epoch_secs)),
            },
            _ => Conversion {
                title: "Currency conversion unavailable".to_string(),
                value: String::new(),
                explanation: "Exchange rates are loading or offline".to_string(),
            },
        }
    }
}

impl Provider for UnitConverter {
    fn id(&self) -> ProviderId {
        ProviderId::Converter
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let Some(parsed) = parse_query(&query.residual) else {
            return Ok(Vec::new());
        };
        let conversion = match convert_units(&parsed) {
            Some(conversion) => conversion,
            None if is_currency(&parsed.from) && is_currency(&parsed.to) => {
                self.convert_currency(&parsed)
            }
            None => return Ok(Vec::new()),
        };

        let id = format!("convert:{}:{}:{}", parsed.value, parsed.from, parsed.to);
        if conversion.value.is_empty() {
            return Ok(vec![Candidate::info(id, conversion.title, conversion.explanation)]);
        }
        Ok(vec![Candidate::new(
            id,
            conversion.title,
            Action::CopyText {
                text: conversion.value,
            },
        )
        .with_subtitle(format!("{} · Copy to clipboard", conversion.explanation))
        .with_icon("accessories-calculator")
        .pinned()])
    }

    fn warm_up(&self) -> Result<(), ProviderError> {
        self.load_cache();
        let stale = self
            .rates
            .read()
            .as_ref()
            .map_or(true, |rates| rates.is_stale(now_epoch_secs()));
        if stale {
            debug!("exchange rate cache missing or stale");
            self.refresh_in_background();
        }
        Ok(())
    }
}

/// Accepts `<number>[ ]<unit> to <unit>` anywhere in the input.
pub fn parse_query(input: &str) -> Option<ConversionQuery> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    let to_index = tokens.iter().position(|t| t.eq_ignore_ascii_case("to"))?;
    let target = tokens.get(to_index + 1)?;
    if !target.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let (value, unit) = match &tokens[..to_index] {
        [.., number, unit] if is_alpha(unit) => (parse_number(number)?, *unit),
        [.., joined] => split_number_unit(joined)?,
        [] => return None,
    };
    Some(ConversionQuery {
        value,
        from: unit.to_ascii_lowercase(),
        to: target.to_ascii_lowercase(),
    })
}

fn is_alpha(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic())
}

fn parse_number(token: &str) -> Option<f64> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    token.parse().ok()
}

fn split_number_unit(token: &str) -> Option<(f64, &str)> {
    let split = token.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = token.split_at(split);
    if !is_alpha(unit) {
        return None;
    }
    Some((parse_number(number)?, unit))
}

fn lookup(table: &[(&str, f64)], unit: &str) -> Option<f64> {
    table.iter().find(|(name, _)| *name == unit).map(|(_, f)| *f)
}

fn is_currency(unit: &str) -> bool {
    CURRENCIES.contains(&unit.to_ascii_uppercase().as_str())
}

pub fn convert_units(query: &ConversionQuery) -> Option<Conversion> {
    for dimension in [Dimension::Length, Dimension::Weight, Dimension::Volume] {
        let table = dimension.table();
        let (Some(from), Some(to)) = (lookup(table, &query.from), lookup(table, &query.to)) else {
            continue;
        };
        let result = query.value * from / to;
        let formatted = format_measure(result);
        return Some(Conversion {
            title: format!(
                "{} {} = {formatted} {}",
                trim_number(query.value),
                query.from,
                query.to
            ),
            value: formatted,
            explanation: format!("{} conversion", dimension.label()),
        });
    }
    convert_temperature(query)
}

fn convert_temperature(query: &ConversionQuery) -> Option<Conversion> {
    let scale = |unit: &str| match unit {
        "c" | "celsius" => Some('C'),
        "f" | "fahrenheit" => Some('F'),
        "k" | "kelvin" => Some('K'),
        _ => None,
    };
    let from = scale(&query.from)?;
    let to = scale(&query.to)?;
    let celsius = match from {
        'F' => (query.value - 32.0) * 5.0 / 9.0,
        'K' => query.value - 273.15,
        _ => query.value,
    };
    let result = match to {
        'F' => celsius * 9.0 / 5.0 + 32.0,
        'K' => celsius + 273.15,
        _ => celsius,
    };
    let formatted = trim_zeros(format!("{result:.2}"));
    Some(Conversion {
        title: format!("{}° {from} = {formatted}° {to}", trim_number(query.value)),
        value: formatted,
        explanation: "Temperature conversion".to_string(),
    })
}

/// Scientific notation outside 0.01..1000, otherwise up to four decimals.
pub fn format_measure(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1000.0 || (magnitude < 0.01 && magnitude != 0.0) {
        format!("{value:.2e}")
    } else if magnitude >= 100.0 {
        format!("{value:.1}")
    } else {
        trim_zeros(format!("{value:.4}"))
    }
}

fn trim_number(value: f64) -> String {
    trim_zeros(format!("{value:.4}"))
}

fn trim_zeros(fixed: String) -> String {
    if !fixed.contains('.') {
        return fixed;
    }
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn age_label(fetched_epoch_secs: i64) -> String {
    let hours = now_epoch_secs().saturating_sub(fetched_epoch_secs) / 3600;
    if hours == 0 {
        "within the hour".to_string()
    } else {
        format!("{hours}h ago")
    }
}

fn rates_url(api_key: Option<&str>) -> String {
    match api_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => format!("https://v6.exchangerate-api.com/v6/{key}/latest/USD"),
        None => RATES_URL.to_string(),
    }
}

fn fetch_rates(url: &str) -> Result<ExchangeRates, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("rate API returned {}", response.status()));
    }
    // The keyed API names the table `conversion_rates`.
    let body: serde_json::Value = response.json().map_err(|e| e.to_string())?;
    let table = body
        .get("rates")
        .or_else(|| body.get("conversion_rates"))
        .cloned()
        .ok_or_else(|| "rate payload has no rate table".to_string())?;
    let rates: HashMap<String, f64> = serde_json::from_value(table).map_err(|e| e.to_string())?;
    Ok(ExchangeRates {
        rates,
        fetched_epoch_secs: now_epoch_secs(),
    })
}

fn save_cache(path: &std::path::Path, rates: &ExchangeRates) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let encoded = serde_json::to_string_pretty(rates).map_err(std::io::Error::other)?;
    std::fs::write(path, encoded)
}
