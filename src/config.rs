//! Configuração via variáveis de ambiente

use crate::types::{MAX_INSTRUMENTS, TRADE_BUFFER_SIZE};
use std::path::PathBuf;

pub const DEFAULT_FEED_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

pub const DEFAULT_SYMBOLS: [&str; MAX_INSTRUMENTS] = [
    "BTC-USDT", "ADA-USDT", "ETH-USDT", "DOGE-USDT", "XRP-USDT", "SOL-USDT", "LTC-USDT", "BNB-USDT",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub feed_url: String,
    pub symbols: Vec<String>,
    pub data_dir: PathBuf,
    pub timing_file: PathBuf,
    pub reconnect_secs: u64,
    pub ping_secs: u64,
    pub trade_buffer_size: usize,
    pub flush_every: u64,
    pub writer_core: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            data_dir: PathBuf::from("data"),
            timing_file: PathBuf::from("timing.csv"),
            reconnect_secs: 10,
            ping_secs: 25,
            trade_buffer_size: TRADE_BUFFER_SIZE,
            flush_every: 1000,
            writer_core: 1,
        }
    }
}

impl Config {
    /// Lê do ambiente do processo.
    ///
    /// - `FEED_URL`, `SYMBOLS` (separados por vírgula), `DATA_DIR`, `TIMING_FILE`
    /// - `RECONNECT_SECS`, `PING_SECS`, `TRADE_BUFFER_SIZE`, `FLUSH_EVERY`, `WRITER_CORE`
    ///
    /// Valores numéricos inválidos caem no padrão.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Mesmo que `from_env`, com uma fonte arbitrária (testes não mexem no ambiente global).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            feed_url: lookup("FEED_URL").unwrap_or(defaults.feed_url),
            symbols: lookup("SYMBOLS")
                .map(|v| parse_symbols(&v))
                .unwrap_or(defaults.symbols),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            timing_file: lookup("TIMING_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.timing_file),
            reconnect_secs: number("RECONNECT_SECS")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.reconnect_secs),
            ping_secs: number("PING_SECS")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.ping_secs),
            trade_buffer_size: number("TRADE_BUFFER_SIZE")
                .filter(|&n| n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.trade_buffer_size),
            flush_every: number("FLUSH_EVERY").unwrap_or(defaults.flush_every),
            writer_core: number("WRITER_CORE")
                .map(|n| n as usize)
                .unwrap_or(defaults.writer_core),
        }
    }
}

/// Lista separada por vírgulas: sem vazios, sem repetidos, no máximo 8.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for s in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !symbols.iter().any(|known| known == s) {
            symbols.push(s.to_string());
        }
    }
    if symbols.len() > MAX_INSTRUMENTS {
        tracing::warn!(
            requested = symbols.len(),
            limit = MAX_INSTRUMENTS,
            "símbolos demais, excedentes ignorados"
        );
        symbols.truncate(MAX_INSTRUMENTS);
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.symbols.len(), 8);
        assert_eq!(config.reconnect_secs, 10);
    }

    #[test]
    fn custom_values_are_read() {
        let config = config_from(&[
            ("SYMBOLS", "BTC-USDT, ETH-USDT"),
            ("DATA_DIR", "/tmp/out"),
            ("RECONNECT_SECS", "3"),
            ("TRADE_BUFFER_SIZE", "500"),
            ("WRITER_CORE", "2"),
        ]);
        assert_eq!(config.symbols, vec!["BTC-USDT", "ETH-USDT"]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.reconnect_secs, 3);
        assert_eq!(config.trade_buffer_size, 500);
        assert_eq!(config.writer_core, 2);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[("RECONNECT_SECS", "soon"), ("PING_SECS", "0")]);
        assert_eq!(config.reconnect_secs, 10);
        assert_eq!(config.ping_secs, 25);
    }

    #[test]
    fn symbols_are_deduplicated_and_capped() {
        let symbols = parse_symbols("A,B,A,,C,D,E,F,G,H,I,J");
        assert_eq!(symbols, vec!["A", "B", "C", "D", "E", "F", "G", "H"]);
        assert!(parse_symbols(" , ").is_empty());
    }
}
