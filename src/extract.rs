//! Extração de tickers do JSON da OKX
//!
//! Formato do push do canal `tickers`:
//! `{"arg":{"channel":"tickers","instId":"BTC-USDT"},"data":[{"instId":"BTC-USDT","last":"43000.1","lastSz":"0.01",...}]}`
//!
//! Respostas de controle (`{"event":"subscribe",...}`, `{"event":"error",...}`)
//! e o `pong` textual não carregam trades.

use crate::error::DecodeError;
use crate::types::TickerEvent;
use serde::Deserialize;

/// Mensagem recebida do WebSocket, já classificada.
#[derive(Debug)]
pub enum FeedMessage {
    Tickers(Vec<RawTicker>),
    Event { event: String, detail: Option<String> },
    Pong,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Event {
        event: String,
        #[serde(default)]
        msg: Option<String>,
    },
    Push {
        data: Vec<RawTicker>,
    },
}

/// Ticker ainda com os campos textuais da OKX.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    #[serde(rename = "instId")]
    pub inst_id: Option<String>,
    pub last: Option<String>,
    pub vol: Option<String>,
    #[serde(rename = "lastSz")]
    pub last_sz: Option<String>,
}

impl RawTicker {
    /// Converte para evento tipado. Usa `vol` se presente, senão `lastSz`.
    pub fn to_event(&self) -> Result<TickerEvent, DecodeError> {
        let instrument = self
            .inst_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(DecodeError::MissingField("instId"))?;
        let last = self.last.as_deref().ok_or(DecodeError::MissingField("last"))?;
        let (vol_field, vol) = match (&self.vol, &self.last_sz) {
            (Some(v), _) => ("vol", v.as_str()),
            (None, Some(v)) => ("lastSz", v.as_str()),
            (None, None) => return Err(DecodeError::MissingField("lastSz")),
        };

        Ok(TickerEvent {
            instrument: instrument.to_string(),
            price: parse_number("last", last)?,
            volume: parse_number(vol_field, vol)?,
        })
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// Classifica uma mensagem de texto do feed.
pub fn decode_message(text: &str) -> Result<FeedMessage, DecodeError> {
    if text.trim() == "pong" {
        return Ok(FeedMessage::Pong);
    }
    match serde_json::from_str::<Envelope>(text)? {
        Envelope::Event { event, msg } => Ok(FeedMessage::Event { event, detail: msg }),
        Envelope::Push { data } => Ok(FeedMessage::Tickers(data)),
    }
}

/// Mensagem de inscrição no canal `tickers` para cada símbolo.
pub fn subscribe_message(symbols: &[String]) -> String {
    let args: Vec<serde_json::Value> = symbols
        .iter()
        .map(|s| serde_json::json!({ "channel": "tickers", "instId": s }))
        .collect();
    serde_json::json!({ "op": "subscribe", "args": args }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ticker_push_with_last_size_fallback() {
        let text = r#"{"arg":{"channel":"tickers","instId":"BTC-USDT"},"data":[{"instType":"SPOT","instId":"BTC-USDT","last":"43250.5","lastSz":"0.0123","vol24h":"9000"}]}"#;

        let FeedMessage::Tickers(tickers) = decode_message(text).unwrap() else {
            panic!("esperava tickers");
        };
        let event = tickers[0].to_event().unwrap();

        assert_eq!(event.instrument, "BTC-USDT");
        assert_eq!(event.price, 43250.5);
        assert_eq!(event.volume, 0.0123);
    }

    #[test]
    fn prefers_vol_over_last_size() {
        let text = r#"{"data":[{"instId":"ETH-USDT","last":"2000","vol":"5","lastSz":"1"}]}"#;
        let FeedMessage::Tickers(tickers) = decode_message(text).unwrap() else {
            panic!("esperava tickers");
        };
        assert_eq!(tickers[0].to_event().unwrap().volume, 5.0);
    }

    #[test]
    fn control_messages_are_not_trades() {
        let ack = r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"BTC-USDT"},"connId":"a4d3ae55"}"#;
        assert!(matches!(
            decode_message(ack).unwrap(),
            FeedMessage::Event { ref event, .. } if event == "subscribe"
        ));
        assert!(matches!(decode_message("pong").unwrap(), FeedMessage::Pong));
    }

    #[test]
    fn malformed_ticker_is_rejected_individually() {
        let text = r#"{"data":[{"instId":"BTC-USDT","last":"abc","lastSz":"1"},{"instId":"ETH-USDT","last":"10","lastSz":"2"},{"last":"1","lastSz":"1"}]}"#;
        let FeedMessage::Tickers(tickers) = decode_message(text).unwrap() else {
            panic!("esperava tickers");
        };

        assert!(matches!(
            tickers[0].to_event(),
            Err(DecodeError::InvalidNumber { field: "last", .. })
        ));
        assert!(tickers[1].to_event().is_ok());
        assert!(matches!(
            tickers[2].to_event(),
            Err(DecodeError::MissingField("instId"))
        ));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(decode_message("{nope"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn subscribe_lists_every_symbol() {
        let msg = subscribe_message(&["BTC-USDT".to_string(), "SOL-USDT".to_string()]);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["op"], "subscribe");
        assert_eq!(v["args"][1]["instId"], "SOL-USDT");
        assert_eq!(v["args"][0]["channel"], "tickers");
    }
}
