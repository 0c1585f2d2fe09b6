use serde::Serialize;

pub const DELTA_STREAM_URL: &str = "wss://socket.india.delta.exchange";

const FUNDING_RATE_CHANNEL: &str = "funding_rate";
const PERPETUAL_FUTURES_GROUP: &str = "perpetual_futures";

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: SubscribePayload<'a>,
}

#[derive(Debug, Serialize)]
struct SubscribePayload<'a> {
    channels: Vec<ChannelSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct ChannelSpec<'a> {
    name: &'a str,
    symbols: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct PingFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

pub fn subscription_payload() -> Result<String, simd_json::Error> {
    simd_json::to_string(&SubscribeFrame {
        kind: "subscribe",
        payload: SubscribePayload {
            channels: vec![ChannelSpec {
                name: FUNDING_RATE_CHANNEL,
                symbols: vec![PERPETUAL_FUTURES_GROUP],
            }],
        },
    })
}

pub fn heartbeat_payload() -> Result<String, simd_json::Error> {
    simd_json::to_string(&PingFrame { kind: "ping" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_requests_funding_rate_for_all_perpetuals() {
        let payload = subscription_payload().expect("subscription should serialize");
        assert_eq!(
            payload,
            r#"{"type":"subscribe","payload":{"channels":[{"name":"funding_rate","symbols":["perpetual_futures"]}]}}"#
        );
    }

    #[test]
    fn heartbeat_is_json_ping() {
        let payload = heartbeat_payload().expect("ping should serialize");
        assert_eq!(payload, r#"{"type":"ping"}"#);
    }
}
