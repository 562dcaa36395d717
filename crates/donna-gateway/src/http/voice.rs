//! Twilio voice webhooks — the HTTP half of call setup.
//!
//! Both endpoints validate `X-Twilio-Signature` over the exact public URL
//! and the form body, then answer with TwiML that connects the call to the
//! media-stream socket, carrying senior id / call type / phone as stream
//! parameters.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use tracing::{info, warn};

use donna_core::types::CallType;
use donna_telephony::{normalize_phone, signature};

use crate::app::AppState;

/// POST /twilio/voice — a senior called Donna.
pub async fn inbound_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = parse_form(&body);
    if let Err(resp) = verify(&state, &headers, "/twilio/voice", &params) {
        return resp;
    }

    let from = form_value(&params, "From").unwrap_or_default();
    let senior = match state.seniors.get_by_phone(&normalize_phone(&from)) {
        Ok(Some(p)) => p,
        Ok(None) => {
            warn!(from = %from, "inbound call from unknown number");
            return reject_twiml();
        }
        Err(e) => {
            warn!(error = %e, "senior lookup failed");
            return reject_twiml();
        }
    };

    info!(senior = %senior.id, "inbound call accepted");
    connect_twiml(
        &state,
        &[
            ("senior_id", senior.id.as_str()),
            ("call_type", "check_in"),
            ("phone", &from),
        ],
    )
}

/// POST /twilio/voice/outbound — a call Donna placed was answered. The
/// per-call context is already stashed under the call sid (scheduler) or
/// the phone number (manual calls); TwiML only has to route the media.
pub async fn outbound_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = parse_form(&body);
    if let Err(resp) = verify(&state, &headers, "/twilio/voice/outbound", &params) {
        return resp;
    }

    let to = form_value(&params, "To").unwrap_or_default();
    info!(to = %to, "outbound call answered");
    connect_twiml(&state, &[("call_type", "reminder"), ("phone", &to)])
}

fn verify(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    params: &[(String, String)],
) -> Result<(), Response> {
    if !state.config.twilio.validate_signatures {
        return Ok(());
    }
    let sig = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let url = format!("{}{}", state.config.gateway.public_url, path);
    signature::validate(&state.config.twilio.auth_token, &url, params, sig).map_err(|e| {
        warn!(error = %e, "webhook signature rejected");
        (StatusCode::FORBIDDEN, "signature validation failed").into_response()
    })
}

/// TwiML that bridges the call into the media WS with stream parameters.
fn connect_twiml(state: &AppState, params: &[(&str, &str)]) -> Response {
    let ws_url = format!(
        "{}/twilio/media",
        state
            .config
            .gateway
            .public_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    );

    let mut parameters = String::new();
    for (name, value) in params {
        parameters.push_str(&format!(
            r#"<Parameter name="{}" value="{}"/>"#,
            xml_escape(name),
            xml_escape(value)
        ));
    }

    let twiml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{ws_url}">{parameters}</Stream></Connect></Response>"#
    );
    xml_response(twiml)
}

/// Polite brush-off for calls that cannot be matched to a senior.
fn reject_twiml() -> Response {
    xml_response(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say>Sorry, this number is not set up with this service. Goodbye.</Say><Hangup/></Response>"#
            .to_string(),
    )
}

fn xml_response(twiml: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Parse an application/x-www-form-urlencoded body.
pub fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

fn form_value(params: &[(String, String)], name: &str) -> Option<String> {
    params.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}
