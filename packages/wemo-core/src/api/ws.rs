//! WebSocket handler streaming bus events and accepting commands.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::api::DeviceView;
use crate::bus::BusEvent;
use crate::error::ErrorCode;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    SetOnOff { payload: WsOnOffRequest },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsOnOffRequest {
    serial: String,
    on: bool,
}

/// Outgoing messages other than raw bus events.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    InitialState { payload: InitialStatePayload },
    CommandResult { payload: CommandResultPayload },
    Error { message: String },
}

#[derive(Serialize)]
struct InitialStatePayload {
    devices: Vec<DeviceView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandResultPayload {
    serial: String,
    on: bool,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl WsOutgoing {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

fn event_message(event: &BusEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(s) => Some(Message::Text(s.into())),
        Err(e) => {
            log::warn!("[WS] Failed to serialize bus event: {}", e);
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Handles one text frame from a client and produces the reply.
async fn handle_text(state: &AppState, text: &str) -> WsOutgoing {
    let incoming = match serde_json::from_str::<WsIncoming>(text) {
        Ok(msg) => msg,
        Err(e) => {
            log::debug!("[WS] Unparseable message: {}", e);
            return WsOutgoing::Error {
                message: format!("invalid message: {e}"),
            };
        }
    };

    match incoming {
        WsIncoming::SetOnOff { payload } => {
            let result = state.set_on_off(&payload.serial, payload.on).await;
            let (success, error, message) = match result {
                Ok(()) => (true, None, None),
                Err(e) => (false, Some(e.code()), Some(e.to_string())),
            };
            WsOutgoing::CommandResult {
                payload: CommandResultPayload {
                    serial: payload.serial,
                    on: payload.on,
                    success,
                    error,
                    message,
                },
            }
        }
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before taking the snapshot
    let mut events = state.bus.subscribe();

    log::info!("[WS] Client connected");

    let initial = WsOutgoing::InitialState {
        payload: InitialStatePayload {
            devices: state.devices(),
        },
    };
    if let Some(msg) = initial.to_message() {
        if sender.send(msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Some(msg) = event_message(&event) else { continue };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[WS] Client lagged, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_text(&state, text.as_str()).await;
                    if let Some(msg) = reply.to_message() {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::debug!("[WS] Receive error: {}", e);
                    break;
                }
            },
        }
    }

    log::info!("[WS] Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;

    fn to_json(out: &WsOutgoing) -> serde_json::Value {
        serde_json::to_value(out).unwrap()
    }

    #[tokio::test]
    async fn set_on_off_replies_with_command_result() {
        let (state, appliance) = test_state::populated().await;
        let reply = handle_text(
            &state,
            r#"{"type":"SET_ON_OFF","payload":{"serial":"S1","on":true}}"#,
        )
        .await;

        let json = to_json(&reply);
        assert_eq!(json["type"], "COMMAND_RESULT");
        assert_eq!(json["payload"]["success"], true);
        assert_eq!(appliance.power_commands(), vec![true]);
    }

    #[tokio::test]
    async fn failed_command_carries_error_code() {
        let (state, appliance) = test_state::populated().await;
        appliance.fail_commands(true);
        let reply = handle_text(
            &state,
            r#"{"type":"SET_ON_OFF","payload":{"serial":"S1","on":false}}"#,
        )
        .await;

        let json = to_json(&reply);
        assert_eq!(json["payload"]["success"], false);
        assert_eq!(json["payload"]["error"], "command_failed");
    }

    #[tokio::test]
    async fn garbage_is_an_error_reply() {
        let (state, _) = test_state::populated().await;
        let json = to_json(&handle_text(&state, r#"{"type":"REBOOT"}"#).await);
        assert_eq!(json["type"], "ERROR");
    }
}
