//! Slack side of the muster bot.
//!
//! - `api` - Web API client (`chat.postMessage`, `views.open`, roster lookups)
//! - `socket` - Socket Mode event loop with acknowledgement and reconnection
//! - `transport` - the WebSocket behind `socket`
//! - `events` - envelope parsing and handler dispatch
//! - `commands` - slash command parsing and the admin gate
//! - `blocks` - Block Kit messages and modals
//!
//! ```text
//! Slack ── WebSocket ──▶ SocketModeRunner ──▶ EventDispatcher ──▶ handlers ──▶ services
//!                              │                                                   │
//!                              └──── ephemeral reply ◀──── MessageTemplate ◀───────┘
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
pub mod transport;
