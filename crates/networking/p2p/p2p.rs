//! # ethkit P2P Networking
//!
//! Light client side of the Ethereum peer-to-peer stack.
//!
//! ## Overview
//!
//! - **Discovery**: UDP node discovery (Ping/Pong/FindNode/Neighbors) feeding a scored node store
//! - **RLPx**: ECIES handshake and the AES-CTR framed transport built on its secrets
//! - **DevP2P**: Hello/Disconnect/Ping/Pong and capability multiplexing
//! - **LES**: Light Ethereum Subprotocol v2 session with task/request correlation
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   nodes   ┌──────────────────────────────────────────┐
//! │  Discovery   │──────────▶│                 Peer task                │
//! │ (UDP client, │           │  RLPx framed stream ─▶ DevP2P ─▶ LES     │
//! │ NodeManager) │           │                        session/handlers  │
//! └──────────────┘           └──────────────────────────────────────────┘
//!                                     ▲ Task              │ PeerEvent
//!                                     │                   ▼
//!                              ┌──────────────────────────────┐
//!                              │     Orchestrator (caller)    │
//!                              └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`discovery`] | Discovery packets, UDP client, node manager and lookups |
//! | [`rlpx`] | ECIES, initiator handshake, frame codec, connection setup |
//! | [`devp2p`] | Base protocol messages, capability negotiation, peer state |
//! | [`les`] | LES messages, tasks, session and task handlers |
//! | [`peer`] | Async driver tying a connection to a LES session |
//! | [`utils`] | Time helpers |

pub mod devp2p;
pub mod discovery;
pub mod les;
pub mod peer;
pub mod rlpx;
pub mod utils;

pub use peer::{PeerConfig, PeerError, PeerEvents, PeerHandle, spawn_peer};
