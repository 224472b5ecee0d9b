//! The Gateway: the in-process message bus and service multiplexer that
//! bridges inbound channel/cron traffic, the agent lifecycle, and RPC
//! clients connecting over WebSocket (spec.md §1-§9).
//!
//! `state::GatewayState` is the shared broker every connection task and
//! background driver holds a handle to. `agent_bridge` wires the session
//! queue to `vargos_agents::run_agent_loop` without either crate depending
//! on the other's concrete types (§9 Design Notes).

pub mod agent_bridge;
pub mod channel_registry;
pub mod connection;
pub mod cron_service;
pub mod debouncer;
pub mod dedupe;
pub mod domain_services;
pub mod event_bus;
pub mod inbound_pipeline;
pub mod local_dispatch;
pub mod reconnector;
pub mod registry;
pub mod reply_delivery;
pub mod rpc;
pub mod server;
pub mod session_queue;
pub mod session_tools;
pub mod state;

pub use agent_bridge::build as build_gateway_state;
pub use channel_registry::ChannelRegistry;
pub use cron_service::GatewayCronService;
pub use state::GatewayState;
