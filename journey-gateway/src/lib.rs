//! Journey gateway.
//!
//! Answers public transport journey requests by combining a public transport
//! planner with street-network routers: stop points reachable around the
//! origin and the destination are found for every fallback mode, journeys
//! are computed between them, then completed with the actual street-network
//! paths, transfer paths and fares.

pub mod cache;
pub mod config;
pub mod domain;
pub mod providers;
pub mod request;
pub mod scenario;
pub mod web;
