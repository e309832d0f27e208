//! Moteur de cycle de vie des tickets de support pour Discord.
//!
//! Le crate expose le moteur ([`tickets::TicketEngine`]), sa couche de données sea-orm
//! ([`db`]), l'accès à Discord ([`platform`]) et le store de coordination partagé entre
//! les invocations ([`coordination`]).

pub mod log;
pub mod config;
pub mod coordination;
pub mod db;
pub mod platform;
pub mod tickets;
