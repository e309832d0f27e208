//! Entités sea-orm du bot de tickets

pub mod guild;
pub mod panel;
pub mod ticket;
