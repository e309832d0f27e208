//! Fonctions d'accès aux données sur les entités sea-orm.
//!
//! Chaque fonction reçoit la connexion en paramètre et convertit les erreurs du driver en [`Error`].

pub mod archive;
pub mod guild;
pub mod panel;
pub mod ticket;

use std::fmt;

#[derive(Debug)]
pub enum Error {
    SeaORM(sea_orm::DbErr),
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SeaORM(e) => write!(f, "base de données : {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<sea_orm::DbErr> for Error {
    fn from(e: sea_orm::DbErr) -> Self {
        Error::SeaORM(e)
    }
}
