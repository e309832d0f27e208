use std::fmt;
use serenity::model::id::UserId;
use crate::{
    coordination::CoordinationError,
    db::controller::Error as DbError,
    platform::PlatformError,
};
use super::capacity::CapacityError;

/// Famille d'une erreur, pour que l'appelant choisisse sa réponse sans inspecter chaque variante
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Refus lié à la demande elle-même : réponse à l'utilisateur, pas de nouvel essai
    Validation,
    /// Limite de salons ou de tickets atteinte
    Capacity,
    RateLimit,
    /// Erreur de l'API Discord
    Platform,
    /// Erreur de la base de données ou du store de coordination
    Data,
    Timeout,
}

#[derive(Debug)]
pub enum TicketError {
    Blacklisted,
    PanelNotFound(i32),
    PanelDisabled,
    PanelAccessDenied,
    /// Le salon parent configuré pour les fils n'est pas un salon textuel
    InvalidThreadParent,
    TicketNotFound,
    TicketClosed,
    TicketAlreadyOpen,
    /// L'opération n'existe qu'en mode fil
    NotAThread,
    /// L'opération n'existe qu'en mode salon
    ThreadTicket,
    ChannelDeleted,
    NoTicketAccess,
    /// L'auteur d'un ticket ne peut pas en être retiré
    CannotRemoveOpener,
    NotStaff,
    AlreadyClaimed(UserId),
    NotClaimed,
    NotClaimer,
    /// Un ticket en mode salon ne peut pas passer sur un panel en mode fil
    IncompatiblePanel,
    /// Le membre ayant claim le ticket perdrait l'accès avec le nouveau panel
    ClaimerWouldLoseAccess,
    NoCloseRequest,
    PageExpired,
    Capacity(CapacityError),
    TicketLimit(u64),
    RateLimited,
    Platform(PlatformError),
    Data(DbError),
    Coordination(CoordinationError),
    Timeout,
}

impl TicketError {
    pub fn kind(&self) -> ErrorKind {
        use TicketError::*;
        match self {
            Capacity(_) | TicketLimit(_) => ErrorKind::Capacity,
            RateLimited => ErrorKind::RateLimit,
            Platform(_) => ErrorKind::Platform,
            Data(_) => ErrorKind::Data,
            Coordination(CoordinationError::Backend(_)) => ErrorKind::Data,
            Coordination(CoordinationError::LockTimeout(_)) | Timeout => ErrorKind::Timeout,
            _ => ErrorKind::Validation,
        }
    }
}

impl fmt::Display for TicketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TicketError::*;
        match self {
            Blacklisted => write!(f, "Vous n'êtes pas autorisé à ouvrir des tickets sur ce serveur."),
            PanelNotFound(id) => write!(f, "Le panel {} n'existe pas.", id),
            PanelDisabled => write!(f, "Ce panel est désactivé."),
            PanelAccessDenied => write!(f, "Vous n'avez pas accès à ce panel."),
            InvalidThreadParent => write!(f, "Le salon parent des fils n'est pas un salon textuel."),
            TicketNotFound => write!(f, "Ce ticket n'existe pas."),
            TicketClosed => write!(f, "Ce ticket est fermé."),
            TicketAlreadyOpen => write!(f, "Ce ticket est déjà ouvert."),
            NotAThread => write!(f, "Seuls les tickets en mode fil peuvent être réouverts."),
            ThreadTicket => write!(f, "Cette action n'est pas disponible pour les tickets en mode fil."),
            ChannelDeleted => write!(f, "Le salon de ce ticket n'existe plus."),
            NoTicketAccess => write!(f, "Vous n'avez pas accès à ce ticket."),
            CannotRemoveOpener => write!(f, "L'auteur du ticket ne peut pas en être retiré."),
            NotStaff => write!(f, "Cette action est réservée au staff."),
            AlreadyClaimed(user) => write!(f, "Ce ticket est déjà pris en charge par <@{}>.", user.0),
            NotClaimed => write!(f, "Ce ticket n'est pas pris en charge."),
            NotClaimer => write!(f, "Seul le membre ayant pris en charge le ticket peut le libérer."),
            IncompatiblePanel => write!(f, "Un ticket en mode salon ne peut pas passer sur un panel en mode fil."),
            ClaimerWouldLoseAccess => write!(f, "Le membre ayant pris en charge ce ticket perdrait l'accès avec ce panel."),
            NoCloseRequest => write!(f, "Aucune demande de fermeture en attente."),
            PageExpired => write!(f, "Ces résultats ont expiré, relancez la commande."),
            Capacity(e) => write!(f, "{}", e),
            TicketLimit(limit) => write!(f, "Vous avez atteint la limite de {} tickets ouverts.", limit),
            RateLimited => write!(f, "Trop de tickets sont ouverts en ce moment, réessayez dans quelques secondes."),
            Platform(e) => write!(f, "Erreur Discord: {}", e),
            Data(e) => write!(f, "Erreur de base de données: {}", e),
            Coordination(e) => write!(f, "{}", e),
            Timeout => write!(f, "L'opération a pris trop de temps."),
        }
    }
}

impl std::error::Error for TicketError {}

impl From<PlatformError> for TicketError {
    fn from(e: PlatformError) -> Self {
        TicketError::Platform(e)
    }
}

impl From<DbError> for TicketError {
    fn from(e: DbError) -> Self {
        TicketError::Data(e)
    }
}

impl From<CoordinationError> for TicketError {
    fn from(e: CoordinationError) -> Self {
        TicketError::Coordination(e)
    }
}

impl From<CapacityError> for TicketError {
    fn from(e: CapacityError) -> Self {
        match e {
            CapacityError::Platform(e) => TicketError::Platform(e),
            CapacityError::Data(e) => TicketError::Data(e),
            CapacityError::Coordination(e) => TicketError::Coordination(e),
            e => TicketError::Capacity(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, TicketError>;
