//! Erreurs côté device : chaque variante porte le code UPnP qui sera
//! renvoyé dans le `<UPnPError>` de la réponse SOAP.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// L'action n'existe pas pour ce service (code 401).
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Arguments manquants ou illisibles (code 402).
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// L'action a échoué côté implémentation (code 501).
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// Valeur d'argument invalide (code 600).
    #[error("Argument value invalid: {0}")]
    ArgumentValueInvalid(String),

    /// Valeur d'argument hors bornes (code 601).
    #[error("Argument value out of range: {0}")]
    ArgumentValueOutOfRange(String),

    /// Action optionnelle non implémentée par le handler (code 602).
    #[error("Optional action not implemented: {0}")]
    OptionalActionNotImplemented(String),

    /// Erreur spécifique au service (codes 7xx des specs AV).
    #[error("UPnP error {code}: {description}")]
    Upnp { code: u32, description: String },

    #[error("XML error: {0}")]
    Xml(#[from] xmltree::Error),
}

impl ServiceError {
    pub fn upnp(code: u32, description: impl Into<String>) -> Self {
        ServiceError::Upnp {
            code,
            description: description.into(),
        }
    }

    /// Code d'erreur UPnP associé à la variante.
    pub fn error_code(&self) -> u32 {
        match self {
            ServiceError::InvalidAction(_) => 401,
            ServiceError::InvalidArgs(_) => 402,
            ServiceError::ActionFailed(_) => 501,
            ServiceError::ArgumentValueInvalid(_) => 600,
            ServiceError::ArgumentValueOutOfRange(_) => 601,
            ServiceError::OptionalActionNotImplemented(_) => 602,
            ServiceError::Upnp { code, .. } => *code,
            ServiceError::Xml(_) => 501,
        }
    }
}
