pub mod blacklist;
pub mod claim_settings;
pub mod settings;
pub mod staff;
