pub mod acp;
pub mod updates;
