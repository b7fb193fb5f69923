pub mod delivery;
pub mod recorder;
