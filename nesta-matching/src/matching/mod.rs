pub mod detect;
pub mod saga;
pub mod rank;
