pub mod agent;
pub mod membership;
pub mod sandbox;
