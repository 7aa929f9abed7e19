pub mod accounts;
pub mod fixtures;
pub mod static_assets;
