pub mod allowed_hosts;
pub mod api_json;
pub mod client_ip;
pub mod flash;
pub mod session;
