mod server;

pub use server::http_server_service;
